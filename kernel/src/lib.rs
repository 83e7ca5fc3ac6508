//! auklet: a hosted teaching kernel's process and file syscall layer.
//!
//! The shape of a small Unix: a bounded process table with fork, execv,
//! waitpid and _exit; a system-wide open-file table under per-process
//! descriptor tables with open, close, read, write, lseek, dup2, chdir,
//! getcwd and remove; and the sleep-lock/condition-variable layer the rest
//! stands on.
//!
//! Kernel threads are OS threads and an address space is a bounds-checked
//! flat memory object, so the whole layer runs and is tested as an
//! ordinary crate. The machine-dependent door into user execution is the
//! [`trap::UserMode`] trait; embedders and tests supply one.
//!
//! ```
//! use auklet_kernel::{Kernel, trap::HaltUserMode, vfs::MemFs};
//! use std::sync::Arc;
//!
//! let kernel = Kernel::bootstrap(Box::new(HaltUserMode));
//! kernel.vfs().mount(Arc::new(MemFs::new("mem"))).unwrap();
//! ```

pub mod error;
pub mod file;
pub mod kernel;
pub mod loader;
pub mod param;
pub mod proc;
pub mod sync;
pub mod syscall;
pub mod thread;
pub mod trap;
pub mod vfs;
pub mod vm;

pub use auklet_abi as abi;

pub use self::kernel::Kernel;
