//! User-visible ABI of the auklet kernel.
//!
//! Everything in this crate is shared verbatim between the kernel and user
//! side: error numbers, open flags, syscall numbers, descriptor and process
//! id newtypes, and the limits a user program can observe.

pub mod errno;
pub mod fcntl;
pub mod fs;
pub mod limits;
pub mod process;
pub mod syscall;

pub use self::{
    errno::Errno,
    fcntl::{AccessMode, OpenFlags, Whence},
    fs::RawFd,
    process::{Pid, WaitOptions, encode_exit_status, exit_code},
    syscall::SyscallCode,
};
