//! The kernel instance: one bootstrapped service owning the process table,
//! the system open-file table, and the mount table. Explicitly constructed
//! and explicitly torn down (by dropping), never a global; each test, and
//! each embedding, gets its own.

use std::sync::Arc;

use auklet_abi::Pid;

use crate::{
    file::SystemFileTable,
    param::KERNEL_NAME,
    proc::{Proc, ProcTable},
    thread,
    trap::UserMode,
    vfs::{Console, ConsoleDevice, Vfs},
};

pub struct Kernel {
    procs: ProcTable,
    files: SystemFileTable,
    vfs: Vfs,
    console: Arc<Console>,
    usermode: Box<dyn UserMode>,
    kproc: Arc<Proc>,
}

impl Kernel {
    /// Brings a kernel up: console registered, kernel process in slot 0 of
    /// the process table. The caller supplies the user-mode door and mounts
    /// any filesystems afterwards.
    pub fn bootstrap(usermode: Box<dyn UserMode>) -> Arc<Self> {
        let vfs = Vfs::new();
        let console = Arc::new(Console::new());
        vfs.mount(Arc::new(ConsoleDevice::new(Arc::clone(&console))))
            .expect("console mounts on a fresh vfs");

        let procs = ProcTable::new();
        let kproc = Arc::new(Proc::new(Pid::KERNEL, KERNEL_NAME));
        procs.set_kernel(Arc::clone(&kproc));

        log::debug!("kernel bootstrapped");
        Arc::new(Self {
            procs,
            files: SystemFileTable::new(),
            vfs,
            console,
            usermode,
            kproc,
        })
    }

    pub fn procs(&self) -> &ProcTable {
        &self.procs
    }

    pub fn files(&self) -> &SystemFileTable {
        &self.files
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    pub fn console(&self) -> &Arc<Console> {
        &self.console
    }

    pub fn usermode(&self) -> &dyn UserMode {
        &*self.usermode
    }

    pub fn kernel_proc(&self) -> &Arc<Proc> {
        &self.kproc
    }

    /// Attaches the calling thread to the kernel process, so it can act as
    /// the menu: start programs, mount filesystems, and so on.
    pub fn attach_current_thread(self: &Arc<Self>) {
        thread::attach(Arc::clone(self), Arc::clone(&self.kproc));
    }

    /// Detaches a thread previously attached with
    /// [`attach_current_thread`](Self::attach_current_thread).
    pub fn detach_current_thread(&self) {
        thread::detach();
    }

    /// Runs a program in a new process. See [`crate::proc::run_program`].
    pub fn run_program(
        self: &Arc<Self>,
        path: &str,
        args: &[&str],
    ) -> Result<(Pid, std::thread::JoinHandle<()>), crate::error::KernelError> {
        crate::proc::run_program(self, path, args)
    }
}
