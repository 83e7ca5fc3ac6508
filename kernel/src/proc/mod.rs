//! Processes: the table entry, fork, exit, wait, and teardown.
//!
//! Each process splits its state the way its locking works:
//!
//! - `shared` (under the proc spinlock): name, filiation, thread count and
//!   exit status, the fields other processes read.
//! - `private`: address space, working directory and descriptor table,
//!   touched only by the process's own thread, or by its reaper once the
//!   thread count has dropped to zero.
//!
//! The wait/exit rendezvous is a sleep lock and condition variable pair per
//! process: `_exit` signals under the lock after detaching its thread, and
//! `waitpid` re-checks the thread count around every wait.

use core::cell::UnsafeCell;
use std::sync::Arc;

use arrayvec::ArrayString;
use auklet_abi::{AccessMode, Pid, RawFd, WaitOptions, encode_exit_status};

use crate::{
    error::KernelError,
    file::FdTable,
    kernel::Kernel,
    param::CONSOLE,
    sync::{Condvar, SleepLock, SpinLock, SpinLockGuard},
    thread,
    trap::Trapframe,
    vfs::{OpenOptions, Vnode},
    vm::VirtAddr,
};

mod exec;
mod table;

pub use self::{
    exec::{exec, run_program},
    table::ProcTable,
};

const NAME_MAX: usize = 32;

/// Fields of a process that other processes may read, guarded by the proc
/// spinlock. Held only for short straight-line sections.
pub struct ProcShared {
    name: ArrayString<NAME_MAX>,
    /// `None` once orphaned; the root of a process tree is also `None`.
    parent: Option<Pid>,
    /// Pids only: filiation is recorded here, ownership stays with the
    /// process table.
    children: Vec<Pid>,
    /// Threads currently attached. Zero after exit has been signalled.
    threads: u32,
    /// Exit status, low 8 bits carrying the exit code. Valid once
    /// `threads` is zero.
    status: i32,
}

impl ProcShared {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name.clear();
        for ch in name.chars() {
            if self.name.try_push(ch).is_err() {
                break;
            }
        }
    }

    pub fn parent(&self) -> Option<Pid> {
        self.parent
    }

    pub fn children(&self) -> &[Pid] {
        &self.children
    }

    pub fn status(&self) -> i32 {
        self.status
    }
}

/// Per-process state touched only by the owning thread (or the reaper of a
/// zombie).
pub(crate) struct ProcPrivate {
    pub(crate) addrspace: Option<crate::vm::AddrSpace>,
    pub(crate) cwd: Option<Arc<dyn Vnode>>,
    pub(crate) fds: FdTable,
}

pub struct Proc {
    pid: Pid,
    shared: SpinLock<ProcShared>,
    private: UnsafeCell<ProcPrivate>,
    /// Rendezvous pair for waitpid/_exit.
    wait_lock: SleepLock<()>,
    wait_cv: Condvar,
}

// `private` is handed out only to the owning thread or a zombie's reaper.
unsafe impl Send for Proc {}
unsafe impl Sync for Proc {}

impl Proc {
    pub(crate) fn new(pid: Pid, name: &str) -> Self {
        let mut shared = ProcShared {
            name: ArrayString::new(),
            parent: None,
            children: Vec::new(),
            threads: 0,
            status: 0,
        };
        shared.set_name(name);
        Self {
            pid,
            shared: SpinLock::new(shared),
            private: UnsafeCell::new(ProcPrivate {
                addrspace: None,
                cwd: None,
                fds: FdTable::new(),
            }),
            wait_lock: SleepLock::new("proc wait", ()),
            wait_cv: Condvar::new("proc wait"),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> String {
        self.shared.lock().name().to_owned()
    }

    pub fn shared(&self) -> SpinLockGuard<'_, ProcShared> {
        self.shared.lock()
    }

    pub fn thread_count(&self) -> u32 {
        self.shared.lock().threads
    }

    /// The process's own-thread state.
    ///
    /// # Safety
    ///
    /// The caller must be the process's attached thread, or its reaper
    /// after the thread count has reached zero; nothing else may alias it.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn private_mut(&self) -> &mut ProcPrivate {
        unsafe { &mut *self.private.get() }
    }

    pub(crate) fn add_thread(&self) {
        self.shared.lock().threads += 1;
    }

    pub(crate) fn remove_thread(&self) {
        let mut shared = self.shared.lock();
        assert!(shared.threads > 0, "thread count underflow");
        shared.threads -= 1;
    }

    /// Wakes anyone blocked in waitpid on this process.
    pub(crate) fn wake_waiters(&self) {
        let mut held = self.wait_lock.lock();
        self.wait_cv.broadcast(&mut held);
    }
}

/// Creates a process with a reserved pid. Not yet in the table: the caller
/// commits it once construction has finished, or releases the pid.
pub(crate) fn create(k: &Kernel, name: &str) -> Result<Arc<Proc>, KernelError> {
    let pid = k.procs().reserve()?;
    let proc = Arc::new(Proc::new(pid, name));
    log::debug!("process {pid} created ({name})");
    Ok(proc)
}

/// Creates a process ready to run a program: console on descriptors 0..=2
/// and the spawner's working directory, if the calling thread has one.
pub(crate) fn create_runprogram(k: &Kernel, name: &str) -> Result<Arc<Proc>, KernelError> {
    let proc = create(k, name)?;
    // No thread is attached yet, so the new private state is ours to set up.
    let private = unsafe { proc.private_mut() };

    let res = (|| -> Result<(), KernelError> {
        console_init(k, private)?;
        if let Some(cur) = thread::try_current() {
            // We are the spawner's thread, so its private state is ours to
            // read.
            let spawner = unsafe { cur.proc.private_mut() };
            private.cwd = spawner.cwd.clone();
        }
        Ok(())
    })();

    if let Err(err) = res {
        release_private(k, private);
        k.procs().release(proc.pid());
        return Err(err);
    }
    Ok(proc)
}

/// Attaches the console to descriptors 0, 1 and 2, each as its own open
/// file with one reference.
fn console_init(k: &Kernel, private: &mut ProcPrivate) -> Result<(), KernelError> {
    const SLOTS: [(&str, AccessMode); 3] = [
        ("STDIN", AccessMode::ReadOnly),
        ("STDOUT", AccessMode::WriteOnly),
        ("STDERR", AccessMode::WriteOnly),
    ];
    for (fd, (name, mode)) in SLOTS.into_iter().enumerate() {
        let options = OpenOptions {
            mode,
            create: false,
            exclusive: false,
            truncate: false,
        };
        let vnode = k.vfs().open(CONSOLE, &options, None)?;
        let id = k.files().create(name, vnode, mode, 0)?;
        let prev = private.fds.set(RawFd::new(fd), id);
        assert!(prev.is_none());
    }
    Ok(())
}

/// Releases everything hanging off a process's private state: descriptors
/// through the ordinary close path, then working directory and address
/// space.
pub(crate) fn release_private(k: &Kernel, private: &mut ProcPrivate) {
    for id in private.fds.take_all() {
        k.files().decref(id);
    }
    private.cwd.take();
    private.addrspace.take();
}

/// Creates a child copying the caller: duplicated address space, shared
/// descriptors, same working directory. The child's thread enters user mode
/// through the forked-process door with a trapframe copy whose return value
/// is 0.
pub fn fork(k: &Arc<Kernel>, p: &Arc<Proc>, tf: &Trapframe) -> Result<Pid, KernelError> {
    let name = p.name();
    let pid = k.procs().reserve()?;
    let child = Arc::new(Proc::new(pid, &name));

    let built = (|| -> Result<Box<Trapframe>, KernelError> {
        // We are the parent's thread; the child has none yet.
        let parent_private = unsafe { p.private_mut() };
        let child_private = unsafe { child.private_mut() };

        let space = parent_private
            .addrspace
            .as_ref()
            .expect("fork caller has no address space");
        child_private.addrspace = Some(space.copy()?);

        // A 1:1 snapshot of the parent's registers, except that the child
        // observes fork returning 0.
        let mut child_tf = Box::new(*tf);
        child_tf.a0 = 0;
        child_tf.a3 = 0;

        for (fd, id) in parent_private.fds.entries() {
            k.files().incref(id);
            let prev = child_private.fds.set(fd, id);
            assert!(prev.is_none());
        }
        child_private.cwd = parent_private.cwd.clone();
        Ok(child_tf)
    })();

    let child_tf = match built {
        Ok(child_tf) => child_tf,
        Err(err) => {
            let child_private = unsafe { child.private_mut() };
            release_private(k, child_private);
            k.procs().release(pid);
            return Err(err);
        }
    };

    p.shared().children.push(pid);
    child.shared().parent = Some(p.pid());
    k.procs().commit(pid, Arc::clone(&child));

    let kernel = Arc::clone(k);
    thread::spawn(&name, Arc::clone(k), Arc::clone(&child), move || {
        kernel.usermode().enter_forked(child_tf);
    });

    log::debug!("process {} forked child {pid}", p.pid());
    Ok(pid)
}

/// The process side of `_exit`: close every descriptor, drop the working
/// directory, record the encoded status, detach the calling thread, and
/// signal the rendezvous. The thread itself is still running afterwards;
/// [`exit`] is the variant that also ends it.
pub(crate) fn finish_exit(k: &Arc<Kernel>, p: &Arc<Proc>, code: i32) {
    let private = unsafe { p.private_mut() };
    for id in private.fds.take_all() {
        k.files().decref(id);
    }
    private.cwd.take();

    p.shared().status = encode_exit_status(code);

    // Detach before signalling: a woken waiter must observe zero threads.
    thread::detach();

    let mut held = p.wait_lock.lock();
    p.wait_cv.signal(&mut held);
    drop(held);

    log::debug!("process {} exited, status {:#04x}", p.pid(), encode_exit_status(code));
}

/// Exits the current process. Does not return; the process stays in the
/// table as a zombie until a waiter reaps it.
pub fn exit(k: &Arc<Kernel>, p: &Arc<Proc>, code: i32) -> ! {
    finish_exit(k, p, code);
    thread::exit()
}

/// Waits for a child to exit, stores its encoded status at `status_addr`
/// in the caller's space, reaps it, and returns its pid.
///
/// With `NOHANG` and a still-running child, stores 0 and returns pid 0.
pub fn wait(
    k: &Arc<Kernel>,
    p: &Arc<Proc>,
    pid: Pid,
    status_addr: VirtAddr,
    options: u32,
) -> Result<Pid, KernelError> {
    if pid == p.pid() {
        return Err(KernelError::WaitForSelf(pid));
    }
    let options = WaitOptions::from_bits(options).ok_or(KernelError::InvalidWaitOptions)?;
    if status_addr.is_null() || !status_addr.is_aligned_to(4) {
        return Err(KernelError::MisalignedAddress(status_addr));
    }
    if !p.shared().children.contains(&pid) {
        return Err(KernelError::NotAChild(pid));
    }
    let child = k
        .procs()
        .search(pid)
        .ok_or(KernelError::ProcessNotFound(pid))?;

    if child.thread_count() > 0 {
        if options.contains(WaitOptions::NOHANG) {
            store_status(p, status_addr, 0)?;
            return Ok(Pid::new(0));
        }
        let mut held = child.wait_lock.lock();
        while child.thread_count() > 0 {
            held = child.wait_cv.wait(held);
        }
        drop(held);
    }

    let status = child.shared().status;
    store_status(p, status_addr, status)?;
    destroy(k, &child);
    Ok(pid)
}

fn store_status(p: &Proc, addr: VirtAddr, status: i32) -> Result<(), KernelError> {
    // Our own private state: we are the waiting process's thread.
    let private = unsafe { p.private_mut() };
    let space = private
        .addrspace
        .as_mut()
        .ok_or(KernelError::InaccessibleMemory(addr, 4))?;
    space.copy_out(addr, &status.to_le_bytes())
}

/// Tears down a process that has finished running: releases what it still
/// holds, unregisters it, orphans its children and unlinks it from its
/// parent. The table's reference is dropped here; the struct itself goes
/// away with the last outstanding handle.
pub(crate) fn destroy(k: &Kernel, proc: &Arc<Proc>) {
    assert_ne!(proc.pid(), Pid::KERNEL, "destroying the kernel process");
    assert_eq!(proc.thread_count(), 0, "destroying a process with threads");

    // Thread count is zero, so private state has no other reader.
    let private = unsafe { proc.private_mut() };
    release_private(k, private);

    let mut table = k.procs().lock();
    assert!(table.remove(proc.pid()).is_some(), "zombie not in the table");

    let (children, parent) = {
        let shared = proc.shared();
        (shared.children.clone(), shared.parent)
    };
    for child_pid in children {
        if let Some(child) = table.get(child_pid) {
            child.shared().parent = None;
        }
    }
    if let Some(parent_pid) = parent {
        if let Some(parent) = table.get(parent_pid) {
            let mut shared = parent.shared();
            if let Some(at) = shared.children.iter().position(|&c| c == proc.pid()) {
                shared.children.remove(at);
            }
        }
    }
    drop(table);

    log::debug!("process {} reaped", proc.pid());
}
