//! The machine-dependent boundary: register snapshots and the two one-way
//! doors into user mode.

use crate::vm::{AddrSpace, VirtAddr};

/// Gives a [`UserMode`] implementation the user side of the current
/// process's memory, which is what the MMU would give real user code. Only
/// the process's own thread may call this, the same restriction the
/// hardware enforces.
///
/// Panics on a thread with no attached process or a process with no user
/// memory.
pub fn with_user_memory<R>(f: impl FnOnce(&mut AddrSpace) -> R) -> R {
    let cur = crate::thread::current();
    // Our own private state: this thread is the process's thread.
    let private = unsafe { cur.proc.private_mut() };
    let space = private
        .addrspace
        .as_mut()
        .expect("current process has no user memory");
    f(space)
}

/// Register-file snapshot captured at the user/kernel transition.
///
/// Fork copies one of these by value; the copy is what makes the child
/// resume exactly where the parent trapped.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Trapframe {
    /// Saved user program counter.
    pub pc: u64,
    pub ra: u64,
    pub sp: u64,
    pub gp: u64,
    pub tp: u64,
    pub t0: u64,
    pub t1: u64,
    pub t2: u64,
    pub s0: u64,
    pub s1: u64,
    /// a0..a7 carry syscall arguments and return values.
    pub a0: u64,
    pub a1: u64,
    pub a2: u64,
    pub a3: u64,
    pub a4: u64,
    pub a5: u64,
    pub a6: u64,
    /// Syscall number register.
    pub a7: u64,
    pub s2: u64,
    pub s3: u64,
    pub s4: u64,
    pub s5: u64,
    pub s6: u64,
    pub s7: u64,
    pub s8: u64,
    pub s9: u64,
    pub s10: u64,
    pub s11: u64,
    pub t3: u64,
    pub t4: u64,
    pub t5: u64,
    pub t6: u64,
}

impl Trapframe {
    #[must_use]
    pub fn zeroed() -> Self {
        Self::default()
    }
}

/// The door back into user execution. Machine-dependent on a real port; the
/// hosted build lets the embedder (or the test harness) supply it.
///
/// Both entries run on the calling kernel thread and do not return: user
/// execution ends the thread's involvement with the kernel until the next
/// trap.
pub trait UserMode: Send + Sync {
    /// Starts a fresh image: `entry` with `argc`/`argv` per the calling
    /// convention and the stack pointer at `sp`.
    fn enter_new(&self, entry: VirtAddr, sp: VirtAddr, argc: usize, argv: VirtAddr) -> !;

    /// Resumes a forked child from its trapframe copy. Ownership of the
    /// copy transfers here; it is freed on entry.
    fn enter_forked(&self, tf: Box<Trapframe>) -> !;
}

/// A [`UserMode`] that ends the process immediately. For embeddings that
/// boot the kernel without user programs.
pub struct HaltUserMode;

impl UserMode for HaltUserMode {
    fn enter_new(&self, _entry: VirtAddr, _sp: VirtAddr, _argc: usize, _argv: VirtAddr) -> ! {
        let cur = crate::thread::current();
        crate::proc::finish_exit(&cur.kernel, &cur.proc, 0);
        crate::thread::exit()
    }

    fn enter_forked(&self, _tf: Box<Trapframe>) -> ! {
        let cur = crate::thread::current();
        crate::proc::finish_exit(&cur.kernel, &cur.proc, 0);
        crate::thread::exit()
    }
}
