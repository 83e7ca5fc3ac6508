//! Kernel threads and the current-process context.
//!
//! Every kernel thread runs on an OS thread. A thread executing on behalf of
//! a process carries a [`Current`] context naming the kernel instance and the
//! process; the process's thread count is raised before the thread can run
//! and dropped when it detaches, so a count of zero reliably means the
//! process has signalled exit.

use core::cell::{Cell, RefCell};
use std::{
    panic,
    sync::{
        Arc, Once,
        atomic::{AtomicU64, Ordering},
    },
    thread::JoinHandle,
};

use crate::{kernel::Kernel, proc::Proc};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<u64> = const { Cell::new(0) };
    static CURRENT: RefCell<Option<Current>> = const { RefCell::new(None) };
}

/// The kernel instance and process this thread is working for.
#[derive(Clone)]
pub struct Current {
    pub kernel: Arc<Kernel>,
    pub proc: Arc<Proc>,
}

/// A stable id for the calling kernel thread. Ids start at 1; 0 never names
/// a thread, so the lock owner fields can use it as "free".
pub fn id() -> u64 {
    THREAD_ID.with(|tid| {
        if tid.get() == 0 {
            tid.set(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        }
        tid.get()
    })
}

/// The current context. Panics on a thread with no attached process.
pub fn current() -> Current {
    try_current().expect("kernel thread has no attached process")
}

pub fn try_current() -> Option<Current> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Attaches the calling thread to `proc`, raising its thread count. Used by
/// embedding threads (the menu); threads made with [`spawn`] are attached
/// before they start.
pub fn attach(kernel: Arc<Kernel>, proc: Arc<Proc>) {
    proc.add_thread();
    set_current(Current { kernel, proc });
}

/// Detaches the calling thread from its process, dropping the thread count.
pub fn detach() {
    let cur = CURRENT.with(|c| c.borrow_mut().take());
    let cur = cur.expect("detach on a thread with no attached process");
    cur.proc.remove_thread();
}

fn set_current(cur: Current) {
    CURRENT.with(|c| {
        let mut slot = c.borrow_mut();
        assert!(slot.is_none(), "thread already attached to a process");
        *slot = Some(cur);
    });
}

/// Payload thrown by [`exit`]; the spawn trampoline swallows it.
struct ThreadExit;

/// Terminates the calling kernel thread. Does not return.
///
/// The caller must already have detached from its process.
pub fn exit() -> ! {
    panic::panic_any(ThreadExit)
}

fn install_quiet_exit_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let prev = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<ThreadExit>().is_none() {
                prev(info);
            }
        }));
    });
}

/// Spawns a kernel thread attached to `proc`.
///
/// The thread count is raised here, in the spawning thread, so a parent that
/// forks and immediately waits can never observe the child at zero threads
/// before it has run. `f` is expected to leave via [`exit`]; a panic other
/// than the exit token detaches the thread and is then re-raised so the
/// joiner sees it.
pub fn spawn(
    name: &str,
    kernel: Arc<Kernel>,
    proc: Arc<Proc>,
    f: impl FnOnce() + Send + 'static,
) -> JoinHandle<()> {
    install_quiet_exit_hook();
    proc.add_thread();

    std::thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            set_current(Current { kernel, proc });
            let outcome = panic::catch_unwind(panic::AssertUnwindSafe(f));
            match outcome {
                Ok(()) => {
                    // The entry routine returned instead of exiting; treat
                    // it as an exit so waiters are not stranded.
                    log::warn!("kernel thread returned without exiting");
                    abandon_if_attached();
                }
                Err(payload) if payload.is::<ThreadExit>() => {
                    abandon_if_attached();
                }
                Err(payload) => {
                    abandon_if_attached();
                    panic::resume_unwind(payload);
                }
            }
        })
        .expect("kernel thread spawn failed")
}

/// Detach and wake any waiters if the exit path did not run, so a crashed
/// thread cannot strand a waitpid caller.
fn abandon_if_attached() {
    let cur = CURRENT.with(|c| c.borrow_mut().take());
    if let Some(cur) = cur {
        cur.proc.remove_thread();
        cur.proc.wake_waiters();
    }
}
