use core::cell::UnsafeCell;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::Thread,
};

use super::SpinLockGuard;

struct Waiter {
    thread: Thread,
    woken: Arc<AtomicBool>,
}

/// A channel on which threads block and from which they are awoken.
///
/// The queue has no lock of its own: every channel is paired with exactly one
/// companion [`SpinLock`](super::SpinLock), and each operation takes a guard
/// of that lock as proof it is held. Sleeping enqueues the caller while the
/// lock is still held, then releases it, so a wakeup issued under the same
/// lock can never be lost.
pub struct WaitChannel {
    name: &'static str,
    waiters: UnsafeCell<VecDeque<Waiter>>,
}

unsafe impl Sync for WaitChannel {}

impl WaitChannel {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            waiters: UnsafeCell::new(VecDeque::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Goes to sleep on this channel, releasing the companion lock
    /// atomically with the enqueue. Reacquires the lock before returning.
    ///
    /// Callers re-check their condition in a loop; a wakeup only means the
    /// condition may have changed.
    pub fn sleep<'a, T>(&self, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
        let woken = Arc::new(AtomicBool::new(false));
        unsafe {
            // Guarded by the companion lock, which `guard` proves is held.
            (*self.waiters.get()).push_back(Waiter {
                thread: std::thread::current(),
                woken: Arc::clone(&woken),
            });
        }

        let lock = guard.into_lock();
        // A waker that slipped in between the release above and this park
        // leaves an unpark token behind, so the park returns immediately.
        while !woken.load(Ordering::Acquire) {
            std::thread::park();
        }
        lock.lock()
    }

    /// Wakes one sleeper, if any. The companion lock must be held.
    pub fn wake_one<T>(&self, _guard: &mut SpinLockGuard<'_, T>) {
        let waiter = unsafe { (*self.waiters.get()).pop_front() };
        if let Some(waiter) = waiter {
            waiter.woken.store(true, Ordering::Release);
            waiter.thread.unpark();
        }
    }

    /// Wakes every sleeper. The companion lock must be held.
    pub fn wake_all<T>(&self, _guard: &mut SpinLockGuard<'_, T>) {
        let waiters: Vec<_> = unsafe { (*self.waiters.get()).drain(..).collect() };
        for waiter in waiters {
            waiter.woken.store(true, Ordering::Release);
            waiter.thread.unpark();
        }
    }
}
