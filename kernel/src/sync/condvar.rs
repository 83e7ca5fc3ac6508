use super::{SleepLockGuard, SpinLock, WaitChannel};

/// A condition variable coupled to a [`SleepLock`](super::SleepLock).
///
/// `wait` releases the lock and sleeps as one step with respect to `signal`
/// and `broadcast`, which both require the lock to be held: the internal
/// spinlock is taken before the sleep lock is released and a waker cannot
/// reach the channel until that spinlock is free again.
pub struct Condvar {
    name: &'static str,
    spin: SpinLock<()>,
    wchan: WaitChannel,
}

impl Condvar {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            spin: SpinLock::new(()),
            wchan: WaitChannel::new(name),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Releases `guard`'s lock, sleeps until signalled, then reacquires the
    /// lock. The caller re-checks its condition on return.
    pub fn wait<'a, T>(&self, guard: SleepLockGuard<'a, T>) -> SleepLockGuard<'a, T> {
        let lock = guard.lock_ref();
        let spin = self.spin.lock();
        // Lock order here is condvar spinlock, then the sleep lock's
        // internals; wakers go the other way only after the sleep lock
        // itself is reacquired, so the order is consistent.
        drop(guard);
        let spin = self.wchan.sleep(spin);
        drop(spin);
        lock.lock()
    }

    /// Wakes one waiter. The guard proves the caller holds the coupled lock.
    pub fn signal<T>(&self, _held: &mut SleepLockGuard<'_, T>) {
        let mut spin = self.spin.lock();
        self.wchan.wake_one(&mut spin);
    }

    /// Wakes every waiter. The guard proves the caller holds the coupled
    /// lock.
    pub fn broadcast<T>(&self, _held: &mut SleepLockGuard<'_, T>) {
        let mut spin = self.spin.lock();
        self.wchan.wake_all(&mut spin);
    }
}
