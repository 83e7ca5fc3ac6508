use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
};

use crate::thread;

use super::{SpinLock, WaitChannel};

pub(super) struct RawSleepLock {
    name: &'static str,
    /// Kernel thread id of the owner, `None` when free.
    state: SpinLock<Option<u64>>,
    wchan: WaitChannel,
}

impl RawSleepLock {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            state: SpinLock::new(None),
            wchan: WaitChannel::new(name),
        }
    }

    pub(super) fn acquire(&self) {
        let me = thread::id();
        let mut owner = self.state.lock();
        assert_ne!(*owner, Some(me), "sleep lock {} acquired twice", self.name);
        while owner.is_some() {
            owner = self.wchan.sleep(owner);
        }
        *owner = Some(me);
    }

    pub(super) fn release(&self) {
        let mut owner = self.state.lock();
        assert_eq!(
            *owner,
            Some(thread::id()),
            "sleep lock {} released by a non-owner",
            self.name
        );
        *owner = None;
        self.wchan.wake_one(&mut owner);
    }

    pub(super) fn held_by_current(&self) -> bool {
        *self.state.lock() == Some(thread::id())
    }
}

/// A mutual-exclusion lock that parks contending threads instead of
/// spinning. Safe to hold across operations that sleep.
///
/// Fairness is not strict FIFO: the woken waiter races with any newly
/// arriving acquirer.
pub struct SleepLock<T> {
    raw: RawSleepLock,
    value: UnsafeCell<T>,
}

unsafe impl<T> Sync for SleepLock<T> where T: Send {}

impl<T> SleepLock<T> {
    pub const fn new(name: &'static str, value: T) -> Self {
        Self {
            raw: RawSleepLock::new(name),
            value: UnsafeCell::new(value),
        }
    }

    pub fn name(&self) -> &'static str {
        self.raw.name
    }

    /// Acquires the lock, sleeping until it is acquired.
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        self.raw.acquire();
        SleepLockGuard { lock: self }
    }

    /// Whether the calling thread is the owner.
    pub fn held_by_current(&self) -> bool {
        self.raw.held_by_current()
    }
}

pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
}

unsafe impl<T> Send for SleepLockGuard<'_, T> where T: Send {}
unsafe impl<T> Sync for SleepLockGuard<'_, T> where T: Sync {}

impl<'a, T> SleepLockGuard<'a, T> {
    /// The lock this guard protects, usable to reacquire after release.
    pub(super) fn lock_ref(&self) -> &'a SleepLock<T> {
        self.lock
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.release();
    }
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.value.get() }
    }
}
