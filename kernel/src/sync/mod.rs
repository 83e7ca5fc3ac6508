mod condvar;
mod sleep_lock;
mod spin_lock;
mod wait_channel;

pub use self::{
    condvar::Condvar,
    sleep_lock::{SleepLock, SleepLockGuard},
    spin_lock::{SpinLock, SpinLockGuard},
    wait_channel::WaitChannel,
};
