use std::sync::Arc;

use auklet_abi::Pid;

use crate::{
    error::KernelError,
    param::PROC_MAX,
    sync::{SpinLock, SpinLockGuard},
};

use super::Proc;

enum Slot {
    Free,
    /// Pid handed out by [`ProcTable::reserve`] but not yet committed; the
    /// slot cannot be claimed by a concurrent fork in the meantime.
    Reserved,
    Used(Arc<Proc>),
}

pub(crate) struct ProcTableInner {
    slots: Vec<Slot>,
    /// Most recently allocated pid; the next scan starts just after it.
    last_pid: usize,
}

impl ProcTableInner {
    pub(crate) fn get(&self, pid: Pid) -> Option<&Arc<Proc>> {
        let idx = usize::try_from(pid.get()).ok()?;
        match self.slots.get(idx)? {
            Slot::Used(proc) => Some(proc),
            _ => None,
        }
    }

    pub(crate) fn remove(&mut self, pid: Pid) -> Option<Arc<Proc>> {
        assert_ne!(pid, Pid::KERNEL, "kernel process slot is never recycled");
        let idx = usize::try_from(pid.get()).ok()?;
        match std::mem::replace(self.slots.get_mut(idx)?, Slot::Free) {
            Slot::Used(proc) => Some(proc),
            other => {
                self.slots[idx] = other;
                None
            }
        }
    }
}

/// The pid-indexed table of live processes.
///
/// Slot 0 belongs to the kernel process for the lifetime of the kernel;
/// pids 1..=PROC_MAX are allocated by circular next-fit scan and recycled
/// when a process is reaped. The table owns the canonical reference to
/// every process it holds.
pub struct ProcTable {
    inner: SpinLock<ProcTableInner>,
}

impl ProcTable {
    pub(crate) fn new() -> Self {
        let mut slots = Vec::with_capacity(PROC_MAX + 1);
        slots.resize_with(PROC_MAX + 1, || Slot::Free);
        Self {
            inner: SpinLock::new(ProcTableInner { slots, last_pid: 0 }),
        }
    }

    /// Installs the kernel process in slot 0. Called once at bootstrap.
    pub(crate) fn set_kernel(&self, kproc: Arc<Proc>) {
        assert_eq!(kproc.pid(), Pid::KERNEL);
        let mut inner = self.inner.lock();
        assert!(matches!(inner.slots[0], Slot::Free), "slot 0 set twice");
        inner.slots[0] = Slot::Used(kproc);
    }

    /// Claims a free pid, scanning circularly from `last_pid + 1` and
    /// skipping slot 0. The slot stays reserved until [`commit`] or
    /// [`release`].
    ///
    /// [`commit`]: Self::commit
    /// [`release`]: Self::release
    pub fn reserve(&self) -> Result<Pid, KernelError> {
        let mut inner = self.inner.lock();
        for step in 0..PROC_MAX {
            let idx = (inner.last_pid + step) % PROC_MAX + 1;
            if matches!(inner.slots[idx], Slot::Free) {
                inner.slots[idx] = Slot::Reserved;
                inner.last_pid = idx;
                return Ok(Pid::new(idx as i32));
            }
        }
        Err(KernelError::NoFreeProc)
    }

    /// Fills a reserved slot with its process.
    pub(crate) fn commit(&self, pid: Pid, proc: Arc<Proc>) {
        assert_eq!(proc.pid(), pid);
        let mut inner = self.inner.lock();
        let idx = usize::try_from(pid.get()).expect("negative pid");
        assert!(
            matches!(inner.slots[idx], Slot::Reserved),
            "commit of a slot that was not reserved"
        );
        inner.slots[idx] = Slot::Used(proc);
    }

    /// Gives a reserved pid back (process construction failed).
    pub(crate) fn release(&self, pid: Pid) {
        let mut inner = self.inner.lock();
        let idx = usize::try_from(pid.get()).expect("negative pid");
        assert!(
            matches!(inner.slots[idx], Slot::Reserved),
            "release of a slot that was not reserved"
        );
        inner.slots[idx] = Slot::Free;
    }

    /// The process a pid names, if any.
    pub fn search(&self, pid: Pid) -> Option<Arc<Proc>> {
        let inner = self.inner.lock();
        let proc = inner.get(pid)?;
        assert_eq!(proc.pid(), pid, "process table slot out of place");
        Some(Arc::clone(proc))
    }

    /// Locks the table for a compound update (reaping).
    pub(crate) fn lock(&self) -> SpinLockGuard<'_, ProcTableInner> {
        self.inner.lock()
    }
}
