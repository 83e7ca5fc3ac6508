use auklet_abi::RawFd;

use crate::{error::KernelError, param::OPEN_MAX};

use super::FileId;

/// First descriptor `open` may hand out; 0..=2 stay reserved for the console
/// even if the process closes them.
pub const FIRST_USER_FD: usize = 3;

/// A process's descriptor table: a fixed vector mapping small integers to
/// system open-file slots.
pub struct FdTable {
    slots: [Option<FileId>; OPEN_MAX],
}

impl FdTable {
    pub const fn new() -> Self {
        Self {
            slots: [None; OPEN_MAX],
        }
    }

    /// The open file a descriptor names, or EBADF.
    pub fn get(&self, fd: RawFd) -> Result<FileId, KernelError> {
        self.slots
            .get(fd.get())
            .copied()
            .flatten()
            .ok_or(KernelError::FileDescriptorNotFound(fd))
    }

    /// Whether `fd` is within table bounds at all.
    pub fn in_range(fd: RawFd) -> bool {
        fd.get() < OPEN_MAX
    }

    /// Claims the lowest free descriptor >= [`FIRST_USER_FD`].
    pub fn alloc(&mut self, id: FileId) -> Result<RawFd, KernelError> {
        let fd = self.slots[FIRST_USER_FD..]
            .iter()
            .position(Option::is_none)
            .map(|i| i + FIRST_USER_FD)
            .ok_or(KernelError::TooManyOpenFiles)?;
        self.slots[fd] = Some(id);
        Ok(RawFd::new(fd))
    }

    /// Points `fd` at `id`, returning whatever it pointed at before.
    pub fn set(&mut self, fd: RawFd, id: FileId) -> Option<FileId> {
        self.slots[fd.get()].replace(id)
    }

    /// Empties `fd`, returning its entry.
    pub fn take(&mut self, fd: RawFd) -> Option<FileId> {
        self.slots.get_mut(fd.get()).and_then(Option::take)
    }

    /// The occupied descriptors, in order.
    pub fn entries(&self) -> impl Iterator<Item = (RawFd, FileId)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(fd, slot)| slot.map(|id| (RawFd::new(fd), id)))
    }

    /// Empties the whole table, yielding the entries that were present.
    pub fn take_all(&mut self) -> Vec<FileId> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
