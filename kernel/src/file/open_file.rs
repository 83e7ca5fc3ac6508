use std::sync::Arc;

use auklet_abi::AccessMode;

use crate::{
    error::KernelError,
    param::SYSTEM_OPEN_MAX,
    sync::{SleepLock, SpinLock},
    vfs::Vnode,
};

/// Index of an open file in the system table.
///
/// Fd tables store these instead of pointers; the table slot is the single
/// place the object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId(usize);

/// One instance of an opened file, shared by every descriptor that names it.
///
/// The seek offset is a property of the open, not of the descriptor: fork
/// and dup2 alias it deliberately.
pub struct OpenFile {
    name: &'static str,
    vnode: Arc<dyn Vnode>,
    offset: i64,
    mode: AccessMode,
    refs: u32,
}

impl OpenFile {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn vnode(&self) -> &Arc<dyn Vnode> {
        &self.vnode
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: i64) {
        debug_assert!(offset >= 0);
        self.offset = offset;
    }
}

struct SlotAlloc {
    used: Box<[bool]>,
}

/// The system-wide open-file table.
///
/// Slot claiming and freeing run under `alloc`; everything about the file
/// itself runs under the slot's sleep lock, which also serializes reads and
/// writes against each other per open file.
pub struct SystemFileTable {
    slots: Box<[SleepLock<Option<OpenFile>>]>,
    alloc: SpinLock<SlotAlloc>,
}

impl SystemFileTable {
    pub(crate) fn new() -> Self {
        let slots = (0..SYSTEM_OPEN_MAX)
            .map(|_| SleepLock::new("openfile", None))
            .collect();
        Self {
            slots,
            alloc: SpinLock::new(SlotAlloc {
                used: vec![false; SYSTEM_OPEN_MAX].into_boxed_slice(),
            }),
        }
    }

    /// Claims a slot for a freshly opened file, reference count 1.
    pub fn create(
        &self,
        name: &'static str,
        vnode: Arc<dyn Vnode>,
        mode: AccessMode,
        offset: i64,
    ) -> Result<FileId, KernelError> {
        let id = {
            let mut alloc = self.alloc.lock();
            let idx = alloc
                .used
                .iter()
                .position(|used| !used)
                .ok_or(KernelError::TooManyOpenFilesSystem)?;
            alloc.used[idx] = true;
            FileId(idx)
        };

        let mut slot = self.slots[id.0].lock();
        let prev = slot.replace(OpenFile {
            name,
            vnode,
            offset,
            mode,
            refs: 1,
        });
        assert!(prev.is_none(), "claimed open-file slot was occupied");
        Ok(id)
    }

    /// Adds a reference (fork, dup2).
    pub fn incref(&self, id: FileId) {
        let mut slot = self.slots[id.0].lock();
        let of = slot.as_mut().expect("incref on empty open-file slot");
        of.refs += 1;
    }

    /// Drops a reference; the last one releases the vnode and frees the
    /// slot. The per-file lock is dropped before either happens.
    pub fn decref(&self, id: FileId) {
        let mut slot = self.slots[id.0].lock();
        let of = slot.as_mut().expect("decref on empty open-file slot");
        assert!(of.refs > 0);
        of.refs -= 1;
        if of.refs > 0 {
            return;
        }
        let of = slot.take().unwrap();
        drop(slot);
        // Last reference: release the vnode, then recycle the slot.
        drop(of);
        self.alloc.lock().used[id.0] = false;
    }

    /// Runs `f` with the open file locked. All I/O and seeking on an open
    /// file goes through here, which is what serializes it.
    pub fn with_file<R>(&self, id: FileId, f: impl FnOnce(&mut OpenFile) -> R) -> R {
        let mut slot = self.slots[id.0].lock();
        f(slot.as_mut().expect("open-file slot empty"))
    }

    /// The access mode, without holding the lock across anything else.
    pub fn mode_of(&self, id: FileId) -> AccessMode {
        self.with_file(id, |of| of.mode())
    }

    /// Current reference count, for invariant checks.
    pub fn ref_count(&self, id: FileId) -> u32 {
        self.with_file(id, |of| of.refs)
    }
}

#[cfg(test)]
mod tests {
    use crate::vfs::{NodeKind, Stat};

    use super::*;

    struct NullVnode;

    impl Vnode for NullVnode {
        fn read_at(&self, _buf: &mut [u8], _offset: u64) -> Result<usize, KernelError> {
            Ok(0)
        }

        fn write_at(&self, buf: &[u8], _offset: u64) -> Result<usize, KernelError> {
            Ok(buf.len())
        }

        fn stat(&self) -> Result<Stat, KernelError> {
            Ok(Stat {
                kind: NodeKind::File,
                size: 0,
            })
        }
    }

    fn open_null(table: &SystemFileTable) -> FileId {
        table
            .create("openfile", Arc::new(NullVnode), AccessMode::ReadWrite, 0)
            .unwrap()
    }

    #[test]
    fn refcount_follows_incref_decref() {
        let table = SystemFileTable::new();
        let id = open_null(&table);
        assert_eq!(table.ref_count(id), 1);
        table.incref(id);
        assert_eq!(table.ref_count(id), 2);
        table.decref(id);
        assert_eq!(table.ref_count(id), 1);
    }

    #[test]
    fn slot_recycles_after_last_decref() {
        let table = SystemFileTable::new();
        let id = open_null(&table);
        table.decref(id);
        // The freed slot is the first candidate for the next scan.
        let id2 = open_null(&table);
        assert_eq!(id, id2);
    }

    #[test]
    fn vnode_released_with_last_reference() {
        struct DropProbe(std::sync::mpsc::Sender<()>);

        impl Vnode for DropProbe {
            fn read_at(&self, _buf: &mut [u8], _offset: u64) -> Result<usize, KernelError> {
                Ok(0)
            }
            fn write_at(&self, buf: &[u8], _offset: u64) -> Result<usize, KernelError> {
                Ok(buf.len())
            }
            fn stat(&self) -> Result<Stat, KernelError> {
                Ok(Stat {
                    kind: NodeKind::File,
                    size: 0,
                })
            }
        }

        impl Drop for DropProbe {
            fn drop(&mut self) {
                let _ = self.0.send(());
            }
        }

        let (tx, rx) = std::sync::mpsc::channel();
        let table = SystemFileTable::new();
        let id = table
            .create("openfile", Arc::new(DropProbe(tx)), AccessMode::ReadOnly, 0)
            .unwrap();
        table.incref(id);
        table.decref(id);
        assert!(rx.try_recv().is_err());
        table.decref(id);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn table_exhaustion_reports_enfile() {
        let table = SystemFileTable::new();
        for _ in 0..crate::param::SYSTEM_OPEN_MAX {
            open_null(&table);
        }
        assert!(matches!(
            table.create("openfile", Arc::new(NullVnode), AccessMode::ReadOnly, 0),
            Err(KernelError::TooManyOpenFilesSystem)
        ));
    }

    #[test]
    fn offsets_are_per_open_file() {
        let table = SystemFileTable::new();
        let a = open_null(&table);
        let b = open_null(&table);
        table.with_file(a, |of| of.set_offset(100));
        assert_eq!(table.with_file(a, |of| of.offset()), 100);
        assert_eq!(table.with_file(b, |of| of.offset()), 0);
    }
}
