use std::{collections::BTreeMap, sync::Arc};

use crate::{error::KernelError, sync::SpinLock};

use super::{FileSystem, NodeKind, OpenOptions, Stat, Vnode};

/// A RAM filesystem with a flat namespace.
///
/// Entries live under the root directory; a name may contain slashes but
/// there is no directory tree behind them. Removing a name does not disturb
/// handles already open on the node.
pub struct MemFs {
    device: String,
    nodes: SpinLock<BTreeMap<String, Arc<MemNode>>>,
}

struct MemNode {
    /// Full `device:path` name, fixed at creation.
    name: String,
    data: SpinLock<Vec<u8>>,
}

/// The root directory of a [`MemFs`]; the target of `chdir("mem:")`.
struct MemRoot {
    name: String,
}

impl MemFs {
    #[must_use]
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_owned(),
            nodes: SpinLock::new(BTreeMap::new()),
        }
    }

    /// Creates (or truncates) a file with the given contents. Kernel-side
    /// convenience for seeding images and fixtures.
    pub fn install(&self, path: &str, contents: &[u8]) {
        let node = Arc::new(MemNode {
            name: format!("{}:{path}", self.device),
            data: SpinLock::new(contents.to_vec()),
        });
        self.nodes.lock().insert(path.to_owned(), node);
    }
}

impl FileSystem for MemFs {
    fn device_name(&self) -> &str {
        &self.device
    }

    fn open(&self, path: &str, options: &OpenOptions) -> Result<Arc<dyn Vnode>, KernelError> {
        if path.is_empty() {
            // The root directory. Writable opens of a directory are refused.
            if options.mode.writable() {
                return Err(KernelError::IsADirectory);
            }
            return Ok(Arc::new(MemRoot {
                name: format!("{}:", self.device),
            }) as Arc<dyn Vnode>);
        }

        let mut nodes = self.nodes.lock();
        if let Some(node) = nodes.get(path) {
            if options.create && options.exclusive {
                return Err(KernelError::AlreadyExists);
            }
            if options.truncate && options.mode.writable() {
                node.data.lock().clear();
            }
            return Ok(Arc::clone(node) as Arc<dyn Vnode>);
        }

        if !options.create {
            return Err(KernelError::FsEntryNotFound);
        }
        let node = Arc::new(MemNode {
            name: format!("{}:{path}", self.device),
            data: SpinLock::new(Vec::new()),
        });
        nodes.insert(path.to_owned(), Arc::clone(&node));
        Ok(node as Arc<dyn Vnode>)
    }

    fn remove(&self, path: &str) -> Result<(), KernelError> {
        self.nodes
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or(KernelError::FsEntryNotFound)
    }
}

impl Vnode for MemNode {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, KernelError> {
        let data = self.data.lock();
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = usize::min(buf.len(), data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize, KernelError> {
        let mut data = self.data.lock();
        let offset = offset as usize;
        if offset > data.len() {
            // Zero-fill the gap a sparse write leaves behind.
            data.resize(offset, 0);
        }
        let end = offset + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn stat(&self) -> Result<Stat, KernelError> {
        Ok(Stat {
            kind: NodeKind::File,
            size: self.data.lock().len() as u64,
        })
    }

    fn namefile(&self) -> Result<String, KernelError> {
        Ok(self.name.clone())
    }
}

impl Vnode for MemRoot {
    fn read_at(&self, _buf: &mut [u8], _offset: u64) -> Result<usize, KernelError> {
        Err(KernelError::IsADirectory)
    }

    fn write_at(&self, _buf: &[u8], _offset: u64) -> Result<usize, KernelError> {
        Err(KernelError::IsADirectory)
    }

    fn stat(&self) -> Result<Stat, KernelError> {
        Ok(Stat {
            kind: NodeKind::Dir,
            size: 0,
        })
    }

    fn namefile(&self) -> Result<String, KernelError> {
        Ok(self.name.clone())
    }
}
