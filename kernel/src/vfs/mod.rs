//! The filesystem interface the syscall layer consumes, plus the hosted
//! providers behind it.
//!
//! Names follow the `device:path` convention: `con:` is the console,
//! `mem:hello` is the file `hello` on the RAM filesystem mounted as `mem`.
//! A name without a device prefix is resolved relative to the calling
//! process's current directory.

use std::sync::Arc;

use auklet_abi::AccessMode;

use crate::{error::KernelError, sync::SpinLock};

mod console;
mod memfs;

pub use self::{
    console::{Console, ConsoleDevice},
    memfs::MemFs,
};

/// What kind of object a vnode names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
    Device,
}

#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub kind: NodeKind,
    pub size: u64,
}

/// One object in a filesystem. Reference-counted; the last handle dropped
/// releases it.
pub trait Vnode: Send + Sync {
    /// Reads into `buf` starting at `offset`; returns bytes read, 0 at EOF.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, KernelError>;

    /// Writes `buf` at `offset`; returns bytes written.
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize, KernelError>;

    fn stat(&self) -> Result<Stat, KernelError>;

    /// The full `device:path` name of this node, for getcwd.
    fn namefile(&self) -> Result<String, KernelError> {
        Err(KernelError::DeviceOperation)
    }
}

/// How `open` should locate or create the target.
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub mode: AccessMode,
    pub create: bool,
    pub exclusive: bool,
    pub truncate: bool,
}

impl OpenOptions {
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            mode: AccessMode::ReadOnly,
            create: false,
            exclusive: false,
            truncate: false,
        }
    }
}

/// A mounted filesystem or device.
pub trait FileSystem: Send + Sync {
    /// The `device` half of this filesystem's names.
    fn device_name(&self) -> &str;

    /// Opens `path` (relative to this filesystem's root; may be empty).
    fn open(&self, path: &str, options: &OpenOptions) -> Result<Arc<dyn Vnode>, KernelError>;

    fn remove(&self, path: &str) -> Result<(), KernelError>;
}

/// The mount table: maps device names to filesystems and resolves names.
pub struct Vfs {
    mounts: SpinLock<Vec<Arc<dyn FileSystem>>>,
}

impl Vfs {
    pub(crate) fn new() -> Self {
        Self {
            mounts: SpinLock::new(Vec::new()),
        }
    }

    /// Mounts a filesystem under its device name.
    pub fn mount(&self, fs: Arc<dyn FileSystem>) -> Result<(), KernelError> {
        let mut mounts = self.mounts.lock();
        if mounts.iter().any(|m| m.device_name() == fs.device_name()) {
            return Err(KernelError::AlreadyExists);
        }
        mounts.push(fs);
        Ok(())
    }

    fn filesystem(&self, device: &str) -> Result<Arc<dyn FileSystem>, KernelError> {
        self.mounts
            .lock()
            .iter()
            .find(|m| m.device_name() == device)
            .cloned()
            .ok_or_else(|| KernelError::NoSuchDevice(device.to_owned()))
    }

    /// Splits `device:path`, resolving a prefix-less name against `cwd`.
    fn resolve(
        &self,
        path: &str,
        cwd: Option<&Arc<dyn Vnode>>,
    ) -> Result<(String, String), KernelError> {
        if let Some((device, rest)) = path.split_once(':') {
            return Ok((device.to_owned(), rest.to_owned()));
        }
        let cwd = cwd.ok_or(KernelError::FsEntryNotFound)?;
        let base = cwd.namefile()?;
        let (device, dir) = base.split_once(':').ok_or(KernelError::FsEntryNotFound)?;
        let joined = if dir.is_empty() {
            path.to_owned()
        } else {
            format!("{dir}/{path}")
        };
        Ok((device.to_owned(), joined))
    }

    /// Opens a name, yielding a vnode.
    pub fn open(
        &self,
        path: &str,
        options: &OpenOptions,
        cwd: Option<&Arc<dyn Vnode>>,
    ) -> Result<Arc<dyn Vnode>, KernelError> {
        let (device, rest) = self.resolve(path, cwd)?;
        self.filesystem(&device)?.open(&rest, options)
    }

    /// Removes a name.
    pub fn remove(
        &self,
        path: &str,
        cwd: Option<&Arc<dyn Vnode>>,
    ) -> Result<(), KernelError> {
        let (device, rest) = self.resolve(path, cwd)?;
        self.filesystem(&device)?.remove(&rest)
    }

    /// The full name of a directory vnode, for getcwd.
    pub fn getcwd(&self, cwd: &Arc<dyn Vnode>) -> Result<String, KernelError> {
        cwd.namefile()
    }
}
