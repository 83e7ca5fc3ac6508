use std::{collections::VecDeque, sync::Arc};

use crate::{error::KernelError, sync::SpinLock};

use super::{FileSystem, NodeKind, OpenOptions, Stat, Vnode};

#[derive(Default)]
struct ConsoleBuffers {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

/// The console character device.
///
/// Reads drain whatever input has been queued; writes append to the output
/// buffer. Offsets are meaningless for a character device and are ignored.
pub struct Console {
    buffers: SpinLock<ConsoleBuffers>,
}

impl Console {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffers: SpinLock::new(ConsoleBuffers::default()),
        }
    }

    /// Queues bytes for the next reads (keyboard input).
    pub fn push_input(&self, bytes: &[u8]) {
        self.buffers.lock().input.extend(bytes);
    }

    /// Drains everything written so far.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.buffers.lock().output)
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Vnode for Console {
    fn read_at(&self, buf: &mut [u8], _offset: u64) -> Result<usize, KernelError> {
        let mut buffers = self.buffers.lock();
        let n = usize::min(buf.len(), buffers.input.len());
        for slot in &mut buf[..n] {
            *slot = buffers.input.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], _offset: u64) -> Result<usize, KernelError> {
        self.buffers.lock().output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn stat(&self) -> Result<Stat, KernelError> {
        Ok(Stat {
            kind: NodeKind::Device,
            size: 0,
        })
    }
}

/// Mounts the console under the `con` device name.
pub struct ConsoleDevice {
    console: Arc<Console>,
}

impl ConsoleDevice {
    #[must_use]
    pub fn new(console: Arc<Console>) -> Self {
        Self { console }
    }
}

impl FileSystem for ConsoleDevice {
    fn device_name(&self) -> &str {
        "con"
    }

    fn open(&self, path: &str, _options: &OpenOptions) -> Result<Arc<dyn Vnode>, KernelError> {
        if !path.is_empty() {
            return Err(KernelError::FsEntryNotFound);
        }
        Ok(Arc::clone(&self.console) as Arc<dyn Vnode>)
    }

    fn remove(&self, _path: &str) -> Result<(), KernelError> {
        Err(KernelError::DeviceOperation)
    }
}
