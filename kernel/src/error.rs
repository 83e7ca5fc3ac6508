use auklet_abi::{Errno, Pid, RawFd};

use crate::vm::VirtAddr;

/// Everything that can go wrong inside the kernel.
///
/// Syscall dispatchers translate these into the numeric [`Errno`] surface
/// before returning to user space; the richer variants exist so kernel-side
/// logs can say what actually happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error("no free process-table slot")]
    NoFreeProc,
    #[error("process not found: {0}")]
    ProcessNotFound(Pid),
    #[error("not a child of the caller: {0}")]
    NotAChild(Pid),
    #[error("process waiting for itself: {0}")]
    WaitForSelf(Pid),
    #[error("out of memory")]
    OutOfMemory,
    #[error("inaccessible user memory: {0} ({1} bytes)")]
    InaccessibleMemory(VirtAddr, usize),
    #[error("misaligned user address: {0}")]
    MisalignedAddress(VirtAddr),
    #[error("unterminated string at {0}")]
    UnterminatedString(VirtAddr),
    #[error("bad file descriptor: {0}")]
    FileDescriptorNotFound(RawFd),
    #[error("file descriptor not readable: {0}")]
    FileDescriptorNotReadable(RawFd),
    #[error("file descriptor not writable: {0}")]
    FileDescriptorNotWritable(RawFd),
    #[error("invalid access-mode bits")]
    InvalidFileMode,
    #[error("invalid wait options")]
    InvalidWaitOptions,
    #[error("invalid seek")]
    InvalidSeek,
    #[error("path is not valid text")]
    InvalidPathEncoding,
    #[error("argument list too long")]
    ArgumentListTooLong,
    #[error("invalid executable")]
    InvalidExecutable,
    #[error("system open-file table full")]
    TooManyOpenFilesSystem,
    #[error("process file table full")]
    TooManyOpenFiles,
    #[error("no such device: {0}:")]
    NoSuchDevice(String),
    #[error("no such file or directory")]
    FsEntryNotFound,
    #[error("file already exists")]
    AlreadyExists,
    #[error("is a directory")]
    IsADirectory,
    #[error("not a directory")]
    NotADirectory,
    #[error("no space left on device")]
    StorageFull,
    #[error("device does not support this operation")]
    DeviceOperation,
    #[error("input/output error")]
    Io,
}

impl From<KernelError> for Errno {
    fn from(error: KernelError) -> Self {
        match error {
            KernelError::NoFreeProc => Self::TooManyProcesses,
            KernelError::ProcessNotFound(_) => Self::ProcessNotFound,
            KernelError::NotAChild(_) | KernelError::WaitForSelf(_) => Self::NoChildProcess,
            KernelError::OutOfMemory => Self::OutOfMemory,
            KernelError::InaccessibleMemory(_, _)
            | KernelError::MisalignedAddress(_)
            | KernelError::UnterminatedString(_) => Self::BadAddress,
            KernelError::FileDescriptorNotFound(_)
            | KernelError::FileDescriptorNotReadable(_)
            | KernelError::FileDescriptorNotWritable(_) => Self::BadFileDescriptor,
            KernelError::InvalidFileMode
            | KernelError::InvalidWaitOptions
            | KernelError::InvalidSeek
            | KernelError::InvalidPathEncoding => Self::InvalidInput,
            KernelError::ArgumentListTooLong => Self::ArgumentListTooLong,
            KernelError::InvalidExecutable => Self::ExecFormat,
            KernelError::TooManyOpenFilesSystem => Self::TooManyOpenFilesSystem,
            KernelError::TooManyOpenFiles => Self::TooManyOpenFiles,
            KernelError::NoSuchDevice(_) => Self::NoSuchDevice,
            KernelError::FsEntryNotFound => Self::FsEntryNotFound,
            KernelError::AlreadyExists => Self::AlreadyExists,
            KernelError::IsADirectory => Self::IsADirectory,
            KernelError::NotADirectory => Self::NotADirectory,
            KernelError::StorageFull => Self::StorageFull,
            KernelError::DeviceOperation => Self::DeviceAddressNotFound,
            KernelError::Io => Self::Io,
        }
    }
}
