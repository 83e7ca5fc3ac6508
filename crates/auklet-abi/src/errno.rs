use strum::FromRepr;

/// User-visible error numbers.
///
/// Syscalls report failure as one of these small integers; the kernel never
/// sends message text across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, thiserror::Error)]
#[repr(i32)]
pub enum Errno {
    // ENOENT
    #[error("no such file or directory")]
    FsEntryNotFound = 2,
    // ESRCH
    #[error("no such process")]
    ProcessNotFound = 3,
    // EIO
    #[error("input/output error")]
    Io = 5,
    // ENXIO
    #[error("no such device or address")]
    DeviceAddressNotFound = 6,
    // E2BIG
    #[error("argument list too long")]
    ArgumentListTooLong = 7,
    // ENOEXEC
    #[error("exec format error")]
    ExecFormat = 8,
    // EBADF
    #[error("bad file descriptor")]
    BadFileDescriptor = 9,
    // ECHILD
    #[error("no child process")]
    NoChildProcess = 10,
    // ENOMEM
    #[error("cannot allocate memory")]
    OutOfMemory = 12,
    // EFAULT
    #[error("bad address")]
    BadAddress = 14,
    // EEXIST
    #[error("file exists")]
    AlreadyExists = 17,
    // ENODEV
    #[error("no such device")]
    NoSuchDevice = 19,
    // ENOTDIR
    #[error("not a directory")]
    NotADirectory = 20,
    // EISDIR
    #[error("is a directory")]
    IsADirectory = 21,
    // EINVAL
    #[error("invalid argument")]
    InvalidInput = 22,
    // ENFILE
    #[error("too many open files in system")]
    TooManyOpenFilesSystem = 23,
    // EMFILE
    #[error("too many open files")]
    TooManyOpenFiles = 24,
    // ENOSPC
    #[error("no space left on device")]
    StorageFull = 28,
    // ESPIPE
    #[error("illegal seek")]
    NotSeekable = 29,
    // ENPROC (BSD EPROCLIM slot)
    #[error("too many processes")]
    TooManyProcesses = 67,
    #[error("unknown error")]
    Unknown = -1,
}

impl Errno {
    /// The numeric value stored in the error-return register.
    #[must_use]
    pub const fn value(self) -> i32 {
        self as i32
    }
}
