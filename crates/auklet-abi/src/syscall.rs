use strum::FromRepr;

/// Syscall numbers, as loaded into the call-number register before trapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u64)]
pub enum SyscallCode {
    Fork = 0,
    Execv = 1,
    Waitpid = 2,
    Exit = 3,
    Getpid = 4,
    Open = 10,
    Close = 11,
    Read = 12,
    Write = 13,
    Lseek = 14,
    Dup2 = 15,
    Chdir = 16,
    Getcwd = 17,
    Remove = 18,
}
