use core::fmt;

/// A process id. Valid pids are >= 1; pid 0 names the kernel process and is
/// never returned to user code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pid(i32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Pid {
    pub const KERNEL: Self = Pid(0);

    #[must_use]
    pub const fn new(pid: i32) -> Self {
        Self(pid)
    }

    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

bitflags::bitflags! {
    /// Options accepted by `waitpid`. Anything outside this set is EINVAL.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WaitOptions: u32 {
        const NOHANG = 0x01;
    }
}

/// Encodes an exit code the way `waitpid` reports it: the low 8 bits carry
/// the code, the rest are zero.
#[must_use]
pub const fn encode_exit_status(code: i32) -> i32 {
    code & 0xff
}

/// The exit code carried by an encoded status.
#[must_use]
pub const fn exit_code(status: i32) -> i32 {
    status & 0xff
}
