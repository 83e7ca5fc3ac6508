/// Open files per process.
pub const OPEN_MAX: usize = 64;

/// Longest pathname accepted from user space, terminator included.
pub const PATH_MAX: usize = 1024;

/// Most argv entries `execv` will marshal.
pub const ARG_MAX: usize = 1024;
