pub use auklet_abi::limits::{ARG_MAX, OPEN_MAX, PATH_MAX};

/// Maximum number of user processes. Slot 0 of the process table is the
/// kernel process, so pids run 1..=PROC_MAX.
pub const PROC_MAX: usize = 100;

/// Capacity of the system-wide open-file table.
pub const SYSTEM_OPEN_MAX: usize = 10 * OPEN_MAX;

/// Device name of the console.
pub const CONSOLE: &str = "con:";

/// Name of the kernel process.
pub const KERNEL_NAME: &str = "[kernel]";
