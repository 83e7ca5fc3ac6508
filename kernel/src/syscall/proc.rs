//! Process system calls. Thin shims over the lifecycle operations in
//! [`crate::proc`]; validation specific to each call lives there, beside
//! the state it guards.

use core::convert::Infallible;
use std::sync::Arc;

use auklet_abi::Pid;

use crate::{
    error::KernelError, kernel::Kernel, proc, proc::Proc, trap::Trapframe, vm::VirtAddr,
};

/// Never fails: the caller's pid is a pure read.
pub fn sys_getpid(p: &Proc) -> Pid {
    p.pid()
}

pub fn sys_fork(k: &Arc<Kernel>, p: &Arc<Proc>, tf: &Trapframe) -> Result<Pid, KernelError> {
    proc::fork(k, p, tf)
}

pub fn sys_execv(
    k: &Arc<Kernel>,
    p: &Arc<Proc>,
    upath: VirtAddr,
    uargv: VirtAddr,
) -> Result<Infallible, KernelError> {
    proc::exec(k, p, upath, uargv)
}

pub fn sys_waitpid(
    k: &Arc<Kernel>,
    p: &Arc<Proc>,
    pid: Pid,
    status_addr: VirtAddr,
    options: u32,
) -> Result<Pid, KernelError> {
    proc::wait(k, p, pid, status_addr, options)
}

pub fn sys_exit(k: &Arc<Kernel>, p: &Arc<Proc>, code: i32) -> ! {
    proc::exit(k, p, code)
}
