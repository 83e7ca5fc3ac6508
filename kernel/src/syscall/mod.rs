//! Syscall decode and dispatch.
//!
//! The call number rides in `a7`, arguments in `a0..a2`. On the way out,
//! `a3` is the error flag: 0 with the value in `a0` (plus `a1` when a
//! 64-bit result is split in two, as for lseek), 1 with the errno in `a0`.

use std::sync::Arc;

use auklet_abi::{Errno, Pid, RawFd, SyscallCode};

use crate::{error::KernelError, kernel::Kernel, proc::Proc, trap::Trapframe, vm::VirtAddr};

pub mod file;
pub mod proc;

/// What a successful syscall stores back into the trapframe.
#[derive(Debug, Clone, Copy)]
enum ReturnValue {
    One(u64),
    /// 64-bit result split across two registers: (high 32, low 32).
    Two(u64, u64),
}

fn one(v: usize) -> ReturnValue {
    ReturnValue::One(v as u64)
}

fn one_fd(fd: RawFd) -> ReturnValue {
    ReturnValue::One(fd.get() as u64)
}

fn one_pid(pid: Pid) -> ReturnValue {
    ReturnValue::One(pid.get() as u64)
}

fn split64(v: i64) -> ReturnValue {
    let v = v as u64;
    ReturnValue::Two(v >> 32, v & 0xffff_ffff)
}

/// Executes the syscall named by the trapframe and stores the result back.
pub fn dispatch(k: &Arc<Kernel>, p: &Arc<Proc>, tf: &mut Trapframe) {
    let Some(code) = SyscallCode::from_repr(tf.a7) else {
        log::warn!("{} {}: unknown syscall {}", p.pid(), p.name(), tf.a7);
        store_err(tf, Errno::Unknown);
        return;
    };

    let result: Result<ReturnValue, KernelError> = match code {
        SyscallCode::Fork => self::proc::sys_fork(k, p, tf).map(one_pid),
        SyscallCode::Execv => {
            let (upath, uargv) = (VirtAddr::new(tf.a0), VirtAddr::new(tf.a1));
            match self::proc::sys_execv(k, p, upath, uargv) {
                Ok(never) => match never {},
                Err(err) => Err(err),
            }
        }
        SyscallCode::Waitpid => {
            let pid = Pid::new(tf.a0 as i32);
            let status = VirtAddr::new(tf.a1);
            let options = tf.a2 as u32;
            self::proc::sys_waitpid(k, p, pid, status, options).map(one_pid)
        }
        SyscallCode::Exit => self::proc::sys_exit(k, p, tf.a0 as i32),
        SyscallCode::Getpid => Ok(one_pid(self::proc::sys_getpid(p))),
        SyscallCode::Open => {
            let (upath, flags) = (VirtAddr::new(tf.a0), tf.a1 as u32);
            self::file::sys_open(k, p, upath, flags).map(one_fd)
        }
        SyscallCode::Close => {
            self::file::sys_close(k, p, RawFd::new(tf.a0 as usize)).map(|()| one(0))
        }
        SyscallCode::Read => {
            let (fd, ubuf, len) = (RawFd::new(tf.a0 as usize), VirtAddr::new(tf.a1), tf.a2 as usize);
            self::file::sys_read(k, p, fd, ubuf, len).map(one)
        }
        SyscallCode::Write => {
            let (fd, ubuf, len) = (RawFd::new(tf.a0 as usize), VirtAddr::new(tf.a1), tf.a2 as usize);
            self::file::sys_write(k, p, fd, ubuf, len).map(one)
        }
        SyscallCode::Lseek => {
            let (fd, offset, whence) = (RawFd::new(tf.a0 as usize), tf.a1 as i64, tf.a2 as u32);
            self::file::sys_lseek(k, p, fd, offset, whence).map(split64)
        }
        SyscallCode::Dup2 => {
            let (old, new) = (RawFd::new(tf.a0 as usize), RawFd::new(tf.a1 as usize));
            self::file::sys_dup2(k, p, old, new).map(one_fd)
        }
        SyscallCode::Chdir => {
            self::file::sys_chdir(k, p, VirtAddr::new(tf.a0)).map(|()| one(0))
        }
        SyscallCode::Getcwd => {
            let (ubuf, len) = (VirtAddr::new(tf.a0), tf.a1 as usize);
            self::file::sys_getcwd(k, p, ubuf, len).map(one)
        }
        SyscallCode::Remove => {
            self::file::sys_remove(k, p, VirtAddr::new(tf.a0)).map(|()| one(0))
        }
    };

    match result {
        Ok(ReturnValue::One(v)) => {
            tf.a3 = 0;
            tf.a0 = v;
        }
        Ok(ReturnValue::Two(hi, lo)) => {
            tf.a3 = 0;
            tf.a0 = hi;
            tf.a1 = lo;
        }
        Err(err) => store_err(tf, err.into()),
    }
}

fn store_err(tf: &mut Trapframe, errno: Errno) {
    tf.a3 = 1;
    tf.a0 = errno.value() as u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split64_halves() {
        let ReturnValue::Two(hi, lo) = split64(0x1_2345_6789) else {
            panic!("expected two registers");
        };
        assert_eq!(hi, 0x1);
        assert_eq!(lo, 0x2345_6789);
    }
}
