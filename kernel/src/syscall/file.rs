//! File system calls.
//!
//! The common prologue for descriptor-based calls: the fd must be in range
//! and occupied (EBADF), and the open file's access mode must allow the
//! operation (also EBADF's territory, reported as not-readable /
//! not-writable). Data moves through a kernel staging buffer; the offset
//! update and the I/O happen together under the per-file lock.

use std::sync::Arc;

use auklet_abi::{AccessMode, OpenFlags, RawFd, Whence};

use crate::{
    error::KernelError,
    file::FdTable,
    kernel::Kernel,
    param::PATH_MAX,
    proc::Proc,
    vfs::{NodeKind, OpenOptions},
    vm::VirtAddr,
};

/// Copies a pathname in from user space.
fn user_path(p: &Proc, upath: VirtAddr) -> Result<String, KernelError> {
    // Syscalls run on the owning thread.
    let private = unsafe { p.private_mut() };
    let space = private
        .addrspace
        .as_ref()
        .ok_or(KernelError::InaccessibleMemory(upath, 1))?;
    let bytes = space.copy_in_str(upath, PATH_MAX)?;
    String::from_utf8(bytes).map_err(|_| KernelError::InvalidPathEncoding)
}

pub fn sys_open(
    k: &Arc<Kernel>,
    p: &Arc<Proc>,
    upath: VirtAddr,
    flags: u32,
) -> Result<RawFd, KernelError> {
    let mode = AccessMode::from_flags(flags).ok_or(KernelError::InvalidFileMode)?;
    let flags = OpenFlags::from_bits(flags).ok_or(KernelError::InvalidFileMode)?;
    let path = user_path(p, upath)?;

    let private = unsafe { p.private_mut() };
    let options = OpenOptions {
        mode,
        create: flags.contains(OpenFlags::CREAT),
        exclusive: flags.contains(OpenFlags::EXCL),
        truncate: flags.contains(OpenFlags::TRUNC),
    };
    let vnode = k.vfs().open(&path, &options, private.cwd.as_ref())?;

    let offset = if flags.contains(OpenFlags::APPEND) {
        i64::try_from(vnode.stat()?.size).map_err(|_| KernelError::InvalidSeek)?
    } else {
        0
    };

    let id = k.files().create("openfile", vnode, mode, offset)?;
    match private.fds.alloc(id) {
        Ok(fd) => Ok(fd),
        Err(err) => {
            // Release in reverse order: the claimed slot goes back first.
            k.files().decref(id);
            Err(err)
        }
    }
}

pub fn sys_close(k: &Arc<Kernel>, p: &Arc<Proc>, fd: RawFd) -> Result<(), KernelError> {
    let private = unsafe { p.private_mut() };
    let id = private
        .fds
        .take(fd)
        .ok_or(KernelError::FileDescriptorNotFound(fd))?;
    k.files().decref(id);
    Ok(())
}

pub fn sys_read(
    k: &Arc<Kernel>,
    p: &Arc<Proc>,
    fd: RawFd,
    ubuf: VirtAddr,
    len: usize,
) -> Result<usize, KernelError> {
    let private = unsafe { p.private_mut() };
    let id = private.fds.get(fd)?;
    if !k.files().mode_of(id).readable() {
        return Err(KernelError::FileDescriptorNotReadable(fd));
    }
    let space = private
        .addrspace
        .as_mut()
        .ok_or(KernelError::InaccessibleMemory(ubuf, len))?;
    space.validate(ubuf, len)?;

    let mut staging = vec![0; len];
    k.files().with_file(id, |of| {
        let n = of.vnode().read_at(&mut staging, of.offset() as u64)?;
        of.set_offset(of.offset() + n as i64);
        space.copy_out(ubuf, &staging[..n])?;
        Ok(n)
    })
}

pub fn sys_write(
    k: &Arc<Kernel>,
    p: &Arc<Proc>,
    fd: RawFd,
    ubuf: VirtAddr,
    len: usize,
) -> Result<usize, KernelError> {
    let private = unsafe { p.private_mut() };
    let id = private.fds.get(fd)?;
    if !k.files().mode_of(id).writable() {
        return Err(KernelError::FileDescriptorNotWritable(fd));
    }
    let space = private
        .addrspace
        .as_ref()
        .ok_or(KernelError::InaccessibleMemory(ubuf, len))?;
    space.validate(ubuf, len)?;

    let mut staging = vec![0; len];
    space.copy_in(ubuf, &mut staging)?;

    k.files().with_file(id, |of| {
        let before = of.offset();
        let n = of.vnode().write_at(&staging, before as u64)?;
        of.set_offset(before + n as i64);
        // Bytes moved is the offset advance.
        Ok((of.offset() - before) as usize)
    })
}

/// Where a seek lands, before the negativity check.
fn seek_target(current: i64, size: i64, offset: i64, whence: Whence) -> Result<i64, KernelError> {
    let base = match whence {
        Whence::Set => 0,
        Whence::Cur => current,
        Whence::End => size,
    };
    base.checked_add(offset).ok_or(KernelError::InvalidSeek)
}

pub fn sys_lseek(
    k: &Arc<Kernel>,
    p: &Arc<Proc>,
    fd: RawFd,
    offset: i64,
    whence: u32,
) -> Result<i64, KernelError> {
    let private = unsafe { p.private_mut() };
    let id = private.fds.get(fd)?;
    let whence = Whence::from_repr(whence).ok_or(KernelError::InvalidSeek)?;

    k.files().with_file(id, |of| {
        let size = i64::try_from(of.vnode().stat()?.size).map_err(|_| KernelError::InvalidSeek)?;
        let target = seek_target(of.offset(), size, offset, whence)?;
        if target < 0 {
            return Err(KernelError::InvalidSeek);
        }
        of.set_offset(target);
        Ok(target)
    })
}

pub fn sys_dup2(
    k: &Arc<Kernel>,
    p: &Arc<Proc>,
    old: RawFd,
    new: RawFd,
) -> Result<RawFd, KernelError> {
    if !FdTable::in_range(new) {
        return Err(KernelError::FileDescriptorNotFound(new));
    }
    let private = unsafe { p.private_mut() };
    let id = private.fds.get(old)?;
    if old == new {
        return Ok(new);
    }
    // An occupied target is closed through the ordinary path first; the old
    // descriptor still pins the file, so this cannot release it early.
    if let Some(displaced) = private.fds.take(new) {
        k.files().decref(displaced);
    }
    k.files().incref(id);
    private.fds.set(new, id);
    Ok(new)
}

pub fn sys_chdir(k: &Arc<Kernel>, p: &Arc<Proc>, upath: VirtAddr) -> Result<(), KernelError> {
    let path = user_path(p, upath)?;
    let private = unsafe { p.private_mut() };
    let vnode = k
        .vfs()
        .open(&path, &OpenOptions::read_only(), private.cwd.as_ref())?;
    if vnode.stat()?.kind != NodeKind::Dir {
        return Err(KernelError::NotADirectory);
    }
    private.cwd = Some(vnode);
    Ok(())
}

pub fn sys_getcwd(
    k: &Arc<Kernel>,
    p: &Arc<Proc>,
    ubuf: VirtAddr,
    len: usize,
) -> Result<usize, KernelError> {
    let private = unsafe { p.private_mut() };
    let name = {
        let cwd = private.cwd.as_ref().ok_or(KernelError::FsEntryNotFound)?;
        k.vfs().getcwd(cwd)?
    };
    let space = private
        .addrspace
        .as_mut()
        .ok_or(KernelError::InaccessibleMemory(ubuf, len))?;
    let bytes = name.as_bytes();
    let n = usize::min(len, bytes.len());
    space.copy_out(ubuf, &bytes[..n])?;
    Ok(n)
}

pub fn sys_remove(k: &Arc<Kernel>, p: &Arc<Proc>, upath: VirtAddr) -> Result<(), KernelError> {
    let path = user_path(p, upath)?;
    let private = unsafe { p.private_mut() };
    k.vfs().remove(&path, private.cwd.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_targets() {
        assert_eq!(seek_target(10, 100, 5, Whence::Set).unwrap(), 5);
        assert_eq!(seek_target(10, 100, 5, Whence::Cur).unwrap(), 15);
        assert_eq!(seek_target(10, 100, -5, Whence::Cur).unwrap(), 5);
        assert_eq!(seek_target(10, 100, -20, Whence::End).unwrap(), 80);
        // Negative results surface to the caller, which rejects them.
        assert_eq!(seek_target(10, 100, -20, Whence::Set).unwrap(), -20);
    }

    #[test]
    fn seek_overflow_is_invalid() {
        assert!(matches!(
            seek_target(i64::MAX, 0, 1, Whence::Cur),
            Err(KernelError::InvalidSeek)
        ));
    }
}
