//! Program images: execv and the kernel-side program-start path.

use core::convert::Infallible;
use std::{sync::Arc, thread::JoinHandle};

use auklet_abi::Pid;

use crate::{
    error::KernelError,
    kernel::Kernel,
    loader,
    param::{ARG_MAX, PATH_MAX},
    thread,
    vfs::{OpenOptions, Vnode},
    vm::{AddrSpace, USER_BASE, VirtAddr},
};

use super::{Proc, create_runprogram, finish_exit, release_private};

/// Status a process dies with when exec fails past the point of no return.
const EXEC_FATAL_STATUS: i32 = 0xff;

fn image_name(path: &str) -> &str {
    path.rsplit(['/', ':']).next().unwrap_or(path)
}

fn open_image(
    k: &Kernel,
    cwd: Option<&Arc<dyn Vnode>>,
    path: &str,
) -> Result<Arc<dyn Vnode>, KernelError> {
    k.vfs().open(path, &OpenOptions::read_only(), cwd)
}

/// Replaces the process image. Everything before the address-space swap
/// fails cleanly back to the caller; the swap is the commit point.
fn install_and_load(
    p: &Proc,
    path: &str,
    vnode: Arc<dyn Vnode>,
    argv: &[Vec<u8>],
) -> Result<(VirtAddr, VirtAddr, usize, VirtAddr), KernelError> {
    // Own-thread access (exec), or a not-yet-started process (run_program).
    let private = unsafe { p.private_mut() };

    // Install the new space and destroy the old one. No rollback from here.
    private.addrspace = Some(AddrSpace::new());
    let space = private.addrspace.as_mut().unwrap();
    space.activate();

    let entry = loader::load_image(&vnode, space)?;
    drop(vnode); // done with the executable

    let sp = space.define_stack();
    let (sp, argv_ptr, argc) = push_arguments(space, sp, argv)?;

    p.shared().set_name(image_name(path));
    Ok((entry, sp, argc, argv_ptr))
}

/// Copies the argument strings onto the user stack from the top down, each
/// padded to a 4-byte boundary, then the pointer array with its trailing
/// null. Returns the final stack pointer, the user argv pointer, and argc.
fn push_arguments(
    space: &mut AddrSpace,
    sp: VirtAddr,
    argv: &[Vec<u8>],
) -> Result<(VirtAddr, VirtAddr, usize), KernelError> {
    let mut sp = sp.addr();
    let mut pointers = Vec::with_capacity(argv.len() + 1);

    let push_down = |sp: u64, by: u64| {
        sp.checked_sub(by)
            .filter(|&sp| sp >= USER_BASE)
            .ok_or(KernelError::ArgumentListTooLong)
    };

    for arg in argv {
        let padded = (arg.len() + 1 + 3) & !3;
        sp = push_down(sp, padded as u64)?;
        space.copy_out(VirtAddr::new(sp), arg)?;
        space.copy_out(VirtAddr::new(sp + arg.len() as u64), &[0])?;
        pointers.push(sp);
    }
    pointers.push(0);

    sp = push_down(sp, (pointers.len() * size_of::<u64>()) as u64)?;
    sp &= !7; // pointer array is 8-byte aligned
    let argv_ptr = VirtAddr::new(sp);
    for (i, &ptr) in pointers.iter().enumerate() {
        space.write_u64(VirtAddr::new(sp + (i * size_of::<u64>()) as u64), ptr)?;
    }

    Ok((argv_ptr, argv_ptr, argv.len()))
}

/// The execv system call: replaces the calling process's image with the
/// named one, passing it the argument vector. Never returns on success.
///
/// A failure before the new address space is installed comes back as an
/// ordinary error. After that point there is nothing to return to: the
/// process is ended with a fatal status.
pub fn exec(
    k: &Arc<Kernel>,
    p: &Arc<Proc>,
    upath: VirtAddr,
    uargv: VirtAddr,
) -> Result<Infallible, KernelError> {
    let (path, argv) = {
        // Our own private state: exec runs on the calling process's thread.
        let private = unsafe { p.private_mut() };
        let space = private
            .addrspace
            .as_ref()
            .ok_or(KernelError::InaccessibleMemory(upath, 1))?;

        let path_bytes = space.copy_in_str(upath, PATH_MAX)?;
        let path = String::from_utf8(path_bytes).map_err(|_| KernelError::InvalidPathEncoding)?;

        let mut argv = Vec::new();
        loop {
            let slot = uargv.byte_add((argv.len() * size_of::<u64>()) as u64)?;
            let ptr = space.read_u64(slot)?;
            if ptr == 0 {
                break;
            }
            if argv.len() >= ARG_MAX {
                return Err(KernelError::ArgumentListTooLong);
            }
            argv.push(space.copy_in_str(VirtAddr::new(ptr), ARG_MAX)?);
        }
        (path, argv)
    };

    let private = unsafe { p.private_mut() };
    let vnode = open_image(k, private.cwd.as_ref(), &path)?;

    match install_and_load(p, &path, vnode, &argv) {
        Ok((entry, sp, argc, argv_ptr)) => k.usermode().enter_new(entry, sp, argc, argv_ptr),
        Err(err) => {
            // The old image is already gone; this process cannot continue.
            log::error!("exec {path} failed past the commit point: {err}");
            finish_exit(k, p, EXEC_FATAL_STATUS);
            thread::exit()
        }
    }
}

/// Starts a program in a fresh console-equipped process: the path the shell
/// takes for each command. The image and arguments are staged before the
/// process's thread exists, so every failure here is clean.
pub fn run_program(
    k: &Arc<Kernel>,
    path: &str,
    args: &[&str],
) -> Result<(Pid, JoinHandle<()>), KernelError> {
    let name = image_name(path);
    let proc = create_runprogram(k, name)?;

    let argv: Vec<Vec<u8>> = std::iter::once(path)
        .chain(args.iter().copied())
        .map(|s| s.as_bytes().to_vec())
        .collect();

    let staged = (|| -> Result<(VirtAddr, VirtAddr, usize, VirtAddr), KernelError> {
        // The process has no thread yet; its private state is ours.
        let private = unsafe { proc.private_mut() };
        let vnode = open_image(k, private.cwd.as_ref(), path)?;
        install_and_load(&proc, path, vnode, &argv)
    })();

    match staged {
        Err(err) => {
            let private = unsafe { proc.private_mut() };
            release_private(k, private);
            k.procs().release(proc.pid());
            Err(err)
        }
        Ok((entry, sp, argc, argv_ptr)) => {
            k.procs().commit(proc.pid(), Arc::clone(&proc));
            let kernel = Arc::clone(k);
            let handle = thread::spawn(name, Arc::clone(k), Arc::clone(&proc), move || {
                kernel.usermode().enter_new(entry, sp, argc, argv_ptr);
            });
            log::debug!("process {} running {path}", proc.pid());
            Ok((proc.pid(), handle))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::USER_TOP;

    #[test]
    fn arguments_land_padded_and_terminated() {
        let mut space = AddrSpace::new();
        let argv = vec![b"prog".to_vec(), b"a".to_vec(), b"longer-arg".to_vec()];
        let (sp, argv_ptr, argc) =
            push_arguments(&mut space, VirtAddr::new(USER_TOP), &argv).unwrap();

        assert_eq!(argc, 3);
        assert_eq!(sp, argv_ptr);
        assert_eq!(sp.addr() % 8, 0);

        // Pointer array: argc entries then a null.
        let mut pointers = Vec::new();
        for i in 0..=argc {
            pointers.push(
                space
                    .read_u64(VirtAddr::new(sp.addr() + (i * 8) as u64))
                    .unwrap(),
            );
        }
        assert_eq!(pointers[argc], 0);

        // Each string sits at a 4-byte boundary with its terminator.
        for (i, arg) in argv.iter().enumerate() {
            let at = VirtAddr::new(pointers[i]);
            assert_eq!(at.addr() % 4, 0);
            let mut buf = vec![0; arg.len() + 1];
            space.copy_in(at, &mut buf).unwrap();
            assert_eq!(&buf[..arg.len()], &arg[..]);
            assert_eq!(buf[arg.len()], 0);
        }

        // Strings were laid out below the top of the stack, pointers below
        // the strings.
        assert!(pointers[..argc].iter().all(|&p| p >= sp.addr()));
    }

    #[test]
    fn empty_argv_still_null_terminated() {
        let mut space = AddrSpace::new();
        let (sp, argv_ptr, argc) =
            push_arguments(&mut space, VirtAddr::new(USER_TOP), &[]).unwrap();
        assert_eq!(argc, 0);
        assert_eq!(space.read_u64(argv_ptr).unwrap(), 0);
        assert_eq!(sp.addr() % 8, 0);
    }
}
