#![allow(dead_code)] // each test binary uses a different slice of this

//! Simulated user mode for the scenario tests.
//!
//! A "program" is a closure registered under an entry address; images on
//! the test filesystem carry that entry in their header. When the kernel
//! enters user mode, for a fresh image or a forked child, the simulator
//! looks up the entry named by the program counter and runs the closure on
//! the process's own kernel thread. Programs talk to the kernel exactly the
//! way compiled user code would: registers in a trapframe, through the
//! syscall dispatcher.

use std::{
    cell::Cell,
    collections::HashMap,
    sync::{Arc, Mutex},
    thread::JoinHandle,
};

use auklet_kernel::{
    Kernel,
    abi::{Errno, OpenFlags, Pid, SyscallCode},
    loader,
    proc::Proc,
    syscall,
    thread,
    trap::{Trapframe, UserMode, with_user_memory},
    vfs::MemFs,
    vm::{USER_BASE, VirtAddr},
};

pub type Program = Arc<dyn Fn(&Env, &mut Trapframe) + Send + Sync>;

/// Where staged strings and buffers go in a program's address space; well
/// clear of the entry-address keys near `USER_BASE`.
const SCRATCH_BASE: u64 = USER_BASE + 0x8000;

pub struct Sim {
    programs: Mutex<HashMap<u64, Program>>,
    next_entry: Mutex<u64>,
}

impl Sim {
    fn new() -> Self {
        Self {
            programs: Mutex::new(HashMap::new()),
            next_entry: Mutex::new(USER_BASE),
        }
    }

    fn register(&self, f: Program) -> VirtAddr {
        let mut next = self.next_entry.lock().unwrap();
        let entry = *next;
        *next += 8;
        self.programs.lock().unwrap().insert(entry, f);
        VirtAddr::new(entry)
    }

    fn run(&self, mut tf: Trapframe) -> ! {
        let program = self
            .programs
            .lock()
            .unwrap()
            .get(&tf.pc)
            .cloned()
            .unwrap_or_else(|| panic!("no program registered at pc {:#x}", tf.pc));
        let env = Env::current();
        program(&env, &mut tf);
        // Falling off the end of a program is an exit(0).
        env.exit(&mut tf, 0)
    }
}

struct SimDoor(Arc<Sim>);

impl UserMode for SimDoor {
    fn enter_new(&self, entry: VirtAddr, sp: VirtAddr, argc: usize, argv: VirtAddr) -> ! {
        let mut tf = Trapframe::zeroed();
        tf.pc = entry.addr();
        tf.sp = sp.addr();
        tf.a0 = argc as u64;
        tf.a1 = argv.addr();
        self.0.run(tf)
    }

    fn enter_forked(&self, tf: Box<Trapframe>) -> ! {
        self.0.run(*tf)
    }
}

/// A program's view of the world: its kernel, its process, and a bump
/// allocator over its own scratch memory for staging syscall arguments.
pub struct Env {
    pub kernel: Arc<Kernel>,
    pub proc: Arc<Proc>,
    bump: Cell<u64>,
}

impl Env {
    fn current() -> Self {
        let cur = thread::current();
        Self {
            kernel: cur.kernel,
            proc: cur.proc,
            bump: Cell::new(SCRATCH_BASE),
        }
    }

    /// Copies bytes into this program's memory, returning their address.
    pub fn stage(&self, bytes: &[u8]) -> VirtAddr {
        let at = self.bump.get();
        self.bump.set((at + bytes.len() as u64 + 7) & !7);
        with_user_memory(|space| space.copy_out(VirtAddr::new(at), bytes)).unwrap();
        VirtAddr::new(at)
    }

    pub fn stage_cstr(&self, s: &str) -> VirtAddr {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.stage(&bytes)
    }

    /// Reserves zeroed scratch space.
    pub fn reserve(&self, len: usize) -> VirtAddr {
        self.stage(&vec![0; len])
    }

    pub fn read_back(&self, addr: VirtAddr, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        with_user_memory(|space| space.copy_in(addr, &mut buf)).unwrap();
        buf
    }

    /// The argument vector as delivered to a fresh image: `a0` is argc,
    /// `a1` the user argv pointer.
    pub fn args(&self, tf: &Trapframe) -> Vec<String> {
        let argc = tf.a0 as usize;
        let argv = VirtAddr::new(tf.a1);
        (0..argc)
            .map(|i| {
                with_user_memory(|space| {
                    let ptr = space.read_u64(argv.byte_add((i * 8) as u64).unwrap()).unwrap();
                    let bytes = space.copy_in_str(VirtAddr::new(ptr), 1024).unwrap();
                    String::from_utf8(bytes).unwrap()
                })
            })
            .collect()
    }

    fn raw(
        &self,
        tf: &mut Trapframe,
        code: SyscallCode,
        args: [u64; 3],
    ) -> Result<(u64, u64), Errno> {
        tf.a7 = code as u64;
        [tf.a0, tf.a1, tf.a2] = args;
        syscall::dispatch(&self.kernel, &self.proc, tf);
        if tf.a3 == 0 {
            Ok((tf.a0, tf.a1))
        } else {
            Err(Errno::from_repr(tf.a0 as i32).unwrap_or(Errno::Unknown))
        }
    }

    pub fn open(&self, tf: &mut Trapframe, path: &str, flags: OpenFlags) -> Result<usize, Errno> {
        let upath = self.stage_cstr(path);
        self.open_ptr(tf, upath, flags)
    }

    /// open with an already-staged pathname; lets polling loops reuse one
    /// staging slot instead of growing the scratch area every try.
    pub fn open_ptr(
        &self,
        tf: &mut Trapframe,
        upath: VirtAddr,
        flags: OpenFlags,
    ) -> Result<usize, Errno> {
        self.raw(tf, SyscallCode::Open, [upath.addr(), flags.bits() as u64, 0])
            .map(|(fd, _)| fd as usize)
    }

    pub fn close(&self, tf: &mut Trapframe, fd: usize) -> Result<(), Errno> {
        self.raw(tf, SyscallCode::Close, [fd as u64, 0, 0]).map(|_| ())
    }

    pub fn write(&self, tf: &mut Trapframe, fd: usize, data: &[u8]) -> Result<usize, Errno> {
        let ubuf = self.stage(data);
        self.raw(
            tf,
            SyscallCode::Write,
            [fd as u64, ubuf.addr(), data.len() as u64],
        )
        .map(|(n, _)| n as usize)
    }

    pub fn read(&self, tf: &mut Trapframe, fd: usize, len: usize) -> Result<Vec<u8>, Errno> {
        let ubuf = self.reserve(len);
        let (n, _) = self.raw(tf, SyscallCode::Read, [fd as u64, ubuf.addr(), len as u64])?;
        Ok(self.read_back(ubuf, n as usize))
    }

    pub fn lseek(
        &self,
        tf: &mut Trapframe,
        fd: usize,
        offset: i64,
        whence: u32,
    ) -> Result<i64, Errno> {
        let (hi, lo) = self.raw(
            tf,
            SyscallCode::Lseek,
            [fd as u64, offset as u64, whence as u64],
        )?;
        Ok(((hi << 32) | lo) as i64)
    }

    pub fn dup2(&self, tf: &mut Trapframe, old: usize, new: usize) -> Result<usize, Errno> {
        self.raw(tf, SyscallCode::Dup2, [old as u64, new as u64, 0])
            .map(|(fd, _)| fd as usize)
    }

    pub fn chdir(&self, tf: &mut Trapframe, path: &str) -> Result<(), Errno> {
        let upath = self.stage_cstr(path);
        self.raw(tf, SyscallCode::Chdir, [upath.addr(), 0, 0]).map(|_| ())
    }

    pub fn getcwd(&self, tf: &mut Trapframe, len: usize) -> Result<String, Errno> {
        let ubuf = self.reserve(len);
        let (n, _) = self.raw(tf, SyscallCode::Getcwd, [ubuf.addr(), len as u64, 0])?;
        Ok(String::from_utf8(self.read_back(ubuf, n as usize)).unwrap())
    }

    pub fn remove(&self, tf: &mut Trapframe, path: &str) -> Result<(), Errno> {
        let upath = self.stage_cstr(path);
        self.raw(tf, SyscallCode::Remove, [upath.addr(), 0, 0]).map(|_| ())
    }

    pub fn getpid(&self, tf: &mut Trapframe) -> Pid {
        let (pid, _) = self
            .raw(tf, SyscallCode::Getpid, [0, 0, 0])
            .expect("getpid never fails");
        Pid::new(pid as i32)
    }

    /// Forks; the child resumes in the program registered at `child_pc`
    /// with `a0 == 0`, just as if the parent's pc had been there.
    pub fn fork(&self, tf: &mut Trapframe, child_pc: VirtAddr) -> Result<Pid, Errno> {
        tf.pc = child_pc.addr();
        self.raw(tf, SyscallCode::Fork, [0, 0, 0])
            .map(|(pid, _)| Pid::new(pid as i32))
    }

    pub fn waitpid(
        &self,
        tf: &mut Trapframe,
        pid: Pid,
        options: u32,
    ) -> Result<(Pid, i32), Errno> {
        let status_addr = self.reserve(4);
        let (got, _) = self.raw(
            tf,
            SyscallCode::Waitpid,
            [pid.get() as u64, status_addr.addr(), options as u64],
        )?;
        let status = i32::from_le_bytes(self.read_back(status_addr, 4).try_into().unwrap());
        Ok((Pid::new(got as i32), status))
    }

    /// waitpid with a caller-chosen status address, for the EFAULT cases.
    pub fn waitpid_at(
        &self,
        tf: &mut Trapframe,
        pid: Pid,
        status_addr: VirtAddr,
        options: u32,
    ) -> Result<Pid, Errno> {
        self.raw(
            tf,
            SyscallCode::Waitpid,
            [pid.get() as u64, status_addr.addr(), options as u64],
        )
        .map(|(got, _)| Pid::new(got as i32))
    }

    /// Only returns on failure.
    pub fn execv(&self, tf: &mut Trapframe, path: &str, args: &[&str]) -> Errno {
        let upath = self.stage_cstr(path);
        let mut pointers: Vec<u64> = args.iter().map(|a| self.stage_cstr(a).addr()).collect();
        pointers.push(0);
        let bytes: Vec<u8> = pointers.iter().flat_map(|p| p.to_le_bytes()).collect();
        let uargv = self.stage(&bytes);
        self.raw(tf, SyscallCode::Execv, [upath.addr(), uargv.addr(), 0])
            .expect_err("execv returned success")
    }

    pub fn exit(&self, tf: &mut Trapframe, code: i32) -> ! {
        let _ = self.raw(tf, SyscallCode::Exit, [code as u64, 0, 0]);
        unreachable!("exit returned")
    }
}

/// One bootstrapped kernel with a RAM filesystem and the simulator door.
pub struct Harness {
    pub kernel: Arc<Kernel>,
    sim: Arc<Sim>,
    pub fs: Arc<MemFs>,
}

impl Harness {
    pub fn new() -> Self {
        let sim = Arc::new(Sim::new());
        let kernel = Kernel::bootstrap(Box::new(SimDoor(Arc::clone(&sim))));
        let fs = Arc::new(MemFs::new("mem"));
        kernel.vfs().mount(Arc::clone(&fs) as _).unwrap();
        Self { kernel, sim, fs }
    }

    /// Registers a program body without an image; the returned address is a
    /// fork continuation target.
    pub fn entry(&self, f: impl Fn(&Env, &mut Trapframe) + Send + Sync + 'static) -> VirtAddr {
        self.sim.register(Arc::new(f))
    }

    /// Registers a program and installs a runnable image for it on the test
    /// filesystem under `name`.
    pub fn program(
        &self,
        name: &str,
        f: impl Fn(&Env, &mut Trapframe) + Send + Sync + 'static,
    ) -> VirtAddr {
        let entry = self.entry(f);
        self.fs
            .install(name, &loader::build_image(entry.addr(), USER_BASE, &[]));
        entry
    }

    /// Starts the named image in a fresh process.
    pub fn run(&self, name: &str, args: &[&str]) -> anyhow::Result<(Pid, JoinHandle<()>)> {
        Ok(self.kernel.run_program(&format!("mem:{name}"), args)?)
    }

    /// Runs the named image to completion; a program assertion failure
    /// comes back as an error.
    pub fn run_to_end(&self, name: &str, args: &[&str]) -> anyhow::Result<()> {
        let (_pid, handle) = self.run(name, args)?;
        handle.join().map_err(|payload| {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            anyhow::anyhow!("program {name} failed: {msg}")
        })
    }

    pub fn console_output(&self) -> String {
        String::from_utf8(self.kernel.console().take_output()).unwrap()
    }
}
