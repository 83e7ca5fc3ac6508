//! User address spaces, hosted.
//!
//! An address space is a flat, exclusively-owned byte region. Page zero is a
//! guard: any access below [`USER_BASE`] faults, so user null pointers are
//! caught the way an MMU would catch them. `activate` exists to keep the
//! call sites honest about when a space becomes current; on this port there
//! is no MMU state to switch.

use core::fmt;

use crate::error::KernelError;

pub const PAGE_SIZE: usize = 4096;

/// Total bytes of user-addressable memory per process.
pub const USER_SPACE_SIZE: usize = 256 * 1024;

/// Lowest valid user address (everything below is the guard page).
pub const USER_BASE: u64 = PAGE_SIZE as u64;

/// One past the highest valid user address; also the initial stack pointer.
pub const USER_TOP: u64 = USER_SPACE_SIZE as u64;

/// A user virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct VirtAddr(u64);

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl VirtAddr {
    pub const NULL: Self = Self(0);

    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[must_use]
    pub const fn addr(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_aligned_to(self, align: u64) -> bool {
        self.0 % align == 0
    }

    pub fn byte_add(self, offset: u64) -> Result<Self, KernelError> {
        self.0
            .checked_add(offset)
            .map(Self)
            .ok_or(KernelError::InaccessibleMemory(self, offset as usize))
    }
}

/// A process's user memory. Owned by exactly one process, never shared;
/// fork duplicates it wholesale.
pub struct AddrSpace {
    mem: Box<[u8]>,
}

impl AddrSpace {
    /// An empty (zeroed) address space.
    pub fn new() -> Self {
        Self {
            mem: vec![0; USER_SPACE_SIZE].into_boxed_slice(),
        }
    }

    /// Duplicates the whole space, for fork.
    pub fn copy(&self) -> Result<Self, KernelError> {
        Ok(Self {
            mem: self.mem.clone(),
        })
    }

    /// Makes this space the current one. Machine-dependent on a real port;
    /// nothing to do here.
    pub fn activate(&self) {}

    /// The initial user stack pointer for this space.
    #[must_use]
    pub fn define_stack(&self) -> VirtAddr {
        VirtAddr::new(USER_TOP)
    }

    /// Bounds-checks `[addr, addr + len)` against the valid user range.
    pub fn validate(&self, addr: VirtAddr, len: usize) -> Result<(), KernelError> {
        self.range(addr, len).map(|_| ())
    }

    fn range(
        &self,
        addr: VirtAddr,
        len: usize,
    ) -> Result<core::ops::Range<usize>, KernelError> {
        let fault = || KernelError::InaccessibleMemory(addr, len);
        let start = addr.addr();
        let end = start.checked_add(len as u64).ok_or_else(fault)?;
        if start < USER_BASE || end > self.mem.len() as u64 {
            return Err(fault());
        }
        Ok(start as usize..end as usize)
    }

    /// Copies bytes from user memory into a kernel buffer.
    pub fn copy_in(&self, src: VirtAddr, dst: &mut [u8]) -> Result<(), KernelError> {
        let range = self.range(src, dst.len())?;
        dst.copy_from_slice(&self.mem[range]);
        Ok(())
    }

    /// Copies bytes from a kernel buffer into user memory.
    pub fn copy_out(&mut self, dst: VirtAddr, src: &[u8]) -> Result<(), KernelError> {
        let range = self.range(dst, src.len())?;
        self.mem[range].copy_from_slice(src);
        Ok(())
    }

    /// Copies a NUL-terminated string in from user memory, bounded by `max`
    /// bytes including the terminator. The terminator is not included in the
    /// result.
    pub fn copy_in_str(&self, src: VirtAddr, max: usize) -> Result<Vec<u8>, KernelError> {
        let start = self.range(src, 1)?.start;
        let limit = usize::min(self.mem.len() - start, max);
        let window = &self.mem[start..start + limit];
        match window.iter().position(|&b| b == 0) {
            Some(nul) => Ok(window[..nul].to_vec()),
            None => Err(KernelError::UnterminatedString(src)),
        }
    }

    /// Reads one little-endian u64 from user memory (argv pointers).
    pub fn read_u64(&self, src: VirtAddr) -> Result<u64, KernelError> {
        let mut buf = [0; 8];
        self.copy_in(src, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Writes one little-endian u64 to user memory.
    pub fn write_u64(&mut self, dst: VirtAddr, value: u64) -> Result<(), KernelError> {
        self.copy_out(dst, &value.to_le_bytes())
    }
}

impl Default for AddrSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_page_faults() {
        let mut space = AddrSpace::new();
        assert!(matches!(
            space.copy_out(VirtAddr::NULL, b"x"),
            Err(KernelError::InaccessibleMemory(_, _))
        ));
        assert!(matches!(
            space.copy_out(VirtAddr::new(USER_BASE - 1), b"x"),
            Err(KernelError::InaccessibleMemory(_, _))
        ));
        space.copy_out(VirtAddr::new(USER_BASE), b"x").unwrap();
    }

    #[test]
    fn top_of_space_faults() {
        let space = AddrSpace::new();
        let mut buf = [0; 16];
        assert!(space.copy_in(VirtAddr::new(USER_TOP - 8), &mut buf).is_err());
        assert!(space
            .copy_in(VirtAddr::new(USER_TOP - 16), &mut buf)
            .is_ok());
    }

    #[test]
    fn copies_are_isolated() {
        let mut parent = AddrSpace::new();
        let addr = VirtAddr::new(USER_BASE);
        parent.copy_out(addr, b"parent").unwrap();

        let mut child = parent.copy().unwrap();
        let mut buf = [0; 6];
        child.copy_in(addr, &mut buf).unwrap();
        assert_eq!(&buf, b"parent");

        child.copy_out(addr, b"child!").unwrap();
        parent.copy_in(addr, &mut buf).unwrap();
        assert_eq!(&buf, b"parent");
    }

    #[test]
    fn copy_in_str_stops_at_nul() {
        let mut space = AddrSpace::new();
        let addr = VirtAddr::new(USER_BASE);
        space.copy_out(addr, b"con:\0junk").unwrap();
        assert_eq!(space.copy_in_str(addr, 64).unwrap(), b"con:");
    }

    #[test]
    fn copy_in_str_without_terminator_faults() {
        let mut space = AddrSpace::new();
        let addr = VirtAddr::new(USER_BASE);
        space.copy_out(addr, b"abcdef").unwrap();
        assert!(matches!(
            space.copy_in_str(addr, 3),
            Err(KernelError::UnterminatedString(_))
        ));
    }

    #[test]
    fn u64_round_trip() {
        let mut space = AddrSpace::new();
        let addr = VirtAddr::new(USER_BASE + 8);
        space.write_u64(addr, 0xdead_beef_0123).unwrap();
        assert_eq!(space.read_u64(addr).unwrap(), 0xdead_beef_0123);
    }
}
