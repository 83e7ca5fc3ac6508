//! The executable-image loader.
//!
//! Images are flat: a fixed header naming the entry point and load base,
//! followed by the payload copied verbatim into the address space. The
//! format is deliberately minimal; the loader's contract to exec is only
//! "read the vnode, populate the space, hand back the entry point".

use std::sync::Arc;

use dataview::{Pod, PodMethods as _};

use crate::{
    error::KernelError,
    vm::{AddrSpace, USER_BASE, USER_TOP, VirtAddr},
    vfs::Vnode,
};

pub const IMAGE_MAGIC: [u8; 4] = *b"auk1";

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct ImageHeader {
    magic: [u8; 4],
    _reserved: u32,
    /// Entry point, absolute user address.
    entry: u64,
    /// Load base for the payload, absolute user address.
    base: u64,
    /// Payload length in bytes.
    size: u64,
}

unsafe impl Pod for ImageHeader {}

/// Loads the image in `vnode` into `space` and returns its entry point.
pub fn load_image(
    vnode: &Arc<dyn Vnode>,
    space: &mut AddrSpace,
) -> Result<VirtAddr, KernelError> {
    let mut header = ImageHeader::zeroed();
    let nread = vnode.read_at(header.as_bytes_mut(), 0)?;
    if nread != size_of::<ImageHeader>() || header.magic != IMAGE_MAGIC {
        return Err(KernelError::InvalidExecutable);
    }

    let base = header.base;
    let end = base
        .checked_add(header.size)
        .ok_or(KernelError::InvalidExecutable)?;
    if base < USER_BASE || end > USER_TOP {
        return Err(KernelError::InvalidExecutable);
    }
    if header.entry < USER_BASE || header.entry >= USER_TOP {
        return Err(KernelError::InvalidExecutable);
    }

    let mut payload = vec![0; header.size as usize];
    let nread = vnode.read_at(&mut payload, size_of::<ImageHeader>() as u64)?;
    if nread != payload.len() {
        return Err(KernelError::InvalidExecutable);
    }
    space.copy_out(VirtAddr::new(base), &payload)?;

    Ok(VirtAddr::new(header.entry))
}

/// Builds an image file for [`load_image`]. The mkfs-side counterpart of
/// the loader, also used to seed test filesystems.
#[must_use]
pub fn build_image(entry: u64, base: u64, payload: &[u8]) -> Vec<u8> {
    let header = ImageHeader {
        magic: IMAGE_MAGIC,
        _reserved: 0,
        entry,
        base,
        size: payload.len() as u64,
    };
    let mut image = header.as_bytes().to_vec();
    image.extend_from_slice(payload);
    image
}

#[cfg(test)]
mod tests {
    use auklet_abi::AccessMode;

    use crate::vfs::{FileSystem, MemFs, OpenOptions};

    use super::*;

    fn image_vnode(bytes: &[u8]) -> Arc<dyn Vnode> {
        let fs = MemFs::new("mem");
        fs.install("img", bytes);
        fs.open(
            "img",
            &OpenOptions {
                mode: AccessMode::ReadOnly,
                create: false,
                exclusive: false,
                truncate: false,
            },
        )
        .unwrap()
    }

    #[test]
    fn round_trip_through_address_space() {
        let image = build_image(USER_BASE + 4, USER_BASE, b"program text");
        let vnode = image_vnode(&image);
        let mut space = AddrSpace::new();
        let entry = load_image(&vnode, &mut space).unwrap();
        assert_eq!(entry.addr(), USER_BASE + 4);

        let mut text = [0; 12];
        space.copy_in(VirtAddr::new(USER_BASE), &mut text).unwrap();
        assert_eq!(&text, b"program text");
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut image = build_image(USER_BASE, USER_BASE, b"x");
        image[0] = b'?';
        let vnode = image_vnode(&image);
        assert!(matches!(
            load_image(&vnode, &mut AddrSpace::new()),
            Err(KernelError::InvalidExecutable)
        ));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let vnode = image_vnode(b"auk1");
        assert!(matches!(
            load_image(&vnode, &mut AddrSpace::new()),
            Err(KernelError::InvalidExecutable)
        ));
    }

    #[test]
    fn image_outside_user_range_is_rejected() {
        let image = build_image(0, 0, b"null page");
        let vnode = image_vnode(&image);
        assert!(matches!(
            load_image(&vnode, &mut AddrSpace::new()),
            Err(KernelError::InvalidExecutable)
        ));

        let image = build_image(USER_TOP, USER_TOP - 2, &[0; 16]);
        let vnode = image_vnode(&image);
        assert!(matches!(
            load_image(&vnode, &mut AddrSpace::new()),
            Err(KernelError::InvalidExecutable)
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut image = build_image(USER_BASE, USER_BASE, b"full payload");
        image.truncate(image.len() - 3);
        let vnode = image_vnode(&image);
        assert!(matches!(
            load_image(&vnode, &mut AddrSpace::new()),
            Err(KernelError::InvalidExecutable)
        ));
    }
}
