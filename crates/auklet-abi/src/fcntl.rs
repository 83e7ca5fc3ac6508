use strum::FromRepr;

bitflags::bitflags! {
    /// Flags accepted by `open`.
    ///
    /// The low two bits select the access mode; the rest modify how the file
    /// is located or created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const RDONLY = 0x00;
        const WRONLY = 0x01;
        const RDWR = 0x02;
        const CREAT = 0x04;
        const EXCL = 0x08;
        const TRUNC = 0x10;
        const APPEND = 0x20;
    }
}

/// Mask covering the access-mode bits of [`OpenFlags`].
pub const O_ACCMODE: u32 = 0x03;

/// How an open file may be used, decoded from `flags & O_ACCMODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    /// Decodes the access-mode bits. `None` for the unused fourth encoding.
    #[must_use]
    pub const fn from_flags(flags: u32) -> Option<Self> {
        match flags & O_ACCMODE {
            0x00 => Some(Self::ReadOnly),
            0x01 => Some(Self::WriteOnly),
            0x02 => Some(Self::ReadWrite),
            _ => None,
        }
    }

    #[must_use]
    pub const fn readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    #[must_use]
    pub const fn writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// Interpretation of the `lseek` offset argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum Whence {
    Set = 0,
    Cur = 1,
    End = 2,
}
