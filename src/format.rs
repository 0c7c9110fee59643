//! Open-mode flags and format identifiers.
//!
//! This module defines the two numeric vocabularies the rest of the crate
//! translates between:
//!
//! - [`Mode`]: the open-mode flag word callers pass when opening a resource.
//!   Ten of its bits name a user-defined format (UDF) slot explicitly.
//! - [`FormatX`]: the integer identifying which format/model services an
//!   open resource, one per UDF slot plus the built-in formats.
//!
//! # Bit layout
//!
//! ```text
//! bit   0  WRITE            bit  9  BIT64_OFFSET     bit 17  NOATTCREORD
//! bit   2  NOCLOBBER        bit 10  LOCK             bit 18  NODIMSCALE_ATTACH
//! bit   3  DISKLESS         bit 11  SHARE            bits 19..26  UDF2..UDF9
//! bit   4  MMAP             bit 12  NETCDF4
//! bit   5  BIT64_DATA       bit 13  MPIIO
//! bit   6  UDF0             bit 14  PERSIST
//! bit   7  UDF1             bit 15  INMEMORY
//! bit   8  CLASSIC_MODEL
//! ```
//!
//! `UDF0` and `UDF1` keep their historical low bits so existing flag words
//! remain valid. The remaining eight slots occupy a contiguous run starting
//! at [`UDF_HIGH_BASE`], above every other reserved bit.

use bitflags::bitflags;
use std::fmt;

/// Number of user-defined format slots.
pub const MAX_UDF_FORMATS: usize = 10;

/// Maximum length in bytes of a registered magic number.
pub const MAX_MAGIC_LEN: usize = 8;

/// Lowest bit of the contiguous UDF2..UDF9 run.
pub const UDF_HIGH_BASE: u32 = 0x0008_0000;

// ============================================================================
// Mode
// ============================================================================

bitflags! {
    /// Open/create mode flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Mode: u32 {
        /// Open for writing.
        const WRITE = 0x0001;
        /// Refuse to overwrite an existing resource.
        const NOCLOBBER = 0x0004;
        /// Keep the resource in memory only.
        const DISKLESS = 0x0008;
        /// Use memory-mapped access.
        const MMAP = 0x0010;
        /// CDF-5 large-variable layout.
        const BIT64_DATA = 0x0020;
        /// User-defined format slot 0.
        const UDF0 = 0x0040;
        /// User-defined format slot 1.
        const UDF1 = 0x0080;
        /// Enforce the classic data model.
        const CLASSIC_MODEL = 0x0100;
        /// CDF-2 64-bit offset layout.
        const BIT64_OFFSET = 0x0200;
        /// Historical lock flag, reserved.
        const LOCK = 0x0400;
        /// Share updates with other openers.
        const SHARE = 0x0800;
        /// Enhanced (HDF5-backed) model.
        const NETCDF4 = 0x1000;
        /// Parallel I/O through MPI-IO.
        const MPIIO = 0x2000;
        /// Persist an in-memory resource on close.
        const PERSIST = 0x4000;
        /// Resource lives in a caller-provided buffer.
        const INMEMORY = 0x8000;
        /// Do not track attribute creation order.
        const NOATTCREORD = 0x2_0000;
        /// Do not attach dimension scales.
        const NODIMSCALE_ATTACH = 0x4_0000;
        /// User-defined format slot 2.
        const UDF2 = UDF_HIGH_BASE;
        /// User-defined format slot 3.
        const UDF3 = UDF_HIGH_BASE << 1;
        /// User-defined format slot 4.
        const UDF4 = UDF_HIGH_BASE << 2;
        /// User-defined format slot 5.
        const UDF5 = UDF_HIGH_BASE << 3;
        /// User-defined format slot 6.
        const UDF6 = UDF_HIGH_BASE << 4;
        /// User-defined format slot 7.
        const UDF7 = UDF_HIGH_BASE << 5;
        /// User-defined format slot 8.
        const UDF8 = UDF_HIGH_BASE << 6;
        /// User-defined format slot 9.
        const UDF9 = UDF_HIGH_BASE << 7;
    }
}

impl Mode {
    /// Read-only open (the absence of `WRITE`).
    pub const NOWRITE: Mode = Mode::empty();

    /// Overwrite on create (the absence of `NOCLOBBER`).
    pub const CLOBBER: Mode = Mode::empty();

    /// Union of every UDF slot bit.
    pub const UDF_ALL: Mode = Mode::UDF0
        .union(Mode::UDF1)
        .union(Mode::UDF2)
        .union(Mode::UDF3)
        .union(Mode::UDF4)
        .union(Mode::UDF5)
        .union(Mode::UDF6)
        .union(Mode::UDF7)
        .union(Mode::UDF8)
        .union(Mode::UDF9);

    /// The UDF bits present in this mode word.
    pub fn udf_bits(self) -> Mode {
        self.intersection(Mode::UDF_ALL)
    }

    /// Whether any UDF slot bit is set.
    pub fn has_udf(self) -> bool {
        self.intersects(Mode::UDF_ALL)
    }
}

// ============================================================================
// FormatX
// ============================================================================

/// Format identifier of an open resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FormatX(pub i32);

impl FormatX {
    /// No format decided yet.
    pub const UNDEFINED: FormatX = FormatX(0);
    /// Classic and 64-bit offset binary formats.
    pub const NC3: FormatX = FormatX(1);
    /// HDF5-backed enhanced format.
    pub const NC_HDF5: FormatX = FormatX(2);
    /// HDF4 read-only access.
    pub const NC_HDF4: FormatX = FormatX(3);
    /// Parallel classic format.
    pub const PNETCDF: FormatX = FormatX(4);
    /// DAP2 remote protocol.
    pub const DAP2: FormatX = FormatX(5);
    /// DAP4 remote protocol.
    pub const DAP4: FormatX = FormatX(6);
    /// User-defined format slot 0.
    pub const UDF0: FormatX = FormatX(8);
    /// User-defined format slot 1.
    pub const UDF1: FormatX = FormatX(9);
    /// Chunked object-store format. Sits between UDF1 and UDF2.
    pub const NCZARR: FormatX = FormatX(10);
    /// User-defined format slot 2; UDF3..UDF9 follow sequentially.
    pub const UDF2: FormatX = FormatX(11);
    /// User-defined format slot 9.
    pub const UDF9: FormatX = FormatX(18);

    /// Raw integer value.
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for FormatX {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            FormatX::UNDEFINED => "undefined",
            FormatX::NC3 => "nc3",
            FormatX::NC_HDF5 => "hdf5",
            FormatX::NC_HDF4 => "hdf4",
            FormatX::PNETCDF => "pnetcdf",
            FormatX::DAP2 => "dap2",
            FormatX::DAP4 => "dap4",
            FormatX::NCZARR => "nczarr",
            other => match crate::slot::Slot::from_format(other) {
                Some(slot) => return write!(f, "udf{}", slot.index()),
                None => return write!(f, "format({})", other.0),
            },
        };
        f.write_str(name)
    }
}

impl From<FormatX> for i32 {
    fn from(value: FormatX) -> Self {
        value.0
    }
}
