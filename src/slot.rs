//! Slot/flag codec.
//!
//! Pure mappings between a UDF slot index, its mode-flag bit and its format
//! identifier. All three are bijective over the ten slots; the inverse
//! functions return `None` for anything outside the image.

use crate::error::{Error, Result};
use crate::format::{FormatX, MAX_UDF_FORMATS, Mode, UDF_HIGH_BASE};
use std::fmt;

/// Format constant of the first high slot (UDF2). Follows `FormatX::NCZARR`.
const UDF_HIGH_FORMAT_BASE: i32 = FormatX::NCZARR.0 + 1;

/// A user-defined format slot, `0..MAX_UDF_FORMATS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(u8);

impl Slot {
    /// Create a slot from its index.
    pub const fn new(index: usize) -> Option<Slot> {
        if index < MAX_UDF_FORMATS {
            Some(Slot(index as u8))
        } else {
            None
        }
    }

    /// Every slot in ascending order.
    pub fn all() -> impl DoubleEndedIterator<Item = Slot> + ExactSizeIterator {
        (0..MAX_UDF_FORMATS as u8).map(Slot)
    }

    /// Slot index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The mode-flag bit naming this slot.
    pub const fn flag(self) -> Mode {
        match self.0 {
            0 => Mode::UDF0,
            1 => Mode::UDF1,
            i => Mode::from_bits_retain(UDF_HIGH_BASE << (i - 2)),
        }
    }

    /// The format identifier of this slot.
    pub const fn format(self) -> FormatX {
        match self.0 {
            0 => FormatX::UDF0,
            1 => FormatX::UDF1,
            i => FormatX(UDF_HIGH_FORMAT_BASE + (i as i32 - 2)),
        }
    }

    /// Inverse of [`Slot::flag`]: `flag` must be exactly one slot's bit and
    /// nothing else.
    pub fn from_flag(flag: Mode) -> Option<Slot> {
        Slot::all().find(|slot| slot.flag() == flag)
    }

    /// Inverse of [`Slot::format`].
    pub fn from_format(format: FormatX) -> Option<Slot> {
        match format {
            FormatX::UDF0 => Some(Slot(0)),
            FormatX::UDF1 => Some(Slot(1)),
            FormatX(n) => {
                let offset = n.checked_sub(UDF_HIGH_FORMAT_BASE)?;
                usize::try_from(offset).ok().and_then(|o| Slot::new(o + 2))
            }
        }
    }

    /// Decode the single UDF slot named by a full mode word.
    ///
    /// Non-UDF bits are ignored. Zero or several UDF bits is an error.
    pub fn from_mode(mode: Mode) -> Result<Slot> {
        let bits = mode.udf_bits();
        match bits.bits().count_ones() {
            1 => Slot::from_flag(bits)
                .ok_or_else(|| Error::invalid(format!("mode {:#x} has no UDF slot", mode.bits()))),
            0 => Err(Error::invalid(format!(
                "mode {:#x} names no UDF slot",
                mode.bits()
            ))),
            n => Err(Error::invalid(format!(
                "mode {:#x} names {n} UDF slots, expected one",
                mode.bits()
            ))),
        }
    }

    /// The UDF slots named by a mode word, ascending.
    pub fn in_mode(mode: Mode) -> impl Iterator<Item = Slot> {
        Slot::all().filter(move |slot| mode.contains(slot.flag()))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UDF{}", self.0)
    }
}

impl TryFrom<usize> for Slot {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self> {
        Slot::new(index).ok_or_else(|| Error::invalid(format!("slot index {index} out of range")))
    }
}
