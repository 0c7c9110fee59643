//! Dispatch table capability and magic numbers.

use crate::error::{Error, Result};
use crate::format::{FormatX, MAX_MAGIC_LEN, Mode};
use std::fmt;
use std::path::Path;

/// Current dispatch ABI version. Tables must report this to be registered.
pub const DISPATCH_ABI_VERSION: u32 = 5;

/// The capability set implementing one storage/access format.
///
/// Only the identification data and the open/close entry points are modelled
/// here; everything else a format back-end provides lives behind the
/// implementor's own types.
///
/// The ABI version is ordinary data returned by [`abi_version`], so a table
/// compiled against an older contract is rejected at registration instead of
/// being trusted by type alone.
///
/// [`abi_version`]: DispatchTable::abi_version
pub trait DispatchTable: Send + Sync {
    /// Format identifier this table reports for resources it opens.
    fn model(&self) -> FormatX;

    /// ABI version the table was built against.
    fn abi_version(&self) -> u32;

    /// Human-readable name, used in log output.
    fn name(&self) -> &str {
        "udf"
    }

    /// Open the resource at `path`.
    fn open(&self, path: &Path, mode: Mode) -> Result<()>;

    /// Close a resource previously opened by this table.
    fn close(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn DispatchTable + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("name", &self.name())
            .field("model", &self.model())
            .field("abi_version", &self.abi_version())
            .finish()
    }
}

/// A short byte prefix identifying a format, at most [`MAX_MAGIC_LEN`] bytes.
///
/// Stored inline so registry entries stay `Copy` and can live in a `static`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Magic {
    bytes: [u8; MAX_MAGIC_LEN],
    len: u8,
}

impl Magic {
    /// The empty magic. Never matches a prefix.
    pub const EMPTY: Magic = Magic {
        bytes: [0; MAX_MAGIC_LEN],
        len: 0,
    };

    /// Create a magic number from raw bytes.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_MAGIC_LEN {
            return Err(Error::invalid(format!(
                "magic number is {} bytes, maximum is {MAX_MAGIC_LEN}",
                bytes.len()
            )));
        }
        let mut magic = Magic::EMPTY;
        magic.bytes[..bytes.len()].copy_from_slice(bytes);
        magic.len = bytes.len() as u8;
        Ok(magic)
    }

    /// The magic bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether this is the empty magic.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `prefix` starts with this magic.
    ///
    /// A prefix shorter than the magic never matches, and the empty magic
    /// matches nothing.
    pub fn matches(&self, prefix: &[u8]) -> bool {
        !self.is_empty() && prefix.starts_with(self.as_bytes())
    }
}

impl fmt::Debug for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Magic(\"{}\")", self.as_bytes().escape_ascii())
    }
}

impl fmt::Display for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_bytes().escape_ascii())
    }
}

impl TryFrom<&[u8]> for Magic {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Magic::new(bytes)
    }
}

impl TryFrom<&str> for Magic {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Magic::new(s.as_bytes())
    }
}

impl PartialEq<[u8]> for Magic {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}
