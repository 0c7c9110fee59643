//! Choosing a dispatch table for a resource being opened.

use super::registry::DispatchRegistry;
use super::table::DispatchTable;
use crate::error::{Error, Result};
use crate::format::{FormatX, MAX_MAGIC_LEN, Mode};
use crate::slot::Slot;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// How a detection was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectMethod {
    /// The caller named the slot with a UDF mode bit.
    ModeFlag,
    /// The resource's leading bytes matched the slot's magic number.
    Magic,
}

/// A UDF slot chosen to service a resource.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    /// Chosen slot.
    pub slot: Slot,
    /// Its dispatch table.
    pub dispatch: &'static dyn DispatchTable,
    /// How the slot was chosen.
    pub method: DetectMethod,
}

impl Detection {
    /// Format identifier of the chosen slot.
    pub fn format(&self) -> FormatX {
        self.slot.format()
    }
}

/// Single-shot format decision against a registry.
///
/// 1. If the mode word carries a UDF bit, that slot is used directly and the
///    resource contents are never inspected.
/// 2. Otherwise the first [`MAX_MAGIC_LEN`] bytes are compared against every
///    registered magic number in ascending slot order; the lowest matching
///    slot wins.
///
/// `Ok(None)` means no UDF applies and the built-in detector should run.
#[derive(Debug, Clone, Copy)]
pub struct FormatDetector<'r> {
    registry: &'r DispatchRegistry,
}

impl<'r> FormatDetector<'r> {
    /// Detector over a specific registry.
    pub fn new(registry: &'r DispatchRegistry) -> Self {
        Self { registry }
    }

    /// Detect from a mode word and an already-read prefix.
    pub fn detect(&self, mode: Mode, prefix: &[u8]) -> Result<Option<Detection>> {
        if let Some(found) = self.detect_explicit(mode)? {
            return Ok(Some(found));
        }
        Ok(self.scan(prefix))
    }

    /// Detect from a mode word, reading the prefix from `reader` only when
    /// magic scanning is needed.
    pub fn detect_reader<R: Read>(&self, mode: Mode, mut reader: R) -> Result<Option<Detection>> {
        if let Some(found) = self.detect_explicit(mode)? {
            return Ok(Some(found));
        }
        let mut buf = [0u8; MAX_MAGIC_LEN];
        let n = read_prefix(&mut reader, &mut buf)?;
        Ok(self.scan(&buf[..n]))
    }

    /// Detect for a file on disk.
    pub fn detect_path(&self, mode: Mode, path: impl AsRef<Path>) -> Result<Option<Detection>> {
        let path = path.as_ref();
        if let Some(found) = self.detect_explicit(mode)? {
            return Ok(Some(found));
        }
        let file = File::open(path)?;
        self.detect_reader(Mode::empty(), file)
    }

    fn detect_explicit(&self, mode: Mode) -> Result<Option<Detection>> {
        if !mode.has_udf() {
            return Ok(None);
        }
        let reg = self.registry.query(mode)?;
        Ok(Some(Detection {
            slot: reg.slot(),
            dispatch: reg.dispatch(),
            method: DetectMethod::ModeFlag,
        }))
    }

    fn scan(&self, prefix: &[u8]) -> Option<Detection> {
        let prefix = &prefix[..prefix.len().min(MAX_MAGIC_LEN)];
        self.registry
            .registrations()
            .into_iter()
            .find(|reg| reg.magic().is_some_and(|magic| magic.matches(prefix)))
            .map(|reg| Detection {
                slot: reg.slot(),
                dispatch: reg.dispatch(),
                method: DetectMethod::Magic,
            })
    }
}

impl FormatDetector<'static> {
    /// Detector over the process-wide registry.
    pub fn global() -> Self {
        Self::new(DispatchRegistry::global())
    }
}

/// Fill `buf` from `reader` until it is full or the reader is exhausted.
fn read_prefix<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}
