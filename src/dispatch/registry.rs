//! The ten-slot dispatch registry.

use super::table::{DISPATCH_ABI_VERSION, DispatchTable, Magic};
use crate::error::{Error, Result};
use crate::format::{MAX_UDF_FORMATS, Mode};
use crate::slot::Slot;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// What one slot currently holds.
///
/// The dispatch reference is non-owning. Tables installed by plugins live in
/// libraries that are never unloaded, so `'static` is their real lifetime.
#[derive(Clone, Copy)]
struct SlotEntry {
    dispatch: Option<&'static dyn DispatchTable>,
    magic: Magic,
}

impl SlotEntry {
    const EMPTY: SlotEntry = SlotEntry {
        dispatch: None,
        magic: Magic::EMPTY,
    };
}

/// A successful lookup: the table installed in a slot and its magic.
#[derive(Clone, Copy, Debug)]
pub struct Registration {
    slot: Slot,
    dispatch: &'static dyn DispatchTable,
    magic: Magic,
}

impl Registration {
    /// Slot the registration lives in.
    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// The registered dispatch table.
    pub fn dispatch(&self) -> &'static dyn DispatchTable {
        self.dispatch
    }

    /// The registered magic number, if one was given.
    pub fn magic(&self) -> Option<Magic> {
        (!self.magic.is_empty()).then_some(self.magic)
    }

    /// Whether this registration holds exactly `table` (pointer identity).
    pub fn is(&self, table: &dyn DispatchTable) -> bool {
        std::ptr::addr_eq(self.dispatch, table)
    }
}

/// Registry of user-defined format slots.
///
/// Every slot starts empty. [`register`](Self::register) overwrites a slot
/// wholesale; there is no way to clear one again.
///
/// The lock only makes the `static` instance sound to share. The intended
/// pattern is to finish registration during start-up and then only query.
pub struct DispatchRegistry {
    entries: RwLock<[SlotEntry; MAX_UDF_FORMATS]>,
    required_abi: u32,
}

static GLOBAL: DispatchRegistry = DispatchRegistry::new();

impl DispatchRegistry {
    /// Create an empty registry requiring [`DISPATCH_ABI_VERSION`].
    pub const fn new() -> Self {
        Self::with_abi_version(DISPATCH_ABI_VERSION)
    }

    /// Create an empty registry requiring a specific ABI version.
    pub const fn with_abi_version(required_abi: u32) -> Self {
        Self {
            entries: RwLock::new([SlotEntry::EMPTY; MAX_UDF_FORMATS]),
            required_abi,
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static DispatchRegistry {
        &GLOBAL
    }

    /// ABI version tables must report.
    pub fn required_abi_version(&self) -> u32 {
        self.required_abi
    }

    /// Install `table` (and optionally a magic number) into the slot named
    /// by `mode`.
    ///
    /// `mode` must carry exactly one UDF bit; other format bits such as
    /// `NETCDF4` are allowed alongside it. Any previous registration in the
    /// slot is replaced.
    pub fn register(
        &self,
        mode: Mode,
        table: &'static dyn DispatchTable,
        magic: Option<&[u8]>,
    ) -> Result<()> {
        let slot = Slot::from_mode(mode)?;
        self.check_abi(table)?;
        let magic = match magic {
            Some(bytes) => Magic::new(bytes)?,
            None => Magic::EMPTY,
        };

        let mut entries = self.write();
        let entry = &mut entries[slot.index()];
        let replaced = entry.dispatch.is_some();
        *entry = SlotEntry {
            dispatch: Some(table),
            magic,
        };
        drop(entries);

        tracing::debug!(
            slot = %slot,
            table = table.name(),
            magic = %magic,
            replaced,
            "registered dispatch table"
        );
        Ok(())
    }

    /// Look up the slot named by `mode`.
    pub fn query(&self, mode: Mode) -> Result<Registration> {
        self.query_slot(Slot::from_mode(mode)?)
    }

    /// Look up a slot directly.
    pub fn query_slot(&self, slot: Slot) -> Result<Registration> {
        let entry = self.read()[slot.index()];
        match entry.dispatch {
            Some(dispatch) => Ok(Registration {
                slot,
                dispatch,
                magic: entry.magic,
            }),
            None => Err(Error::not_found(format!("{slot} has no dispatch table"))),
        }
    }

    /// Every occupied slot, ascending.
    pub fn registrations(&self) -> Vec<Registration> {
        let entries = self.read();
        Slot::all()
            .filter_map(|slot| {
                let entry = entries[slot.index()];
                entry.dispatch.map(|dispatch| Registration {
                    slot,
                    dispatch,
                    magic: entry.magic,
                })
            })
            .collect()
    }

    /// Check a table's ABI version against this registry.
    pub fn check_abi(&self, table: &dyn DispatchTable) -> Result<()> {
        let actual = table.abi_version();
        if actual != self.required_abi {
            return Err(Error::AbiMismatch {
                expected: self.required_abi,
                actual,
            });
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, [SlotEntry; MAX_UDF_FORMATS]> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, [SlotEntry; MAX_UDF_FORMATS]> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DispatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.read();
        let occupied = entries.iter().filter(|e| e.dispatch.is_some()).count();
        f.debug_struct("DispatchRegistry")
            .field("occupied", &occupied)
            .field("required_abi", &self.required_abi)
            .finish()
    }
}

/// Register a dispatch table in the process-wide registry.
///
/// This is the entry point plugin init functions call.
pub fn register_user_format(
    mode: Mode,
    table: &'static dyn DispatchTable,
    magic: Option<&[u8]>,
) -> Result<()> {
    DispatchRegistry::global().register(mode, table, magic)
}

/// Query the process-wide registry.
pub fn query_user_format(mode: Mode) -> Result<Registration> {
    DispatchRegistry::global().query(mode)
}
