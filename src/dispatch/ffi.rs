//! C ABI between a plugin library and the host registry.
//!
//! A Rust plugin built as a `cdylib` links its own copy of this crate, so
//! its `register_user_format` would write into a registry the host never
//! reads. Registration therefore crosses the library boundary as plain C
//! data:
//!
//! - [`RawDispatchTable`] is the C-compatible table handle: the ABI version,
//!   the model, the name and `extern "C"` open/close thunks over the
//!   plugin's own table.
//! - [`HostApi`] is the host's registration entry, tagged with
//!   [`HOST_API_VERSION`].
//! - Before calling a plugin's init function the loader resolves the
//!   plugin's exported `udf_dispatch_attach_host` and hands it a
//!   [`HostApi`] for the target registry. It detaches again once init
//!   returns.
//! - [`register_plugin_table`] (what `define_udf_plugin!` calls) goes through
//!   the attached host when there is one and falls back to this copy's
//!   process-wide registry otherwise, which is the right registry for
//!   plugins compiled into the host itself.
//!
//! Plugins written in C link against the host and call the exported
//! [`udf_register_user_format`] directly.

use super::registry::{DispatchRegistry, register_user_format};
use super::table::{DispatchTable, Magic};
use crate::error::{Error, Result, STATUS_OK};
use crate::format::{FormatX, Mode};
use crate::slot::Slot;
use std::ffi::{c_int, c_void};
use std::marker::PhantomData;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Layout version of [`HostApi`] and [`RawDispatchTable`].
pub const HOST_API_VERSION: u32 = 1;

/// Symbol a plugin library exports to receive the host's [`HostApi`].
pub const ATTACH_HOST_SYMBOL: &str = "udf_dispatch_attach_host";

/// Open thunk: `(ctx, path, path_len, mode) -> status`. The path is UTF-8.
pub type RawOpenFn =
    unsafe extern "C" fn(ctx: *const c_void, path: *const u8, path_len: usize, mode: u32) -> c_int;

/// Close thunk: `(ctx, path, path_len) -> status`.
pub type RawCloseFn =
    unsafe extern "C" fn(ctx: *const c_void, path: *const u8, path_len: usize) -> c_int;

/// Host registration entry: `(registry, mode, table, magic, magic_len) -> status`.
pub type RawRegisterFn = unsafe extern "C" fn(
    registry: *const c_void,
    mode: u32,
    table: *const RawDispatchTable,
    magic: *const u8,
    magic_len: usize,
) -> c_int;

/// Signature of [`ATTACH_HOST_SYMBOL`]. A null pointer detaches.
pub type AttachHostFn = unsafe extern "C" fn(api: *const HostApi);

/// C-compatible dispatch table handle.
///
/// `ctx` and `name` point into the plugin library, which is never unloaded,
/// so the host may keep a copy for the rest of the process.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawDispatchTable {
    /// Layout version, [`HOST_API_VERSION`].
    pub layout_version: u32,
    /// Dispatch ABI version the table was built against.
    pub abi_version: u32,
    /// Format identifier, as [`FormatX::as_i32`].
    pub model: i32,
    /// UTF-8 table name, not NUL-terminated.
    pub name: *const u8,
    /// Length of `name` in bytes.
    pub name_len: usize,
    /// Opaque pointer passed back to the thunks.
    pub ctx: *const c_void,
    /// Open entry point.
    pub open: RawOpenFn,
    /// Close entry point.
    pub close: RawCloseFn,
}

// SAFETY: `ctx` points at a `'static` table that is itself `Send + Sync`, and
// `name` at immutable data owned by that table.
unsafe impl Send for RawDispatchTable {}
unsafe impl Sync for RawDispatchTable {}

impl RawDispatchTable {
    /// Describe a static Rust table through C thunks.
    pub fn new<T: DispatchTable>(table: &'static T) -> Self {
        let name = table.name();
        Self {
            layout_version: HOST_API_VERSION,
            abi_version: table.abi_version(),
            model: table.model().as_i32(),
            name: name.as_ptr(),
            name_len: name.len(),
            ctx: ptr::from_ref(table).cast(),
            open: open_thunk::<T>,
            close: close_thunk::<T>,
        }
    }
}

unsafe extern "C" fn open_thunk<T: DispatchTable>(
    ctx: *const c_void,
    path: *const u8,
    path_len: usize,
    mode: u32,
) -> c_int {
    // SAFETY: `ctx` was built from a `&'static T` in `RawDispatchTable::new`;
    // the host passes a valid UTF-8 buffer of `path_len` bytes.
    let (table, path) = unsafe { (&*ctx.cast::<T>(), raw_path(path, path_len)) };
    status_of(path.and_then(|path| table.open(path, Mode::from_bits_retain(mode))))
}

unsafe extern "C" fn close_thunk<T: DispatchTable>(
    ctx: *const c_void,
    path: *const u8,
    path_len: usize,
) -> c_int {
    // SAFETY: As in `open_thunk`.
    let (table, path) = unsafe { (&*ctx.cast::<T>(), raw_path(path, path_len)) };
    status_of(path.and_then(|path| table.close(path)))
}

unsafe fn raw_path<'a>(path: *const u8, len: usize) -> Result<&'a Path> {
    if path.is_null() {
        return Err(Error::invalid("null path"));
    }
    // SAFETY: Caller guarantees `len` readable bytes at `path`.
    let bytes = unsafe { std::slice::from_raw_parts(path, len) };
    std::str::from_utf8(bytes)
        .map(Path::new)
        .map_err(|_| Error::invalid("path is not valid UTF-8"))
}

fn status_of(result: Result<()>) -> c_int {
    match result {
        Ok(()) => STATUS_OK,
        Err(err) => err.code(),
    }
}

/// A plugin's table as seen from the host.
struct ForeignTable {
    raw: RawDispatchTable,
    name: &'static str,
}

impl ForeignTable {
    /// # Safety
    ///
    /// `raw` must come from [`RawDispatchTable::new`] in a library that is
    /// never unloaded.
    unsafe fn new(raw: RawDispatchTable) -> Result<Self> {
        if raw.layout_version != HOST_API_VERSION {
            return Err(Error::invalid(format!(
                "dispatch table layout version {} is not {HOST_API_VERSION}",
                raw.layout_version
            )));
        }
        let name = if raw.name.is_null() {
            "udf"
        } else {
            // SAFETY: Caller guarantees `name` lives as long as the library.
            let bytes = unsafe { std::slice::from_raw_parts(raw.name, raw.name_len) };
            std::str::from_utf8(bytes).map_err(|_| Error::invalid("table name is not UTF-8"))?
        };
        Ok(Self { raw, name })
    }

    fn path_bytes(path: &Path) -> Result<&[u8]> {
        path.to_str()
            .map(str::as_bytes)
            .ok_or_else(|| Error::invalid(format!("{} is not valid UTF-8", path.display())))
    }
}

impl DispatchTable for ForeignTable {
    fn model(&self) -> FormatX {
        FormatX(self.raw.model)
    }

    fn abi_version(&self) -> u32 {
        self.raw.abi_version
    }

    fn name(&self) -> &str {
        self.name
    }

    fn open(&self, path: &Path, mode: Mode) -> Result<()> {
        let bytes = Self::path_bytes(path)?;
        // SAFETY: `ctx` and the thunk come from the same plugin table.
        let status =
            unsafe { (self.raw.open)(self.raw.ctx, bytes.as_ptr(), bytes.len(), mode.bits()) };
        Error::check_status(status)
    }

    fn close(&self, path: &Path) -> Result<()> {
        let bytes = Self::path_bytes(path)?;
        // SAFETY: As in `open`.
        let status = unsafe { (self.raw.close)(self.raw.ctx, bytes.as_ptr(), bytes.len()) };
        Error::check_status(status)
    }
}

/// Validate and install a raw table. Nothing is leaked unless the
/// registration is going to succeed.
unsafe fn register_raw(
    registry: &DispatchRegistry,
    mode: u32,
    table: *const RawDispatchTable,
    magic: *const u8,
    magic_len: usize,
) -> Result<()> {
    if table.is_null() {
        return Err(Error::invalid("null dispatch table"));
    }
    let mode = Mode::from_bits_retain(mode);
    Slot::from_mode(mode)?;

    // SAFETY: Non-null and, per the caller, a valid table handle.
    let foreign = unsafe { ForeignTable::new(*table) }?;
    registry.check_abi(&foreign)?;
    let magic = if magic.is_null() {
        None
    } else {
        // SAFETY: Caller guarantees `magic_len` readable bytes.
        let bytes = unsafe { std::slice::from_raw_parts(magic, magic_len) };
        Magic::new(bytes)?;
        Some(bytes)
    };

    // Registry entries are never removed, so the wrapper lives as long as the
    // plugin library it points into.
    let foreign: &'static ForeignTable = Box::leak(Box::new(foreign));
    registry.register(mode, foreign, magic)
}

unsafe extern "C" fn register_into(
    registry: *const c_void,
    mode: u32,
    table: *const RawDispatchTable,
    magic: *const u8,
    magic_len: usize,
) -> c_int {
    // SAFETY: `registry` comes from `HostApi::new` and outlives the attach.
    let registry = unsafe { &*registry.cast::<DispatchRegistry>() };
    // SAFETY: Forwarded from the plugin.
    status_of(unsafe { register_raw(registry, mode, table, magic, magic_len) })
}

/// Register a C-described table into the host's process-wide registry.
///
/// Returns `0` or a negative status from [`Error::code`].
///
/// # Safety
///
/// `table` must be null or point at a [`RawDispatchTable`] whose pointers
/// stay valid for the rest of the process. `magic` must be null or point at
/// `magic_len` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn udf_register_user_format(
    mode: u32,
    table: *const RawDispatchTable,
    magic: *const u8,
    magic_len: usize,
) -> c_int {
    // SAFETY: Forwarded from the caller.
    status_of(unsafe { register_raw(DispatchRegistry::global(), mode, table, magic, magic_len) })
}

/// The host's registration entry, handed to a plugin while its init runs.
#[repr(C)]
#[derive(Debug)]
pub struct HostApi {
    /// Layout version, [`HOST_API_VERSION`].
    pub version: u32,
    /// Opaque target registry.
    pub registry: *const c_void,
    /// Registration entry point.
    pub register: RawRegisterFn,
}

impl HostApi {
    /// An entry point registering into `registry`.
    ///
    /// The result holds a raw pointer to `registry`; it must not be used
    /// after `registry` is gone.
    pub fn new(registry: &DispatchRegistry) -> Self {
        Self {
            version: HOST_API_VERSION,
            registry: ptr::from_ref(registry).cast(),
            register: register_into,
        }
    }

    fn register<T: DispatchTable>(
        &self,
        mode: Mode,
        table: &'static T,
        magic: Option<&[u8]>,
    ) -> Result<()> {
        if self.version != HOST_API_VERSION {
            return Err(Error::invalid(format!(
                "host API version {} is not {HOST_API_VERSION}",
                self.version
            )));
        }
        let raw = RawDispatchTable::new(table);
        let (magic_ptr, magic_len) = match magic {
            Some(bytes) => (bytes.as_ptr(), bytes.len()),
            None => (ptr::null(), 0),
        };
        // SAFETY: `raw` and `magic` are valid for the call; the host copies
        // what it keeps.
        let status = unsafe {
            (self.register)(self.registry, mode.bits(), &raw, magic_ptr, magic_len)
        };
        Error::check_status(status)
    }
}

static HOST: AtomicPtr<HostApi> = AtomicPtr::new(ptr::null_mut());

/// Attach (or with null, detach) the host registration entry.
///
/// # Safety
///
/// A non-null `api` must stay valid until it is detached again.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn udf_dispatch_attach_host(api: *const HostApi) {
    HOST.store(api.cast_mut(), Ordering::SeqCst);
}

/// Register a plugin's table with whichever registry is loading it.
///
/// Called by the init function `define_udf_plugin!` generates. Inside a
/// host-attached init this crosses into the host; otherwise it registers
/// into this copy's process-wide registry.
pub fn register_plugin_table<T: DispatchTable>(
    mode: Mode,
    table: &'static T,
    magic: Option<&[u8]>,
) -> Result<()> {
    let api = HOST.load(Ordering::SeqCst);
    // SAFETY: A non-null pointer was attached by the loader and stays valid
    // until init returns.
    match unsafe { api.as_ref() } {
        Some(host) => host.register(mode, table, magic),
        None => register_user_format(mode, table, magic),
    }
}

/// Keeps a host attached to a plugin library for the duration of a scope.
pub(crate) struct HostAttachment<'a> {
    attach: AttachHostFn,
    _api: PhantomData<&'a HostApi>,
}

impl<'a> HostAttachment<'a> {
    /// # Safety
    ///
    /// `attach` must be a plugin's [`ATTACH_HOST_SYMBOL`].
    pub(crate) unsafe fn new(attach: AttachHostFn, api: &'a HostApi) -> Self {
        // SAFETY: `api` outlives the attachment, which detaches on drop.
        unsafe { attach(api) };
        Self {
            attach,
            _api: PhantomData,
        }
    }
}

impl Drop for HostAttachment<'_> {
    fn drop(&mut self) {
        // SAFETY: Detaching is always valid.
        unsafe { (self.attach)(ptr::null()) };
    }
}
