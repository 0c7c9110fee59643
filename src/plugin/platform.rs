//! Platform dynamic loading and library path resolution.

use super::descriptor::InitFn;
use crate::dispatch::{ATTACH_HOST_SYMBOL, AttachHostFn};
use libloading::Library;
use std::path::{Path, PathBuf};

/// Dynamic-loader capability used by the plugin loader.
///
/// There is deliberately no unload operation. Handles returned by
/// [`load`](Self::load) are never given back: a dispatch table registered by
/// the library may hold function pointers into it for the rest of the
/// process, so the library must stay mapped even if its slot later fails.
pub trait PlatformLoader {
    /// A loaded library.
    type Handle;

    /// Load the library at `path`, returning the platform error message on
    /// failure.
    ///
    /// # Safety
    ///
    /// Loading a library runs its initialisation routines. The library must
    /// be trusted.
    unsafe fn load(&self, path: &Path) -> Result<Self::Handle, String>;

    /// Resolve a plugin init function by name.
    ///
    /// # Safety
    ///
    /// The symbol must really be a function with the [`InitFn`] signature.
    unsafe fn resolve_init(&self, handle: &Self::Handle, symbol: &str) -> Result<InitFn, String>;

    /// Resolve the library's host-attach entry point, if it exports one.
    ///
    /// Libraries built with `define_udf_plugin!` export it; plugins that
    /// register some other way (or are compiled into the host) do not.
    ///
    /// # Safety
    ///
    /// A symbol with this name must have the [`AttachHostFn`] signature.
    unsafe fn resolve_attach(&self, _handle: &Self::Handle) -> Option<AttachHostFn> {
        None
    }
}

/// [`PlatformLoader`] backed by `libloading`.
///
/// Libraries are opened with the platform's default flags (`RTLD_LOCAL` on
/// Unix), so each plugin's copy of the attach symbol stays private to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicLoader;

impl DynamicLoader {
    /// Create a loader using the platform's default binding flags.
    pub fn new() -> Self {
        Self
    }
}

impl PlatformLoader for DynamicLoader {
    type Handle = Library;

    unsafe fn load(&self, path: &Path) -> Result<Library, String> {
        // SAFETY: Caller guarantees the library is trusted.
        unsafe { Library::new(path) }.map_err(|e| e.to_string())
    }

    unsafe fn resolve_init(&self, handle: &Library, symbol: &str) -> Result<InitFn, String> {
        // SAFETY: Caller guarantees the symbol has the InitFn signature. The
        // pointer is copied out of the Symbol; the library is never unloaded,
        // so it stays valid after the borrow ends.
        unsafe { handle.get::<InitFn>(symbol.as_bytes()) }
            .map(|sym| *sym)
            .map_err(|e| e.to_string())
    }

    unsafe fn resolve_attach(&self, handle: &Library) -> Option<AttachHostFn> {
        // SAFETY: Caller guarantees the signature; copied out as above.
        unsafe { handle.get::<AttachHostFn>(ATTACH_HOST_SYMBOL.as_bytes()) }
            .ok()
            .map(|sym| *sym)
    }
}

/// Resolve a configured library path against an optional search path.
///
/// - Absolute paths are returned unchanged.
/// - Relative paths are tried against each directory of `search_path`
///   (separated by `:` or `;`; `;` only on Windows, where `:` follows the
///   drive letter) and the first existing file wins.
/// - Otherwise the path is returned unchanged and the platform loader's own
///   search rules apply.
pub fn resolve_library_path(path: &Path, search_path: Option<&str>) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let Some(search_path) = search_path else {
        return path.to_path_buf();
    };

    for dir in split_search_path(search_path) {
        let candidate = Path::new(dir).join(path);
        if candidate.is_file() {
            tracing::debug!(
                path = %path.display(),
                resolved = %candidate.display(),
                "resolved plugin library on search path"
            );
            return candidate;
        }
    }

    tracing::debug!(
        path = %path.display(),
        search_path,
        "plugin library not found on search path, deferring to platform loader"
    );
    path.to_path_buf()
}

fn split_search_path(search_path: &str) -> impl Iterator<Item = &str> {
    let separator = |c: char| if cfg!(windows) { c == ';' } else { c == ':' || c == ';' };
    search_path
        .split(separator)
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
}
