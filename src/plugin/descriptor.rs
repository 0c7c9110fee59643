//! Plugin descriptors and the init-function ABI.
//!
//! A plugin is a shared library exporting one zero-argument function that
//! returns an integer status. Before returning `0` it must have registered
//! its dispatch table for the slot it was configured into.
//!
//! Rust plugins use [`define_udf_plugin!`](crate::define_udf_plugin), whose
//! init function registers through the host the loader attached (see
//! [`register_plugin_table`]). C plugins call the host's exported
//! [`udf_register_user_format`].
//!
//! [`register_plugin_table`]: crate::dispatch::register_plugin_table
//! [`udf_register_user_format`]: crate::dispatch::udf_register_user_format

use super::config::{ConfigSource, LoaderConfig};
use super::loader::PluginError;
use crate::slot::Slot;
use std::ffi::c_int;
use std::path::PathBuf;

/// Signature of a plugin init function.
///
/// # Safety
///
/// Calling it runs arbitrary code from the plugin library.
pub type InitFn = unsafe extern "C" fn() -> c_int;

/// Per-slot plugin configuration: where the library is and what to call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    /// Library path as configured (possibly relative).
    pub library: PathBuf,
    /// Name of the exported init function.
    pub init_symbol: String,
    /// Magic number the plugin is expected to register, if configured.
    pub magic: Option<String>,
}

impl PluginDescriptor {
    /// Read the descriptor for `slot` from configuration.
    ///
    /// Returns `Ok(None)` when neither the library nor the init symbol is
    /// configured, and [`PluginError::PartialConfig`] when only one is.
    /// Empty values count as unset.
    pub fn from_config<S: ConfigSource + ?Sized>(
        source: &S,
        config: &LoaderConfig,
        slot: Slot,
    ) -> Result<Option<Self>, PluginError> {
        let library_key = config.library_key(slot);
        let init_key = config.init_key(slot);
        let library = non_empty(source.lookup(&library_key));
        let init_symbol = non_empty(source.lookup(&init_key));

        match (library, init_symbol) {
            (None, None) => Ok(None),
            (Some(library), Some(init_symbol)) => Ok(Some(Self {
                library: PathBuf::from(library),
                init_symbol,
                magic: non_empty(source.lookup(&config.magic_key(slot))),
            })),
            (Some(_), None) => Err(PluginError::PartialConfig { missing: init_key }),
            (None, Some(_)) => Err(PluginError::PartialConfig {
                missing: library_key,
            }),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Define a plugin init function that registers a static dispatch table.
///
/// Build the plugin as a `cdylib`. When the host's loader calls the init
/// function the table is registered into the loader's registry across the C
/// ABI; called any other way it registers into the process-wide registry of
/// the calling crate copy.
///
/// # Example
///
/// ```ignore
/// use udf_dispatch::define_udf_plugin;
/// use udf_dispatch::format::Mode;
///
/// static TABLE: MyTable = MyTable::new();
///
/// define_udf_plugin! {
///     init: my_plugin_init,
///     mode: Mode::UDF3 | Mode::NETCDF4,
///     table: TABLE,
///     magic: Some("MYFMT"),
/// }
/// ```
///
/// Configure the slot with `NETCDF.UDF3.INIT=my_plugin_init`.
#[macro_export]
macro_rules! define_udf_plugin {
    (
        init: $init:ident,
        mode: $mode:expr,
        table: $table:path,
        magic: $magic:expr $(,)?
    ) => {
        /// Plugin init entry point.
        #[unsafe(no_mangle)]
        pub extern "C" fn $init() -> ::std::ffi::c_int {
            let magic: ::std::option::Option<&str> = $magic;
            match $crate::dispatch::register_plugin_table(
                $mode,
                &$table,
                magic.map(str::as_bytes),
            ) {
                Ok(()) => $crate::error::STATUS_OK,
                Err(err) => err.code(),
            }
        }
    };
    (
        init: $init:ident,
        mode: $mode:expr,
        table: $table:path $(,)?
    ) => {
        $crate::define_udf_plugin! {
            init: $init,
            mode: $mode,
            table: $table,
            magic: None,
        }
    };
}
