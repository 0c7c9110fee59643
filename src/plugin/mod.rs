//! Plugin system for installing user-defined formats at runtime.
//!
//! Plugins are shared libraries named in configuration. For each of the ten
//! UDF slots the loader reads three keys:
//!
//! ```text
//! NETCDF.UDF3.LIBRARY=/opt/plugins/libmyfmt.so
//! NETCDF.UDF3.INIT=myfmt_init
//! NETCDF.UDF3.MAGIC=MYFMT
//! NETCDF.DISPATCH.PATH=/opt/plugins:/usr/local/lib/udf
//! ```
//!
//! The library is loaded, its init symbol is called, and the loader checks
//! that the slot now holds a dispatch table built for the current ABI.
//!
//! # Plugin Structure
//!
//! A plugin exports one zero-argument `extern "C"` function returning an
//! integer status (see [`InitFn`]). [`define_udf_plugin!`](crate::define_udf_plugin)
//! writes it for Rust plugins:
//!
//! ```ignore
//! use udf_dispatch::define_udf_plugin;
//! use udf_dispatch::format::Mode;
//!
//! static TABLE: MyTable = MyTable;
//!
//! define_udf_plugin! {
//!     init: myfmt_init,
//!     mode: Mode::UDF3,
//!     table: TABLE,
//!     magic: Some("MYFMT"),
//! }
//! ```
//!
//! Build it as a `cdylib` depending on this crate:
//!
//! ```toml
//! [lib]
//! crate-type = ["cdylib"]
//! ```
//!
//! # Loading
//!
//! ```ignore
//! use udf_dispatch::plugin::{RcConfig, load_plugins};
//!
//! let rc = RcConfig::load("/etc/udfrc")?;
//! // SAFETY: every library named in /etc/udfrc is trusted.
//! let report = unsafe { load_plugins(&rc) };
//! for (slot, err) in report.failures() {
//!     eprintln!("{slot}: {err}");
//! }
//! ```
//!
//! Loaded libraries are never unloaded.

mod config;
mod descriptor;
mod loader;
mod platform;

pub use config::{ConfigSource, LoaderConfig, RcConfig};
pub use descriptor::{InitFn, PluginDescriptor};
pub use loader::{LoadReport, PluginError, PluginLoader, SlotOutcome, load_plugins};
pub use platform::{DynamicLoader, PlatformLoader, resolve_library_path};
