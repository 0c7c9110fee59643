//! # udf-dispatch
//!
//! Pluggable format dispatch for a scientific data-access library.
//!
//! The host library opens resources through a dispatch table chosen per
//! resource. Besides its built-in formats it offers ten user-defined format
//! (UDF) slots that third parties fill at runtime, either by calling
//! [`register_user_format`](dispatch::register_user_format) directly or by
//! naming a shared library in configuration and letting the
//! [plugin loader](plugin) install it.
//!
//! ## Features
//!
//! - **Slot/flag codec**: bijective mapping between slot index, mode-flag bit
//!   and format identifier
//! - **Registry**: ten process-wide slots holding a dispatch table and an
//!   optional magic number, with ABI version checking
//! - **Format detection**: explicit mode flag first, then magic-number scan
//!   in slot order
//! - **Plugin loading**: per-slot failure isolation, libraries never unloaded
//! - **Property lists**: small ordered option bags handed to plugins
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use udf_dispatch::prelude::*;
//!
//! static TABLE: MyTable = MyTable;
//!
//! register_user_format(Mode::UDF2, &TABLE, Some(b"MYFMT"))?;
//!
//! match FormatDetector::global().detect_path(Mode::empty(), "data.myfmt")? {
//!     Some(found) => found.dispatch.open("data.myfmt".as_ref(), Mode::empty())?,
//!     None => { /* built-in detection */ }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod dispatch;
pub mod error;
pub mod format;
pub mod plugin;
pub mod proplist;
pub mod slot;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::dispatch::{
        DetectMethod, Detection, DispatchRegistry, DispatchTable, FormatDetector, Magic,
        query_user_format, register_user_format,
    };
    pub use crate::error::{Error, Result};
    pub use crate::format::{FormatX, Mode};
    pub use crate::plugin::{LoadReport, PluginLoader, RcConfig};
    pub use crate::proplist::PropertyList;
    pub use crate::slot::Slot;
}

pub use error::{Error, Result};
