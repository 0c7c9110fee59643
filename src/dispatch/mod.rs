//! Dispatch table registry and format detection.
//!
//! A dispatch table is the capability set that services every operation on
//! an open resource. The built-in formats bring their own; third parties
//! install theirs into one of ten user-defined format (UDF) slots.
//!
//! # Registration
//!
//! ```rust,ignore
//! use udf_dispatch::dispatch::{register_user_format, query_user_format};
//! use udf_dispatch::format::Mode;
//!
//! static TABLE: MyTable = MyTable::new();
//!
//! register_user_format(Mode::UDF3 | Mode::NETCDF4, &TABLE, Some(b"MYFMT"))?;
//! let reg = query_user_format(Mode::UDF3)?;
//! assert_eq!(reg.magic().unwrap().as_bytes(), b"MYFMT");
//! ```
//!
//! # Lifecycle
//!
//! The process-wide registry ([`DispatchRegistry::global`]) is a plain
//! `static`: it exists before `main` and is never torn down. Registration is
//! expected to happen during single-threaded start-up (normally from the
//! plugin loader); afterwards the registry is treated as read-only.
//!
//! # Plugin boundary
//!
//! Plugin libraries reach the host registry through the C ABI in
//! [`RawDispatchTable`] and [`HostApi`], never through their own copy of
//! this crate's statics.

mod detect;
mod ffi;
mod registry;
mod table;

pub(crate) use ffi::HostAttachment;

pub use detect::{DetectMethod, Detection, FormatDetector};
pub use ffi::{
    ATTACH_HOST_SYMBOL, AttachHostFn, HOST_API_VERSION, HostApi, RawCloseFn, RawDispatchTable,
    RawOpenFn, RawRegisterFn, register_plugin_table, udf_dispatch_attach_host,
    udf_register_user_format,
};
pub use registry::{DispatchRegistry, Registration, query_user_format, register_user_format};
pub use table::{DISPATCH_ABI_VERSION, DispatchTable, Magic};
