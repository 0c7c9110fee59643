//! Error types for the dispatch registry.

use std::ffi::c_int;
use thiserror::Error;

/// Result type alias using the crate's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Status returned by a plugin init function that completed successfully.
pub const STATUS_OK: c_int = 0;

/// Main error type for registry, detector and property list operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed mode flags, oversized magic, bad index and similar.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Dispatch table was built against a different ABI.
    #[error("dispatch ABI version mismatch: expected {expected}, got {actual}")]
    AbiMismatch {
        /// Version the registry requires.
        expected: u32,
        /// Version the table reported.
        actual: u32,
    },

    /// Unset slot or missing key.
    #[error("not found: {0}")]
    NotFound(String),

    /// Allocation failed while growing a container.
    #[error("out of memory")]
    OutOfMemory,

    /// Library or symbol could not be resolved.
    #[error("dynamic load failed: {0}")]
    DynamicLoad(String),

    /// Plugin init reported failure or did not register.
    #[error("plugin initialization failed: {0}")]
    PluginInit(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// True for `InvalidArgument` and its ABI-mismatch subtype.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_) | Error::AbiMismatch { .. })
    }

    /// True for `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Integer status for the C-style init function contract.
    ///
    /// Always negative; `STATUS_OK` is reserved for success.
    pub fn code(&self) -> c_int {
        match self {
            Error::InvalidArgument(_) => -36,
            Error::AbiMismatch { .. } => -36,
            Error::NotFound(_) => -90,
            Error::OutOfMemory => -61,
            Error::DynamicLoad(_) => -130,
            Error::PluginInit(_) => -131,
            Error::Io(_) => -68,
        }
    }

    /// Rebuild an error from a status returned across the plugin C ABI.
    ///
    /// Only the category survives the trip; `AbiMismatch` comes back as
    /// `InvalidArgument` and unknown codes as `PluginInit`.
    pub fn from_code(code: c_int) -> Self {
        match code {
            -36 => Error::invalid("rejected across the plugin boundary"),
            -90 => Error::not_found("reported across the plugin boundary"),
            -61 => Error::OutOfMemory,
            -130 => Error::DynamicLoad("reported across the plugin boundary".into()),
            -68 => Error::Io(std::io::Error::other("reported across the plugin boundary")),
            other => Error::PluginInit(format!("status {other}")),
        }
    }

    /// `Ok` for [`STATUS_OK`], otherwise [`from_code`](Self::from_code).
    pub fn check_status(code: c_int) -> Result<()> {
        match code {
            STATUS_OK => Ok(()),
            code => Err(Error::from_code(code)),
        }
    }
}
