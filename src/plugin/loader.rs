//! Configuration-driven plugin loading.

use super::config::{ConfigSource, LoaderConfig};
use super::descriptor::PluginDescriptor;
use super::platform::{DynamicLoader, PlatformLoader, resolve_library_path};
use crate::dispatch::{DispatchRegistry, HostApi, HostAttachment};
use crate::error::Error;
use crate::slot::Slot;
use std::ffi::c_int;
use std::mem::ManuallyDrop;
use std::path::PathBuf;
use thiserror::Error;

/// Why one slot's plugin could not be installed.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Only one of the library path and init symbol is configured.
    #[error("partial plugin configuration: {missing} is not set")]
    PartialConfig {
        /// The key that is missing.
        missing: String,
    },

    /// The platform loader could not load the library.
    #[error("failed to load library {}: {reason}", path.display())]
    LoadFailed {
        /// Resolved library path.
        path: PathBuf,
        /// Platform error message.
        reason: String,
    },

    /// The init symbol is not exported by the library.
    #[error("missing plugin entry point {symbol}: {reason}")]
    MissingEntryPoint {
        /// Configured init symbol.
        symbol: String,
        /// Platform error message.
        reason: String,
    },

    /// The init function returned a non-zero status.
    #[error("plugin init {symbol} returned status {status}")]
    InitFailed {
        /// Init symbol that was called.
        symbol: String,
        /// Returned status.
        status: c_int,
    },

    /// The init function succeeded but the slot is still empty.
    #[error("plugin init {symbol} returned success without registering a dispatch table")]
    NotRegistered {
        /// Init symbol that was called.
        symbol: String,
    },

    /// The registered table reports a different dispatch ABI.
    #[error("plugin dispatch table ABI version {actual} does not match required {expected}")]
    AbiMismatch {
        /// Version the registry requires.
        expected: u32,
        /// Version the table reported.
        actual: u32,
    },
}

impl From<PluginError> for Error {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::PartialConfig { .. } => Error::InvalidArgument(err.to_string()),
            PluginError::LoadFailed { .. } | PluginError::MissingEntryPoint { .. } => {
                Error::DynamicLoad(err.to_string())
            }
            PluginError::InitFailed { .. } | PluginError::NotRegistered { .. } => {
                Error::PluginInit(err.to_string())
            }
            PluginError::AbiMismatch { expected, actual } => {
                Error::AbiMismatch { expected, actual }
            }
        }
    }
}

/// What happened to one slot during a loader run.
#[derive(Debug)]
pub enum SlotOutcome {
    /// Nothing configured; the slot was not touched.
    Unconfigured,
    /// The plugin loaded and its table is installed.
    Registered {
        /// Library path that was loaded.
        library: PathBuf,
        /// The configured magic differs from the one the plugin registered.
        magic_mismatch: bool,
    },
    /// The slot's pipeline stopped at some step.
    Failed(PluginError),
}

/// Per-slot results of a loader run.
#[derive(Debug, Default)]
pub struct LoadReport {
    outcomes: Vec<(Slot, SlotOutcome)>,
}

impl LoadReport {
    /// Outcome for one slot.
    pub fn outcome(&self, slot: Slot) -> Option<&SlotOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, outcome)| outcome)
    }

    /// Slots whose plugin was installed.
    pub fn registered(&self) -> impl Iterator<Item = Slot> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SlotOutcome::Registered { .. }))
            .map(|(slot, _)| *slot)
    }

    /// Slots that failed, with the reason.
    pub fn failures(&self) -> impl Iterator<Item = (Slot, &PluginError)> + '_ {
        self.outcomes.iter().filter_map(|(slot, o)| match o {
            SlotOutcome::Failed(err) => Some((*slot, err)),
            _ => None,
        })
    }

    /// Whether no slot failed.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Loads UDF plugins named in configuration and verifies their registration.
///
/// For every slot the loader reads `<NS>.UDF<i>.LIBRARY`, `<NS>.UDF<i>.INIT`
/// and `<NS>.UDF<i>.MAGIC`, loads the library, calls the init function and
/// checks that the slot now holds a table with the right ABI version.
///
/// Each slot is independent: a failure is logged, recorded in the
/// [`LoadReport`] and the loop moves on. The run itself never fails.
/// Running again re-reads configuration and may overwrite slots; nothing is
/// ever unregistered or unloaded.
///
/// While a library's init function runs, the library is attached to the
/// run's registry through its exported host-attach symbol. Runs that load
/// the same library must not overlap.
pub struct PluginLoader<L = DynamicLoader> {
    platform: L,
    config: LoaderConfig,
}

impl PluginLoader<DynamicLoader> {
    /// Create a loader backed by the platform dynamic loader.
    pub fn new() -> Self {
        Self::with_platform(DynamicLoader::new())
    }
}

impl Default for PluginLoader<DynamicLoader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: PlatformLoader> PluginLoader<L> {
    /// Create a loader over a specific platform loader.
    pub fn with_platform(platform: L) -> Self {
        Self {
            platform,
            config: LoaderConfig::default(),
        }
    }

    /// Use custom loader settings.
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// The loader settings.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The platform loader.
    pub fn platform(&self) -> &L {
        &self.platform
    }

    /// Load every configured plugin into `registry`.
    ///
    /// # Safety
    ///
    /// Loading plugins executes code from shared libraries. Every library
    /// named in `source` must be trusted and its init symbol must have the
    /// [`InitFn`](super::InitFn) signature.
    pub unsafe fn run<S: ConfigSource + ?Sized>(
        &self,
        source: &S,
        registry: &DispatchRegistry,
    ) -> LoadReport {
        let search_path = source.lookup(&self.config.search_path_key());
        let mut report = LoadReport::default();

        for slot in Slot::all() {
            // SAFETY: Caller guarantees configured plugins are trusted.
            let result =
                unsafe { self.load_slot(slot, source, registry, search_path.as_deref()) };
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    log_failure(slot, &err);
                    SlotOutcome::Failed(err)
                }
            };
            report.outcomes.push((slot, outcome));
        }

        report
    }

    unsafe fn load_slot<S: ConfigSource + ?Sized>(
        &self,
        slot: Slot,
        source: &S,
        registry: &DispatchRegistry,
        search_path: Option<&str>,
    ) -> Result<SlotOutcome, PluginError> {
        let Some(desc) = PluginDescriptor::from_config(source, &self.config, slot)? else {
            tracing::debug!(slot = %slot, "no plugin configured");
            return Ok(SlotOutcome::Unconfigured);
        };

        let path = resolve_library_path(&desc.library, search_path);

        // Never unload. Tables registered by the library, including ones
        // installed by an init that later fails, point into it.
        // SAFETY: Caller guarantees the library is trusted.
        let handle = ManuallyDrop::new(
            unsafe { self.platform.load(&path) }.map_err(|reason| PluginError::LoadFailed {
                path: path.clone(),
                reason,
            })?,
        );

        // SAFETY: Caller guarantees the symbol has the InitFn signature.
        let init = unsafe { self.platform.resolve_init(&handle, &desc.init_symbol) }.map_err(
            |reason| PluginError::MissingEntryPoint {
                symbol: desc.init_symbol.clone(),
                reason,
            },
        )?;

        // SAFETY: Caller guarantees the library is trusted.
        let attach = unsafe { self.platform.resolve_attach(&handle) };
        let host = HostApi::new(registry);
        tracing::debug!(
            slot = %slot,
            init = %desc.init_symbol,
            attached = attach.is_some(),
            "calling plugin init"
        );
        let status = {
            // SAFETY: `attach` is the library's own attach symbol and `host`
            // outlives the attachment.
            let _attached = attach.map(|attach| unsafe { HostAttachment::new(attach, &host) });
            // SAFETY: Resolved from a trusted library with the InitFn signature.
            unsafe { init() }
        };
        if status != 0 {
            return Err(PluginError::InitFailed {
                symbol: desc.init_symbol,
                status,
            });
        }

        let reg = registry
            .query_slot(slot)
            .map_err(|_| PluginError::NotRegistered {
                symbol: desc.init_symbol.clone(),
            })?;
        registry.check_abi(reg.dispatch()).map_err(|_| PluginError::AbiMismatch {
            expected: registry.required_abi_version(),
            actual: reg.dispatch().abi_version(),
        })?;

        let magic_mismatch = match (&desc.magic, reg.magic()) {
            (Some(expected), Some(actual)) if actual.as_bytes() != expected.as_bytes() => {
                tracing::warn!(
                    slot = %slot,
                    expected = %expected,
                    registered = %actual,
                    "plugin registered a different magic number than configured"
                );
                true
            }
            _ => false,
        };

        tracing::info!(
            slot = %slot,
            library = %path.display(),
            init = %desc.init_symbol,
            table = reg.dispatch().name(),
            "loaded UDF plugin"
        );

        Ok(SlotOutcome::Registered {
            library: path,
            magic_mismatch,
        })
    }
}

fn log_failure(slot: Slot, err: &PluginError) {
    match err {
        PluginError::PartialConfig { .. } => tracing::warn!(
            slot = %slot,
            error = %err,
            "ignoring partial UDF plugin configuration; LIBRARY and INIT are both required"
        ),
        PluginError::AbiMismatch { expected, actual } => tracing::error!(
            slot = %slot,
            expected,
            actual,
            "UDF plugin dispatch table was built against a different ABI version"
        ),
        _ => tracing::warn!(slot = %slot, error = %err, "UDF plugin failed to load"),
    }
}

/// Load configured plugins into the process-wide registry with the platform
/// dynamic loader.
///
/// # Safety
///
/// See [`PluginLoader::run`].
pub unsafe fn load_plugins<S: ConfigSource + ?Sized>(source: &S) -> LoadReport {
    // SAFETY: Forwarded from the caller.
    unsafe { PluginLoader::new().run(source, DispatchRegistry::global()) }
}
