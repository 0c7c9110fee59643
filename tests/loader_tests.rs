//! Integration tests for the configuration-driven plugin loader.
//!
//! Plugins are simulated with a fake platform loader whose libraries map
//! symbol names to init functions compiled into this test binary. The init
//! functions register into the process-wide registry exactly as a plugin
//! compiled into the host would. Each test owns the global slots it
//! configures. `plugin_fixture_tests.rs` covers a real plugin library.

use std::collections::HashMap;
use std::ffi::c_int;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use udf_dispatch::define_udf_plugin;
use udf_dispatch::dispatch::{
    DISPATCH_ABI_VERSION, DispatchRegistry, DispatchTable, query_user_format,
    register_user_format,
};
use udf_dispatch::format::{FormatX, Mode};
use udf_dispatch::plugin::{
    InitFn, LoaderConfig, PlatformLoader, PluginError, PluginLoader, RcConfig, SlotOutcome,
};
use udf_dispatch::slot::Slot;
use udf_dispatch::{Error, Result};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

fn slot(i: usize) -> Slot {
    Slot::new(i).unwrap()
}

// ============================================================================
// Fake platform loader
// ============================================================================

#[derive(Default)]
struct FakeLoader {
    libraries: HashMap<PathBuf, Vec<(&'static str, InitFn)>>,
    loads: AtomicUsize,
}

impl FakeLoader {
    fn with_library(
        mut self,
        path: impl Into<PathBuf>,
        symbols: &[(&'static str, InitFn)],
    ) -> Self {
        self.libraries.insert(path.into(), symbols.to_vec());
        self
    }
}

impl PlatformLoader for FakeLoader {
    type Handle = Vec<(&'static str, InitFn)>;

    unsafe fn load(&self, path: &Path) -> std::result::Result<Self::Handle, String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.libraries
            .get(path)
            .cloned()
            .ok_or_else(|| format!("{}: cannot open shared object file", path.display()))
    }

    unsafe fn resolve_init(
        &self,
        handle: &Self::Handle,
        symbol: &str,
    ) -> std::result::Result<InitFn, String> {
        handle
            .iter()
            .find(|(name, _)| *name == symbol)
            .map(|(_, init)| *init)
            .ok_or_else(|| format!("undefined symbol: {symbol}"))
    }
}

// ============================================================================
// Plugin dispatch tables and init functions
// ============================================================================

struct PluginTable(&'static str);

impl DispatchTable for PluginTable {
    fn model(&self) -> FormatX {
        FormatX::UDF2
    }

    fn abi_version(&self) -> u32 {
        DISPATCH_ABI_VERSION
    }

    fn name(&self) -> &str {
        self.0
    }

    fn open(&self, _path: &Path, _mode: Mode) -> Result<()> {
        Ok(())
    }
}

static PLUG3: PluginTable = PluginTable("plug3");
static PLUG7: PluginTable = PluginTable("plug7");
static PLUG8: PluginTable = PluginTable("plug8");
static PLUG9: PluginTable = PluginTable("plug9");
static ISOLATED_TABLE: PluginTable = PluginTable("isolated");

define_udf_plugin! {
    init: plug3_init,
    mode: Mode::UDF3 | Mode::NETCDF4,
    table: PLUG3,
    magic: Some("PLUG3"),
}

define_udf_plugin! {
    init: plug7_init,
    mode: Mode::UDF7,
    table: PLUG7,
    magic: Some("ACTUAL"),
}

define_udf_plugin! {
    init: plug8_init,
    mode: Mode::UDF8,
    table: PLUG8,
}

define_udf_plugin! {
    init: plug9_init,
    mode: Mode::UDF9,
    table: PLUG9,
    magic: Some("NINE"),
}

extern "C" fn failing_init() -> c_int {
    -1
}

extern "C" fn lazy_init() -> c_int {
    0
}

/// Table whose reported ABI version drops after it has been registered.
struct Drifting {
    abi: AtomicU32,
}

impl DispatchTable for Drifting {
    fn model(&self) -> FormatX {
        FormatX::UDF1
    }

    fn abi_version(&self) -> u32 {
        self.abi.load(Ordering::SeqCst)
    }

    fn open(&self, _path: &Path, _mode: Mode) -> Result<()> {
        Ok(())
    }
}

static DRIFTING: Drifting = Drifting {
    abi: AtomicU32::new(DISPATCH_ABI_VERSION),
};

extern "C" fn drifting_init() -> c_int {
    match register_user_format(Mode::UDF1, &DRIFTING, None) {
        Ok(()) => {
            DRIFTING.abi.store(DISPATCH_ABI_VERSION - 1, Ordering::SeqCst);
            0
        }
        Err(err) => err.code(),
    }
}

static ISOLATED: DispatchRegistry = DispatchRegistry::new();

extern "C" fn isolated_init() -> c_int {
    match ISOLATED.register(Mode::UDF0, &ISOLATED_TABLE, Some(b"ISO".as_slice())) {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}

// ============================================================================
// Per-slot behaviour
// ============================================================================

#[test]
fn test_plugin_registers_slot() {
    init_tracing();
    let platform = FakeLoader::default()
        .with_library("/opt/plugins/libplug3.so", &[("plug3_init", plug3_init as InitFn)]);
    let rc = RcConfig::parse(
        "NETCDF.UDF3.LIBRARY=/opt/plugins/libplug3.so\n\
         NETCDF.UDF3.INIT=plug3_init\n\
         NETCDF.UDF3.MAGIC=PLUG3\n",
    );

    let loader = PluginLoader::with_platform(platform);
    let report = unsafe { loader.run(&rc, DispatchRegistry::global()) };

    match report.outcome(slot(3)) {
        Some(SlotOutcome::Registered {
            library,
            magic_mismatch,
        }) => {
            assert_eq!(library, Path::new("/opt/plugins/libplug3.so"));
            assert!(!magic_mismatch);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(report.registered().collect::<Vec<_>>(), vec![slot(3)]);
    assert!(report.is_clean());

    let reg = query_user_format(Mode::UDF3).unwrap();
    assert!(reg.is(&PLUG3));
    assert_eq!(reg.magic().unwrap().as_bytes(), b"PLUG3");
}

#[test]
fn test_partial_config_leaves_slot_empty() {
    init_tracing();
    let platform = FakeLoader::default();
    let rc = RcConfig::parse("NETCDF.UDF5.LIBRARY=/opt/plugins/libplug5.so\n");

    let loader = PluginLoader::with_platform(platform);
    let report = unsafe { loader.run(&rc, DispatchRegistry::global()) };

    match report.outcome(slot(5)) {
        Some(SlotOutcome::Failed(PluginError::PartialConfig { missing })) => {
            assert_eq!(missing, "NETCDF.UDF5.INIT");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(query_user_format(Mode::UDF5).unwrap_err().is_not_found());
}

#[test]
fn test_init_failure_leaves_slot_empty() {
    init_tracing();
    let platform = FakeLoader::default()
        .with_library("libplug4.so", &[("plug4_init", failing_init as InitFn)]);
    let rc = RcConfig::parse("NETCDF.UDF4.LIBRARY=libplug4.so\nNETCDF.UDF4.INIT=plug4_init\n");

    let loader = PluginLoader::with_platform(platform);
    let report = unsafe { loader.run(&rc, DispatchRegistry::global()) };

    assert!(matches!(
        report.outcome(slot(4)),
        Some(SlotOutcome::Failed(PluginError::InitFailed { status: -1, .. }))
    ));
    assert!(query_user_format(Mode::UDF4).unwrap_err().is_not_found());
}

#[test]
fn test_missing_entry_point() {
    init_tracing();
    let platform = FakeLoader::default()
        .with_library("libplug6.so", &[("something_else", lazy_init as InitFn)]);
    let rc = RcConfig::parse("NETCDF.UDF6.LIBRARY=libplug6.so\nNETCDF.UDF6.INIT=plug6_init\n");

    let loader = PluginLoader::with_platform(platform);
    let report = unsafe { loader.run(&rc, DispatchRegistry::global()) };

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, slot(6));
    assert!(matches!(
        failures[0].1,
        PluginError::MissingEntryPoint { symbol, .. } if symbol == "plug6_init"
    ));
    assert!(query_user_format(Mode::UDF6).unwrap_err().is_not_found());
}

#[test]
fn test_init_success_without_registration() {
    init_tracing();
    let platform =
        FakeLoader::default().with_library("libplug2.so", &[("plug2_init", lazy_init as InitFn)]);
    let rc = RcConfig::parse("NETCDF.UDF2.LIBRARY=libplug2.so\nNETCDF.UDF2.INIT=plug2_init\n");

    let loader = PluginLoader::with_platform(platform);
    let report = unsafe { loader.run(&rc, DispatchRegistry::global()) };

    let Some(SlotOutcome::Failed(err)) = report.outcome(slot(2)) else {
        panic!("slot 2 should have failed");
    };
    assert!(matches!(err, PluginError::NotRegistered { .. }));
    let converted = Error::from(PluginError::NotRegistered {
        symbol: "plug2_init".into(),
    });
    assert!(matches!(converted, Error::PluginInit(_)));
}

#[test]
fn test_abi_drift_is_reported() {
    init_tracing();
    let platform = FakeLoader::default()
        .with_library("libplug1.so", &[("plug1_init", drifting_init as InitFn)]);
    let rc = RcConfig::parse("NETCDF.UDF1.LIBRARY=libplug1.so\nNETCDF.UDF1.INIT=plug1_init\n");

    let loader = PluginLoader::with_platform(platform);
    let report = unsafe { loader.run(&rc, DispatchRegistry::global()) };

    assert!(matches!(
        report.outcome(slot(1)),
        Some(SlotOutcome::Failed(PluginError::AbiMismatch { expected, actual }))
            if *expected == DISPATCH_ABI_VERSION && *actual == DISPATCH_ABI_VERSION - 1
    ));
    // The registration made by the init function is not rolled back.
    assert!(query_user_format(Mode::UDF1).unwrap().is(&DRIFTING));
}

#[test]
fn test_magic_mismatch_keeps_registration() {
    init_tracing();
    let platform =
        FakeLoader::default().with_library("libplug7.so", &[("plug7_init", plug7_init as InitFn)]);
    let rc = RcConfig::parse(
        "NETCDF.UDF7.LIBRARY=libplug7.so\n\
         NETCDF.UDF7.INIT=plug7_init\n\
         NETCDF.UDF7.MAGIC=EXPECT\n",
    );

    let loader = PluginLoader::with_platform(platform);
    let report = unsafe { loader.run(&rc, DispatchRegistry::global()) };

    assert!(matches!(
        report.outcome(slot(7)),
        Some(SlotOutcome::Registered {
            magic_mismatch: true,
            ..
        })
    ));
    assert!(report.is_clean());
    let reg = query_user_format(Mode::UDF7).unwrap();
    assert_eq!(reg.magic().unwrap().as_bytes(), b"ACTUAL");
}

#[test]
fn test_rc_file_with_search_path() {
    init_tracing();
    let plugins = tempfile::tempdir().unwrap();
    let empty = tempfile::tempdir().unwrap();
    let library = plugins.path().join("libplug8.so");
    fs::write(&library, b"").unwrap();

    let rc_dir = tempfile::tempdir().unwrap();
    let rc_path = rc_dir.path().join(".ncrc");
    fs::write(
        &rc_path,
        format!(
            "# UDF plugins\n\
             NETCDF.DISPATCH.PATH={};{}\n\
             NETCDF.UDF8.LIBRARY=libplug8.so\n\
             NETCDF.UDF8.INIT=plug8_init\n",
            empty.path().display(),
            plugins.path().display()
        ),
    )
    .unwrap();
    let rc = RcConfig::load(&rc_path).unwrap();

    let platform =
        FakeLoader::default().with_library(&library, &[("plug8_init", plug8_init as InitFn)]);
    let loader = PluginLoader::with_platform(platform);
    let report = unsafe { loader.run(&rc, DispatchRegistry::global()) };

    match report.outcome(slot(8)) {
        Some(SlotOutcome::Registered { library: loaded, .. }) => assert_eq!(loaded, &library),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let reg = query_user_format(Mode::UDF8).unwrap();
    assert!(reg.is(&PLUG8));
    assert!(reg.magic().is_none());
}

#[test]
fn test_custom_namespace() {
    init_tracing();
    let platform =
        FakeLoader::default().with_library("libplug9.so", &[("plug9_init", plug9_init as InitFn)]);
    let mut source = HashMap::new();
    source.insert("MYLIB.UDF9.LIBRARY".to_string(), "libplug9.so".to_string());
    source.insert("MYLIB.UDF9.INIT".to_string(), "plug9_init".to_string());
    // Ignored under the custom namespace.
    source.insert("NETCDF.UDF9.LIBRARY".to_string(), "other.so".to_string());

    let loader = PluginLoader::with_platform(platform)
        .with_config(LoaderConfig::new().with_namespace("MYLIB"));
    let report = unsafe { loader.run(&source, DispatchRegistry::global()) };

    assert_eq!(report.registered().collect::<Vec<_>>(), vec![slot(9)]);
    assert!(query_user_format(Mode::UDF9).unwrap().is(&PLUG9));
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn test_failures_do_not_stop_other_slots() {
    init_tracing();
    let platform = FakeLoader::default()
        .with_library("libgood.so", &[("isolated_init", isolated_init as InitFn)])
        .with_library("libbad.so", &[("bad_init", failing_init as InitFn)]);
    let rc = RcConfig::parse(
        "NETCDF.UDF0.LIBRARY=libgood.so\n\
         NETCDF.UDF0.INIT=isolated_init\n\
         NETCDF.UDF1.LIBRARY=libmissing.so\n\
         NETCDF.UDF1.INIT=missing_init\n\
         NETCDF.UDF2.INIT=orphan_init\n\
         NETCDF.UDF3.LIBRARY=libbad.so\n\
         NETCDF.UDF3.INIT=bad_init\n",
    );

    let loader = PluginLoader::with_platform(platform);
    let report = unsafe { loader.run(&rc, &ISOLATED) };

    assert_eq!(report.registered().collect::<Vec<_>>(), vec![slot(0)]);
    let failed: Vec<usize> = report.failures().map(|(s, _)| s.index()).collect();
    assert_eq!(failed, vec![1, 2, 3]);
    for i in 4..10 {
        assert!(matches!(report.outcome(slot(i)), Some(SlotOutcome::Unconfigured)));
    }
    // Slot 2 had no library, so only slots 0, 1 and 3 reached the platform.
    assert_eq!(loader_loads(&loader), 3);

    let regs = ISOLATED.registrations();
    assert_eq!(regs.len(), 1);
    assert!(regs[0].is(&ISOLATED_TABLE));
}

fn loader_loads(loader: &PluginLoader<FakeLoader>) -> usize {
    loader.platform().loads.load(Ordering::SeqCst)
}

// ============================================================================
// Repeated runs
// ============================================================================

static RELOAD: DispatchRegistry = DispatchRegistry::new();
static FIRST_TABLE: PluginTable = PluginTable("first");
static SECOND_TABLE: PluginTable = PluginTable("second");
static KEPT_TABLE: PluginTable = PluginTable("kept");

fn register_reload(mode: Mode, table: &'static PluginTable, magic: &[u8]) -> c_int {
    match RELOAD.register(mode, table, Some(magic)) {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}

extern "C" fn first_init() -> c_int {
    register_reload(Mode::UDF4, &FIRST_TABLE, b"ONE")
}

extern "C" fn second_init() -> c_int {
    register_reload(Mode::UDF4, &SECOND_TABLE, b"TWO")
}

extern "C" fn kept_init() -> c_int {
    register_reload(Mode::UDF5, &KEPT_TABLE, b"KEEP")
}

#[test]
fn test_second_run_overwrites_configured_slots_only() {
    init_tracing();
    let platform = FakeLoader::default()
        .with_library("libfirst.so", &[("first_init", first_init as InitFn)])
        .with_library("libsecond.so", &[("second_init", second_init as InitFn)])
        .with_library("libkept.so", &[("kept_init", kept_init as InitFn)]);
    let loader = PluginLoader::with_platform(platform);

    let first = RcConfig::parse(
        "NETCDF.UDF4.LIBRARY=libfirst.so\n\
         NETCDF.UDF4.INIT=first_init\n\
         NETCDF.UDF5.LIBRARY=libkept.so\n\
         NETCDF.UDF5.INIT=kept_init\n",
    );
    let report = unsafe { loader.run(&first, &RELOAD) };
    assert_eq!(report.registered().collect::<Vec<_>>(), vec![slot(4), slot(5)]);
    assert!(RELOAD.query(Mode::UDF4).unwrap().is(&FIRST_TABLE));

    let second = RcConfig::parse(
        "NETCDF.UDF4.LIBRARY=libsecond.so\n\
         NETCDF.UDF4.INIT=second_init\n",
    );
    let report = unsafe { loader.run(&second, &RELOAD) };
    assert_eq!(report.registered().collect::<Vec<_>>(), vec![slot(4)]);
    assert!(matches!(report.outcome(slot(5)), Some(SlotOutcome::Unconfigured)));

    let replaced = RELOAD.query(Mode::UDF4).unwrap();
    assert!(replaced.is(&SECOND_TABLE));
    assert_eq!(replaced.magic().unwrap().as_bytes(), b"TWO");
    let kept = RELOAD.query(Mode::UDF5).unwrap();
    assert!(kept.is(&KEPT_TABLE));
    assert_eq!(kept.magic().unwrap().as_bytes(), b"KEEP");
    assert_eq!(loader_loads(&loader), 3);
}

// ============================================================================
// Real dynamic loading
// ============================================================================

#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[test]
fn test_real_library_nonzero_init() {
    init_tracing();
    // getpid() has the init signature and returns a positive pid, which the
    // loader treats as a failed init.
    let registry = DispatchRegistry::new();
    let rc = RcConfig::parse("NETCDF.UDF0.LIBRARY=libc.so.6\nNETCDF.UDF0.INIT=getpid\n");

    let report = unsafe { PluginLoader::new().run(&rc, &registry) };

    assert!(matches!(
        report.outcome(slot(0)),
        Some(SlotOutcome::Failed(PluginError::InitFailed { status, .. })) if *status > 0
    ));
    assert!(registry.query_slot(slot(0)).unwrap_err().is_not_found());
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[test]
fn test_real_library_missing_symbol() {
    init_tracing();
    let registry = DispatchRegistry::new();
    let rc = RcConfig::parse(
        "NETCDF.UDF0.LIBRARY=libc.so.6\nNETCDF.UDF0.INIT=udf_no_such_init_symbol\n",
    );

    let report = unsafe { PluginLoader::new().run(&rc, &registry) };

    assert!(matches!(
        report.outcome(slot(0)),
        Some(SlotOutcome::Failed(PluginError::MissingEntryPoint { .. }))
    ));
}
