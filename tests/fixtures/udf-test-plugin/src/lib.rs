//! UDF plugin library for the dynamic-loading integration tests.

use std::path::Path;
use udf_dispatch::define_udf_plugin;
use udf_dispatch::dispatch::{DISPATCH_ABI_VERSION, DispatchTable};
use udf_dispatch::format::{FormatX, Mode};
use udf_dispatch::{Error, Result};

struct FixtureTable {
    name: &'static str,
    model: FormatX,
}

impl DispatchTable for FixtureTable {
    fn model(&self) -> FormatX {
        self.model
    }

    fn abi_version(&self) -> u32 {
        DISPATCH_ABI_VERSION
    }

    fn name(&self) -> &str {
        self.name
    }

    fn open(&self, path: &Path, _mode: Mode) -> Result<()> {
        if path.is_file() {
            Ok(())
        } else {
            Err(Error::not_found(format!("{} does not exist", path.display())))
        }
    }
}

// UDF3 and UDF4.
static PLUG3: FixtureTable = FixtureTable {
    name: "fixture-plug3",
    model: FormatX(12),
};

static PLUG4: FixtureTable = FixtureTable {
    name: "fixture-plug4",
    model: FormatX(13),
};

define_udf_plugin! {
    init: fixture_plug3_init,
    mode: Mode::UDF3 | Mode::NETCDF4,
    table: PLUG3,
    magic: Some("PLUG3"),
}

define_udf_plugin! {
    init: fixture_plug4_init,
    mode: Mode::UDF4,
    table: PLUG4,
}

define_udf_plugin! {
    init: fixture_oversized_magic_init,
    mode: Mode::UDF5,
    table: PLUG4,
    magic: Some("NINEBYTES"),
}
