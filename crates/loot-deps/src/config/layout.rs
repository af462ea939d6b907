use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{DepsError, Result};

/// Directory under the project root that holds everything procured
pub const EXTERNAL_DIR: &str = ".ext";
const BIN_DIR: &str = "bin";
const GOBIN_DIR: &str = "gobin";
const LIB_DIR: &str = "lib";
const TMP_DIR: &str = "tmp";

/// On-disk cache conventions, all relative to a project root.
///
/// ```text
/// <root>/.ext/bin/<name>-<version>/...
/// <root>/.ext/gobin/<name>-<version>/...
/// <root>/.ext/lib/<output dir | name-version>/...
/// <root>/.ext/tmp/<random>/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ext_dir(&self) -> PathBuf {
        self.root.join(EXTERNAL_DIR)
    }

    /// Directory of downloaded (non-Go) tools
    pub fn bin_dir(&self) -> PathBuf {
        self.ext_dir().join(BIN_DIR)
    }

    pub fn gobin_dir(&self) -> PathBuf {
        self.ext_dir().join(GOBIN_DIR)
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.ext_dir().join(LIB_DIR)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.ext_dir().join(TMP_DIR)
    }

    pub fn bin_path(&self, name: &str, version: &str) -> PathBuf {
        self.bin_dir().join(versioned(name, version))
    }

    pub fn gobin_path(&self, name: &str, version: &str) -> PathBuf {
        self.gobin_dir().join(versioned(name, version))
    }

    /// Where a library lands: a shared output directory when one is
    /// configured, otherwise its own `name-version` directory.
    pub fn lib_path(&self, name: &str, version: &str, output_dir: Option<&str>) -> PathBuf {
        match output_dir {
            Some(dir) => self.lib_dir().join(dir),
            None => self.lib_dir().join(versioned(name, version)),
        }
    }

    /// Create a fresh scratch directory under `.ext/tmp`, removed on drop
    pub fn scratch_dir(&self) -> Result<TempDir> {
        let tmp = self.tmp_dir();
        fs::create_dir_all(&tmp).map_err(|e| DepsError::io("setup .ext/tmp dir", &tmp, e))?;

        tempfile::Builder::new()
            .prefix("loot")
            .tempdir_in(&tmp)
            .map_err(|e| DepsError::io("setup temp dir in", &tmp, e))
    }
}

fn versioned(name: &str, version: &str) -> String {
    if version.is_empty() {
        name.to_string()
    } else {
        format!("{}-{}", name, version)
    }
}
