use std::env;
use std::path::{Path, PathBuf};

use crate::downloader::DownloaderConfig;
use crate::{DepsError, Result};

use super::layout::CacheLayout;

/// Name of the manifest looked up from the working directory upwards
pub const MANIFEST_FILE: &str = "Depfile";

/// Presence (with any value) disables procurement entirely
pub const SKIP_PROCUREMENT_ENV: &str = "DEPFILE_SKIP_PROCUREMENT";
/// Explicit manifest path, bypassing the upward search
pub const MANIFEST_ENV: &str = "DEPFILE";
/// Explicit project root for the `.ext` cache
pub const ROOT_ENV: &str = "DEPFILE_ROOT";

/// Effective settings for one process
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory that holds `.ext`
    pub root: PathBuf,
    /// Manifest in use, if one was found
    pub manifest: Option<PathBuf>,
    /// Assume dependencies are already installed (e.g. baked into a CI image)
    pub skip_procurement: bool,
    pub downloader: DownloaderConfig,
}

impl Settings {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest: None,
            skip_procurement: false,
            downloader: DownloaderConfig::default(),
        }
    }

    pub fn layout(&self) -> CacheLayout {
        CacheLayout::new(&self.root)
    }
}

/// Builds [`Settings`] from the working directory and environment
#[derive(Debug)]
pub struct SettingsLoader {
    use_environment: bool,
}

impl SettingsLoader {
    pub fn new(use_environment: bool) -> Self {
        Self { use_environment }
    }

    /// Get a non-empty environment variable
    pub fn get_env(&self, var: &str) -> Option<String> {
        if !self.use_environment {
            return None;
        }

        env::var(var).ok().filter(|s| !s.is_empty())
    }

    pub fn skip_procurement(&self) -> bool {
        self.use_environment && env::var_os(SKIP_PROCUREMENT_ENV).is_some()
    }

    /// Walk from `start` towards the filesystem root looking for a manifest
    pub fn find_manifest(&self, start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(MANIFEST_FILE))
            .find(|candidate| candidate.is_file())
    }

    pub fn load(&self, start_dir: &Path) -> Result<Settings> {
        let start = start_dir
            .canonicalize()
            .map_err(|e| DepsError::io("resolve working directory", start_dir, e))?;

        let manifest = match self.get_env(MANIFEST_ENV) {
            Some(path) => {
                let path = start.join(path);
                if !path.is_file() {
                    return Err(DepsError::Config(format!(
                        "{} points at '{}', which is not a file",
                        MANIFEST_ENV,
                        path.display()
                    )));
                }
                Some(path)
            }
            None => self.find_manifest(&start),
        };

        let root = match self.get_env(ROOT_ENV) {
            Some(root) => start.join(root),
            None => manifest
                .as_deref()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .unwrap_or_else(|| start.clone()),
        };

        let skip_procurement = self.skip_procurement();
        if skip_procurement {
            log::debug!("{} is set, dependencies will not be procured", SKIP_PROCUREMENT_ENV);
        }

        Ok(Settings {
            root,
            manifest,
            skip_procurement,
            downloader: DownloaderConfig::default(),
        })
    }
}
