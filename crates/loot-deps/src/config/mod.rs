//! Configuration: where the cache lives, which manifest is in use and what
//! the environment overrides.

mod layout;
mod manifest;
mod source;

pub use layout::{CacheLayout, EXTERNAL_DIR};
pub use manifest::{BinEntry, GoEntry, LibEntry, Manifest, PathList, ShaSpec};
pub use source::{Settings, SettingsLoader, MANIFEST_ENV, MANIFEST_FILE, ROOT_ENV, SKIP_PROCUREMENT_ENV};
