//! Subcommands.

pub mod fetch;
pub mod list;
pub mod path;
pub mod run;

use anyhow::{Context, Result};
use loot_deps::Registry;
use std::path::Path;

pub use fetch::FetchArgs;
pub use list::ListArgs;
pub use path::PathArgs;
pub use run::RunArgs;

/// Build the registry for `working_dir` from its Depfile and the environment
pub fn load_registry(working_dir: &Path) -> Result<Registry> {
    let registry = Registry::load(working_dir)
        .with_context(|| format!("Failed to load dependencies for {}", working_dir.display()))?;

    if registry.names().is_empty() {
        log::warn!("No dependencies declared, is there a Depfile above {}?", working_dir.display());
    }
    Ok(registry)
}
