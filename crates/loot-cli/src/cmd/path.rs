use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

use super::load_registry;

#[derive(Args, Debug)]
pub struct PathArgs {
    /// Dependency name
    #[arg(value_name = "NAME")]
    pub name: String,
}

/// Print only the path so the output can be used in scripts
pub fn execute(working_dir: &Path, args: PathArgs) -> Result<i32> {
    let registry = load_registry(working_dir)?;
    let path = registry
        .resolved_path(&args.name)
        .with_context(|| format!("Failed to resolve '{}'", args.name))?;

    println!("{}", path.display());
    Ok(0)
}
