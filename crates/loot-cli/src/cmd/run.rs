//! Run command - execute a procured tool.

use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

use super::load_registry;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Tool to run
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Arguments passed to the tool
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Runs the tool from the working directory and returns its exit code
pub fn execute(working_dir: &Path, args: RunArgs) -> Result<i32> {
    let registry = load_registry(working_dir)?;
    let mut command = registry
        .command(&args.name)
        .with_context(|| format!("Failed to resolve '{}'", args.name))?;

    let status = command
        .args(&args.args)
        .current_dir(working_dir)
        .status()
        .with_context(|| format!("Failed to execute {}", args.name))?;

    Ok(status.code().unwrap_or(1))
}
