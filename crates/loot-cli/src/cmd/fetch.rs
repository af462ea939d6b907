//! Fetch command - procure dependencies ahead of time.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use std::path::Path;

use super::load_registry;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Dependencies to procure; all of them when omitted
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,
}

pub fn execute(working_dir: &Path, args: FetchArgs) -> Result<i32> {
    let registry = load_registry(working_dir)?;

    if registry.skip_procurement() {
        println!(
            "{} Procurement is disabled by {}",
            style("Info:").cyan(),
            loot_deps::config::SKIP_PROCUREMENT_ENV
        );
        return Ok(0);
    }

    if args.names.is_empty() {
        registry.procure_all().context("Failed to procure dependencies")?;

        for name in registry.names() {
            if let Some(record) = registry.get(&name) {
                print_procured(&name, record.path());
            }
        }
        return Ok(0);
    }

    for name in &args.names {
        let path = registry
            .procure(name)
            .with_context(|| format!("Failed to procure '{}'", name))?;
        print_procured(name, &path);
    }

    Ok(0)
}

fn print_procured(name: &str, path: &Path) {
    println!(
        "{} {} {}",
        style("Procured").green().bold(),
        style(name).cyan(),
        style(path.display()).dim()
    );
}
