//! List command - show declared dependencies and whether they are cached.

use anyhow::Result;
use clap::Args;
use console::style;
use loot_deps::Registry;
use std::path::Path;

use super::load_registry;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only print names
    #[arg(short = 'N', long)]
    pub name_only: bool,
}

pub fn execute(working_dir: &Path, args: ListArgs) -> Result<i32> {
    let registry = load_registry(working_dir)?;
    let names = registry.names();

    if names.is_empty() {
        println!("{} No dependencies declared", style("Info:").cyan());
        return Ok(0);
    }

    if args.name_only {
        for name in &names {
            println!("{}", name);
        }
        return Ok(0);
    }

    println!("{} Dependencies for {}:\n", style("List:").cyan().bold(), style(registry.layout().root().display()).dim());
    for line in describe(&registry, &names) {
        println!("  {}", line);
    }
    println!();

    Ok(0)
}

fn describe(registry: &Registry, names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter_map(|name| registry.get(name))
        .map(|record| {
            let resolved = record.resolved();
            let cached = if record.install_dir().exists() {
                style("cached").green()
            } else {
                style("missing").yellow()
            };
            format!(
                "{} {} {} {} {}",
                style("-").dim(),
                style(&resolved.name).green(),
                style(format!("[{}]", resolved.kind)).dim(),
                if resolved.version.is_empty() { "-" } else { resolved.version.as_str() },
                cached
            )
        })
        .collect()
}
