mod cmd;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "loot")]
#[command(version)]
#[command(about = "Download, verify and run the build tools pinned in a Depfile")]
struct Args {
    /// Working directory the Depfile is searched from
    #[arg(short = 'd', long, default_value = ".", global = true)]
    working_dir: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Procure dependencies (all of them when no names are given)
    Fetch(cmd::FetchArgs),

    /// Print the path of a dependency, procuring it first
    Path(cmd::PathArgs),

    /// Run a tool, procuring it first
    Run(cmd::RunArgs),

    /// List the dependencies declared in the Depfile
    List(cmd::ListArgs),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run() -> Result<i32> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Commands::Fetch(fetch) => cmd::fetch::execute(&args.working_dir, fetch),
        Commands::Path(path) => cmd::path::execute(&args.working_dir, path),
        Commands::Run(run) => cmd::run::execute(&args.working_dir, run),
        Commands::List(list) => cmd::list::execute(&args.working_dir, list),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            eprintln!("{} {}", console::style("Error:").red().bold(), e);
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}
