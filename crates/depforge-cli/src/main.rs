//! depforge CLI - fetch, build and install pinned library dependencies

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod config;
mod ensure;
mod plan;
mod status;

#[derive(Parser)]
#[command(name = "depforge")]
#[command(version)]
#[command(about = "Fetch, build and install pinned library dependencies", long_about = None)]
struct Cli {
    /// Path to the manifest (defaults to ./depforge.toml, then built-in boost 1.48.0)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision dependencies that are not provisioned yet (default)
    Ensure {
        /// Only these dependencies
        names: Vec<String>,
    },

    /// Show the archive, URL and build steps without running anything
    Plan {
        /// Only these dependencies
        names: Vec<String>,
    },

    /// List provisioned dependencies
    Status,

    /// Forget that a dependency was provisioned so it is rebuilt next time
    Forget {
        /// Dependency name
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Ensure { names }) => {
            run_ensure(names, cli.config, cli.quiet)?;
        }

        Some(Commands::Plan { names }) => {
            plan::show_plan(cli.config, &names)?;
        }

        Some(Commands::Status) => {
            status::show_status(cli.config)?;
        }

        Some(Commands::Forget { name }) => {
            status::forget(cli.config, &name)?;
        }

        None => {
            // Default behavior: ensure everything
            run_ensure(Vec::new(), cli.config, cli.quiet)?;
        }
    }

    Ok(())
}

fn run_ensure(names: Vec<String>, config: Option<PathBuf>, quiet: bool) -> Result<()> {
    let options = ensure::EnsureOptions {
        names,
        config,
        quiet,
    };
    let result = ensure::ensure_dependencies(options)?;
    if !quiet {
        result.print_summary();
    }
    Ok(())
}
