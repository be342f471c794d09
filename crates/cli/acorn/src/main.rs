//! Acorn compiler CLI
//!
//! Checks and lowers JSON-serialized units produced by the Acorn parser

use ac_driver::CompileOptions;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

mod build;
mod check;
mod report;

#[derive(Parser)]
#[command(name = "acorn")]
#[command(about = "Acorn compiler core", long_about = None)]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace); `ACORN_LOG` overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check units for errors without writing anything
    Check {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Lower units to textual IR
    Build {
        #[command(flatten)]
        input: InputArgs,

        /// Output file (default from Acorn.toml, else build/output.ll)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Unit files (JSON)
    #[arg(required = true)]
    units: Vec<PathBuf>,

    /// Configuration file (default: ./Acorn.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Module name written to the IR header
    #[arg(long)]
    module_name: Option<String>,

    /// Worker threads
    #[arg(short, long)]
    jobs: Option<usize>,
}

impl InputArgs {
    fn options(&self) -> Result<CompileOptions> {
        let mut options = match &self.config {
            Some(path) => CompileOptions::load(path)?,
            None => CompileOptions::discover(Path::new("."))?,
        };
        if let Some(name) = &self.module_name {
            options.module_name.clone_from(name);
        }
        if let Some(jobs) = self.jobs {
            anyhow::ensure!(jobs > 0, "--jobs must be at least 1");
            options.jobs = Some(jobs);
        }
        Ok(options)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("ACORN_LOG", level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Check { input } => {
            let options = input.options()?;
            check::check(&input.units, options)?;
        }
        Commands::Build { input, output } => {
            let mut options = input.options()?;
            if let Some(output) = output {
                options.output = output;
            }
            build::build(&input.units, options)?;
        }
    }

    Ok(())
}
