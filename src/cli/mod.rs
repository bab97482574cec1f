//! CLI tools for gantry
//!
//! - `check`: Validate a stage graph definition without running it
//! - `run`: Execute a stage graph definition and emit the run report
//! - `completions`: Generate shell completions

pub mod check;
pub mod completions;
pub mod run;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for gantry
#[derive(Parser, Debug)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a definition file without running it
    Check {
        /// Definition file (YAML, or JSON with a .json extension)
        file: PathBuf,
    },

    /// Run a definition file and emit the run report as JSON
    Run {
        /// Definition file (YAML, or JSON with a .json extension)
        file: PathBuf,
        /// Worker-pool size for parallel groups; defaults to the
        /// definition's largest declared fan-out
        #[arg(long)]
        max_parallel: Option<usize>,
        /// Default per-step timeout in seconds
        #[arg(long)]
        step_timeout: Option<u64>,
        /// Command whose stdout becomes the checked-out revision id
        #[arg(long)]
        checkout_command: Option<String>,
        /// Report output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

/// Parse and execute CLI arguments
pub fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Check { file } => {
            check::check_definition(&file)?;
        }
        Command::Run {
            file,
            max_parallel,
            step_timeout,
            checkout_command,
            output,
        } => {
            let options = run::RunOptions {
                max_parallel,
                step_timeout,
                checkout_command,
                output,
            };
            let status = run::run_definition(&file, &options)?;
            if !status.is_succeeded() {
                anyhow::bail!("run finished {status}");
            }
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                println!("{}", completions);
            }
        }
    }

    Ok(())
}
