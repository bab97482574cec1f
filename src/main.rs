//! gantry - CLI for the stage graph orchestration engine
//!
//! ## Commands
//!
//! - `gantry check` - Validate a definition file without running it
//! - `gantry run` - Execute a definition file and emit the run report
//! - `gantry completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Validate a definition
//! gantry check ci.yaml
//!
//! # Run it, writing the report next to it
//! gantry run ci.yaml -o report.json
//!
//! # Generate shell completions
//! gantry completions bash > /etc/bash_completion.d/gantry
//! ```

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    // Initialize tracing for debugging
    if std::env::var("GANTRY_DEBUG").is_ok() {
        gantry::init_logging("debug");
    }

    // Run the CLI
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if std::env::var("GANTRY_VERBOSE").is_ok() {
                eprintln!("{:?}", e);
            }
            ExitCode::FAILURE
        }
    }
}
