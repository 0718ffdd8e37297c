//! prep CLI - block-oriented text preprocessor.
//!
//! Expands one or more input files to stdout: conditionals resolved,
//! loops unrolled, includes inlined, defines substituted. Diagnostics go
//! to stderr; the exit code is non-zero on any expansion error.

mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use commands::ExpandArgs;
use output::Output;

/// prep - text preprocessor.
#[derive(Parser)]
#[command(name = "prep", version, about)]
struct Cli {
    #[command(flatten)]
    expand: ExpandArgs,
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new(cli.expand.verbose);

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.expand.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = cli.expand.execute() {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
