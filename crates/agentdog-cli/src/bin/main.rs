//! AgentDog CLI
//!
//! # Usage
//!
//! ```bash
//! # Detect coordination failures in a recorded trace
//! agentdog analyze --trace run.json --format table
//!
//! # Analyze a stored workflow document with a custom detector config
//! agentdog analyze --trace workflow.yaml --config detector.toml --format json
//!
//! # List spans with depth and start offset
//! agentdog inspect --trace run.json
//! ```
//!
//! # Exit Codes
//!
//! - 0: No failures detected
//! - 1: Failures detected
//! - 2: No analysis possible (trace has no root span)
//! - 3: Invalid input or arguments
//! - 4: File not found or inaccessible
//! - 10: Internal error

use clap::Parser;
use agentdog_cli::{run_cli, AgentdogCli};

fn main() {
    let cli = AgentdogCli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = run_cli(cli);
    std::process::exit(exit_code.into());
}
