//! AgentDog command-line front end
//!
//! Thin layer over `agentdog-span` and `agentdog-detector`: loads recorded
//! traces from disk, runs coordination failure detection, and renders the
//! results as a colored table, JSON or YAML.

pub mod commands;
pub mod error;
pub mod output;

pub use commands::{AgentdogCli, Commands};
pub use error::{CliError, Result};
pub use output::{AnalysisOutput, InspectOutput, OutputFormat};

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Analysis ran and found no failures
    Success = 0,
    /// Analysis ran and found at least one failure
    FailuresDetected = 1,
    /// The trace has no root span, nothing to analyze
    NoAnalysis = 2,
    /// Invalid input or arguments
    InvalidInput = 3,
    /// File not found or inaccessible
    FileError = 4,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Determine exit code from a detection outcome
    pub fn from_detection(has_failures: bool) -> Self {
        if has_failures {
            ExitCode::FailuresDetected
        } else {
            ExitCode::Success
        }
    }
}

/// Run the CLI with the given arguments and return the exit code
pub fn run(cli: AgentdogCli) -> Result<ExitCode> {
    let mut stdout = std::io::stdout();
    commands::execute(cli, &mut stdout)
}

/// Run the CLI, reporting errors on stderr.
///
/// # Example
///
/// ```no_run
/// use clap::Parser;
/// use agentdog_cli::{run_cli, AgentdogCli};
///
/// let cli = AgentdogCli::parse();
/// let exit_code = run_cli(cli);
/// std::process::exit(exit_code.into());
/// ```
pub fn run_cli(cli: AgentdogCli) -> ExitCode {
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}
