//! CLI command definitions
//!
//! `analyze` runs coordination failure detection over a recorded trace;
//! `inspect` lists its spans as a flat timeline.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

use agentdog_detector::{CoordinationFailureDetector, DetectorConfig, DetectorError, WorkflowMetadata};
use agentdog_span::Trace;

use crate::error::{CliError, Result};
use crate::output::{AnalysisOutput, InspectOutput, OutputFormat};
use crate::ExitCode;

/// AgentDog trace analysis CLI
///
/// Detect coordination failures in recorded multi-agent workflow traces.
#[derive(Parser, Debug)]
#[command(name = "agentdog")]
#[command(about = "AgentDog - Coordination failure detection for multi-agent traces", long_about = None)]
#[command(version)]
pub struct AgentdogCli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect coordination failures in a recorded trace
    ///
    /// Accepts either a trace document or a stored workflow document with
    /// `run_id` and `detailed_trace`.
    Analyze {
        /// Path to the trace file (json, yaml or yml)
        #[arg(short, long)]
        trace: PathBuf,

        /// Detector configuration file (json, yaml, yml or toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run id to report, overriding the one in the trace
        #[arg(long)]
        run_id: Option<String>,

        /// Workflow type, skipping inference from span names
        #[arg(short, long)]
        workflow_type: Option<String>,

        /// Output format for the report
        #[arg(long, value_enum, default_value = "table")]
        format: Option<OutputFormat>,
    },

    /// List the spans of a recorded trace with depth and start offset
    Inspect {
        /// Path to the trace file (json, yaml or yml)
        #[arg(short, long)]
        trace: PathBuf,

        /// Output format for the span listing
        #[arg(long, value_enum, default_value = "table")]
        format: Option<OutputFormat>,
    },
}

/// Dispatch a parsed command, rendering into `out`
pub fn execute(cli: AgentdogCli, out: &mut impl Write) -> Result<ExitCode> {
    let quiet = cli.quiet;
    match cli.command {
        Commands::Analyze {
            trace,
            config,
            run_id,
            workflow_type,
            format,
        } => execute_analyze(
            &trace,
            config.as_deref(),
            run_id,
            workflow_type,
            format.unwrap_or_default(),
            quiet,
            out,
        ),
        Commands::Inspect { trace, format } => {
            execute_inspect(&trace, format.unwrap_or_default(), quiet, out)
        }
    }
}

/// Execute the analyze command
pub fn execute_analyze(
    trace_path: &Path,
    config_path: Option<&Path>,
    run_id: Option<String>,
    workflow_type: Option<String>,
    format: OutputFormat,
    quiet: bool,
    out: &mut impl Write,
) -> Result<ExitCode> {
    let config = match config_path {
        Some(path) => DetectorConfig::from_file(path)?,
        None => DetectorConfig::default(),
    };
    let detector = CoordinationFailureDetector::new(config)?;

    let (trace, mut metadata) = split_document(load_document(trace_path)?)?;
    if run_id.is_some() {
        metadata.run_id = run_id;
    }
    if workflow_type.is_some() {
        metadata.workflow_type = workflow_type;
    }

    let result = detector.detect(&trace, &metadata)?;
    tracing::debug!(
        path = %trace_path.display(),
        failures = result.failure_count,
        "Analyzed trace file"
    );

    if !quiet {
        AnalysisOutput::from_result(&result).render(format, out)?;
    }
    Ok(ExitCode::from_detection(result.has_failures))
}

/// Execute the inspect command
pub fn execute_inspect(
    trace_path: &Path,
    format: OutputFormat,
    quiet: bool,
    out: &mut impl Write,
) -> Result<ExitCode> {
    let (trace, _) = split_document(load_document(trace_path)?)?;
    let output = InspectOutput::from_trace(&trace).ok_or(DetectorError::NoRoot)?;

    if !quiet {
        output.render(format, out)?;
    }
    Ok(ExitCode::Success)
}

/// Read a trace file into a JSON value, picking the parser from the extension
pub fn load_document(path: &Path) -> Result<Value> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let content = std::fs::read_to_string(path).map_err(|e| {
        CliError::file_error(format!("Failed to read trace file '{}': {}", path.display(), e))
    })?;

    match extension.as_str() {
        "json" => Ok(serde_json::from_str(&content)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
        _ => Err(CliError::invalid_input(format!(
            "Unsupported trace format: '{}'. Supported formats: json, yaml, yml",
            extension
        ))),
    }
}

/// Separate a loaded document into the trace and its run metadata.
///
/// Documents with a `detailed_trace` key are stored workflow documents;
/// anything else must be a trace document itself.
pub fn split_document(doc: Value) -> Result<(Trace, WorkflowMetadata)> {
    if doc.get("detailed_trace").is_some() {
        return WorkflowMetadata::from_workflow_document(&doc)
            .ok_or(CliError::Detector(DetectorError::NoRoot));
    }
    if !doc.is_object() {
        return Err(CliError::invalid_input("Trace document must be a mapping"));
    }

    let trace: Trace = serde_json::from_value(doc)?;
    let metadata = WorkflowMetadata {
        run_id: trace.run_id.clone(),
        workflow_type: None,
    };
    Ok((trace, metadata))
}
