//! Output formatting for the agentdog CLI
//!
//! Reports render as JSON, YAML, or a human-readable table with
//! severity-based coloring.

use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::io::Write;

use agentdog_detector::{DetectionResult, FailureRecord, Severity};
use agentdog_span::{views, SpanStatus, SpanView, Trace};

use crate::error::{CliError, Result};

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
    /// YAML format
    Yaml,
}

fn write_json(value: &impl Serialize, out: &mut impl Write) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::SerializationError(e.to_string()))?;
    writeln!(out, "{}", json)?;
    Ok(())
}

fn write_yaml(value: &impl Serialize, out: &mut impl Write) -> Result<()> {
    let yaml =
        serde_yaml::to_string(value).map_err(|e| CliError::SerializationError(e.to_string()))?;
    write!(out, "{}", yaml)?;
    Ok(())
}

fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::High => "HIGH".red().bold(),
        Severity::Medium => "MEDIUM".yellow().bold(),
        Severity::Low => "LOW".blue(),
    }
}

fn health_colored(score: f64) -> ColoredString {
    let text = format!("{:.0}/100", score);
    if score >= 80.0 {
        text.green().bold()
    } else if score >= 50.0 {
        text.yellow().bold()
    } else {
        text.red().bold()
    }
}

/// Detection report for rendering
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct AnalysisOutput<'a> {
    result: &'a DetectionResult,
}

impl<'a> AnalysisOutput<'a> {
    pub fn from_result(result: &'a DetectionResult) -> Self {
        Self { result }
    }

    /// Render output in the specified format
    pub fn render(&self, format: OutputFormat, out: &mut impl Write) -> Result<()> {
        match format {
            OutputFormat::Json => write_json(self, out),
            OutputFormat::Yaml => write_yaml(self, out),
            OutputFormat::Table => self.render_table(out),
        }
    }

    fn render_table(&self, out: &mut impl Write) -> Result<()> {
        let result = self.result;
        let summary = &result.summary;

        writeln!(out)?;
        writeln!(out, "{}", "Coordination Analysis".cyan().bold())?;
        writeln!(out, "{}", "=".repeat(60))?;
        writeln!(out)?;

        writeln!(out, "  Run:           {}", result.run_id.as_deref().unwrap_or("-"))?;
        writeln!(out, "  Workflow type: {}", result.workflow_type)?;
        writeln!(out, "  Health score:  {}", health_colored(summary.health_score))?;
        writeln!(out)?;

        if !result.has_failures {
            writeln!(out, "{} No coordination failures detected", "+".green())?;
            return Ok(());
        }

        writeln!(
            out,
            "{} {} failure(s), {} critical",
            "x".red(),
            result.failure_count,
            summary.critical_issues
        )?;
        writeln!(out)?;

        writeln!(out, "{}", "By severity:".cyan().bold())?;
        for (severity, count) in summary.by_severity.iter().rev() {
            writeln!(out, "  {:<8} {}", severity_label(*severity), count)?;
        }
        writeln!(out)?;

        writeln!(out, "{}", "Failures:".cyan().bold())?;
        writeln!(out, "{}", "-".repeat(60))?;
        for (index, failure) in result.failures.iter().enumerate() {
            Self::render_failure(failure, index + 1, out)?;
        }

        out.flush()?;
        Ok(())
    }

    fn render_failure(failure: &FailureRecord, index: usize, out: &mut impl Write) -> Result<()> {
        writeln!(out)?;
        writeln!(
            out,
            "{}. {} [{}] {}",
            index,
            severity_label(failure.severity),
            failure.subtype.as_str().dimmed(),
            failure.message
        )?;
        writeln!(
            out,
            "   {} {} ({})",
            "Span:".dimmed(),
            failure.span_name.cyan(),
            failure.span_id.dimmed()
        )?;
        for (key, value) in &failure.evidence {
            writeln!(out, "   {} {} = {}", "Evidence:".dimmed(), key, value)?;
        }
        Ok(())
    }
}

/// Flat span listing of a recorded trace
#[derive(Debug, Clone, Serialize)]
pub struct InspectOutput {
    pub run_id: Option<String>,
    pub total_spans: usize,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub max_depth: usize,
    pub spans: Vec<SpanView>,
}

impl InspectOutput {
    /// Build the listing; `None` when the trace has no root span.
    pub fn from_trace(trace: &Trace) -> Option<Self> {
        let spans = views(trace.root()?);
        Some(Self {
            run_id: trace.run_id.clone(),
            total_spans: spans.len(),
            total_tokens: spans.iter().filter_map(|v| v.span.tokens_total).sum(),
            total_cost_usd: spans.iter().filter_map(|v| v.span.cost_usd).sum(),
            max_depth: spans.iter().map(|v| v.depth).max().unwrap_or(0),
            spans,
        })
    }

    /// Render output in the specified format
    pub fn render(&self, format: OutputFormat, out: &mut impl Write) -> Result<()> {
        match format {
            OutputFormat::Json => write_json(self, out),
            OutputFormat::Yaml => write_yaml(self, out),
            OutputFormat::Table => self.render_table(out),
        }
    }

    fn render_table(&self, out: &mut impl Write) -> Result<()> {
        writeln!(out)?;
        writeln!(out, "{}", "Trace Spans".cyan().bold())?;
        writeln!(out, "{}", "=".repeat(60))?;
        writeln!(out)?;
        writeln!(
            out,
            "  Run: {}  Spans: {}  Tokens: {}  Cost: ${:.4}",
            self.run_id.as_deref().unwrap_or("-"),
            self.total_spans,
            self.total_tokens,
            self.total_cost_usd
        )?;
        writeln!(out)?;

        for view in &self.spans {
            let span = &view.span;
            let status = match span.status {
                Some(SpanStatus::Success) => "ok".green(),
                Some(SpanStatus::Error) => "error".red(),
                Some(SpanStatus::Running) => "running".yellow(),
                None => "-".dimmed(),
            };
            let offset = view
                .start_offset_ms
                .map(|ms| format!("+{}ms", ms))
                .unwrap_or_else(|| "-".to_string());
            let duration = span
                .duration_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_else(|| "-".to_string());
            let span_type = span
                .span_type
                .as_ref()
                .map(|t| t.as_str().to_string())
                .unwrap_or_else(|| "-".to_string());

            writeln!(
                out,
                "{:>9} {}{} {} {} {}",
                offset.dimmed(),
                "  ".repeat(view.depth),
                span.name.bold(),
                format!("[{}]", span_type).cyan(),
                duration,
                status
            )?;
        }

        out.flush()?;
        Ok(())
    }
}
