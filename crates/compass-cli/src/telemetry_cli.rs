//! CLI commands for the `compass telemetry` namespace.
//!
//! - `record`: append one event from a shell-based hook
//! - `summary`: aggregate the log per hook

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use compass_core::{
    EventLogger, HookConfig, HookEvent, TelemetryRecord, TelemetrySummary, duration_ms_from_f64,
};
use serde_json::{Map, Value};

use crate::OutputFormat;

#[derive(Parser, Debug)]
pub struct TelemetryArgs {
    #[command(subcommand)]
    pub command: TelemetryCommands,
}

#[derive(Subcommand, Debug)]
pub enum TelemetryCommands {
    /// Append one event to the telemetry log (never fails)
    Record(RecordArgs),

    /// Summarise the telemetry log per hook
    Summary(SummaryArgs),
}

#[derive(Parser, Debug)]
pub struct RecordArgs {
    /// Event name (hook_start, hook_end, hook_error, or a custom name)
    pub event: String,

    /// Hook identifier
    pub hook: String,

    /// Elapsed milliseconds; fractional, negative and non-finite values are
    /// accepted and normalised
    #[arg(long, allow_hyphen_values = true)]
    pub duration_ms: Option<f64>,

    /// Error message (kept only for hook_error)
    #[arg(long)]
    pub error: Option<String>,

    /// Extra metadata as key=value; values that parse as JSON keep their type
    #[arg(long = "meta", value_parser = parse_meta)]
    pub meta: Vec<(String, Value)>,
}

#[derive(Parser, Debug)]
pub struct SummaryArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

pub fn execute(args: TelemetryArgs) -> Result<()> {
    let logger = EventLogger::from_config(HookConfig::global());
    match args.command {
        TelemetryCommands::Record(record_args) => {
            record_command(&logger, record_args);
            Ok(())
        }
        TelemetryCommands::Summary(summary_args) => summary_command(&logger, &summary_args),
    }
}

fn record_command(logger: &EventLogger, args: RecordArgs) {
    let metadata: Map<String, Value> = args.meta.into_iter().collect();
    let record = TelemetryRecord::new(
        HookEvent::parse(&args.event),
        &args.hook,
        args.duration_ms.map_or(0, duration_ms_from_f64),
        args.error,
        metadata,
    );
    logger.append(&record);
}

fn summary_command(logger: &EventLogger, args: &SummaryArgs) -> Result<()> {
    let summary = logger
        .summary()
        .with_context(|| format!("Failed to read {}", logger.path().display()))?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Table => print_summary(logger, &summary),
    }
    Ok(())
}

fn print_summary(logger: &EventLogger, summary: &TelemetrySummary) {
    println!("Telemetry: {}", logger.path().display());
    println!(
        "Records: {} ({} malformed line(s) skipped)",
        summary.records, summary.malformed_lines
    );
    if let (Some(first), Some(last)) = (summary.first, summary.last) {
        println!("Span: {} .. {}", first.to_rfc3339(), last.to_rfc3339());
    }
    if summary.hooks.is_empty() {
        return;
    }

    println!();
    let width = summary.hooks.keys().map(String::len).max().unwrap_or(4).max(4);
    println!(
        "  {:<width$} {:>7} {:>7} {:>7} {:>9} {:>9}",
        "HOOK", "STARTS", "ENDS", "ERRORS", "AVG MS", "MAX MS"
    );
    for (hook, stats) in &summary.hooks {
        println!(
            "  {:<width$} {:>7} {:>7} {:>7} {:>9} {:>9}",
            hook,
            stats.starts,
            stats.ends,
            stats.errors,
            stats.average_duration_ms(),
            stats.max_duration_ms
        );
        if let Some(error) = &stats.last_error {
            println!("      last error: {error}");
        }
    }
}

fn parse_meta(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty metadata key in {raw:?}"));
    }
    let value = serde_json::from_str::<Value>(value)
        .ok()
        .filter(|v| !v.is_object() && !v.is_array())
        .unwrap_or_else(|| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_meta_values() {
        assert_eq!(parse_meta("attempt=3"), Ok(("attempt".to_string(), json!(3))));
        assert_eq!(parse_meta("ok=true"), Ok(("ok".to_string(), json!(true))));
        assert_eq!(
            parse_meta("tool=mcp__memory__store"),
            Ok(("tool".to_string(), json!("mcp__memory__store")))
        );
        assert_eq!(parse_meta("expr=a=b"), Ok(("expr".to_string(), json!("a=b"))));
        assert_eq!(parse_meta("list=[1]"), Ok(("list".to_string(), json!("[1]"))));
    }

    #[test]
    fn test_parse_meta_rejects_malformed() {
        assert!(parse_meta("novalue").is_err());
        assert!(parse_meta(" =x").is_err());
    }
}
