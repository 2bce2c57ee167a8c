//! Append-only hook telemetry.
//!
//! Every hook invocation appends records to `<root>/logs/hook-events.jsonl`:
//! - **One record per line**: each line is a self-contained JSON object, so a
//!   damaged line never invalidates its neighbours
//! - **Atomic appends**: a record is written with a single `write_all` on an
//!   `O_APPEND` handle, which keeps concurrent hook processes from interleaving
//! - **Never fails the hook**: [`EventLogger::record`] swallows every error
//!
//! The log is never truncated or rotated here; rotation belongs to deployment.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::HookConfig;

/// Field names owned by the record itself; metadata may not overwrite them.
const RESERVED_KEYS: [&str; 5] = ["timestamp", "event", "hook", "duration_ms", "error"];

/// Directories this process has already created.
///
/// Once a directory is in here it is never checked again, so a directory
/// removed mid-process is not recreated and later appends fail silently.
static READY_DIRS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();

/// Errors that can occur while appending or reading telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Lifecycle event kinds. Unknown names read back as [`HookEvent::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    HookStart,
    HookEnd,
    HookError,
    #[serde(untagged)]
    Other(String),
}

impl HookEvent {
    pub fn as_str(&self) -> &str {
        match self {
            HookEvent::HookStart => "hook_start",
            HookEvent::HookEnd => "hook_end",
            HookEvent::HookError => "hook_error",
            HookEvent::Other(name) => name,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "hook_start" => HookEvent::HookStart,
            "hook_end" => HookEvent::HookEnd,
            "hook_error" => HookEvent::HookError,
            other => HookEvent::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single telemetry line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,

    pub event: HookEvent,

    pub hook: String,

    #[serde(default)]
    pub duration_ms: u64,

    /// Present only on `hook_error` records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Free-form caller data, merged into the top level of the record.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl TelemetryRecord {
    /// Creates a record stamped with the current time.
    ///
    /// An empty hook id is recorded as `unknown`, `error` is dropped for
    /// events other than `hook_error`, and metadata keys that collide with
    /// record fields are discarded.
    pub fn new(
        event: HookEvent,
        hook: &str,
        duration_ms: u64,
        error: Option<String>,
        mut metadata: Map<String, Value>,
    ) -> Self {
        let hook = match hook.trim() {
            "" => "unknown".to_string(),
            trimmed => trimmed.to_string(),
        };
        for key in RESERVED_KEYS {
            metadata.remove(key);
        }
        let error = if event == HookEvent::HookError {
            error
        } else {
            None
        };

        Self {
            timestamp: Utc::now(),
            event,
            hook,
            duration_ms,
            error,
            metadata,
        }
    }
}

/// Converts a caller-supplied millisecond value into a recordable duration.
///
/// Negative, NaN and infinite inputs become 0; fractions are truncated.
pub fn duration_ms_from_f64(ms: f64) -> u64 {
    if !ms.is_finite() || ms <= 0.0 {
        return 0;
    }
    if ms >= u64::MAX as f64 {
        return u64::MAX;
    }
    ms as u64
}

/// Appends telemetry records to a JSONL file.
#[derive(Debug, Clone)]
pub struct EventLogger {
    path: PathBuf,
}

impl EventLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Logger writing to the configured installation's telemetry file.
    pub fn from_config(config: &HookConfig) -> Self {
        Self::new(config.telemetry_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records one lifecycle event. Never fails.
    pub fn record(
        &self,
        event: HookEvent,
        hook: &str,
        duration_ms: u64,
        metadata: Map<String, Value>,
    ) {
        self.append(&TelemetryRecord::new(event, hook, duration_ms, None, metadata));
    }

    pub fn record_start(&self, hook: &str) {
        self.append(&TelemetryRecord::new(
            HookEvent::HookStart,
            hook,
            0,
            None,
            Map::new(),
        ));
    }

    pub fn record_end(&self, hook: &str, duration_ms: u64) {
        self.append(&TelemetryRecord::new(
            HookEvent::HookEnd,
            hook,
            duration_ms,
            None,
            Map::new(),
        ));
    }

    pub fn record_error(&self, hook: &str, duration_ms: u64, error: &str) {
        self.append(&TelemetryRecord::new(
            HookEvent::HookError,
            hook,
            duration_ms,
            Some(error.to_string()),
            Map::new(),
        ));
    }

    /// Appends a prepared record, swallowing any failure.
    pub fn append(&self, record: &TelemetryRecord) {
        if let Err(err) = self.try_append(record) {
            tracing::debug!("Dropped telemetry record for {}: {}", record.hook, err);
        }
    }

    /// Appends a prepared record, reporting failures.
    pub fn try_append(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            ensure_dir(parent)?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        Ok(())
    }

    /// Reads every parseable record, returning them with the count of skipped
    /// lines.
    pub fn read_all(&self) -> Result<(Vec<TelemetryRecord>, usize), TelemetryError> {
        if !self.path.exists() {
            return Ok((Vec::new(), 0));
        }

        let bytes = fs::read(&self.path)?;
        let content = String::from_utf8_lossy(&bytes);

        let mut records = Vec::new();
        let mut malformed = 0;
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TelemetryRecord>(line) {
                Ok(record) => records.push(record),
                Err(_) => malformed += 1,
            }
        }

        Ok((records, malformed))
    }

    /// Aggregates the log into per-hook statistics.
    pub fn summary(&self) -> Result<TelemetrySummary, TelemetryError> {
        let (records, malformed_lines) = self.read_all()?;

        let mut summary = TelemetrySummary {
            malformed_lines,
            ..TelemetrySummary::default()
        };

        for record in &records {
            summary.records += 1;
            if summary.first.is_none_or(|first| record.timestamp < first) {
                summary.first = Some(record.timestamp);
            }
            if summary.last.is_none_or(|last| record.timestamp > last) {
                summary.last = Some(record.timestamp);
            }

            let stats = summary.hooks.entry(record.hook.clone()).or_default();
            match record.event {
                HookEvent::HookStart => stats.starts += 1,
                HookEvent::HookEnd => {
                    stats.ends += 1;
                    stats.add_duration(record.duration_ms);
                }
                HookEvent::HookError => {
                    stats.errors += 1;
                    stats.add_duration(record.duration_ms);
                    stats.last_error.clone_from(&record.error);
                }
                HookEvent::Other(_) => stats.other += 1,
            }
        }

        Ok(summary)
    }
}

fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    let ready = READY_DIRS.get_or_init(|| Mutex::new(HashSet::new()));
    let mut ready = ready.lock().unwrap_or_else(PoisonError::into_inner);
    if ready.contains(dir) {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    ready.insert(dir.to_path_buf());
    Ok(())
}

/// Per-hook counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HookStats {
    pub starts: u64,
    pub ends: u64,
    pub errors: u64,
    pub other: u64,
    pub total_duration_ms: u64,
    pub max_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl HookStats {
    fn add_duration(&mut self, duration_ms: u64) {
        self.total_duration_ms = self.total_duration_ms.saturating_add(duration_ms);
        self.max_duration_ms = self.max_duration_ms.max(duration_ms);
    }

    /// Mean duration over finished (`hook_end` + `hook_error`) invocations.
    pub fn average_duration_ms(&self) -> u64 {
        let finished = self.ends + self.errors;
        if finished == 0 {
            0
        } else {
            self.total_duration_ms / finished
        }
    }
}

/// Summary statistics for a telemetry log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetrySummary {
    /// Number of parseable records.
    pub records: u64,

    /// Lines that failed to parse and were skipped.
    pub malformed_lines: usize,

    /// Earliest record timestamp.
    pub first: Option<DateTime<Utc>>,

    /// Latest record timestamp.
    pub last: Option<DateTime<Utc>>,

    /// Counters keyed by hook id.
    pub hooks: BTreeMap<String, HookStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn temp_logger() -> (TempDir, EventLogger) {
        let dir = TempDir::new().unwrap();
        let logger = EventLogger::new(dir.path().join("logs").join("hook-events.jsonl"));
        (dir, logger)
    }

    fn lines(logger: &EventLogger) -> Vec<Value> {
        let content = fs::read_to_string(logger.path()).unwrap();
        content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_record_creates_directory_and_appends() {
        let (_dir, logger) = temp_logger();

        logger.record_start("session-start");
        logger.record_end("session-start", 42);

        let parsed = lines(&logger);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["event"], "hook_start");
        assert_eq!(parsed[0]["duration_ms"], 0);
        assert_eq!(parsed[1]["event"], "hook_end");
        assert_eq!(parsed[1]["duration_ms"], 42);
        assert_eq!(parsed[1]["hook"], "session-start");
    }

    #[test]
    fn test_serialization_format() {
        let (_dir, logger) = temp_logger();
        logger.record_error("pre-compact", 7, "disk full");

        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(content.ends_with('\n'));
        let value: Value = serde_json::from_str(content.trim_end()).unwrap();
        for key in ["timestamp", "event", "hook", "duration_ms", "error"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        let ts = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
        assert_eq!(value["error"], "disk full");
    }

    #[test]
    fn test_metadata_is_merged_without_overriding_fields() {
        let (_dir, logger) = temp_logger();
        let metadata = json!({"agent": "dev", "hook": "spoofed", "duration_ms": -3})
            .as_object()
            .cloned()
            .unwrap();

        logger.record(HookEvent::HookEnd, "subagent-stop", 5, metadata);

        let parsed = lines(&logger);
        assert_eq!(parsed[0]["agent"], "dev");
        assert_eq!(parsed[0]["hook"], "subagent-stop");
        assert_eq!(parsed[0]["duration_ms"], 5);
    }

    #[test]
    fn test_error_only_kept_on_hook_error() {
        let record = TelemetryRecord::new(
            HookEvent::HookEnd,
            "x",
            1,
            Some("ignored".to_string()),
            Map::new(),
        );
        assert!(record.error.is_none());
    }

    #[test]
    fn test_empty_hook_id_recorded_as_unknown() {
        let record = TelemetryRecord::new(HookEvent::HookStart, "  ", 0, None, Map::new());
        assert_eq!(record.hook, "unknown");
    }

    #[test]
    fn test_unknown_event_round_trips() {
        let record = TelemetryRecord::new(
            HookEvent::parse("probe_skipped"),
            "pre-tool-use",
            0,
            None,
            Map::new(),
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"event\":\"probe_skipped\""));

        let parsed: TelemetryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event, HookEvent::Other("probe_skipped".to_string()));
    }

    #[test]
    fn test_damaged_line_does_not_hide_siblings() {
        let (_dir, logger) = temp_logger();
        logger.record_start("a");
        let mut file = OpenOptions::new().append(true).open(logger.path()).unwrap();
        file.write_all(b"{\"timestamp\": \"trunc\n\xff\xfe garbage\n").unwrap();
        logger.record_end("a", 3);

        let (records, malformed) = logger.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(malformed, 2);
    }

    #[test]
    fn test_duration_sanitizer() {
        assert_eq!(duration_ms_from_f64(12.9), 12);
        assert_eq!(duration_ms_from_f64(0.0), 0);
        assert_eq!(duration_ms_from_f64(-5.0), 0);
        assert_eq!(duration_ms_from_f64(f64::NAN), 0);
        assert_eq!(duration_ms_from_f64(f64::INFINITY), 0);
        assert_eq!(duration_ms_from_f64(f64::NEG_INFINITY), 0);
        assert_eq!(duration_ms_from_f64(1e30), u64::MAX);
    }

    #[test]
    fn test_unwritable_location_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();

        let logger = EventLogger::new(blocker.join("logs").join("events.jsonl"));
        logger.record_start("session-start");
        let record = TelemetryRecord::new(
            HookEvent::HookStart,
            "session-start",
            0,
            None,
            Map::new(),
        );
        assert!(logger.try_append(&record).is_err());
    }

    #[test]
    fn test_removed_directory_is_not_recreated() {
        let (dir, logger) = temp_logger();
        logger.record_start("session-start");

        fs::remove_dir_all(dir.path().join("logs")).unwrap();
        logger.record_end("session-start", 1);

        assert!(!dir.path().join("logs").exists());
    }

    #[test]
    fn test_read_missing_file() {
        let (_dir, logger) = temp_logger();
        let (records, malformed) = logger.read_all().unwrap();
        assert!(records.is_empty());
        assert_eq!(malformed, 0);
    }

    #[test]
    fn test_summary() {
        let (_dir, logger) = temp_logger();

        logger.record_start("pre-compact");
        logger.record_end("pre-compact", 10);
        logger.record_start("pre-compact");
        logger.record_error("pre-compact", 30, "boom");
        logger.record_start("session-start");
        logger.record_end("session-start", 4);
        logger.record(
            HookEvent::Other("custom".to_string()),
            "session-start",
            0,
            Map::new(),
        );

        let summary = logger.summary().unwrap();
        assert_eq!(summary.records, 7);
        assert_eq!(summary.malformed_lines, 0);
        assert!(summary.first.unwrap() <= summary.last.unwrap());

        let compact = &summary.hooks["pre-compact"];
        assert_eq!(compact.starts, 2);
        assert_eq!(compact.ends, 1);
        assert_eq!(compact.errors, 1);
        assert_eq!(compact.average_duration_ms(), 20);
        assert_eq!(compact.max_duration_ms, 30);
        assert_eq!(compact.last_error.as_deref(), Some("boom"));

        let start = &summary.hooks["session-start"];
        assert_eq!(start.other, 1);
        assert_eq!(start.average_duration_ms(), 4);
    }
}
