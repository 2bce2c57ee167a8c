//! Recovery snapshot that survives context compaction.
//!
//! One JSON document per project at `.compass/session-state.json`. The
//! pre-compaction hook refreshes its sprint block and stamps
//! `last_compaction`; everything else is carried over from the previous
//! snapshot unless a caller replaces it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::sprint_status::{SprintField, SprintStatus};

/// Directory under the project that holds Compass state.
pub const STATE_DIR: &str = ".compass";

const STATE_FILE: &str = "session-state.json";

/// Sentinel for sprint fields the status document did not define.
pub const UNKNOWN: &str = "unknown";

/// Errors that can occur when reading or writing the snapshot.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} is not a regular file")]
    NotAFile(PathBuf),
}

/// Sprint-level fields captured at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SprintSnapshot {
    pub workflow: String,
    pub status: String,
    pub current_phase: String,
    pub next_phase: String,
    pub quality_tier: String,
    pub scale: String,
}

impl Default for SprintSnapshot {
    fn default() -> Self {
        Self {
            workflow: UNKNOWN.to_string(),
            status: UNKNOWN.to_string(),
            current_phase: UNKNOWN.to_string(),
            next_phase: UNKNOWN.to_string(),
            quality_tier: UNKNOWN.to_string(),
            scale: UNKNOWN.to_string(),
        }
    }
}

impl SprintSnapshot {
    pub fn get(&self, field: SprintField) -> &str {
        match field {
            SprintField::Workflow => &self.workflow,
            SprintField::Status => &self.status,
            SprintField::CurrentPhase => &self.current_phase,
            SprintField::NextPhase => &self.next_phase,
            SprintField::QualityTier => &self.quality_tier,
            SprintField::Scale => &self.scale,
        }
    }
}

impl From<&SprintStatus> for SprintSnapshot {
    fn from(status: &SprintStatus) -> Self {
        let field = |f| status.get(f).unwrap_or(UNKNOWN).to_string();
        Self {
            workflow: field(SprintField::Workflow),
            status: field(SprintField::Status),
            current_phase: field(SprintField::CurrentPhase),
            next_phase: field(SprintField::NextPhase),
            quality_tier: field(SprintField::QualityTier),
            scale: field(SprintField::Scale),
        }
    }
}

/// The persisted snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Time of the most recent pre-compaction write.
    pub last_compaction: Option<DateTime<Utc>>,
    pub sprint: SprintSnapshot,
    /// Agent id to opaque task handle.
    pub active_agents: BTreeMap<String, String>,
    pub pending_decisions: Vec<String>,
    pub notes: String,
}

/// Caller-supplied replacements applied during a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateOverrides {
    pub active_agents: Option<BTreeMap<String, String>>,
    pub pending_decisions: Option<Vec<String>>,
    pub notes: Option<String>,
}

impl SessionState {
    /// Decodes each top-level field independently; a field with the wrong
    /// shape falls back to its default without discarding the others.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        fn field<T>(obj: &serde_json::Map<String, Value>, key: &str) -> T
        where
            T: DeserializeOwned + Default,
        {
            obj.get(key)
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default()
        }

        Self {
            last_compaction: field(obj, "last_compaction"),
            sprint: field(obj, "sprint"),
            active_agents: field(obj, "active_agents"),
            pending_decisions: field(obj, "pending_decisions"),
            notes: field(obj, "notes"),
        }
    }

    /// Applies the merge rule: the sprint block is replaced, `last_compaction`
    /// moves forward, and the remaining fields survive unless overridden.
    pub fn merge(
        self,
        fresh: SprintSnapshot,
        overrides: StateOverrides,
        now: DateTime<Utc>,
    ) -> Self {
        let last_compaction = match self.last_compaction {
            Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
            _ => now,
        };

        Self {
            last_compaction: Some(last_compaction),
            sprint: fresh,
            active_agents: overrides.active_agents.unwrap_or(self.active_agents),
            pending_decisions: overrides.pending_decisions.unwrap_or(self.pending_decisions),
            notes: overrides.notes.unwrap_or(self.notes),
        }
    }

    pub fn start_agent(&mut self, agent: &str, task: &str) {
        self.active_agents
            .insert(agent.trim().to_string(), task.trim().to_string());
    }

    /// Removes `agent` (case-insensitively) and returns its task handle.
    pub fn stop_agent(&mut self, agent: &str) -> Option<String> {
        let wanted = agent.trim();
        let key = self
            .active_agents
            .keys()
            .find(|known| known.eq_ignore_ascii_case(wanted))?
            .clone();
        self.active_agents.remove(&key)
    }

    pub fn add_decision(&mut self, decision: &str) {
        let decision = decision.trim();
        if !decision.is_empty() {
            self.pending_decisions.push(decision.to_string());
        }
    }

    /// Resolves a decision by its exact text or by 1-based position.
    pub fn resolve_decision(&mut self, selector: &str) -> Option<String> {
        let selector = selector.trim();
        let index = self
            .pending_decisions
            .iter()
            .position(|d| d == selector)
            .or_else(|| {
                selector
                    .parse::<usize>()
                    .ok()
                    .filter(|n| (1..=self.pending_decisions.len()).contains(n))
                    .map(|n| n - 1)
            })?;
        Some(self.pending_decisions.remove(index))
    }
}

/// Reads and writes the snapshot for one project directory.
#[derive(Debug, Clone)]
pub struct SessionStateStore {
    path: PathBuf,
}

impl SessionStateStore {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            path: project_dir.as_ref().join(STATE_DIR).join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot, substituting defaults for anything unreadable.
    pub fn load(&self) -> SessionState {
        match self.try_load() {
            Ok(state) => state,
            Err(err) => {
                tracing::debug!(
                    "Ignoring unreadable session state at {}: {}",
                    self.path.display(),
                    err
                );
                SessionState::default()
            }
        }
    }

    /// Loads the snapshot. A missing or blank file is an empty state.
    pub fn try_load(&self) -> Result<SessionState, StateError> {
        if !self.path.exists() {
            return Ok(SessionState::default());
        }
        if !self.path.is_file() {
            return Err(StateError::NotAFile(self.path.clone()));
        }

        let bytes = fs::read(&self.path)?;
        let content = String::from_utf8_lossy(&bytes);
        if content.trim().is_empty() {
            return Ok(SessionState::default());
        }
        let value: Value = serde_json::from_str(&content)?;
        Ok(SessionState::from_value(&value))
    }

    /// Loads the prior snapshot and merges fresh sprint fields into it.
    pub fn load_and_merge(&self, fresh: SprintSnapshot, overrides: StateOverrides) -> SessionState {
        self.load().merge(fresh, overrides, Utc::now())
    }

    /// Best-effort write; returns whether the snapshot reached disk.
    pub fn persist(&self, state: &SessionState) -> bool {
        match self.try_persist(state) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(
                    "Failed to persist session state to {}: {}",
                    self.path.display(),
                    err
                );
                false
            }
        }
    }

    /// Writes a sibling temp file and renames it over the snapshot so readers
    /// never observe a partial document.
    pub fn try_persist(&self, state: &SessionState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut json = serde_json::to_string_pretty(state)?;
        json.push('\n');

        let tmp = self
            .path
            .with_file_name(format!("{STATE_FILE}.{}.tmp", std::process::id()));
        fs::write(&tmp, json)?;
        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    /// Loads, edits and writes the snapshot without touching
    /// `last_compaction`.
    pub fn update<F>(&self, edit: F) -> Result<SessionState, StateError>
    where
        F: FnOnce(&mut SessionState),
    {
        let mut state = self.load();
        edit(&mut state);
        self.try_persist(&state)?;
        Ok(state)
    }
}
