//! # compass-core
//!
//! Core functionality behind the Compass lifecycle hooks.
//!
//! This crate provides:
//! - An append-only JSONL telemetry log and the hook instrumentation wrapper
//! - A bounded-time health probe for the companion memory service, with
//!   degraded-mode notices when it is unreachable
//! - The session-state snapshot that survives context compaction
//! - Field extraction from the sprint-status document and the agent pipeline
//!   router
//! - Hook handlers that turn all of the above into host output envelopes
//! - Installation preflight checks for `compass doctor`

pub mod config;
pub mod fallback;
pub mod health;
pub mod hooks;
pub mod instrument;
pub mod preflight;
pub mod routing;
pub mod session_state;
pub mod sprint_status;
pub mod telemetry;
mod text;

pub use config::{ConfigError, DEFAULT_MEMORY_PORT, HookConfig};
pub use fallback::{
    FALLBACK_PREFIX, fallback_message, fallback_message_for_value, is_fallback_message,
};
pub use health::HealthProbe;
pub use hooks::HookRunner;
pub use instrument::{instrument, instrument_async};
pub use preflight::{CheckResult, CheckStatus, InstallCheck, PreflightReport, PreflightRunner};
pub use routing::{GENERIC_NEXT_STEP, KNOWN_AGENTS, next_step};
pub use session_state::{
    SessionState, SessionStateStore, SprintSnapshot, StateError, StateOverrides,
};
pub use sprint_status::{
    SprintField, SprintStatus, StoryProgress, StoryRecord, StoryStatus, extract_field,
};
pub use telemetry::{
    EventLogger, HookEvent, TelemetryError, TelemetryRecord, TelemetrySummary,
    duration_ms_from_f64,
};
pub use text::truncate_with_ellipsis;
