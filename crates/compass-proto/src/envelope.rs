//! Input and output envelopes of a hook invocation.
//!
//! The host writes zero or one JSON object to a hook's stdin and expects
//! exactly one JSON object back on stdout. Input is read field by field so a
//! single mistyped field never discards the rest of the payload.

use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::HookKind;

/// The subset of the host's input payload that hooks consume.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookInput {
    pub session_id: Option<String>,
    pub cwd: Option<PathBuf>,
    pub hook_event_name: Option<String>,
    /// Session start source: `startup`, `resume`, `clear` or `compact`.
    pub source: Option<String>,
    pub tool_name: Option<String>,
    /// Identifier of the sub-agent that just finished.
    pub agent: Option<String>,
    /// Compaction trigger: `manual` or `auto`.
    pub trigger: Option<String>,
}

impl HookInput {
    /// Parses raw stdin, substituting an empty input for anything that is not
    /// a JSON object.
    pub fn parse_lenient(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => Self::from_value(&value),
            Err(_) => Self::default(),
        }
    }

    /// Extracts known fields from a JSON value; non-string fields are ignored.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            session_id: text("session_id"),
            cwd: text("cwd").map(PathBuf::from),
            hook_event_name: text("hook_event_name"),
            source: text("source"),
            tool_name: text("tool_name"),
            agent: text("agent_type")
                .or_else(|| text("subagent_type"))
                .or_else(|| text("agent_name"))
                .or_else(|| text("agent_id")),
            trigger: text("trigger"),
        }
    }
}

/// Permission decision for a pending tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Block,
}

/// Whether the host should carry on after a sub-agent finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookVerdict {
    Continue,
    Stop,
}

/// Body of the `hookSpecificOutput` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

/// The single JSON object a hook writes to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HookOutput {
    /// `{"hookSpecificOutput": {...}}`
    Specific {
        #[serde(rename = "hookSpecificOutput")]
        hook_specific_output: HookSpecificOutput,
    },
    /// `{"result": ..., "message": ...}`
    Verdict { result: HookVerdict, message: String },
    /// `{"decision": ..., "reason"?: ...}`
    Decision {
        decision: Decision,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl HookOutput {
    /// Context injected into the conversation for `kind`.
    pub fn context(kind: HookKind, context: impl Into<String>) -> Self {
        Self::Specific {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: kind.event_name().to_string(),
                additional_context: Some(context.into()),
                status_message: None,
            },
        }
    }

    /// Status line shown by the host for `kind`.
    pub fn status(kind: HookKind, message: impl Into<String>) -> Self {
        Self::Specific {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: kind.event_name().to_string(),
                additional_context: None,
                status_message: Some(message.into()),
            },
        }
    }

    /// Envelope that only names the event.
    pub fn acknowledge(kind: HookKind) -> Self {
        Self::Specific {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: kind.event_name().to_string(),
                additional_context: None,
                status_message: None,
            },
        }
    }

    pub fn proceed(message: impl Into<String>) -> Self {
        Self::Verdict {
            result: HookVerdict::Continue,
            message: message.into(),
        }
    }

    pub fn approve() -> Self {
        Self::Decision {
            decision: Decision::Approve,
            reason: None,
        }
    }

    pub fn approve_with_reason(reason: impl Into<String>) -> Self {
        Self::Decision {
            decision: Decision::Approve,
            reason: Some(reason.into()),
        }
    }

    /// Typed equivalent of [`HookKind::fallback_json`].
    pub fn fallback(kind: HookKind) -> Self {
        match kind {
            HookKind::SessionStart => Self::context(kind, ""),
            HookKind::UserPromptSubmit => Self::acknowledge(kind),
            HookKind::SubagentStop => {
                Self::proceed("Hook degraded; continuing without pipeline guidance.")
            }
            HookKind::PreCompact => Self::status(kind, "Session state was not saved."),
            HookKind::PreToolUse => Self::approve(),
        }
    }

    /// Serialises to one JSON line, falling back to the hard-coded envelope.
    pub fn to_json_line(&self, kind: HookKind) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| kind.fallback_json().to_string())
    }
}
