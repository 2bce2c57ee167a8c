//! Lifecycle extension points a hook process can be launched for.

use std::str::FromStr;

/// A host lifecycle extension point.
///
/// Each variant has a kebab-case identifier used on the command line, in
/// telemetry, and in the fallback messenger, plus the PascalCase event name the
/// host uses in `hookEventName`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    SessionStart,
    UserPromptSubmit,
    SubagentStop,
    PreCompact,
    PreToolUse,
}

/// Returned when a string names no known hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown hook kind: {0}")]
pub struct UnknownHookKind(pub String);

impl HookKind {
    /// Every hook kind, in host lifecycle order.
    pub const ALL: [HookKind; 5] = [
        HookKind::SessionStart,
        HookKind::UserPromptSubmit,
        HookKind::SubagentStop,
        HookKind::PreCompact,
        HookKind::PreToolUse,
    ];

    /// Kebab-case identifier (`session-start`, `pre-compact`, ...).
    pub fn id(self) -> &'static str {
        match self {
            HookKind::SessionStart => "session-start",
            HookKind::UserPromptSubmit => "user-prompt-submit",
            HookKind::SubagentStop => "subagent-stop",
            HookKind::PreCompact => "pre-compact",
            HookKind::PreToolUse => "pre-tool-use",
        }
    }

    /// Host event name as it appears in `hookEventName`.
    pub fn event_name(self) -> &'static str {
        match self {
            HookKind::SessionStart => "SessionStart",
            HookKind::UserPromptSubmit => "UserPromptSubmit",
            HookKind::SubagentStop => "SubagentStop",
            HookKind::PreCompact => "PreCompact",
            HookKind::PreToolUse => "PreToolUse",
        }
    }

    /// Hard-coded last-resort output for this hook.
    ///
    /// Emitted verbatim when even serialising a [`crate::HookOutput`] fails, so
    /// it must stay valid JSON with a single top-level object.
    pub fn fallback_json(self) -> &'static str {
        match self {
            HookKind::SessionStart => {
                r#"{"hookSpecificOutput":{"hookEventName":"SessionStart","additionalContext":""}}"#
            }
            HookKind::UserPromptSubmit => {
                r#"{"hookSpecificOutput":{"hookEventName":"UserPromptSubmit"}}"#
            }
            HookKind::SubagentStop => {
                r#"{"result":"continue","message":"Hook degraded; continuing without pipeline guidance."}"#
            }
            HookKind::PreCompact => {
                r#"{"hookSpecificOutput":{"hookEventName":"PreCompact","statusMessage":"Session state was not saved."}}"#
            }
            HookKind::PreToolUse => r#"{"decision":"approve"}"#,
        }
    }
}

impl FromStr for HookKind {
    type Err = UnknownHookKind;

    /// Accepts either the kebab-case id or the host event name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        HookKind::ALL
            .into_iter()
            .find(|kind| kind.id() == trimmed || kind.event_name() == trimmed)
            .ok_or_else(|| UnknownHookKind(trimmed.to_string()))
    }
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
