//! Degraded-mode notices shown when the memory service is unavailable.
//!
//! Every notice starts with [`FALLBACK_PREFIX`] so downstream consumers can
//! recognise fallback text without parsing it.

use serde_json::Value;

pub const FALLBACK_PREFIX: &str = "[memory-fallback]";

const GENERIC_NOTICE: &str =
    "Memory service unavailable; continuing without stored memories.";

/// Hook-specific explanations, keyed by hook id.
const NOTICES: &[(&str, &str)] = &[
    (
        "session-start",
        "Memory service unavailable; prior project memories were not loaded for this session.",
    ),
    (
        "user-prompt-submit",
        "Memory service unavailable; relevant memories were not retrieved for this prompt.",
    ),
    (
        "subagent-stop",
        "Memory service unavailable; store operation skipped for this agent's findings.",
    ),
    (
        "pre-compact",
        "Memory service unavailable; retrieval may fail after compaction, rely on the saved session state.",
    ),
    (
        "pre-tool-use",
        "Memory service unavailable; this memory tool call is likely to fail.",
    ),
];

/// Returns the degraded-mode notice for `hook`, or a generic one.
pub fn fallback_message(hook: Option<&str>) -> String {
    let notice = hook
        .map(str::trim)
        .and_then(|id| NOTICES.iter().find(|(known, _)| *known == id))
        .map_or(GENERIC_NOTICE, |(_, notice)| *notice);
    format!("{FALLBACK_PREFIX} {notice}")
}

/// Like [`fallback_message`], accepting any JSON value as the hook id.
///
/// Non-string values (null, numbers, objects) get the generic notice.
pub fn fallback_message_for_value(hook: &Value) -> String {
    fallback_message(hook.as_str())
}

pub fn is_fallback_message(text: &str) -> bool {
    text.starts_with(FALLBACK_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn generic() -> String {
        format!("{FALLBACK_PREFIX} {GENERIC_NOTICE}")
    }

    #[test]
    fn test_known_hooks_get_specific_notices() {
        for (hook, _) in NOTICES {
            let message = fallback_message(Some(hook));
            assert!(is_fallback_message(&message));
            assert_ne!(message, generic(), "{hook} fell back to the generic notice");
        }
    }

    #[test]
    fn test_specific_wording() {
        assert!(fallback_message(Some("subagent-stop")).contains("store operation skipped"));
        assert!(
            fallback_message(Some("pre-compact")).contains("retrieval may fail after compaction")
        );
    }

    #[test]
    fn test_unknown_and_missing_hooks() {
        assert_eq!(fallback_message(Some("post-tool-use")), generic());
        assert_eq!(fallback_message(Some("")), generic());
        assert_eq!(fallback_message(None), generic());
    }

    #[test]
    fn test_non_string_values_are_coerced() {
        for value in [json!(null), json!(42), json!({"hook": "x"}), json!(["a"])] {
            let message = fallback_message_for_value(&value);
            assert!(!message.is_empty());
            assert_eq!(message, generic());
        }
        assert_ne!(fallback_message_for_value(&json!("session-start")), generic());
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert_eq!(
            fallback_message(Some("  pre-tool-use\n")),
            fallback_message(Some("pre-tool-use"))
        );
    }
}
