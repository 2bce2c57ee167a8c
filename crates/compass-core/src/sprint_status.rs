//! Field extraction from the sprint-status document.
//!
//! The document is YAML-shaped but only a fixed micro-format is understood:
//! top-level `key: value` scalars, plus story entries that appear either as an
//! indented map (`  1-2-login: in-progress`) or as list items
//! (`- id: 1-2` followed by `  status: done`). Nothing here is a YAML parser.
//!
//! Matching uses the `regex` crate, whose automata run in time linear in the
//! input, and every repetition in the patterns is width-bounded.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;

/// Where the sprint-status document may live, relative to the project.
pub const SPRINT_STATUS_CANDIDATES: [&str; 3] = [
    "sprint-status.yaml",
    "docs/sprint-status.yaml",
    "docs/sprint-artifacts/sprint-status.yaml",
];

/// Rendered for a field the document does not define.
pub const MISSING: &str = "?";

const MAX_FIELD_NAME: usize = 64;

/// One indented or list-item `key: value` line inside a story block. Group
/// widths are capped so a single huge line costs no more than scanning it once.
/// Separator whitespace matches [`extract_field`].
const LINE_PATTERN: &str =
    r"^(?P<indent>[ \t]{0,32})(?P<dash>-[ \t]{1,8})?(?P<key>[A-Za-z0-9_.-]{1,128})[ \t]{0,8}:[ \t]{0,8}(?P<value>[^\r\n]{0,256})";

/// Sprint-level scalar fields the hooks surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SprintField {
    Workflow,
    Status,
    CurrentPhase,
    NextPhase,
    QualityTier,
    Scale,
}

impl SprintField {
    pub const ALL: [SprintField; 6] = [
        SprintField::Workflow,
        SprintField::Status,
        SprintField::CurrentPhase,
        SprintField::NextPhase,
        SprintField::QualityTier,
        SprintField::Scale,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SprintField::Workflow => "workflow",
            SprintField::Status => "status",
            SprintField::CurrentPhase => "current_phase",
            SprintField::NextPhase => "next_phase",
            SprintField::QualityTier => "quality_tier",
            SprintField::Scale => "scale",
        }
    }
}

/// Story status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoryStatus {
    Backlog,
    ReadyForDev,
    InProgress,
    Review,
    Done,
}

impl StoryStatus {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "backlog" => Some(StoryStatus::Backlog),
            "ready-for-dev" => Some(StoryStatus::ReadyForDev),
            "in-progress" => Some(StoryStatus::InProgress),
            "review" => Some(StoryStatus::Review),
            "done" => Some(StoryStatus::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryRecord {
    pub id: String,
    pub status: StoryStatus,
}

/// Completed stories out of all stories with a recognised status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoryProgress {
    pub done: usize,
    pub total: usize,
}

impl StoryProgress {
    /// Completion ratio, or `None` when there are no stories.
    pub fn ratio(&self) -> Option<f64> {
        (self.total > 0).then(|| self.done as f64 / self.total as f64)
    }
}

impl fmt::Display for StoryProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.done, self.total)
    }
}

/// Extracts the first top-level `field: value` scalar from `raw`.
///
/// Surrounding quotes, trailing comments and whitespace are removed. Returns
/// `None` for an absent or empty value, or for a field name outside
/// `[A-Za-z0-9_-]{1,64}`.
pub fn extract_field(raw: &str, field: &str) -> Option<String> {
    if field.is_empty()
        || field.len() > MAX_FIELD_NAME
        || !field
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return None;
    }

    let pattern = format!(
        r"(?m)^{}[ \t]{{0,8}}:[ \t]{{0,8}}([^\r\n]{{0,256}})",
        regex::escape(field)
    );
    let re = Regex::new(&pattern).ok()?;
    let captures = re.captures(raw)?;
    clean_value(captures.get(1)?.as_str())
}

/// Strips quotes or a trailing comment from a raw scalar.
fn clean_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let value = match trimmed.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let inner = &trimmed[1..];
            match inner.find(quote) {
                Some(end) => &inner[..end],
                None => inner,
            }
        }
        _ => match trimmed.find(" #") {
            Some(idx) => &trimmed[..idx],
            None => trimmed,
        },
    };

    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parsed view of the sprint-status document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SprintStatus {
    source: Option<PathBuf>,
    fields: BTreeMap<SprintField, String>,
    stories: Vec<StoryRecord>,
}

/// A list item whose fields are still being read.
#[derive(Default)]
struct PendingItem {
    id: Option<String>,
    status: Option<StoryStatus>,
}

impl SprintStatus {
    /// Parses the document. Never fails; unrecognised lines are ignored.
    ///
    /// Sprint-level fields come from [`extract_field`]. Only statuses on
    /// indented lines or list items count as stories, so the sprint-level
    /// `status:` never inflates the story totals.
    pub fn parse(raw: &str) -> Self {
        let mut status = Self::default();
        for field in SprintField::ALL {
            if let Some(value) = extract_field(raw, field.key()) {
                status.fields.insert(field, value);
            }
        }

        let Ok(line_re) = Regex::new(LINE_PATTERN) else {
            return status;
        };

        let mut pending: Option<PendingItem> = None;
        let mut item_count = 0usize;

        for line in raw.lines() {
            let Some(caps) = line_re.captures(line) else {
                continue;
            };
            let indented = caps.name("indent").is_some_and(|m| !m.as_str().is_empty());
            let list_item = caps.name("dash").is_some();
            let key = caps.name("key").map_or("", |m| m.as_str());
            if !indented && !list_item {
                status.finish_item(pending.take(), &mut item_count);
                continue;
            }
            let value = caps.name("value").and_then(|m| clean_value(m.as_str()));

            if list_item {
                status.finish_item(pending.take(), &mut item_count);
                pending = Some(PendingItem::default());
            }

            let Some(value) = value else {
                continue;
            };
            match (pending.as_mut(), key) {
                (Some(item), "id" | "key" | "story") => item.id = Some(value),
                (Some(item), "status") => item.status = StoryStatus::parse(&value),
                (None, "status") => {}
                _ => {
                    if let Some(story_status) = StoryStatus::parse(&value) {
                        status.stories.push(StoryRecord {
                            id: key.to_string(),
                            status: story_status,
                        });
                    }
                }
            }
        }
        status.finish_item(pending, &mut item_count);

        status
    }

    fn finish_item(&mut self, item: Option<PendingItem>, item_count: &mut usize) {
        let Some(item) = item else {
            return;
        };
        *item_count += 1;
        if let Some(status) = item.status {
            let id = item.id.unwrap_or_else(|| format!("item-{item_count}"));
            self.stories.push(StoryRecord { id, status });
        }
    }

    /// Finds the document under `project_dir`.
    pub fn locate(project_dir: &Path) -> Option<PathBuf> {
        SPRINT_STATUS_CANDIDATES
            .iter()
            .map(|candidate| project_dir.join(candidate))
            .find(|path| path.is_file())
    }

    /// Loads and parses the document; missing or unreadable files yield an
    /// empty status.
    pub fn load(project_dir: &Path) -> Self {
        let Some(path) = Self::locate(project_dir) else {
            return Self::default();
        };
        match std::fs::read(&path) {
            Ok(bytes) => {
                let mut status = Self::parse(&String::from_utf8_lossy(&bytes));
                status.source = Some(path);
                status
            }
            Err(err) => {
                tracing::debug!("Failed to read {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    /// Path the status was loaded from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, field: SprintField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// The field's value, or [`MISSING`].
    pub fn display(&self, field: SprintField) -> &str {
        self.get(field).unwrap_or(MISSING)
    }

    pub fn stories(&self) -> &[StoryRecord] {
        &self.stories
    }

    pub fn progress(&self) -> StoryProgress {
        StoryProgress {
            done: self
                .stories
                .iter()
                .filter(|story| story.status == StoryStatus::Done)
                .count(),
            total: self.stories.len(),
        }
    }

    /// True when neither fields nor stories were found.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.stories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const SAMPLE: &str = r#"# generated by the orchestrator
workflow: greenfield
status: in-progress
current_phase: "hojo"
next_phase: 'reno'
quality_tier: gold # reviewed
scale: 2

development_status:
  epic-1: in-progress
  1-1-login: done
  1-2-signup: review
  1-3-reset: backlog
  1-4-profile: drafted
"#;

    #[test]
    fn test_extract_quoted_fields() {
        assert_eq!(extract_field(SAMPLE, "current_phase").as_deref(), Some("hojo"));
        assert_eq!(extract_field(SAMPLE, "next_phase").as_deref(), Some("reno"));
    }

    #[test]
    fn test_extract_strips_comment_and_whitespace() {
        assert_eq!(extract_field(SAMPLE, "quality_tier").as_deref(), Some("gold"));
        assert_eq!(extract_field(SAMPLE, "scale").as_deref(), Some("2"));
    }

    #[test]
    fn test_extract_absent_or_empty() {
        assert_eq!(extract_field(SAMPLE, "owner"), None);
        assert_eq!(extract_field("workflow:\n", "workflow"), None);
        assert_eq!(extract_field("workflow: \"\"\n", "workflow"), None);
        assert_eq!(extract_field("", "workflow"), None);
    }

    #[test]
    fn test_extract_rejects_invalid_field_names() {
        assert_eq!(extract_field(SAMPLE, ""), None);
        assert_eq!(extract_field(SAMPLE, "status|workflow"), None);
        assert_eq!(extract_field(SAMPLE, ".*"), None);
        assert_eq!(extract_field(SAMPLE, &"a".repeat(65)), None);
    }

    #[test]
    fn test_extract_ignores_indented_keys() {
        let doc = "stories:\n  - id: 1\n    status: done\nstatus: active\n";
        assert_eq!(extract_field(doc, "status").as_deref(), Some("active"));
        assert_eq!(extract_field("  status: done\n", "status"), None);
    }

    #[test]
    fn test_extract_handles_crlf() {
        let doc = "workflow: brownfield\r\nscale: 3\r\n";
        assert_eq!(extract_field(doc, "workflow").as_deref(), Some("brownfield"));
        assert_eq!(extract_field(doc, "scale").as_deref(), Some("3"));
    }

    #[test]
    fn test_parse_fields_and_map_stories() {
        let status = SprintStatus::parse(SAMPLE);
        assert_eq!(status.display(SprintField::Workflow), "greenfield");
        assert_eq!(status.display(SprintField::Status), "in-progress");
        assert_eq!(status.display(SprintField::CurrentPhase), "hojo");
        assert_eq!(status.display(SprintField::NextPhase), "reno");

        // epic-1, 1-1, 1-2, 1-3; `drafted` is outside the vocabulary and the
        // sprint-level status is never counted.
        assert_eq!(status.stories().len(), 4);
        assert_eq!(status.progress(), StoryProgress { done: 1, total: 4 });
        assert_eq!(status.progress().to_string(), "1/4");
    }

    #[test]
    fn test_parse_agrees_with_extract_field() {
        let docs = [
            "current_phase:\"hojo\"\nnext_phase:reno\n",
            "current_phase  :   'hojo' # soon\nnext_phase:\t\treno\n",
            "current_phase:\ncurrent_phase: hojo\nnext_phase: \"\"\n",
            "workflow:greenfield\r\nstories:\n  1-1-login:done\n",
        ];
        for doc in docs {
            let status = SprintStatus::parse(doc);
            for field in SprintField::ALL {
                assert_eq!(
                    status.get(field),
                    extract_field(doc, field.key()).as_deref(),
                    "{field:?} in {doc:?}"
                );
            }
        }

        let status = SprintStatus::parse(docs[0]);
        assert_eq!(status.display(SprintField::CurrentPhase), "hojo");
        assert_eq!(status.display(SprintField::NextPhase), "reno");
        assert_eq!(
            SprintStatus::parse(docs[3]).progress(),
            StoryProgress { done: 1, total: 1 }
        );
    }

    #[test]
    fn test_parse_list_stories() {
        let doc = "\
status: done
stories:
  - id: 2-1
    status: done
  - id: 2-2
    title: \"Search\"
    status: in-progress
  - status: review
  - id: 2-4
    status: shipped
";
        let status = SprintStatus::parse(doc);
        let ids: Vec<&str> = status.stories().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["2-1", "2-2", "item-3"]);
        assert_eq!(status.progress(), StoryProgress { done: 1, total: 3 });
    }

    #[test]
    fn test_sprint_status_alone_has_no_stories() {
        let status = SprintStatus::parse("status: done\n");
        assert_eq!(status.progress(), StoryProgress { done: 0, total: 0 });
        assert_eq!(status.progress().ratio(), None);
    }

    #[test]
    fn test_empty_document() {
        let status = SprintStatus::parse("");
        assert!(status.is_empty());
        for field in SprintField::ALL {
            assert_eq!(status.display(field), MISSING);
        }
        assert_eq!(status.progress().to_string(), "0/0");
    }

    #[test]
    fn test_binary_document() {
        let bytes = b"\x00\xff\xfe\x01workflow\x00: \xc3\x28\n\x89PNG\r\n";
        let status = SprintStatus::parse(&String::from_utf8_lossy(bytes));
        assert_eq!(status.display(SprintField::Workflow), MISSING);
        assert_eq!(status.progress().to_string(), "0/0");
    }

    #[test]
    fn test_pathological_input_is_fast() {
        let mut doc = String::from("current_phase: ");
        doc.push_str(&"a".repeat(1_000_000));
        doc.push('\n');
        for _ in 0..20_000 {
            doc.push_str("  :::: - - - : : x: y: z: ");
            doc.push_str(&" ".repeat(40));
            doc.push('\n');
        }
        doc.push_str("next_phase: reno\n");

        let started = Instant::now();
        let status = SprintStatus::parse(&doc);
        let phase = extract_field(&doc, "next_phase");
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(status.get(SprintField::CurrentPhase).map(str::len), Some(256));
        assert_eq!(phase.as_deref(), Some("reno"));
    }

    #[test]
    fn test_load_missing_document() {
        let dir = TempDir::new().unwrap();
        let status = SprintStatus::load(dir.path());
        assert!(status.is_empty());
        assert!(status.source().is_none());
    }

    #[test]
    fn test_load_zero_byte_document() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("sprint-status.yaml"), "").unwrap();

        let status = SprintStatus::load(dir.path());
        assert_eq!(status.display(SprintField::CurrentPhase), MISSING);
        assert_eq!(status.progress().to_string(), "0/0");
        assert!(status.source().is_some());
    }

    #[test]
    fn test_load_prefers_first_candidate() {
        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("sprint-status.yaml"), "workflow: nested\n").unwrap();
        assert_eq!(
            SprintStatus::load(dir.path()).display(SprintField::Workflow),
            "nested"
        );

        std::fs::write(dir.path().join("sprint-status.yaml"), "workflow: root\n").unwrap();
        assert_eq!(
            SprintStatus::load(dir.path()).display(SprintField::Workflow),
            "root"
        );
    }
}
