//! Shared data model: intent kind, stage ordering, and the intent state record (§3).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Two kinds of intent. The kind selects the state-file name, the subdirectory
/// set, and the stage vocabulary (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Dev,
    Doc,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Dev => "dev",
            IntentKind::Doc => "doc",
        }
    }

    /// Directory under `.bloom/.intents/` that holds intents of this kind.
    pub fn intents_subdir(&self) -> &'static str {
        match self {
            IntentKind::Dev => ".dev",
            IntentKind::Doc => ".doc",
        }
    }

    /// State file name written inside each intent's folder.
    pub fn state_file_name(&self) -> String {
        format!(".{}_state.json", self.as_str())
    }

    /// Ordered pipeline steps recorded in `steps` (§3).
    pub fn steps(&self) -> &'static [&'static str] {
        match self {
            IntentKind::Dev => &["create", "hydrate", "plan", "build", "submit", "merge"],
            IntentKind::Doc => &["create", "hydrate", "curate", "publish"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Created,
    Hydrated,
    Planned,
    Built,
    Submitted,
    Completed,
    Failed,
}

/// A position in an intent's pipeline, totally ordered: `briefing < execution
/// < refinement_1 < refinement_2 < …` (§3). Doc intents reuse `Briefing` for
/// `context` and `Execution` for `curation`; the label differs, the ordinal
/// does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Briefing,
    Execution,
    Refinement(u32),
}

impl Stage {
    /// Directory-name form used under `.pipeline/` and `.refinement/.turn_N/`.
    pub fn label(&self) -> String {
        match self {
            Stage::Briefing => "briefing".to_string(),
            Stage::Execution => "execution".to_string(),
            Stage::Refinement(n) => format!("refinement_{}", n),
        }
    }

    pub fn parse(label: &str) -> Option<Stage> {
        match label {
            "briefing" => Some(Stage::Briefing),
            "execution" => Some(Stage::Execution),
            other => other
                .strip_prefix("refinement_")
                .and_then(|n| n.parse::<u32>().ok())
                .map(Stage::Refinement),
        }
    }

    /// The greatest stage among those whose response directory exists under
    /// `pipeline_root` (Open Question 3: gaps in numbering do not affect which
    /// N is "latest" — only the maximum existing N matters).
    pub fn latest_existing(pipeline_root: &std::path::Path) -> Option<Stage> {
        let mut found: Option<Stage> = None;
        let candidates = ["briefing", "execution"];
        for label in candidates {
            if pipeline_root.join(format!(".{}", label)).join(".response").is_dir() {
                let stage = Stage::parse(label).unwrap();
                found = Some(found.map_or(stage, |f| f.max(stage)));
            }
        }
        if let Ok(entries) = std::fs::read_dir(pipeline_root) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if let Some(label) = name.strip_prefix('.') {
                    if let Some(stage @ Stage::Refinement(_)) = Stage::parse(label) {
                        if entry.path().join(".response").is_dir() {
                            found = Some(found.map_or(stage, |f| f.max(stage)));
                        }
                    }
                }
            }
        }
        found
    }
}

/// The lock record embedded in intent state (§3, §4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockRecord {
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_pending: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_initiated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastMerge {
    pub timestamp: String,
    pub stage: String,
    pub files_merged: usize,
    pub backup_dir: String,
}

/// The intent state record, `<intent>/.{kind}_state.json` (§3).
///
/// `extended` and any top-level key this struct does not name are preserved
/// verbatim across read/write — invariant 5 in §8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentState {
    pub uuid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: IntentKind,
    pub status: IntentStatus,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub initial_files: Vec<String>,
    #[serde(default)]
    pub steps: BTreeMap<String, bool>,
    #[serde(default)]
    pub lock: LockRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_merge: Option<LastMerge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_submitted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_provider: Option<String>,
    #[serde(default)]
    pub extended: Value,
    /// Unknown top-level keys not otherwise modeled above, preserved as-is.
    #[serde(flatten)]
    pub unknown: Map<String, Value>,
}

impl IntentState {
    pub fn new_steps_map(kind: IntentKind) -> BTreeMap<String, bool> {
        kind.steps().iter().map(|s| (s.to_string(), false)).collect()
    }
}
