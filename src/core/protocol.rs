//! Protocol Parser (C9, §4.9).
//!
//! Validates a Bloom protocol v1.0 response envelope: mandatory sections,
//! completion status, file references, and the SHA-256 checksum over the
//! canonical envelope with `validation` stripped. Grounded on the original
//! response parser's `_validate_protocol`/`_analyze_completion`/
//! `_analyze_questions` trio — warnings never abort except in strict mode.

use crate::core::error::CoreError;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

const VALID_COMPLETION_STATUSES: &[&str] = &[
    "complete",
    "partial",
    "token_limit",
    "continuity_prompt",
    "error",
];

/// Recommended action for a given `completion_status` (§4.9).
pub fn recommended_action(status: &str) -> Option<&'static str> {
    match status {
        "complete" => None,
        "token_limit" => Some("rotate_ai_provider"),
        "partial" => Some("recovery_or_retry"),
        "continuity_prompt" => Some("submit_continuity_to_new_provider"),
        "error" => Some("review_error_and_retry"),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct ParseReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub completion_status: Option<String>,
    pub recommended_action: Option<String>,
    pub files_checked: usize,
    pub files_missing: usize,
    pub has_questions: bool,
    pub question_count: usize,
    pub auto_answerable: bool,
    pub requires_user_input: bool,
}

impl ParseReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "validation": {
                "valid": self.is_valid(),
                "errors": self.errors,
                "warnings": self.warnings,
            },
            "file_references": {
                "checked": self.files_checked,
                "missing": self.files_missing,
            },
            "completion_analysis": {
                "status": self.completion_status,
                "recommended_action": self.recommended_action,
            },
            "questions_analysis": {
                "has_questions": self.has_questions,
                "count": self.question_count,
                "auto_answerable": self.auto_answerable,
                "requires_user_input": self.requires_user_input,
            },
        })
    }
}

/// Recompute SHA-256 over the canonical JSON serialization of `envelope`
/// with `validation` removed and keys sorted — the round-trip law in §8.
pub fn checksum(envelope: &Value) -> Result<String, CoreError> {
    let mut copy = envelope.clone();
    if let Some(obj) = copy.as_object_mut() {
        obj.remove("validation");
    }
    let canonical = canonicalize(&copy);
    let serialized = serde_json::to_string(&canonical)
        .map_err(|e| CoreError::InvalidProtocol(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Recursively sort object keys so serialization is deterministic regardless
/// of key insertion order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), canonicalize(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Parse and validate `envelope`. `response_dir` is the `.response/`
/// directory the envelope was read from, used to check `.files/` references.
/// In `strict` mode, any warning is promoted to an error and the first one
/// aborts parsing.
pub fn parse(envelope: &Value, response_dir: &Path, strict: bool, expected_intent_uuid: &str) -> Result<ParseReport, CoreError> {
    let mut report = ParseReport::default();

    macro_rules! flag {
        ($is_error:expr, $msg:expr) => {{
            if $is_error || strict {
                report.errors.push($msg);
                if strict {
                    return Err(CoreError::InvalidProtocol(report.errors.join("; ")));
                }
            } else {
                report.warnings.push($msg);
            }
        }};
    }

    let bloom_protocol = envelope.get("bloom_protocol");
    match bloom_protocol {
        None => flag!(true, "missing bloom_protocol section".to_string()),
        Some(bp) => {
            match bp.get("version").and_then(Value::as_str) {
                Some("1.0") => {}
                _ => flag!(true, "bloom_protocol.version must be \"1.0\"".to_string()),
            }
            if bp.get("intent_id").is_none() {
                flag!(true, "bloom_protocol missing intent_id".to_string());
            } else if bp.get("intent_id").and_then(Value::as_str) != Some(expected_intent_uuid) {
                flag!(false, "bloom_protocol.intent_id does not match the expected intent".to_string());
            }
            match bp.get("completion_status").and_then(Value::as_str) {
                Some(status) => {
                    report.completion_status = Some(status.to_string());
                    report.recommended_action = recommended_action(status).map(str::to_string);
                    if !VALID_COMPLETION_STATUSES.contains(&status) {
                        flag!(false, format!("unrecognized completion_status: {}", status));
                    }
                }
                None => flag!(true, "bloom_protocol missing completion_status".to_string()),
            }
        }
    }

    match envelope.get("metadata") {
        None => flag!(true, "missing metadata section".to_string()),
        Some(meta) => {
            if meta.get("ai_provider").is_none() {
                flag!(true, "metadata missing ai_provider".to_string());
            }
            if meta.get("conversation_id").is_none() {
                flag!(true, "metadata missing conversation_id".to_string());
            }
        }
    }

    let mut file_entries: Vec<Value> = Vec::new();
    match envelope.get("content") {
        None => flag!(true, "missing content section".to_string()),
        Some(content) => {
            if content.get("type").is_none() {
                flag!(true, "content missing type".to_string());
            }
            match content.get("files").and_then(Value::as_array) {
                Some(files) => file_entries = files.clone(),
                None => flag!(true, "content missing files".to_string()),
            }
        }
    }

    for entry in &file_entries {
        report.files_checked += 1;
        if let Some(file_ref) = entry.get("file_ref").and_then(Value::as_str) {
            if !response_dir.join(".files").join(file_ref).is_file() {
                report.files_missing += 1;
                flag!(false, format!("missing file reference: {}", file_ref));
            }
        } else {
            report.files_missing += 1;
            flag!(false, "file entry missing file_ref".to_string());
        }
    }

    if let Some(declared) = envelope
        .get("validation")
        .and_then(|v| v.get("checksum"))
        .and_then(Value::as_str)
    {
        let actual = checksum(envelope)?;
        if actual != declared {
            flag!(false, format!("checksum mismatch: expected {}, got {}", declared, actual));
        }
    }

    if let Some(questions) = envelope.get("questions") {
        report.has_questions = questions
            .get("has_questions")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        report.question_count = questions
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        report.auto_answerable = questions
            .get("auto_answerable")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        report.requires_user_input = report.has_questions && !report.auto_answerable;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_envelope(intent_id: &str) -> Value {
        serde_json::json!({
            "bloom_protocol": {"version": "1.0", "intent_id": intent_id, "completion_status": "complete"},
            "metadata": {"ai_provider": "claude", "conversation_id": "c1"},
            "content": {"type": "code", "files": []},
            "questions": {"has_questions": false, "count": 0, "auto_answerable": false},
            "validation": {}
        })
    }

    #[test]
    fn test_valid_envelope_has_no_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let report = parse(&base_envelope("abc"), tmp.path(), false, "abc").unwrap();
        assert!(report.is_valid());
        assert_eq!(report.completion_status.as_deref(), Some("complete"));
        assert!(report.recommended_action.is_none());
    }

    #[test]
    fn test_missing_section_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut envelope = base_envelope("abc");
        envelope.as_object_mut().unwrap().remove("metadata");
        let report = parse(&envelope, tmp.path(), false, "abc").unwrap();
        assert!(!report.is_valid());
    }

    #[test]
    fn test_intent_id_mismatch_is_warning_not_error() {
        let tmp = tempfile::tempdir().unwrap();
        let report = parse(&base_envelope("other"), tmp.path(), false, "abc").unwrap();
        assert!(report.is_valid());
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_strict_mode_aborts_on_first_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let err = parse(&base_envelope("other"), tmp.path(), true, "abc").unwrap_err();
        assert!(matches!(err, CoreError::InvalidProtocol(_)));
    }

    #[test]
    fn test_checksum_round_trips() {
        let mut envelope = base_envelope("abc");
        let digest = checksum(&envelope).unwrap();
        envelope["validation"] = serde_json::json!({"checksum": digest.clone()});
        let tmp = tempfile::tempdir().unwrap();
        let report = parse(&envelope, tmp.path(), false, "abc").unwrap();
        assert!(report.is_valid());
    }

    #[test]
    fn test_unrecognized_completion_status_is_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let mut envelope = base_envelope("abc");
        envelope["bloom_protocol"]["completion_status"] = serde_json::json!("bogus");
        let report = parse(&envelope, tmp.path(), false, "abc").unwrap();
        assert!(report.is_valid());
        assert!(!report.warnings.is_empty());
    }
}
