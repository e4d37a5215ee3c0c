//! State Store (C2, §4.2).
//!
//! Sole gateway to intent state files. Every write is atomic-by-rename:
//! serialize to a sibling temp file, then `fs::rename` over the canonical
//! path — the same tmp-then-swap idiom used elsewhere in this codebase for
//! on-disk database files, just applied to JSON documents here.

use crate::core::error::CoreError;
use crate::core::model::{IntentKind, IntentState, IntentStatus, LockRecord};
use crate::core::time;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Fixed namespace for deterministic UUIDv3 generation (§4.2).
const INTENT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x10, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30, 0xc8,
]);

/// `uuid == v3(NAMESPACE, name)` — invariant 1 in §8.
pub fn deterministic_uuid(name: &str) -> Uuid {
    Uuid::new_v3(&INTENT_NAMESPACE, name.trim().as_bytes())
}

/// Lowercase, hyphenate, strip to `[a-z0-9-]`, collapse repeats, cap at 50
/// chars, falling back to `"unnamed"` if nothing survives.
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let hyphenated: String = lowered
        .chars()
        .map(|c| if c.is_whitespace() || c == '_' { '-' } else { c })
        .collect();
    let stripped: String = hyphenated
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    let mut collapsed = String::with_capacity(stripped.len());
    let mut last_hyphen = false;
    for c in stripped.chars() {
        if c == '-' {
            if last_hyphen {
                continue;
            }
            last_hyphen = true;
        } else {
            last_hyphen = false;
        }
        collapsed.push(c);
    }
    let trimmed = collapsed.trim_matches('-');
    let truncated: String = trimmed.chars().take(50).collect();
    let truncated = truncated.trim_matches('-');
    if truncated.is_empty() {
        "unnamed".to_string()
    } else {
        truncated.to_string()
    }
}

/// Folder name for an intent: `.{slug(name)}-{uuid[:8]}` — invariant 2 in §8.
pub fn folder_name(name: &str, uuid: &Uuid) -> String {
    let hex = uuid.simple().to_string();
    format!(".{}-{}", slugify(name), &hex[..8])
}

/// Create a new intent directory tree and its initial state file.
///
/// The state file is written last: a partially created intent is
/// recognizable by the absence of a readable state file (§3).
pub fn create(
    intents_dir: &Path,
    kind: IntentKind,
    name: &str,
    initial_files: Vec<String>,
) -> Result<(PathBuf, IntentState), CoreError> {
    let uuid = deterministic_uuid(name);
    let folder = folder_name(name, &uuid);
    let intent_dir = intents_dir.join(&folder);
    fs::create_dir_all(&intent_dir).map_err(|e| CoreError::io(&intent_dir, e))?;

    for sub in subdirectories(kind) {
        let dir = intent_dir.join(sub);
        fs::create_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;
    }

    let now = time::now_iso();
    let state = IntentState {
        uuid: uuid.to_string(),
        name: name.trim().to_string(),
        kind,
        status: IntentStatus::Created,
        created_at: now.clone(),
        updated_at: now,
        initial_files,
        steps: IntentState::new_steps_map(kind),
        lock: LockRecord::default(),
        last_merge: None,
        last_submitted_at: None,
        last_provider: None,
        extended: serde_json::json!({}),
        unknown: serde_json::Map::new(),
    };

    write(&intent_dir, kind, &state)?;
    Ok((intent_dir, state))
}

/// Subdirectories created for each intent kind (§3).
fn subdirectories(kind: IntentKind) -> &'static [&'static str] {
    match kind {
        IntentKind::Dev => &[
            ".briefing",
            ".briefing/.files",
            ".execution",
            ".execution/.files",
            ".refinement",
            ".pipeline/.briefing/.response/.staging",
            ".pipeline/.execution/.response/.staging",
            ".pipeline/.refinement",
        ],
        IntentKind::Doc => &[
            ".context",
            ".context/.files",
            ".curation",
            ".pipeline/.context/.response/.staging",
            ".pipeline/.curation",
        ],
    }
}

fn state_path(intent_dir: &Path, kind: IntentKind) -> PathBuf {
    intent_dir.join(kind.state_file_name())
}

/// Read and parse the state file for an intent directory.
pub fn load(intent_dir: &Path, kind: IntentKind) -> Result<IntentState, CoreError> {
    let path = state_path(intent_dir, kind);
    let bytes = fs::read(&path).map_err(|e| CoreError::io(&path, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CoreError::InvalidState(format!("{}: {}", path.display(), e)))
}

/// Serialize `state` to a sibling temp file and rename it over the canonical
/// path. At no moment does a partially written state file exist at the
/// canonical path (invariant 4 in §8).
pub fn write(intent_dir: &Path, kind: IntentKind, state: &IntentState) -> Result<(), CoreError> {
    let path = state_path(intent_dir, kind);
    let tmp_path = intent_dir.join(format!(".{}.tmp", kind.state_file_name()));
    let body = serde_json::to_vec_pretty(state)
        .map_err(|e| CoreError::InvalidState(e.to_string()))?;
    fs::write(&tmp_path, &body).map_err(|e| CoreError::io(&tmp_path, e))?;
    if let Ok(f) = fs::File::open(&tmp_path) {
        let _ = f.sync_all();
    }
    fs::rename(&tmp_path, &path).map_err(|e| CoreError::io(&path, e))?;
    Ok(())
}

/// Apply a mutation to an intent's state, bumping `updated_at`, and persist it.
pub fn update<F>(intent_dir: &Path, kind: IntentKind, mutate: F) -> Result<IntentState, CoreError>
where
    F: FnOnce(&mut IntentState),
{
    let mut state = load(intent_dir, kind)?;
    mutate(&mut state);
    state.updated_at = time::now_iso();
    write(intent_dir, kind, &state)?;
    Ok(state)
}

/// Rename an intent's folder and regenerate its uuid after the human name
/// changes (§4.2). The caller is responsible for updating any external index.
pub fn rename(
    intents_dir: &Path,
    old_dir: &Path,
    kind: IntentKind,
    new_name: &str,
) -> Result<PathBuf, CoreError> {
    let new_uuid = deterministic_uuid(new_name);
    let new_folder = folder_name(new_name, &new_uuid);
    let new_dir = intents_dir.join(&new_folder);
    if new_dir.exists() {
        return Err(CoreError::InvalidState(format!(
            "rename target already exists: {}",
            new_dir.display()
        )));
    }
    fs::rename(old_dir, &new_dir).map_err(|e| CoreError::io(&new_dir, e))?;
    update(&new_dir, kind, |state| {
        state.name = new_name.trim().to_string();
        state.uuid = new_uuid.to_string();
    })?;
    Ok(new_dir)
}

/// Delete an intent's directory tree. Refuses a locked intent unless `force`.
pub fn delete(intent_dir: &Path, kind: IntentKind, force: bool) -> Result<(), CoreError> {
    let state = load(intent_dir, kind)?;
    if state.lock.locked && !force {
        return Err(CoreError::AlreadyLocked {
            by: state.lock.locked_by.unwrap_or_default(),
            at: state.lock.locked_at.unwrap_or_default(),
        });
    }
    fs::remove_dir_all(intent_dir).map_err(|e| CoreError::io(intent_dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Fix login"), "fix-login");
        assert_eq!(slugify("  Weird__Name!! "), "weird-name");
        assert_eq!(slugify("!!!"), "unnamed");
    }

    #[test]
    fn test_slugify_truncates() {
        let long = "a".repeat(100);
        assert_eq!(slugify(&long).len(), 50);
    }

    #[test]
    fn test_deterministic_uuid_is_stable() {
        let a = deterministic_uuid("Fix login");
        let b = deterministic_uuid("Fix login");
        assert_eq!(a, b);
    }

    #[test]
    fn test_folder_name_pattern() {
        let uuid = deterministic_uuid("Fix login");
        let folder = folder_name("Fix login", &uuid);
        assert!(folder.starts_with(".fix-login-"));
        assert_eq!(folder.len(), ".fix-login-".len() + 8);
    }

    #[test]
    fn test_create_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let intents_dir = tmp.path().join(".dev");
        fs::create_dir_all(&intents_dir).unwrap();
        let (dir, state) =
            create(&intents_dir, IntentKind::Dev, "Fix login", vec!["src/a.rs".into()]).unwrap();
        let reloaded = load(&dir, IntentKind::Dev).unwrap();
        assert_eq!(reloaded.uuid, state.uuid);
        assert_eq!(reloaded.name, "Fix login");
        assert_eq!(reloaded.steps.get("create"), Some(&false));
    }

    #[test]
    fn test_write_preserves_unknown_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let intents_dir = tmp.path().join(".dev");
        fs::create_dir_all(&intents_dir).unwrap();
        let (dir, mut state) =
            create(&intents_dir, IntentKind::Dev, "Keep fields", vec![]).unwrap();
        state
            .unknown
            .insert("future_field".to_string(), serde_json::json!("value"));
        write(&dir, IntentKind::Dev, &state).unwrap();
        let reloaded = load(&dir, IntentKind::Dev).unwrap();
        assert_eq!(
            reloaded.unknown.get("future_field"),
            Some(&serde_json::json!("value"))
        );
    }
}
