//! Recovery Engine (C13, §4.13).
//!
//! Walks `.bloom/.intents/.dev` and `.bloom/.intents/.doc` for intents left
//! locked by an interrupted process and resolves each according to what
//! operation it was interrupted during.

use crate::core::error::CoreError;
use crate::core::lock;
use crate::core::model::IntentKind;
use crate::core::state_store;
use crate::core::time;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    DownloadResumed,
    MergeResumed,
    ForceUnlocked,
}

#[derive(Debug)]
pub struct RecoveredIntent {
    pub intent_dir: PathBuf,
    pub kind: IntentKind,
    pub outcome: RecoveryOutcome,
}

/// Find every locked intent of `kind` under `intents_root` (the `.dev` or
/// `.doc` directory, not `.bloom/.intents` itself).
pub fn find_interrupted(intents_root: &Path, kind: IntentKind) -> Result<Vec<PathBuf>, CoreError> {
    let mut found = Vec::new();
    if !intents_root.is_dir() {
        return Ok(found);
    }
    let entries = fs::read_dir(intents_root).map_err(|e| CoreError::io(intents_root, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CoreError::io(intents_root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if let Ok(state) = state_store::load(&path, kind) {
            if state.lock.locked {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Recover a single locked intent (§4.13). `force_unlock` always wins and is
/// idempotent even if the intent is no longer locked (scenario S6).
pub fn recover_one(
    intent_dir: &Path,
    kind: IntentKind,
    force_unlock: bool,
) -> Result<RecoveryOutcome, CoreError> {
    if force_unlock {
        lock::release(intent_dir, kind, true)?;
        return Ok(RecoveryOutcome::ForceUnlocked);
    }

    let state = state_store::load(intent_dir, kind)?;
    if !state.lock.locked {
        return Err(CoreError::NotLocked);
    }

    match state.lock.operation.as_deref() {
        Some("downloading_response") => {
            let recovery_data = state.lock.recovery_data.clone().ok_or_else(|| {
                CoreError::RecoveryDataMissing("lock.recovery_data is absent".to_string())
            })?;
            let has_url = recovery_data.get("chat_url").and_then(|v| v.as_str()).is_some();
            let has_profile = recovery_data.get("profile").and_then(|v| v.as_str()).is_some();
            if !has_url || !has_profile {
                return Err(CoreError::RecoveryDataMissing(
                    "recovery_data missing chat_url or profile".to_string(),
                ));
            }
            let now = time::now_iso();
            state_store::update(intent_dir, kind, |s| {
                s.lock.recovery_pending = Some(true);
                s.lock.recovery_initiated_at = Some(now.clone());
            })?;
            Ok(RecoveryOutcome::DownloadResumed)
        }
        Some("merging") => {
            // Backups already exist on disk for any partially applied merge;
            // releasing the lock is the whole of recovery (§4.13).
            lock::release(intent_dir, kind, true)?;
            Ok(RecoveryOutcome::MergeResumed)
        }
        _ => Err(CoreError::InvalidState(format!(
            "cannot recover intent with lock.operation = {:?} without force_unlock",
            state.lock.operation
        ))),
    }
}

#[derive(Debug, Default)]
pub struct RecoverySummary {
    pub recovered: Vec<RecoveredIntent>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Recover every interrupted intent under both `.dev` and `.doc`.
pub fn recover_all(bloom_intents_root: &Path, force_unlock: bool) -> Result<RecoverySummary, CoreError> {
    let mut summary = RecoverySummary::default();
    for kind in [IntentKind::Dev, IntentKind::Doc] {
        let intents_root = bloom_intents_root.join(kind.intents_subdir());
        for intent_dir in find_interrupted(&intents_root, kind)? {
            match recover_one(&intent_dir, kind, force_unlock) {
                Ok(outcome) => summary.recovered.push(RecoveredIntent {
                    intent_dir,
                    kind,
                    outcome,
                }),
                Err(e) => summary.failed.push((intent_dir, e.to_string())),
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_locked_intent(
        intents_dir: &Path,
        name: &str,
        operation: &str,
        recovery_data: Option<serde_json::Value>,
    ) -> PathBuf {
        fs::create_dir_all(intents_dir).unwrap();
        let (dir, _) = state_store::create(intents_dir, IntentKind::Dev, name, vec![]).unwrap();
        lock::acquire(&dir, IntentKind::Dev, operation, recovery_data).unwrap();
        dir
    }

    #[test]
    fn test_find_interrupted_only_returns_locked() {
        let tmp = tempfile::tempdir().unwrap();
        let intents_dir = tmp.path().join(".dev");
        let locked = make_locked_intent(&intents_dir, "Locked one", "merging", None);
        let (unlocked, _) =
            state_store::create(&intents_dir, IntentKind::Dev, "Unlocked one", vec![]).unwrap();
        let found = find_interrupted(&intents_dir, IntentKind::Dev).unwrap();
        assert_eq!(found, vec![locked]);
        assert!(!found.contains(&unlocked));
    }

    #[test]
    fn test_recover_downloading_response_with_data_pending() {
        let tmp = tempfile::tempdir().unwrap();
        let intents_dir = tmp.path().join(".dev");
        let recovery_data = serde_json::json!({"chat_url": "https://example/chat/1", "profile": "default"});
        let dir = make_locked_intent(&intents_dir, "Download me", "downloading_response", Some(recovery_data));
        let outcome = recover_one(&dir, IntentKind::Dev, false).unwrap();
        assert_eq!(outcome, RecoveryOutcome::DownloadResumed);
        let state = state_store::load(&dir, IntentKind::Dev).unwrap();
        assert!(state.lock.locked);
        assert_eq!(state.lock.recovery_pending, Some(true));
    }

    #[test]
    fn test_recover_downloading_response_missing_data_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let intents_dir = tmp.path().join(".dev");
        let dir = make_locked_intent(&intents_dir, "Download me", "downloading_response", None);
        let err = recover_one(&dir, IntentKind::Dev, false).unwrap_err();
        assert!(matches!(err, CoreError::RecoveryDataMissing(_)));
    }

    #[test]
    fn test_recover_merging_releases_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let intents_dir = tmp.path().join(".dev");
        let dir = make_locked_intent(&intents_dir, "Merge me", "merging", None);
        let outcome = recover_one(&dir, IntentKind::Dev, false).unwrap();
        assert_eq!(outcome, RecoveryOutcome::MergeResumed);
        let state = state_store::load(&dir, IntentKind::Dev).unwrap();
        assert!(!state.lock.locked);
    }

    #[test]
    fn test_force_unlock_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let intents_dir = tmp.path().join(".dev");
        let dir = make_locked_intent(&intents_dir, "Stuck", "unknown_op", None);
        recover_one(&dir, IntentKind::Dev, true).unwrap();
        let outcome = recover_one(&dir, IntentKind::Dev, true).unwrap();
        assert_eq!(outcome, RecoveryOutcome::ForceUnlocked);
    }

    #[test]
    fn test_unknown_operation_requires_force() {
        let tmp = tempfile::tempdir().unwrap();
        let intents_dir = tmp.path().join(".dev");
        let dir = make_locked_intent(&intents_dir, "Weird op", "scribbling", None);
        let err = recover_one(&dir, IntentKind::Dev, false).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }
}
