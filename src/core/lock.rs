//! Lock Manager (C3, §4.3).
//!
//! Locks are advisory and cooperative: the core writes a record into intent
//! state and checks it, but does not coordinate across processes beyond that
//! record (§5, §9). Within a single process, acquisition against the same
//! intent directory is additionally serialized through an in-process mutex
//! map so that two threads racing for the same intent observe a single
//! winner instead of both reading `locked=false`.

use crate::core::error::CoreError;
use crate::core::model::IntentKind;
use crate::core::state_store;
use crate::core::time;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

fn lock_map() -> &'static Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    LOCKS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn process_lock(intent_dir: &Path) -> Arc<Mutex<()>> {
    let mut map = lock_map().lock().unwrap_or_else(|e| e.into_inner());
    map.entry(intent_dir.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Current machine hostname, used as `locked_by` (§4.3, §6).
///
/// Tries the environment first (cheap, no subprocess); falls back to the
/// `hostname` binary, matching the subprocess idiom used elsewhere in this
/// codebase for querying the local environment.
pub fn host_identifier() -> String {
    if let Ok(h) = std::env::var("HOSTNAME").or_else(|_| std::env::var("COMPUTERNAME")) {
        if !h.trim().is_empty() {
            return h;
        }
    }
    std::process::Command::new("hostname")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown-host".to_string())
}

/// Acquire the lock on an intent, recording `operation` and optional
/// `recovery_data`. Fails with `AlreadyLocked` if the lock is already held;
/// the caller observes the existing holder's identity and timestamp.
pub fn acquire(
    intent_dir: &Path,
    kind: IntentKind,
    operation: &str,
    recovery_data: Option<Value>,
) -> Result<(), CoreError> {
    let guard = process_lock(intent_dir);
    let _held = guard.lock().unwrap_or_else(|e| e.into_inner());

    let state = state_store::load(intent_dir, kind)?;
    if state.lock.locked {
        return Err(CoreError::AlreadyLocked {
            by: state.lock.locked_by.unwrap_or_default(),
            at: state.lock.locked_at.unwrap_or_default(),
        });
    }

    let host = host_identifier();
    let now = time::now_iso();
    state_store::update(intent_dir, kind, |s| {
        s.lock.locked = true;
        s.lock.locked_by = Some(host.clone());
        s.lock.locked_at = Some(now.clone());
        s.lock.operation = Some(operation.to_string());
        s.lock.recovery_data = recovery_data.clone();
    })?;

    // Read-back: if another writer raced us between the check above and this
    // write, whoever's write landed last is authoritative (§5); detect and
    // fail the loser.
    let after = state_store::load(intent_dir, kind)?;
    if after.lock.locked_by.as_deref() != Some(host.as_str())
        || after.lock.locked_at.as_deref() != Some(now.as_str())
    {
        return Err(CoreError::AlreadyLocked {
            by: after.lock.locked_by.unwrap_or_default(),
            at: after.lock.locked_at.unwrap_or_default(),
        });
    }
    Ok(())
}

/// Release the lock, clearing its fields. `force` releases even if this
/// process did not observe itself as the holder.
pub fn release(intent_dir: &Path, kind: IntentKind, force: bool) -> Result<(), CoreError> {
    let guard = process_lock(intent_dir);
    let _held = guard.lock().unwrap_or_else(|e| e.into_inner());

    let state = state_store::load(intent_dir, kind)?;
    if !state.lock.locked && !force {
        return Err(CoreError::NotLocked);
    }

    state_store::update(intent_dir, kind, |s| {
        s.lock.locked = false;
        s.lock.locked_by = None;
        s.lock.locked_at = None;
        s.lock.operation = None;
        s.lock.recovery_data = None;
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::IntentKind;

    fn make_intent(tmp: &std::path::Path) -> std::path::PathBuf {
        let intents_dir = tmp.join(".dev");
        std::fs::create_dir_all(&intents_dir).unwrap();
        let (dir, _) =
            state_store::create(&intents_dir, IntentKind::Dev, "Lock me", vec![]).unwrap();
        dir
    }

    #[test]
    fn test_acquire_then_already_locked() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = make_intent(tmp.path());
        acquire(&dir, IntentKind::Dev, "merging", None).unwrap();
        let err = acquire(&dir, IntentKind::Dev, "merging", None).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyLocked { .. }));
    }

    #[test]
    fn test_release_clears_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = make_intent(tmp.path());
        acquire(&dir, IntentKind::Dev, "merging", None).unwrap();
        release(&dir, IntentKind::Dev, false).unwrap();
        let state = state_store::load(&dir, IntentKind::Dev).unwrap();
        assert!(!state.lock.locked);
        assert!(state.lock.locked_by.is_none());
    }

    #[test]
    fn test_release_without_lock_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = make_intent(tmp.path());
        let err = release(&dir, IntentKind::Dev, false).unwrap_err();
        assert!(matches!(err, CoreError::NotLocked));
    }
}
