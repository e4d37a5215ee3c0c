//! Path & Project Locator (C1, §4.1).
//!
//! Finds the project root from any working directory and resolves an intent
//! by id or folder name. Grounded on the upward directory walk in the
//! original `_find_bloom_project` helper and the two-pass (folder name, then
//! state `uuid`) matching in `_locate_intent`.

use crate::core::error::CoreError;
use crate::core::model::{IntentKind, IntentState};
use crate::core::state_store;
use std::path::{Path, PathBuf};

/// A discovered project root: a directory containing `.bloom/`.
#[derive(Debug, Clone)]
pub struct ProjectRoot(PathBuf);

impl ProjectRoot {
    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn bloom_dir(&self) -> PathBuf {
        self.0.join(".bloom")
    }

    pub fn intents_dir(&self, kind: IntentKind) -> PathBuf {
        self.bloom_dir().join(".intents").join(kind.intents_subdir())
    }
}

/// Search upward from `start` until a directory containing `.bloom/` is
/// found. Fails with `ProjectNotFound` if none is found in the ancestry.
pub fn locate(start: &Path) -> Result<ProjectRoot, CoreError> {
    let mut cur = start.to_path_buf();
    loop {
        if cur.join(".bloom").is_dir() {
            return Ok(ProjectRoot(cur));
        }
        match cur.parent() {
            Some(parent) => cur = parent.to_path_buf(),
            None => return Err(CoreError::ProjectNotFound(start.to_path_buf())),
        }
    }
}

/// Resolve an explicit path: still requires `.bloom/` to be present, but does
/// not walk upward.
pub fn locate_at(explicit: &Path) -> Result<ProjectRoot, CoreError> {
    if explicit.join(".bloom").is_dir() {
        Ok(ProjectRoot(explicit.to_path_buf()))
    } else {
        Err(CoreError::ProjectNotFound(explicit.to_path_buf()))
    }
}

/// The path to a resolved intent's folder, plus the kind it was found under.
#[derive(Debug, Clone)]
pub struct IntentPath {
    pub path: PathBuf,
    pub kind: IntentKind,
}

/// Resolve an intent by exact folder name or by uuid, searching both
/// `.bloom/.intents/.dev/` and `.bloom/.intents/.doc/` (§4.1).
///
/// Match by exact folder name first; otherwise load each candidate's state
/// file and compare `uuid` exactly. Zero matches is `IntentNotFound`; more
/// than one is `IntentAmbiguous`.
pub fn locate_intent(project: &ProjectRoot, reference: &str) -> Result<IntentPath, CoreError> {
    let mut folder_matches = Vec::new();
    let mut uuid_matches = Vec::new();

    for kind in [IntentKind::Dev, IntentKind::Doc] {
        let dir = project.intents_dir(kind);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == reference {
                folder_matches.push(IntentPath { path: path.clone(), kind });
                continue;
            }
            if let Ok(state) = state_store::load(&path, kind) {
                if state.uuid == reference {
                    uuid_matches.push(IntentPath { path, kind });
                }
            }
        }
    }

    if folder_matches.len() == 1 && uuid_matches.is_empty() {
        return Ok(folder_matches.remove(0));
    }
    if folder_matches.is_empty() && uuid_matches.len() == 1 {
        return Ok(uuid_matches.remove(0));
    }
    let total = folder_matches.len() + uuid_matches.len();
    if total == 0 {
        return Err(CoreError::IntentNotFound(reference.to_string()));
    }
    if total > 1 {
        return Err(CoreError::IntentAmbiguous(reference.to_string()));
    }
    // total == 1 but split across the two vecs in some unreachable combination
    folder_matches
        .into_iter()
        .chain(uuid_matches)
        .next()
        .ok_or_else(|| CoreError::IntentNotFound(reference.to_string()))
}

/// Load the state of an already-resolved intent path.
pub fn load_state(intent: &IntentPath) -> Result<IntentState, CoreError> {
    state_store::load(&intent.path, intent.kind)
}
