//! Staging Engine (C10, §4.10).
//!
//! Copies extracted response files into a mirror tree under `.staging/` and
//! produces a manifest with per-file hashes, preserving the input order so
//! validators and merges observe the same sequence (§4.10 Determinism).

use crate::core::error::CoreError;
use crate::core::hydration;
use crate::core::time;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedFile {
    pub source: String,
    pub target: String,
    pub target_path: String,
    pub action: FileAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingManifest {
    pub staged_at: String,
    pub intent_id: String,
    pub stage: String,
    pub files: Vec<StagedFile>,
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub dry_run: bool,
    pub overwrite: bool,
}

/// Extract `content.files`, falling back to `files`, then `data.files` (§4.10).
fn extract_file_entries(raw_output: &Value) -> Vec<Value> {
    for path in [["content", "files"].as_slice(), ["files"].as_slice(), ["data", "files"].as_slice()] {
        let mut cur = raw_output;
        let mut ok = true;
        for key in path {
            match cur.get(key) {
                Some(v) => cur = v,
                None => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            if let Some(arr) = cur.as_array() {
                return arr.clone();
            }
        }
    }
    Vec::new()
}

/// Stage the files referenced by `.raw_output.json` under `response_dir` into
/// `response_dir/.staging/`. When `overwrite` is set, an existing `.staging/`
/// is removed first (unless `dry_run`). When `dry_run` is set, nothing is
/// written; the manifest is returned as the plan.
pub fn stage(
    response_dir: &Path,
    intent_id: &str,
    stage_label: &str,
    overwrite: bool,
    dry_run: bool,
) -> Result<StagingManifest, CoreError> {
    let raw_output_path = response_dir.join(".raw_output.json");
    let raw_bytes = fs::read(&raw_output_path).map_err(|e| CoreError::io(&raw_output_path, e))?;
    let raw_output: Value =
        serde_json::from_slice(&raw_bytes).map_err(|e| CoreError::InvalidProtocol(e.to_string()))?;

    let entries = extract_file_entries(&raw_output);
    if entries.is_empty() {
        return Err(CoreError::ValidationFailed("no files to stage".to_string()));
    }

    let staging_dir = response_dir.join(".staging");
    if overwrite && !dry_run && staging_dir.exists() {
        fs::remove_dir_all(&staging_dir).map_err(|e| CoreError::io(&staging_dir, e))?;
    }

    let files_dir = response_dir.join(".files");
    let mut planned: Vec<(String, String, FileAction)> = Vec::new();
    for entry in &entries {
        let Some(file_ref) = entry.get("file_ref").and_then(Value::as_str) else {
            continue;
        };
        let Some(target_path) = entry.get("path").and_then(Value::as_str) else {
            continue;
        };
        if file_ref.is_empty() || target_path.is_empty() {
            continue;
        }
        let action = match entry.get("action").and_then(Value::as_str) {
            Some("update") => FileAction::Update,
            Some("delete") => FileAction::Delete,
            _ => FileAction::Create,
        };
        planned.push((file_ref.to_string(), target_path.to_string(), action));
    }

    let results: Vec<Option<StagedFile>> = if dry_run {
        planned
            .iter()
            .map(|(file_ref, target_path, action)| {
                let source = files_dir.join(file_ref);
                let size = fs::metadata(&source).map(|m| m.len()).unwrap_or(0);
                Some(StagedFile {
                    source: file_ref.clone(),
                    target: staging_dir.join(target_path).to_string_lossy().into_owned(),
                    target_path: target_path.clone(),
                    action: *action,
                    hash: None,
                    size,
                })
            })
            .collect()
    } else {
        planned
            .par_iter()
            .map(|(file_ref, target_path, action)| {
                let source = files_dir.join(file_ref);
                if !source.is_file() {
                    return None;
                }
                let dest = staging_dir.join(target_path);
                if let Some(parent) = dest.parent() {
                    if fs::create_dir_all(parent).is_err() {
                        return None;
                    }
                }
                let bytes = match fs::read(&source) {
                    Ok(b) => b,
                    Err(_) => return None,
                };
                if fs::write(&dest, &bytes).is_err() {
                    return None;
                }
                Some(StagedFile {
                    source: file_ref.clone(),
                    target: dest.to_string_lossy().into_owned(),
                    target_path: target_path.clone(),
                    action: *action,
                    hash: Some(hydration::md5_hex(&bytes)),
                    size: bytes.len() as u64,
                })
            })
            .collect()
    };

    // par_iter preserves input order in its output Vec, so `results` already
    // matches `planned`'s order (§4.10 Determinism).
    let staged_files: Vec<StagedFile> = results.into_iter().flatten().collect();
    let total_size_bytes = staged_files.iter().map(|f| f.size).sum();

    let manifest = StagingManifest {
        staged_at: time::now_iso(),
        intent_id: intent_id.to_string(),
        stage: stage_label.to_string(),
        total_files: staged_files.len(),
        total_size_bytes,
        files: staged_files,
        dry_run,
        overwrite,
    };

    if !dry_run {
        fs::create_dir_all(&staging_dir).map_err(|e| CoreError::io(&staging_dir, e))?;
        let manifest_path = staging_dir.join(".staging_manifest.json");
        let tmp_path = staging_dir.join(".staging_manifest.json.tmp");
        let body = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| CoreError::ValidationFailed(e.to_string()))?;
        fs::write(&tmp_path, &body).map_err(|e| CoreError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &manifest_path).map_err(|e| CoreError::io(&manifest_path, e))?;
    }

    Ok(manifest)
}
