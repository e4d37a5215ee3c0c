//! Merge Engine (C12, §4.12).
//!
//! Backs up affected project files, applies staged changes atomically per
//! file, and updates intent state. Whole-merge atomicity is not guaranteed;
//! the backup set is the recovery mechanism (§4.12 Atomicity, §5).

use crate::core::error::CoreError;
use crate::core::lock;
use crate::core::model::{IntentKind, LastMerge};
use crate::core::staging::{FileAction, StagingManifest};
use crate::core::state_store;
use crate::core::time;
use crate::core::validator::ValidationReport;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub files_merged: usize,
    pub backup_dir: Option<PathBuf>,
    pub errors: Vec<String>,
}

pub struct MergeOptions {
    pub force: bool,
    pub dry_run: bool,
    pub no_backup: bool,
}

/// Run a merge for `stage_label` against `project_root`, reading the staging
/// manifest from `staging_dir` and the `.report.json` alongside it.
pub fn merge(
    project_root: &Path,
    intent_dir: &Path,
    kind: IntentKind,
    staging_dir: &Path,
    manifest: &StagingManifest,
    report: Option<&ValidationReport>,
    stage_label: &str,
    opts: &MergeOptions,
) -> Result<MergeOutcome, CoreError> {
    if !opts.force && !opts.dry_run {
        let ready = report.map(|r| r.ready_for_merge).unwrap_or(false);
        if !ready {
            return Err(CoreError::MergeNotApproved(
                "staging report is not marked ready_for_merge".to_string(),
            ));
        }
    }

    if manifest.files.is_empty() {
        let outcome = MergeOutcome::default();
        if !opts.dry_run {
            record_merge(intent_dir, kind, stage_label, &outcome)?;
        }
        return Ok(outcome);
    }

    let backup_dir = if opts.no_backup || opts.dry_run {
        None
    } else {
        Some(create_backup(project_root, intent_dir, manifest)?)
    };

    let mut outcome = MergeOutcome {
        backup_dir: backup_dir.clone(),
        ..Default::default()
    };

    if opts.dry_run {
        outcome.files_merged = manifest.files.len();
        return Ok(outcome);
    }

    for file in &manifest.files {
        let staged_path = staging_dir.join(&file.target_path);
        let target_path = project_root.join(&file.target_path);
        let result = match file.action {
            FileAction::Delete => {
                if target_path.exists() {
                    fs::remove_file(&target_path)
                } else {
                    Ok(())
                }
            }
            FileAction::Create | FileAction::Update => {
                if let Some(parent) = target_path.parent() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        outcome
                            .errors
                            .push(format!("{}: {}", file.target_path, e));
                        continue;
                    }
                }
                atomic_copy(&staged_path, &target_path)
            }
        };
        match result {
            Ok(()) => outcome.files_merged += 1,
            Err(e) => outcome.errors.push(format!("{}: {}", file.target_path, e)),
        }
    }

    record_merge(intent_dir, kind, stage_label, &outcome)?;
    Ok(outcome)
}

/// Copy `source` onto `target` atomically: copy to a sibling temp file in
/// `target`'s directory, then rename over `target`.
fn atomic_copy(source: &Path, target: &Path) -> std::io::Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let tmp = parent.join(format!(
        ".{}.merge.tmp",
        target.file_name().and_then(|s| s.to_str()).unwrap_or("file")
    ));
    fs::copy(source, &tmp)?;
    fs::rename(&tmp, target)
}

fn create_backup(
    project_root: &Path,
    intent_dir: &Path,
    manifest: &StagingManifest,
) -> Result<PathBuf, CoreError> {
    let backup_dir = intent_dir
        .join(".pipeline")
        .join(".backup")
        .join(time::backup_timestamp());
    fs::create_dir_all(&backup_dir).map_err(|e| CoreError::io(&backup_dir, e))?;

    for file in &manifest.files {
        let source = project_root.join(&file.target_path);
        if !source.is_file() {
            continue;
        }
        let dest = backup_dir.join(&file.target_path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
        fs::copy(&source, &dest).map_err(|e| CoreError::BackupFailed(e.to_string()))?;
    }
    Ok(backup_dir)
}

fn record_merge(
    intent_dir: &Path,
    kind: IntentKind,
    stage_label: &str,
    outcome: &MergeOutcome,
) -> Result<(), CoreError> {
    let timestamp = time::now_iso();
    let stage = stage_label.to_string();
    let files_merged = outcome.files_merged;
    let backup_dir = outcome
        .backup_dir
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    state_store::update(intent_dir, kind, |state| {
        state.steps.insert("merge".to_string(), true);
        state.last_merge = Some(LastMerge {
            timestamp: timestamp.clone(),
            stage: stage.clone(),
            files_merged,
            backup_dir: backup_dir.clone(),
        });
    })?;
    lock::release(intent_dir, kind, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::IntentKind;
    use crate::core::staging::StagedFile;
    use crate::core::validator::{BasicValidation, ValidationReport};

    fn setup_intent(tmp: &Path) -> PathBuf {
        let intents_dir = tmp.join(".bloom/.intents/.dev");
        fs::create_dir_all(&intents_dir).unwrap();
        let (dir, _) = state_store::create(&intents_dir, IntentKind::Dev, "Merge me", vec![]).unwrap();
        lock::acquire(&dir, IntentKind::Dev, "merging", None).unwrap();
        dir
    }

    #[test]
    fn test_merge_with_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let project_root = tmp.path().join("project");
        fs::create_dir_all(project_root.join("src")).unwrap();
        fs::write(project_root.join("src/a.txt"), "OLD").unwrap();

        let intent_dir = setup_intent(tmp.path());
        let staging_dir = intent_dir.join(".pipeline/.briefing/.response/.staging");
        fs::create_dir_all(staging_dir.join("src")).unwrap();
        fs::write(staging_dir.join("src/a.txt"), "NEW").unwrap();

        let manifest = StagingManifest {
            staged_at: "now".to_string(),
            intent_id: "x".to_string(),
            stage: "briefing".to_string(),
            total_files: 1,
            total_size_bytes: 3,
            files: vec![StagedFile {
                source: "a.txt".to_string(),
                target: "src/a.txt".to_string(),
                target_path: "src/a.txt".to_string(),
                action: FileAction::Update,
                hash: None,
                size: 3,
            }],
            dry_run: false,
            overwrite: false,
        };
        let report = ValidationReport {
            basic: BasicValidation {
                passed: true,
                files_checked: 1,
                issues: vec![],
            },
            analyzer: None,
            approved: true,
            ready_for_merge: true,
        };

        let opts = MergeOptions {
            force: false,
            dry_run: false,
            no_backup: false,
        };
        let outcome = merge(
            &project_root,
            &intent_dir,
            IntentKind::Dev,
            &staging_dir,
            &manifest,
            Some(&report),
            "briefing",
            &opts,
        )
        .unwrap();

        assert_eq!(outcome.files_merged, 1);
        assert_eq!(fs::read_to_string(project_root.join("src/a.txt")).unwrap(), "NEW");
        let backup_dir = outcome.backup_dir.unwrap();
        assert_eq!(fs::read_to_string(backup_dir.join("src/a.txt")).unwrap(), "OLD");

        let state = state_store::load(&intent_dir, IntentKind::Dev).unwrap();
        assert_eq!(state.last_merge.unwrap().files_merged, 1);
        assert_eq!(state.steps.get("merge"), Some(&true));
        assert!(!state.lock.locked);
    }

    #[test]
    fn test_merge_without_ready_report_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let project_root = tmp.path().join("project");
        fs::create_dir_all(&project_root).unwrap();
        let intent_dir = setup_intent(tmp.path());
        let manifest = StagingManifest {
            staged_at: "now".to_string(),
            intent_id: "x".to_string(),
            stage: "briefing".to_string(),
            total_files: 0,
            total_size_bytes: 0,
            files: vec![StagedFile {
                source: "a.txt".to_string(),
                target: "a.txt".to_string(),
                target_path: "a.txt".to_string(),
                action: FileAction::Create,
                hash: None,
                size: 0,
            }],
            dry_run: false,
            overwrite: false,
        };
        let opts = MergeOptions {
            force: false,
            dry_run: false,
            no_backup: true,
        };
        let err = merge(
            &project_root,
            &intent_dir,
            IntentKind::Dev,
            &intent_dir,
            &manifest,
            None,
            "briefing",
            &opts,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MergeNotApproved(_)));
    }

    #[test]
    fn test_merge_empty_manifest_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let project_root = tmp.path().join("project");
        fs::create_dir_all(&project_root).unwrap();
        let intent_dir = setup_intent(tmp.path());
        let manifest = StagingManifest {
            staged_at: "now".to_string(),
            intent_id: "x".to_string(),
            stage: "briefing".to_string(),
            total_files: 0,
            total_size_bytes: 0,
            files: vec![],
            dry_run: false,
            overwrite: false,
        };
        let opts = MergeOptions {
            force: true,
            dry_run: false,
            no_backup: false,
        };
        let outcome = merge(
            &project_root,
            &intent_dir,
            IntentKind::Dev,
            &intent_dir,
            &manifest,
            None,
            "briefing",
            &opts,
        )
        .unwrap();
        assert_eq!(outcome.files_merged, 0);
        assert!(outcome.backup_dir.is_none());
    }
}
