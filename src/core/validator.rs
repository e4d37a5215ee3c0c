//! Validator (C11, §4.11).
//!
//! Verifies staged files against the manifest (existence, MD5 hash) and
//! optionally folds in an external analyzer's structured recommendation.

use crate::core::error::CoreError;
use crate::core::hydration;
use crate::core::staging::StagingManifest;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicValidation {
    pub passed: bool,
    pub files_checked: usize,
    pub issues: Vec<String>,
}

/// Overall recommendation from an external analyzer (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    ReviewNeeded,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerReport {
    pub consistency_score: f64,
    pub quality_score: f64,
    pub completeness_score: f64,
    pub risks: Vec<String>,
    pub recommendation: Recommendation,
}

/// A pluggable external analyzer; the core treats it as an opaque
/// collaborator invoked with the staged paths and their content.
pub trait Analyzer {
    fn analyze(
        &self,
        staged: &[(String, Vec<u8>)],
    ) -> Result<AnalyzerReport, CoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub basic: BasicValidation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<AnalyzerReport>,
    pub approved: bool,
    pub ready_for_merge: bool,
}

/// Verify every manifest entry exists under `staging_dir` and, when a hash
/// was recorded, that the MD5 of the staged bytes matches it (§4.11, §8
/// invariants 8-9).
pub fn basic_validation(staging_dir: &Path, manifest: &StagingManifest) -> Result<BasicValidation, CoreError> {
    let mut issues = Vec::new();
    let mut files_checked = 0usize;

    for file in &manifest.files {
        files_checked += 1;
        let path = staging_dir.join(&file.target_path);
        if !path.is_file() {
            issues.push(format!("missing staged file: {}", file.target_path));
            continue;
        }
        if let Some(expected) = &file.hash {
            let bytes = fs::read(&path).map_err(|e| CoreError::io(&path, e))?;
            let actual = hydration::md5_hex(&bytes);
            if &actual != expected {
                issues.push(format!(
                    "hash mismatch for {}: expected {}, got {}",
                    file.target_path, expected, actual
                ));
            }
        }
    }

    Ok(BasicValidation {
        passed: issues.is_empty(),
        files_checked,
        issues,
    })
}

/// Run the full validation and produce the persisted report's contents
/// (§4.11). `analyzer` is consulted only when `Some` and `skip_gemini` is
/// false; `auto_approve` forces `ready_for_merge` regardless of the
/// analyzer's recommendation.
pub fn validate(
    staging_dir: &Path,
    manifest: &StagingManifest,
    analyzer: Option<&dyn Analyzer>,
    skip_analyzer: bool,
    auto_approve: bool,
) -> Result<ValidationReport, CoreError> {
    let basic = basic_validation(staging_dir, manifest)?;

    let analyzer_report = if skip_analyzer {
        None
    } else if let Some(analyzer) = analyzer {
        let staged: Vec<(String, Vec<u8>)> = manifest
            .files
            .iter()
            .filter_map(|f| {
                let path = staging_dir.join(&f.target_path);
                fs::read(&path).ok().map(|bytes| (f.target_path.clone(), bytes))
            })
            .collect();
        analyzer.analyze(&staged).ok()
    } else {
        None
    };

    let ready_for_merge = if auto_approve {
        true
    } else if skip_analyzer || analyzer_report.is_none() {
        basic.passed
    } else {
        basic.passed
            && analyzer_report
                .as_ref()
                .map(|r| r.recommendation == Recommendation::Approve)
                .unwrap_or(false)
    };

    Ok(ValidationReport {
        approved: ready_for_merge,
        ready_for_merge,
        basic,
        analyzer: analyzer_report,
    })
}

/// Write `.report.json` atomically next to `staging_dir`'s parent `.response/`.
pub fn write_report(response_dir: &Path, report: &ValidationReport) -> Result<(), CoreError> {
    let target = response_dir.join(".report.json");
    let tmp = response_dir.join(".report.json.tmp");
    let body =
        serde_json::to_vec_pretty(report).map_err(|e| CoreError::ValidationFailed(e.to_string()))?;
    fs::write(&tmp, &body).map_err(|e| CoreError::io(&tmp, e))?;
    fs::rename(&tmp, &target).map_err(|e| CoreError::io(&target, e))?;
    Ok(())
}
