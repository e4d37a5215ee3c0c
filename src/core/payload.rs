//! Payload Builder (C6, §4.6).
//!
//! Assembles a prioritized AI payload from a context plan and the compressed
//! codebase/docbase blobs. Grounded on the original payload builder's
//! critical → high → medium tier walk and its token/size bookkeeping.

use crate::core::error::CoreError;
use crate::core::hydration::{self, Blob};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry in a priority tier of a context plan.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlanEntry {
    pub path: String,
    pub reason: String,
}

/// The context plan consumed by the payload builder (§4.6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextPlan {
    pub version: String,
    pub intent_type: String,
    pub priority_tiers: PriorityTiers,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PriorityTiers {
    #[serde(default)]
    pub critical: Vec<PlanEntry>,
    #[serde(default)]
    pub high: Vec<PlanEntry>,
    #[serde(default)]
    pub medium: Vec<PlanEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Critical,
    High,
    Medium,
}

impl Tier {
    fn label(&self) -> &'static str {
        match self {
            Tier::Critical => "critical",
            Tier::High => "high",
            Tier::Medium => "medium",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PayloadFileMetadata {
    pub language: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayloadFile {
    pub path: String,
    pub content: String,
    pub priority: &'static str,
    pub reason: String,
    pub metadata: PayloadFileMetadata,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TierBreakdown {
    pub count: usize,
    pub tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayloadMetadata {
    pub context_plan_version: String,
    pub intent_type: String,
    pub total_files: usize,
    pub total_tokens: usize,
    pub breakdown_by_tier: BTreeMap<String, TierBreakdown>,
    pub focus_areas: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    pub files: Vec<PayloadFile>,
    pub metadata: PayloadMetadata,
}

/// Build a payload from `plan`, preferring the codebase blob and falling
/// back to the docbase blob for each entry. A path found in neither is
/// silently dropped — a lower tier of the same path may still succeed.
pub fn build_from_plan(
    plan: &ContextPlan,
    codebase: &Blob,
    docbase: Option<&Blob>,
) -> Result<Payload, CoreError> {
    let tiers = [
        (Tier::Critical, &plan.priority_tiers.critical),
        (Tier::High, &plan.priority_tiers.high),
        (Tier::Medium, &plan.priority_tiers.medium),
    ];

    let mut files = Vec::new();
    let mut breakdown: BTreeMap<String, TierBreakdown> = BTreeMap::new();
    let mut total_chars = 0usize;

    for (tier, entries) in tiers {
        for entry in entries {
            let Some(found) = codebase
                .find(&entry.path)
                .or_else(|| docbase.and_then(|d| d.find(&entry.path)))
            else {
                continue;
            };
            let decoded = hydration::decode(found)?;
            let content = String::from_utf8_lossy(&decoded).into_owned();
            total_chars += content.chars().count();
            let tokens = content.chars().count() / 4;
            let slot = breakdown.entry(tier.label().to_string()).or_default();
            slot.count += 1;
            slot.tokens += tokens;

            files.push(PayloadFile {
                path: entry.path.clone(),
                content,
                priority: tier.label(),
                reason: entry.reason.clone(),
                metadata: PayloadFileMetadata {
                    language: found.l.clone(),
                    size_bytes: found.s,
                },
            });
        }
    }

    let focus_areas = plan
        .metadata
        .get("focus_areas")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let metadata = PayloadMetadata {
        context_plan_version: plan.version.clone(),
        intent_type: plan.intent_type.clone(),
        total_files: files.len(),
        total_tokens: total_chars / 4,
        breakdown_by_tier: breakdown,
        focus_areas,
    };

    Ok(Payload { files, metadata })
}
