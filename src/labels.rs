//! Cluster label/summary resolution
//!
//! Trivial clusters are labeled by cheap deterministic rules; anything with
//! three or more members goes to the external summarizer. Results are cached
//! under the cluster signature for the process lifetime - a strict cache, not
//! a TTL cache. Membership changes produce a new signature and therefore a
//! cache miss; that is the only invalidation mechanism.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ai_client::{extract_json_object, Summarizer, MAX_SAMPLE_TEXTS};
use crate::identity::ClusterSignature;
use crate::mail_store::MessageMeta;

/// Fallback label when the summarizer fails or returns nothing parseable
const FALLBACK_LABEL: &str = "Cluster";

/// Human-readable label and summary for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterLabel {
    pub label: String,
    pub summary: String,
}

/// Process-lifetime label cache keyed by cluster signature
pub type LabelCache = HashMap<ClusterSignature, ClusterLabel>;

/// Resolve the label for a cluster, consulting the cache first. A cache hit
/// returns the stored record unchanged with no external call.
pub async fn resolve_label(
    cache: &mut LabelCache,
    summarizer: &dyn Summarizer,
    member_ids: &[String],
    metadata: &HashMap<String, MessageMeta>,
) -> ClusterLabel {
    let signature = ClusterSignature::new(member_ids.iter().cloned());
    if let Some(cached) = cache.get(&signature) {
        return cached.clone();
    }

    let record = compute_label(summarizer, member_ids, metadata).await;
    cache.insert(signature, record.clone());
    record
}

async fn compute_label(
    summarizer: &dyn Summarizer,
    member_ids: &[String],
    metadata: &HashMap<String, MessageMeta>,
) -> ClusterLabel {
    let members: Vec<&MessageMeta> = member_ids
        .iter()
        .filter_map(|id| metadata.get(id))
        .collect();

    match members.len() {
        0 => ClusterLabel {
            label: FALLBACK_LABEL.to_string(),
            summary: String::new(),
        },
        1 => {
            let meta = members[0];
            let label = if meta.subject.trim().is_empty() {
                "Single email".to_string()
            } else {
                meta.subject.clone()
            };
            ClusterLabel { label, summary: meta.snippet.clone() }
        }
        2 => {
            // Pairs are labeled from headers alone; an API call per pair
            // costs more than it tells
            let first = members[0];
            ClusterLabel {
                label: first.from.clone(),
                summary: first.subject.clone(),
            }
        }
        _ => {
            let samples: Vec<String> = members
                .iter()
                .take(MAX_SAMPLE_TEXTS)
                .map(|m| m.composed_text())
                .collect();

            match summarizer.summarize_cluster(&samples).await {
                Ok(raw) => parse_label_response(&raw),
                Err(e) => {
                    eprintln!("[AI] Cluster labeling failed: {}", e);
                    ClusterLabel {
                        label: FALLBACK_LABEL.to_string(),
                        summary: format!("Could not label cluster: {}", e),
                    }
                }
            }
        }
    }
}

/// Pull {label, summary} out of a free-form summarizer response, falling
/// back to the raw text as summary when no parseable object is present.
fn parse_label_response(raw: &str) -> ClusterLabel {
    match extract_json_object(raw) {
        Some(json) => {
            let label = json
                .get("label")
                .and_then(|v| v.as_str())
                .unwrap_or(FALLBACK_LABEL)
                .to_string();
            let summary = json
                .get("summary")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            ClusterLabel { label, summary }
        }
        None => ClusterLabel {
            label: FALLBACK_LABEL.to_string(),
            summary: raw.to_string(),
        },
    }
}
