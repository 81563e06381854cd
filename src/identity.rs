//! Stable cluster identity
//!
//! Clustering runs hand out transient integer ids that change between runs.
//! The signature - the sorted set of member message ids - is the durable key:
//! two clusters with identical membership always produce the same signature,
//! and any single-id difference produces a different one. The label cache is
//! keyed exclusively on signatures so labels survive re-clustering and UI
//! refreshes without recomputation.

use serde::{Deserialize, Serialize};

/// Canonical, order-independent key for a cluster's membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterSignature(Vec<String>);

impl ClusterSignature {
    /// Build a signature from member ids in any order.
    pub fn new<I, S>(member_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = member_ids.into_iter().map(Into::into).collect();
        ids.sort();
        ClusterSignature(ids)
    }

    pub fn member_ids(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
