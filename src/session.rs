//! Per-session state and orchestration
//!
//! One `Session` owns the three pieces of process-lifetime mutable state:
//! the message metadata map, the current cluster partition, and the label
//! cache. It is created per user session, passed explicitly, and mutated
//! only by the interaction loop - no ambient globals.

use std::collections::HashMap;

use crate::ai_client::Summarizer;
use crate::clustering::{self, ClusterParams};
use crate::identity::ClusterSignature;
use crate::labels::{resolve_label, ClusterLabel, LabelCache};
use crate::local_embeddings::TextEmbedder;
use crate::mail_store::{MailStore, MessageMeta};

/// One display group: transient id, member ids, durable signature
#[derive(Debug, Clone)]
pub struct ClusterGroup {
    pub id: i32,
    pub message_ids: Vec<String>,
    pub signature: ClusterSignature,
}

impl ClusterGroup {
    fn new(id: i32, message_ids: Vec<String>) -> Self {
        let signature = ClusterSignature::new(message_ids.iter().cloned());
        Self { id, message_ids, signature }
    }

    pub fn len(&self) -> usize {
        self.message_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message_ids.is_empty()
    }
}

/// Counts reported back from a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub messages_fetched: usize,
    pub clusters_formed: usize,
}

#[derive(Default)]
pub struct Session {
    /// id -> metadata for every message currently known to the session
    pub messages: HashMap<String, MessageMeta>,
    /// Current partition, largest clusters first
    pub clusters: Vec<ClusterGroup>,
    pub label_cache: LabelCache,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch ids and metadata for the query, embed subject+snippet texts,
    /// and replace the current partition with a fresh clustering run.
    pub async fn scan(
        &mut self,
        store: &dyn MailStore,
        embedder: &dyn TextEmbedder,
        query: &str,
        max_results: usize,
        params: &ClusterParams,
    ) -> Result<ScanOutcome, String> {
        let ids = store.list_ids(query, max_results).await?;
        println!("[Session] Found {} messages", ids.len());

        self.messages.clear();
        for id in &ids {
            match store.get_metadata(id).await {
                Ok(meta) => {
                    self.messages.insert(id.clone(), meta);
                }
                Err(e) => {
                    // A message that vanished mid-scan is skipped, not fatal
                    eprintln!("[Session] Metadata fetch failed for {}: {}", id, e);
                }
            }
        }

        let mut ordered_ids: Vec<String> = Vec::with_capacity(self.messages.len());
        let mut texts: Vec<String> = Vec::with_capacity(self.messages.len());
        for id in &ids {
            if let Some(meta) = self.messages.get(id) {
                ordered_ids.push(id.clone());
                texts.push(meta.composed_text());
            }
        }

        let mapping = clustering::cluster_texts(embedder, &texts, params)?;
        self.set_partition(mapping, &ordered_ids);

        println!(
            "[Session] Formed {} clusters from {} messages",
            self.clusters.len(),
            ordered_ids.len()
        );
        Ok(ScanOutcome {
            messages_fetched: ordered_ids.len(),
            clusters_formed: self.clusters.len(),
        })
    }

    /// Replace the partition with engine output (index groups mapped back to
    /// message ids), ordered largest-first for display.
    pub fn set_partition(&mut self, mapping: HashMap<i32, Vec<usize>>, ordered_ids: &[String]) {
        let mut groups: Vec<ClusterGroup> = mapping
            .into_iter()
            .map(|(id, indices)| {
                let member_ids = indices.iter().map(|&i| ordered_ids[i].clone()).collect();
                ClusterGroup::new(id, member_ids)
            })
            .collect();
        groups.sort_by(|a, b| b.len().cmp(&a.len()).then(a.id.cmp(&b.id)));
        self.clusters = groups;
    }

    pub fn cluster(&self, id: i32) -> Option<&ClusterGroup> {
        self.clusters.iter().find(|c| c.id == id)
    }

    /// Resolve the label for a cluster through the strict signature cache
    pub async fn label_for(
        &mut self,
        summarizer: &dyn Summarizer,
        cluster_id: i32,
    ) -> Option<ClusterLabel> {
        let member_ids = self
            .clusters
            .iter()
            .find(|c| c.id == cluster_id)?
            .message_ids
            .clone();
        Some(resolve_label(&mut self.label_cache, summarizer, &member_ids, &self.messages).await)
    }

    /// Drop ids that were deleted or archived: remove them from the metadata
    /// map and from every cluster, discard clusters that become empty, and
    /// refresh signatures of clusters that shrank. Keeps the displayed
    /// partition consistent with the real mailbox without a re-scan.
    pub fn remove_messages(&mut self, removed_ids: &[String]) {
        for id in removed_ids {
            self.messages.remove(id);
        }

        for cluster in &mut self.clusters {
            let before = cluster.message_ids.len();
            cluster.message_ids.retain(|id| !removed_ids.contains(id));
            if cluster.message_ids.len() != before {
                cluster.signature = ClusterSignature::new(cluster.message_ids.iter().cloned());
            }
        }
        self.clusters.retain(|c| !c.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail_store::MutationOutcome;
    use async_trait::async_trait;

    struct InMemoryStore {
        messages: Vec<(String, MessageMeta)>,
    }

    #[async_trait]
    impl MailStore for InMemoryStore {
        async fn list_ids(&self, _query: &str, max: usize) -> Result<Vec<String>, String> {
            Ok(self.messages.iter().take(max).map(|(id, _)| id.clone()).collect())
        }

        async fn get_metadata(&self, id: &str) -> Result<MessageMeta, String> {
            self.messages
                .iter()
                .find(|(mid, _)| mid == id)
                .map(|(_, meta)| meta.clone())
                .ok_or_else(|| format!("no such message {}", id))
        }

        async fn get_raw_body(&self, _id: &str) -> Result<String, String> {
            Err("not implemented".to_string())
        }

        async fn batch_delete(&self, _ids: &[String]) -> Result<(), String> {
            Ok(())
        }

        async fn move_to_trash(&self, ids: &[String]) -> MutationOutcome {
            MutationOutcome { success_count: ids.len(), failure_count: 0 }
        }

        async fn archive(&self, ids: &[String]) -> MutationOutcome {
            MutationOutcome { success_count: ids.len(), failure_count: 0 }
        }
    }

    /// Maps each text to a fixed vector by keyword
    struct KeywordEmbedder;

    impl TextEmbedder for KeywordEmbedder {
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("Invoice") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    fn message(id: &str, subject: &str, snippet: &str) -> (String, MessageMeta) {
        (
            id.to_string(),
            MessageMeta {
                snippet: snippet.to_string(),
                subject: subject.to_string(),
                from: "sender@example.com".to_string(),
                date: String::new(),
            },
        )
    }

    fn store() -> InMemoryStore {
        InMemoryStore {
            messages: vec![
                message("a", "Invoice #1", "Payment due"),
                message("b", "Invoice #2", "Payment due"),
                message("c", "Team lunch", "Friday noon"),
            ],
        }
    }

    #[tokio::test]
    async fn test_scan_builds_partition() {
        let mut session = Session::new();
        let outcome = session
            .scan(&store(), &KeywordEmbedder, "", 100, &ClusterParams::default())
            .await
            .unwrap();

        assert_eq!(outcome.messages_fetched, 3);
        assert_eq!(outcome.clusters_formed, 2);
        assert_eq!(session.messages.len(), 3);

        // Largest cluster first: the two invoices
        assert_eq!(session.clusters[0].message_ids, vec!["a", "b"]);
        assert_eq!(session.clusters[1].message_ids, vec!["c"]);
    }

    #[tokio::test]
    async fn test_scan_empty_mailbox() {
        let empty = InMemoryStore { messages: vec![] };
        let mut session = Session::new();
        let outcome = session
            .scan(&empty, &KeywordEmbedder, "", 100, &ClusterParams::default())
            .await
            .unwrap();
        assert_eq!(outcome.clusters_formed, 0);
        assert!(session.clusters.is_empty());
    }

    #[test]
    fn test_remove_messages_updates_signature() {
        let mut session = Session::new();
        let ids: Vec<String> = (0..5).map(|i| format!("m{}", i)).collect();
        for id in &ids {
            session.messages.insert(id.clone(), MessageMeta::default());
        }
        let mapping = HashMap::from([(0, vec![0usize, 1, 2, 3, 4])]);
        session.set_partition(mapping, &ids);
        let original_signature = session.clusters[0].signature.clone();

        session.remove_messages(&ids[0..3].to_vec());

        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.clusters.len(), 1);
        assert_eq!(session.clusters[0].message_ids, vec!["m3", "m4"]);
        assert_ne!(session.clusters[0].signature, original_signature);
    }

    #[test]
    fn test_remove_messages_discards_empty_cluster() {
        let mut session = Session::new();
        let ids: Vec<String> = vec!["x".into(), "y".into(), "z".into()];
        for id in &ids {
            session.messages.insert(id.clone(), MessageMeta::default());
        }
        let mapping = HashMap::from([(0, vec![0usize, 1]), (1, vec![2usize])]);
        session.set_partition(mapping, &ids);
        assert_eq!(session.clusters.len(), 2);

        session.remove_messages(&["z".to_string()]);
        assert_eq!(session.clusters.len(), 1);
        assert!(session.cluster(1).is_none());
    }

    #[test]
    fn test_remove_messages_untouched_cluster_keeps_signature() {
        let mut session = Session::new();
        let ids: Vec<String> = vec!["x".into(), "y".into(), "z".into()];
        for id in &ids {
            session.messages.insert(id.clone(), MessageMeta::default());
        }
        let mapping = HashMap::from([(0, vec![0usize, 1]), (1, vec![2usize])]);
        session.set_partition(mapping, &ids);
        let untouched = session.cluster(0).unwrap().signature.clone();

        session.remove_messages(&["z".to_string()]);
        assert_eq!(session.cluster(0).unwrap().signature, untouched);
    }
}
