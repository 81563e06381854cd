//! Mail store capability
//!
//! The clustering core consumes the mailbox through this trait; the concrete
//! Gmail REST implementation lives in [`crate::gmail`]. Tests substitute
//! in-memory stores.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-message metadata held for the session lifetime. All fields are plain
/// text and possibly empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMeta {
    pub snippet: String,
    pub subject: String,
    pub from: String,
    pub date: String,
}

impl MessageMeta {
    /// The text the embedder sees: subject plus snippet, the cheap proxy for
    /// full message content.
    pub fn composed_text(&self) -> String {
        format!("Subject: {}\n{}", self.subject, self.snippet)
    }
}

/// Success/failure accounting for one bulk mutation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub success_count: usize,
    pub failure_count: usize,
}

impl MutationOutcome {
    pub fn merge(&mut self, other: MutationOutcome) {
        self.success_count += other.success_count;
        self.failure_count += other.failure_count;
    }
}

/// Abstract mailbox operations the session needs.
///
/// `batch_delete` is all-or-nothing per call (the store either removes the
/// whole batch or errors); `move_to_trash` and `archive` account per id and
/// never error for partial failures.
#[async_trait]
pub trait MailStore: Send + Sync {
    async fn list_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>, String>;

    async fn get_metadata(&self, id: &str) -> Result<MessageMeta, String>;

    /// Full raw message as the store's base64url-encoded MIME payload
    async fn get_raw_body(&self, id: &str) -> Result<String, String>;

    async fn batch_delete(&self, ids: &[String]) -> Result<(), String>;

    async fn move_to_trash(&self, ids: &[String]) -> MutationOutcome;

    async fn archive(&self, ids: &[String]) -> MutationOutcome;
}
