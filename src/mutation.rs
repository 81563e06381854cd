//! Bulk mailbox mutations in bounded batches
//!
//! Archive and trash run one batch at a time with a fixed pause between
//! batches. Permanent delete additionally retries each failed batch with
//! exponential backoff before counting its ids as failed. Partial failures
//! are accounted, never raised.

use std::time::Duration;

use crate::mail_store::{MailStore, MutationOutcome};

/// Delete attempts per batch before the batch is abandoned
const MAX_DELETE_ATTEMPTS: u32 = 3;

/// Batching and pacing knobs. The defaults match the mail store's rate
/// limits; tests shrink the time units to milliseconds.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub batch_size: usize,
    /// Base unit for exponential backoff (delays are 2u, 4u, 8u)
    pub backoff_unit: Duration,
    /// Pause between consecutive batches regardless of outcome
    pub batch_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            batch_size: 100,
            backoff_unit: Duration::from_secs(1),
            batch_pause: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry `attempt` (1-based): 2^attempt base units
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_unit * 2u32.saturating_pow(attempt)
    }
}

/// Permanently delete ids in batches, retrying each failed batch up to 3
/// attempts with exponential backoff. Abandoned batches count as failures.
pub async fn bulk_delete_with_retry(
    store: &dyn MailStore,
    message_ids: &[String],
    policy: &RetryPolicy,
) -> MutationOutcome {
    let mut outcome = MutationOutcome::default();

    for batch in message_ids.chunks(policy.batch_size.max(1)) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match store.batch_delete(batch).await {
                Ok(()) => {
                    outcome.success_count += batch.len();
                    break;
                }
                Err(e) if attempts < MAX_DELETE_ATTEMPTS => {
                    eprintln!("[Mutation] Batch delete error, retrying: {}", e);
                    tokio::time::sleep(policy.backoff_delay(attempts)).await;
                }
                Err(e) => {
                    eprintln!(
                        "[Mutation] Batch of {} abandoned after {} attempts: {}",
                        batch.len(),
                        attempts,
                        e
                    );
                    outcome.failure_count += batch.len();
                    break;
                }
            }
        }
        tokio::time::sleep(policy.batch_pause).await;
    }

    outcome
}

/// Move ids to trash in batches (softer than permanent delete)
pub async fn bulk_trash(
    store: &dyn MailStore,
    message_ids: &[String],
    policy: &RetryPolicy,
) -> MutationOutcome {
    let mut outcome = MutationOutcome::default();
    for batch in message_ids.chunks(policy.batch_size.max(1)) {
        outcome.merge(store.move_to_trash(batch).await);
        tokio::time::sleep(policy.batch_pause).await;
    }
    outcome
}

/// Archive ids (remove the inbox marker) in batches
pub async fn bulk_archive(
    store: &dyn MailStore,
    message_ids: &[String],
    policy: &RetryPolicy,
) -> MutationOutcome {
    let mut outcome = MutationOutcome::default();
    for batch in message_ids.chunks(policy.batch_size.max(1)) {
        outcome.merge(store.archive(batch).await);
        tokio::time::sleep(policy.batch_pause).await;
    }
    outcome
}
