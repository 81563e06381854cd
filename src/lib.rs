//! mailsweep - semantic inbox clustering and bulk cleanup
//!
//! Scans a mailbox, embeds subject+snippet texts locally, partitions them
//! with a two-pass adaptive clustering pipeline, labels clusters via Claude,
//! and applies bulk archive/trash/delete mutations with retry and
//! partial-failure accounting.

pub mod ai_client;
pub mod clustering;
pub mod gmail;
pub mod identity;
pub mod labels;
pub mod local_embeddings;
pub mod mail_store;
pub mod mutation;
pub mod processor;
pub mod session;
pub mod settings;
pub mod similarity;
pub mod utils;

pub use ai_client::{AnthropicClient, SafeDeleteScore, Summarizer};
pub use clustering::ClusterParams;
pub use gmail::GmailClient;
pub use identity::ClusterSignature;
pub use labels::ClusterLabel;
pub use mail_store::{MailStore, MessageMeta, MutationOutcome};
pub use mutation::RetryPolicy;
pub use session::{ClusterGroup, ScanOutcome, Session};
