//! Gmail REST API client
//!
//! Implements [`MailStore`] over the Gmail v1 HTTP API with a bearer token
//! from settings (or the GMAIL_ACCESS_TOKEN env var). OAuth token acquisition
//! is outside this crate; any OAuth helper that yields a `gmail.modify`
//! scoped token works.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::mail_store::{MailStore, MessageMeta, MutationOutcome};
use crate::settings;

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Ids per list page; the API caps pages at 500
const LIST_PAGE_SIZE: usize = 500;

pub struct GmailClient {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    snippet: String,
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    raw: String,
}

impl GmailClient {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    fn token(&self) -> Result<String, String> {
        settings::get_gmail_token().ok_or_else(|| "GMAIL_ACCESS_TOKEN not set".to_string())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, String> {
        let token = self.token()?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Gmail API error {}: {}", status, body));
        }

        response
            .json()
            .await
            .map_err(|e| format!("Failed to parse Gmail response: {}", e))
    }

    async fn post_json(&self, url: &str, body: serde_json::Value) -> Result<(), String> {
        let token = self.token()?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("Gmail API error {}: {}", status, text));
        }
        Ok(())
    }

    /// Add/remove labels on a single message
    async fn modify_labels(
        &self,
        id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), String> {
        let url = format!("{}/messages/{}/modify", API_BASE, id);
        self.post_json(
            &url,
            json!({ "addLabelIds": add, "removeLabelIds": remove }),
        )
        .await
    }

    /// Apply a per-message label change to every id, counting outcomes
    async fn modify_each(&self, ids: &[String], add: &[&str], remove: &[&str]) -> MutationOutcome {
        let mut outcome = MutationOutcome::default();
        for id in ids {
            match self.modify_labels(id, add, remove).await {
                Ok(()) => outcome.success_count += 1,
                Err(e) => {
                    eprintln!("[Gmail] Label change failed for {}: {}", id, e);
                    outcome.failure_count += 1;
                }
            }
        }
        outcome
    }
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailStore for GmailClient {
    /// List message ids matching a query (empty query matches everything),
    /// following pagination up to `max_results`.
    async fn list_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>, String> {
        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/messages?maxResults={}&q={}",
                API_BASE,
                LIST_PAGE_SIZE,
                urlencoding::encode(query)
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
            }

            let page: ListResponse = self.get_json(&url).await?;
            ids.extend(page.messages.into_iter().map(|m| m.id));

            match page.next_page_token {
                Some(token) if ids.len() < max_results => page_token = Some(token),
                _ => break,
            }
        }

        ids.truncate(max_results);
        println!("[Gmail] Listed {} message ids", ids.len());
        Ok(ids)
    }

    /// Metadata fields (snippet, headers) without the raw body
    async fn get_metadata(&self, id: &str) -> Result<MessageMeta, String> {
        let url = format!(
            "{}/messages/{}?format=metadata&metadataHeaders=From&metadataHeaders=Subject&metadataHeaders=Date",
            API_BASE, id
        );
        let response: MetadataResponse = self.get_json(&url).await?;

        let mut meta = MessageMeta {
            snippet: response.snippet,
            ..Default::default()
        };
        for header in response.payload.map(|p| p.headers).unwrap_or_default() {
            match header.name.as_str() {
                "Subject" => meta.subject = header.value,
                "From" => meta.from = header.value,
                "Date" => meta.date = header.value,
                _ => {}
            }
        }
        Ok(meta)
    }

    /// Full raw message (base64url MIME) for body preview / scoring
    async fn get_raw_body(&self, id: &str) -> Result<String, String> {
        let url = format!("{}/messages/{}?format=raw", API_BASE, id);
        let response: RawResponse = self.get_json(&url).await?;
        Ok(response.raw)
    }

    /// Permanently remove a batch; all-or-nothing per the API contract
    async fn batch_delete(&self, ids: &[String]) -> Result<(), String> {
        if ids.is_empty() {
            return Ok(());
        }
        let url = format!("{}/messages/batchDelete", API_BASE);
        self.post_json(&url, json!({ "ids": ids })).await
    }

    async fn move_to_trash(&self, ids: &[String]) -> MutationOutcome {
        self.modify_each(ids, &["TRASH"], &[]).await
    }

    async fn archive(&self, ids: &[String]) -> MutationOutcome {
        self.modify_each(ids, &[], &["INBOX"]).await
    }
}
