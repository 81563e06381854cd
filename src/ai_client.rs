//! Anthropic Claude API client for cluster labeling and safe-delete scoring
//!
//! Responses are free-form text expected to contain an embedded JSON object;
//! parsing is best-effort and never fatal to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::settings;
use crate::utils::safe_truncate;

/// Up to this many sample texts are sent per cluster labeling request
pub const MAX_SAMPLE_TEXTS: usize = 6;

/// Parsed safe-delete verdict for a single message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeDeleteScore {
    pub score: f64,
    pub reason: String,
}

/// External summarizer capability consumed by the label resolver and the
/// safe-delete preview. Both calls are best-effort: the raw text comes back
/// and the caller extracts structure with [`extract_json_object`].
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Free-form text expected to contain {"label": ..., "summary": ...}
    async fn summarize_cluster(&self, sample_texts: &[String]) -> Result<String, String>;

    /// Free-form text expected to contain {"score": 0.0-1.0, "reason": ...}
    async fn score_deletion_safety(&self, message_text: &str) -> Result<String, String>;
}

/// Anthropic API message format
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Anthropic API request format
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

/// Anthropic API response format
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

/// Check if AI features are available (API key is set)
pub fn is_available() -> bool {
    settings::has_api_key()
}

/// Claude-backed summarizer
pub struct AnthropicClient {
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    async fn send(&self, prompt: String, max_tokens: u32) -> Result<String, String> {
        let api_key = settings::get_api_key().ok_or("ANTHROPIC_API_KEY not set")?;

        let request = AnthropicRequest {
            model: settings::get_anthropic_model(),
            max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API error {}: {}", status, body));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))?;

        // Track token usage
        if let Some(usage) = &api_response.usage {
            let _ = settings::add_anthropic_tokens(usage.input_tokens, usage.output_tokens);
        }

        Ok(api_response
            .content
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_default())
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for AnthropicClient {
    async fn summarize_cluster(&self, sample_texts: &[String]) -> Result<String, String> {
        let sample = sample_texts
            .iter()
            .take(MAX_SAMPLE_TEXTS)
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");

        let prompt = format!(
            r#"Given the following emails (separated by '---'), produce a short label (3 words or less) and a 2-3 sentence human readable summary explaining why they were grouped.
Output JSON: {{"label": "...", "summary": "..."}}

Emails:
{}"#,
            sample
        );

        self.send(prompt, 256).await
    }

    async fn score_deletion_safety(&self, message_text: &str) -> Result<String, String> {
        let prompt = format!(
            r#"For the following single email text, respond with JSON containing:
- "score": a float from 0.0 to 1.0 showing how safe it is to DELETE this email (1.0 = very safe to delete, 0.0 = definitely do not delete),
- "reason": short explanation (1-2 sentences).
Email:
"""{}""""#,
            safe_truncate(message_text, 3000)
        );

        self.send(prompt, 512).await
    }
}

// ==================== Best-effort structured extraction ====================

/// Locate the first brace-delimited JSON object embedded in free-form text.
/// Returns None on malformed or absent JSON; never panics.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Parse a safe-delete response; score is clamped to [0, 1].
pub fn parse_safe_delete(text: &str) -> Option<SafeDeleteScore> {
    let json = extract_json_object(text)?;
    let score = json.get("score")?.as_f64()?;
    let reason = json
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    Some(SafeDeleteScore {
        score: score.clamp(0.0, 1.0),
        reason,
    })
}
