//! Plain-text extraction from raw messages
//!
//! The mail store hands back the full message as base64url-encoded MIME.
//! Preference order: joined text/plain parts, then tag-stripped HTML parts.
//! Only used for full-body preview and safe-delete scoring - clustering
//! works from snippets alone.

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::Engine;
use mail_parser::MessageParser;
use regex::Regex;
use std::sync::OnceLock;

use crate::utils::normalize_newlines;

/// Stores are inconsistent about padding their base64url payloads
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a base64url raw message and extract readable plain text.
pub fn extract_plaintext_from_raw(raw_b64: &str) -> Result<String, String> {
    let raw_bytes = BASE64_URL
        .decode(raw_b64.trim())
        .map_err(|e| format!("Failed to decode raw message: {}", e))?;

    extract_plaintext(&raw_bytes)
}

/// Extract readable plain text from decoded MIME bytes.
pub fn extract_plaintext(raw_bytes: &[u8]) -> Result<String, String> {
    let message = MessageParser::default()
        .parse(raw_bytes)
        .ok_or("Failed to parse MIME message")?;

    let mut parts: Vec<String> = Vec::new();
    for i in 0..message.text_body_count() {
        if let Some(text) = message.body_text(i) {
            parts.push(text.into_owned());
        }
    }

    if parts.is_empty() {
        for i in 0..message.html_body_count() {
            if let Some(html) = message.body_html(i) {
                parts.push(strip_html(&html));
            }
        }
    }

    Ok(normalize_newlines(&parts.join("\n")))
}

/// Crude HTML-to-text: drop tags, decode entities, keep the prose.
fn strip_html(html: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());
    let stripped = tag_re.replace_all(html, " ");
    html_escape::decode_html_entities(stripped.as_ref()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(raw: &str) -> String {
        BASE64_URL.encode(raw.as_bytes())
    }

    const PLAIN_MESSAGE: &str = "From: a@example.com\r\n\
To: b@example.com\r\n\
Subject: Hi\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Hello there.\r\nSee you soon.\r\n";

    const HTML_MESSAGE: &str = "From: a@example.com\r\n\
Subject: Offer\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><body><p>Big <b>sale</b> today &amp; tomorrow</p></body></html>\r\n";

    const MULTIPART_MESSAGE: &str = "From: a@example.com\r\n\
Subject: Mixed\r\n\
Content-Type: multipart/alternative; boundary=\"xyz\"\r\n\
\r\n\
--xyz\r\n\
Content-Type: text/plain\r\n\
\r\n\
Plain version.\r\n\
--xyz\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>HTML version.</p>\r\n\
--xyz--\r\n";

    #[test]
    fn test_plain_text_extracted() {
        let text = extract_plaintext_from_raw(&encode(PLAIN_MESSAGE)).unwrap();
        assert!(text.contains("Hello there."));
        assert!(text.contains("See you soon."));
    }

    #[test]
    fn test_html_fallback_strips_tags() {
        let text = extract_plaintext_from_raw(&encode(HTML_MESSAGE)).unwrap();
        assert!(text.contains("sale"));
        assert!(text.contains("& tomorrow"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_multipart_prefers_plain_part() {
        let text = extract_plaintext_from_raw(&encode(MULTIPART_MESSAGE)).unwrap();
        assert!(text.contains("Plain version."));
    }

    #[test]
    fn test_invalid_base64_is_error() {
        assert!(extract_plaintext_from_raw("!!not base64!!").is_err());
    }

    #[test]
    fn test_strip_html_entities() {
        assert_eq!(strip_html("<p>a &lt; b</p>").trim(), "a < b");
    }
}
