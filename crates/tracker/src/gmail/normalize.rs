//! Gmail API response normalization
//!
//! Reduces a full Gmail message to the subject, sender and body the sync
//! pipeline works with.

use base64::prelude::*;

use super::api::{GmailMessage, MessagePart, MessagePayload};
use crate::models::{MailMessage, MessageId};

/// Normalize a Gmail API message
///
/// Missing headers become empty strings. The body prefers `text/plain`,
/// falls back to `text/html` reduced to its visible text, then to whatever
/// single-part body is present.
pub fn normalize_message(gmail_msg: GmailMessage) -> MailMessage {
    let id = MessageId::new(&gmail_msg.id);

    let Some(payload) = gmail_msg.payload.as_ref() else {
        return MailMessage::new(id, "", "", gmail_msg.snippet.unwrap_or_default());
    };

    let subject = extract_header(payload, "Subject").unwrap_or_default();
    let from = extract_header(payload, "From").unwrap_or_default();
    let body = extract_body(payload).unwrap_or_default();

    MailMessage::new(id, subject, from, body)
}

/// Extract a header value by name
fn extract_header(payload: &MessagePayload, name: &str) -> Option<String> {
    payload.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

fn extract_body(payload: &MessagePayload) -> Option<String> {
    let top_level = payload
        .body
        .as_ref()
        .and_then(|b| b.data.as_deref())
        .and_then(decode_base64_body);

    let is_mime = |mime: &str| payload.mime_type.as_deref().is_some_and(|m| m.starts_with(mime));

    if is_mime("text/plain")
        && let Some(text) = &top_level
    {
        return Some(text.clone());
    }

    if let Some(parts) = &payload.parts {
        if let Some(text) = find_in_parts(parts, "text/plain") {
            return Some(text);
        }
        if let Some(html) = find_in_parts(parts, "text/html") {
            return Some(html_to_text(&html));
        }
    }

    if is_mime("text/html") {
        return top_level.map(|html| html_to_text(&html));
    }

    top_level
}

/// Recursively search message parts for the first body of a MIME type
fn find_in_parts(parts: &[MessagePart], mime: &str) -> Option<String> {
    for part in parts {
        if part.mime_type.as_deref().is_some_and(|m| m.starts_with(mime))
            && let Some(body) = &part.body
            && let Some(data) = &body.data
            && let Some(text) = decode_base64_body(data)
        {
            return Some(text);
        }

        if let Some(nested) = &part.parts
            && let Some(text) = find_in_parts(nested, mime)
        {
            return Some(text);
        }
    }

    None
}

/// Reduce an HTML body to its visible text
///
/// Tags become word breaks, `<script>` and `<style>` contents are dropped and
/// whitespace is collapsed.
fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut chars = html.chars();
    let mut hidden = false;

    while let Some(c) = chars.next() {
        if c != '<' {
            if !hidden {
                text.push(c);
            }
            continue;
        }

        let tag: String = chars.by_ref().take_while(|&c| c != '>').collect();
        let name = tag
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_ascii_lowercase();
        match name.as_str() {
            "script" | "style" => hidden = true,
            "/script" | "/style" => hidden = false,
            _ => {}
        }
        text.push(' ');
    }

    decode_html_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `&amp;` goes last so escaped entities are not decoded twice
fn decode_html_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple decoders.
fn decode_base64_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    decoders
        .iter()
        .filter_map(|decoder| decoder.decode(data).ok())
        .find_map(|decoded| String::from_utf8(decoded).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::api::{Header, MessageBody};

    fn encode(s: &str) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(s)
    }

    fn part(mime: &str, text: &str) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            body: Some(MessageBody {
                size: Some(text.len() as u32),
                data: Some(encode(text)),
            }),
            parts: None,
        }
    }

    fn message(payload: MessagePayload) -> GmailMessage {
        GmailMessage {
            id: "m1".to_string(),
            thread_id: Some("t1".to_string()),
            snippet: Some("snippet".to_string()),
            payload: Some(payload),
        }
    }

    fn headers(pairs: &[(&str, &str)]) -> Option<Vec<Header>> {
        Some(
            pairs
                .iter()
                .map(|(n, v)| Header {
                    name: n.to_string(),
                    value: v.to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn test_extract_header_case_insensitive() {
        let payload = MessagePayload {
            headers: headers(&[("FROM", "jobs@acme.com")]),
            body: None,
            parts: None,
            mime_type: None,
        };
        assert_eq!(extract_header(&payload, "from"), Some("jobs@acme.com".to_string()));
        assert_eq!(extract_header(&payload, "Subject"), None);
    }

    #[test]
    fn test_simple_plain_text_message() {
        let msg = message(MessagePayload {
            headers: headers(&[("Subject", "Interview invite"), ("From", "Acme <jobs@acme.com>")]),
            body: Some(MessageBody {
                size: None,
                data: Some(encode("Let's talk on Monday")),
            }),
            parts: None,
            mime_type: Some("text/plain".to_string()),
        });

        let normalized = normalize_message(msg);
        assert_eq!(normalized.id.as_str(), "m1");
        assert_eq!(normalized.subject, "Interview invite");
        assert_eq!(normalized.from, "Acme <jobs@acme.com>");
        assert_eq!(normalized.body, "Let's talk on Monday");
    }

    #[test]
    fn test_multipart_prefers_plain_text() {
        let msg = message(MessagePayload {
            headers: headers(&[("Subject", "Update")]),
            body: None,
            parts: Some(vec![part("text/html", "<p>html</p>"), part("text/plain", "plain")]),
            mime_type: Some("multipart/alternative".to_string()),
        });
        assert_eq!(normalize_message(msg).body, "plain");
    }

    #[test]
    fn test_nested_html_fallback() {
        let nested = MessagePart {
            mime_type: Some("multipart/alternative".to_string()),
            body: None,
            parts: Some(vec![part("text/html", "<p>only html</p>")]),
        };
        let msg = message(MessagePayload {
            headers: None,
            body: None,
            parts: Some(vec![nested]),
            mime_type: Some("multipart/mixed".to_string()),
        });

        let normalized = normalize_message(msg);
        assert_eq!(normalized.body, "only html");
        assert_eq!(normalized.subject, "");
    }

    #[test]
    fn test_single_part_html_is_reduced_to_text() {
        let html = "<html><head><style>p { color: red; }</style></head>\
                    <body><p>We&#39;d like to <b>schedule</b> an interview</p>\
                    <script>track();</script><br/>Acme &amp; Co &lt;jobs&gt;</body></html>";
        let msg = message(MessagePayload {
            headers: headers(&[("Subject", "Next steps")]),
            body: Some(MessageBody {
                size: None,
                data: Some(encode(html)),
            }),
            parts: None,
            mime_type: Some("text/html".to_string()),
        });

        assert_eq!(
            normalize_message(msg).body,
            "We'd like to schedule an interview Acme & Co <jobs>"
        );
    }

    #[test]
    fn test_escaped_entities_are_decoded_once() {
        assert_eq!(html_to_text("<p>&amp;lt;b&amp;gt;</p>"), "&lt;b&gt;");
    }

    #[test]
    fn test_missing_payload_uses_snippet() {
        let msg = GmailMessage {
            id: "m2".to_string(),
            thread_id: None,
            snippet: Some("short preview".to_string()),
            payload: None,
        };
        assert_eq!(normalize_message(msg).body, "short preview");
    }

    #[test]
    fn test_decode_base64_body() {
        // "Hello, World!" in base64url
        assert_eq!(decode_base64_body("SGVsbG8sIFdvcmxkIQ"), Some("Hello, World!".to_string()));
    }
}
