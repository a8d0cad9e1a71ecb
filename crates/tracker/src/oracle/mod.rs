//! Reasoning oracle (LLM) access
//!
//! The oracle is a black box from prompt text to reply text. Callers build
//! task-specific prompts with [`prompts`] and decode the JSON-shaped answer
//! with [`parse_json_reply`], which strips incidental formatting first and
//! reports malformed replies as a typed [`ReplyParseError`].

mod gemini;
pub mod prompts;

use anyhow::Result;
use serde::de::DeserializeOwned;

use crate::sync::Deadline;

pub use gemini::GeminiOracle;

/// External reasoning service
pub trait Oracle: Send + Sync {
    /// Send a prompt and return the raw reply text
    ///
    /// Implementations must give up once `deadline` has passed.
    fn complete(&self, prompt: &str, deadline: &Deadline) -> Result<String>;
}

/// A reply that could not be decoded into the expected shape
#[derive(Debug, thiserror::Error)]
pub enum ReplyParseError {
    #[error("Reply contains no JSON object. Raw: {raw:?}")]
    NoJson { raw: String },

    #[error("Reply has an unexpected shape: {source}. Raw: {raw:?}")]
    Shape {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Strip markdown fences and surrounding prose from a JSON reply
///
/// Returns the text between the first `{` and the last `}`, or `None` if
/// there is no such span.
pub fn sanitize_reply(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let unfenced = unfenced.strip_suffix("```").unwrap_or(unfenced).trim();

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&unfenced[start..=end])
}

/// Sanitize then decode an oracle reply into `T`
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T, ReplyParseError> {
    let json = sanitize_reply(raw).ok_or_else(|| ReplyParseError::NoJson {
        raw: raw.to_string(),
    })?;

    serde_json::from_str(json).map_err(|source| ReplyParseError::Shape {
        raw: raw.to_string(),
        source,
    })
}
