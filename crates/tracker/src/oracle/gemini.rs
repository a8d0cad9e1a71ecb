//! Gemini generateContent backend

use anyhow::{Context, Result, bail};
use log::debug;
use serde::Deserialize;
use serde_json::json;

use super::Oracle;
use crate::config::OracleSettings;
use crate::sync::Deadline;

/// Environment variable holding the Gemini API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// [`Oracle`] backed by the Gemini REST API
pub struct GeminiOracle {
    api_key: String,
    settings: OracleSettings,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiOracle {
    const BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    pub fn new(api_key: impl Into<String>, settings: OracleSettings) -> Self {
        Self {
            api_key: api_key.into(),
            settings,
        }
    }

    /// Read the API key from `GEMINI_API_KEY`
    pub fn from_env(settings: OracleSettings) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .with_context(|| format!("{} is not set", API_KEY_ENV))?;
        Ok(Self::new(api_key, settings))
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

impl Oracle for GeminiOracle {
    fn complete(&self, prompt: &str, deadline: &Deadline) -> Result<String> {
        let remaining = deadline
            .remaining()
            .context("Deadline passed before oracle call")?;
        let timeout = remaining.min(self.settings.request_timeout());

        let url = format!(
            "{}/models/{}:generateContent",
            Self::BASE_URL,
            self.settings.model
        );
        let request = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.settings.temperature },
        });

        debug!(
            "Gemini request: model={}, prompt_chars={}",
            self.settings.model,
            prompt.len()
        );

        let mut response = ureq::post(&url)
            .config()
            .timeout_global(Some(timeout))
            .build()
            .header("x-goog-api-key", &self.api_key)
            .send_json(&request)
            .context("Gemini request failed")?;

        let parsed: GenerateContentResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse Gemini response")?;

        extract_text(parsed)
    }
}

/// Concatenate the text parts of the first candidate
fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        bail!("Gemini returned an empty response");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_joins_parts() {
        let json = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"index\""}, {"text": ": 1}"}]},
                "finishReason": "STOP"
            }]
        }"#;
        let response: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(extract_text(response).unwrap(), r#"{"index": 1}"#);
    }

    #[test]
    fn test_extract_text_rejects_empty_response() {
        let response: GenerateContentResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(extract_text(response).is_err());

        let blocked: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(extract_text(blocked).is_err());
    }

    #[test]
    fn test_expired_deadline_skips_request() {
        let oracle = GeminiOracle::new("key", OracleSettings::default());
        let deadline = Deadline::after(std::time::Duration::ZERO);
        assert!(oracle.complete("prompt", &deadline).is_err());
    }
}
