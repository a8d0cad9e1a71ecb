//! Gmail API HTTP client
//!
//! Implements [`MailSource`] over the Gmail REST API. Uses synchronous HTTP
//! (ureq) to be executor-agnostic; every request is bounded by the time left
//! on the cycle deadline.

use serde::de::DeserializeOwned;

use super::api::{GmailMessage, HistoryResponse, ListMessagesResponse, ProfileResponse};
use super::{GmailAuth, normalize_message};
use crate::models::{MailMessage, MessageId};
use crate::sync::{ChangeSet, Deadline, MailSource, SourceError};

/// Gmail API client for the authenticated user's mailbox
pub struct GmailClient {
    auth: GmailAuth,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Create a new Gmail client
    pub fn new(auth: GmailAuth) -> Self {
        Self { auth }
    }

    /// Check if a usable token is available
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    /// GET a Gmail endpoint and decode the JSON response
    fn get_json<T: DeserializeOwned>(&self, url: &str, deadline: &Deadline) -> Result<T, SourceError> {
        let access_token = self
            .auth
            .get_access_token(deadline)
            .map_err(|e| token_error(e, deadline))?;

        // Re-read after a possible refresh
        let timeout = deadline.remaining().ok_or(SourceError::Timeout)?;

        let response = ureq::get(url)
            .config()
            .timeout_global(Some(timeout))
            .build()
            .header("Authorization", &format!("Bearer {}", access_token))
            .call();

        match response {
            Ok(mut resp) => resp
                .body_mut()
                .read_json()
                .map_err(|e| SourceError::Transient(format!("Failed to parse response: {}", e))),
            Err(e) => Err(classify_error(e, url)),
        }
    }

    /// One page of the history listing
    fn list_history_page(
        &self,
        start_history_id: u64,
        page_token: Option<&str>,
        deadline: &Deadline,
    ) -> Result<HistoryResponse, SourceError> {
        let mut url = format!(
            "{}/users/me/history?startHistoryId={}&historyTypes=messageAdded",
            Self::BASE_URL,
            start_history_id
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        self.get_json(&url, deadline)
    }
}

impl MailSource for GmailClient {
    fn list_messages(
        &self,
        query: &str,
        max_results: usize,
        deadline: &Deadline,
    ) -> Result<Vec<MessageId>, SourceError> {
        let url = format!(
            "{}/users/me/messages?q={}&maxResults={}",
            Self::BASE_URL,
            urlencoding::encode(query),
            max_results.clamp(1, 500)
        );

        let list: ListMessagesResponse = self.get_json(&url, deadline)?;

        Ok(list
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| MessageId::new(m.id))
            .collect())
    }

    fn current_position(&self, deadline: &Deadline) -> Result<u64, SourceError> {
        let url = format!("{}/users/me/profile", Self::BASE_URL);
        let profile: ProfileResponse = self.get_json(&url, deadline)?;

        profile.history_id.parse().map_err(|_| {
            SourceError::Transient(format!("Invalid historyId in profile: {:?}", profile.history_id))
        })
    }

    fn list_changes(&self, since: u64, deadline: &Deadline) -> Result<ChangeSet, SourceError> {
        let mut changes = ChangeSet::default();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_history_page(since, page_token.as_deref(), deadline)?;

            let added = page
                .history
                .into_iter()
                .flatten()
                .flat_map(|record| record.messages_added.into_iter().flatten())
                .map(|added| MessageId::new(added.message.id));

            for id in added {
                if !changes.added.contains(&id) {
                    changes.added.push(id);
                }
            }

            if let Some(history_id) = page.history_id.and_then(|h| h.parse().ok()) {
                changes.position = Some(history_id);
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(changes)
    }

    fn get_message(&self, id: &MessageId, deadline: &Deadline) -> Result<MailMessage, SourceError> {
        let url = format!(
            "{}/users/me/messages/{}?format=full",
            Self::BASE_URL,
            urlencoding::encode(id.as_str())
        );

        let message: GmailMessage = self.get_json(&url, deadline)?;
        Ok(normalize_message(message))
    }
}

/// Map a ureq failure onto the sync error kinds
///
/// Gmail answers 404 both for unknown message IDs and for a startHistoryId
/// that is too old.
fn classify_error(error: ureq::Error, url: &str) -> SourceError {
    match error {
        ureq::Error::StatusCode(404) => SourceError::NotFound(url.to_string()),
        ureq::Error::Timeout(_) => SourceError::Timeout,
        other => SourceError::Transient(other.to_string()),
    }
}

/// A token failure is a timeout when the deadline ran out, transient otherwise
fn token_error(error: anyhow::Error, deadline: &Deadline) -> SourceError {
    let timed_out = matches!(
        error.downcast_ref::<ureq::Error>(),
        Some(ureq::Error::Timeout(_))
    );
    if timed_out || deadline.is_expired() {
        SourceError::Timeout
    } else {
        SourceError::Transient(format!("{:#}", error))
    }
}
