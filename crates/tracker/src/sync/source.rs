//! Remote message store abstraction
//!
//! The sync engine only talks to the mailbox through [`MailSource`], so tests
//! can script the remote side and the Gmail client stays a thin adapter.

use crate::models::{MailMessage, MessageId};

use super::deadline::Deadline;

/// Errors from the remote message store
///
/// Callers branch on the kind: `NotFound` means retrying cannot help (and for
/// the change log means the cursor has expired), `Transient` is retried with
/// backoff, `Timeout` means the cycle deadline was hit.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("Not found or expired: {0}")]
    NotFound(String),

    #[error("Mailbox request failed: {0}")]
    Transient(String),

    #[error("Cycle deadline exceeded")]
    Timeout,

    #[error("Failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<SourceError>,
    },
}

impl SourceError {
    /// True for the "not found / expired" kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SourceError::Timeout)
    }

    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// Messages added to the mailbox since a cursor, plus the new cursor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// IDs of added messages, oldest first, without duplicates
    pub added: Vec<MessageId>,
    /// Mailbox position after these changes, if the store reported one
    pub position: Option<u64>,
}

/// Read-only view of the remote mailbox
pub trait MailSource: Send + Sync {
    /// Search for messages matching a provider query, newest first
    fn list_messages(
        &self,
        query: &str,
        max_results: usize,
        deadline: &Deadline,
    ) -> Result<Vec<MessageId>, SourceError>;

    /// Current global position of the mailbox change log
    fn current_position(&self, deadline: &Deadline) -> Result<u64, SourceError>;

    /// Message-added changes strictly after `since`
    ///
    /// Returns [`SourceError::NotFound`] when `since` is too old for the
    /// store to answer.
    fn list_changes(&self, since: u64, deadline: &Deadline) -> Result<ChangeSet, SourceError>;

    /// Fetch one message with headers and body
    fn get_message(&self, id: &MessageId, deadline: &Deadline) -> Result<MailMessage, SourceError>;
}
