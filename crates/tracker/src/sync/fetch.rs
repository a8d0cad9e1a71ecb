//! Candidate listing and expansion
//!
//! Two ways to find candidate messages:
//! - Full sync: search the recent mailbox with the relevance filter, then
//!   read the current mailbox position as the new cursor.
//! - Incremental sync: read the change log strictly after the stored cursor.
//!
//! Listing calls run under the listing retry policy; per-message expansion
//! runs under the cheaper fetch policy and never aborts the batch.

use log::{debug, warn};
use std::sync::Arc;

use super::deadline::Deadline;
use super::retry::RetryPolicy;
use super::source::{MailSource, SourceError};
use crate::config::FullSyncSettings;
use crate::models::{MailMessage, MessageId};

/// Candidate IDs from one strategy plus the cursor to store afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub ids: Vec<MessageId>,
    pub position: u64,
}

/// Lists and expands candidate messages from a [`MailSource`]
pub struct Fetcher {
    source: Arc<dyn MailSource>,
    full_sync: FullSyncSettings,
    listing_retry: RetryPolicy,
    fetch_retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(
        source: Arc<dyn MailSource>,
        full_sync: FullSyncSettings,
        listing_retry: RetryPolicy,
        fetch_retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            full_sync,
            listing_retry,
            fetch_retry,
        }
    }

    /// Search recent relevant mail and anchor the cursor at the mailbox head
    ///
    /// By default the position is read after the search, so a message that
    /// arrives in between can be missed once. With `anchor_before_query` the
    /// position is read first and such a message is seen again next cycle.
    pub fn full_sync(&self, deadline: &Deadline) -> Result<Listing, SourceError> {
        let query = self.full_sync.query();
        debug!("Full sync query: {}", query);

        let (ids, position) = if self.full_sync.anchor_before_query {
            let position = self.current_position(deadline)?;
            (self.search(&query, deadline)?, position)
        } else {
            let ids = self.search(&query, deadline)?;
            (ids, self.current_position(deadline)?)
        };

        debug!("Full sync listed {} candidates, position {}", ids.len(), position);
        Ok(Listing { ids, position })
    }

    /// Read messages added after `since`
    ///
    /// A change log that reports no position leaves the cursor at `since`.
    pub fn incremental_sync(&self, since: u64, deadline: &Deadline) -> Result<Listing, SourceError> {
        let changes = self
            .listing_retry
            .run(deadline, || self.source.list_changes(since, deadline))?;

        let position = changes.position.unwrap_or(since);
        debug!(
            "Incremental sync from {} listed {} candidates, position {}",
            since,
            changes.added.len(),
            position
        );

        Ok(Listing {
            ids: changes.added,
            position,
        })
    }

    /// Fetch one full message
    ///
    /// Failures other than the deadline are logged and yield `None` so the
    /// rest of the batch continues.
    pub fn expand(
        &self,
        id: &MessageId,
        deadline: &Deadline,
    ) -> Result<Option<MailMessage>, SourceError> {
        match self
            .fetch_retry
            .run(deadline, || self.source.get_message(id, deadline))
        {
            Ok(message) => Ok(Some(message)),
            Err(SourceError::Timeout) => Err(SourceError::Timeout),
            Err(e) => {
                warn!("Failed to fetch message {}: {}", id, e);
                Ok(None)
            }
        }
    }

    fn search(&self, query: &str, deadline: &Deadline) -> Result<Vec<MessageId>, SourceError> {
        self.listing_retry.run(deadline, || {
            self.source
                .list_messages(query, self.full_sync.max_results, deadline)
        })
    }

    fn current_position(&self, deadline: &Deadline) -> Result<u64, SourceError> {
        self.listing_retry
            .run(deadline, || self.source.current_position(deadline))
    }
}
