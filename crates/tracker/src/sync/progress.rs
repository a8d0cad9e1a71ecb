//! Durable sync progress: the mailbox cursor and the processed-message set

use anyhow::Result;
use log::debug;
use std::sync::Arc;

use crate::models::MessageId;
use crate::storage::TrackerStore;

/// Reads and advances the cursor for one mailbox
pub struct CursorStore {
    store: Arc<dyn TrackerStore>,
    mailbox: String,
}

impl CursorStore {
    pub fn new(store: Arc<dyn TrackerStore>, mailbox: impl Into<String>) -> Self {
        Self {
            store,
            mailbox: mailbox.into(),
        }
    }

    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// Stored cursor, or `None` if no cycle has completed yet
    pub fn load(&self) -> Result<Option<u64>> {
        Ok(self
            .store
            .get_sync_state(&self.mailbox)?
            .map(|state| state.history_id))
    }

    /// Persist `position` if it is strictly greater than the stored cursor
    pub fn advance(&self, position: u64) -> Result<bool> {
        let advanced = self.store.advance_cursor(&self.mailbox, position)?;
        if !advanced {
            debug!(
                "Cursor for {} not advanced: {} is not past the stored position",
                self.mailbox, position
            );
        }
        Ok(advanced)
    }
}

/// Tracks which messages have already been handled
pub struct Deduplicator {
    store: Arc<dyn TrackerStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn TrackerStore>) -> Self {
        Self { store }
    }

    pub fn is_processed(&self, id: &MessageId) -> Result<bool> {
        self.store.is_processed(id)
    }

    pub fn mark_processed(&self, id: &MessageId) -> Result<()> {
        self.store.mark_processed(id)
    }
}
