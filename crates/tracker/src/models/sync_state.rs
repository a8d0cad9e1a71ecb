//! Sync state tracking for incremental Gmail sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable sync cursor for one mailbox
///
/// `history_id` is Gmail's historyId: an opaque, monotonically increasing
/// position in the mailbox change log. A mailbox without a stored state has
/// never completed a cycle and gets a full sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Mailbox identity the cursor is bound to
    pub mailbox: String,
    /// Gmail historyId reached by the last successful cycle
    pub history_id: u64,
    /// When the cursor was last advanced
    pub last_sync_at: DateTime<Utc>,
    /// Schema version for migrations
    pub sync_version: u32,
}

impl SyncState {
    pub fn new(mailbox: impl Into<String>, history_id: u64) -> Self {
        Self {
            mailbox: mailbox.into(),
            history_id,
            last_sync_at: Utc::now(),
            sync_version: 1,
        }
    }

    /// Move the cursor forward, refusing to go backwards
    ///
    /// Returns `None` when `history_id` is not strictly greater than the
    /// current position.
    pub fn advanced(mut self, history_id: u64) -> Option<Self> {
        if history_id <= self.history_id {
            return None;
        }
        self.history_id = history_id;
        self.last_sync_at = Utc::now();
        Some(self)
    }

    /// Gmail keeps history for about a week; older cursors are likely expired
    pub fn is_recent(&self) -> bool {
        let age = Utc::now() - self.last_sync_at;
        age.num_days() < 7
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sync_state() {
        let state = SyncState::new("default", 12345);
        assert_eq!(state.mailbox, "default");
        assert_eq!(state.history_id, 12345);
        assert_eq!(state.sync_version, 1);
        assert!(state.is_recent());
    }

    #[test]
    fn test_advanced_moves_forward_only() {
        let state = SyncState::new("default", 100);
        assert!(state.clone().advanced(100).is_none());
        assert!(state.clone().advanced(99).is_none());

        let advanced = state.advanced(150).unwrap();
        assert_eq!(advanced.history_id, 150);
    }

    #[test]
    fn test_serialization() {
        let state = SyncState::new("default", 42);
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: SyncState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
