//! Audit log entries for applications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type recorded when a synced email changes an application's status
pub const EMAIL_UPDATE: &str = "EMAIL_UPDATE";

/// An immutable audit record tied to one application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationEvent {
    pub id: i64,
    pub application_id: i64,
    pub event_type: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

/// An audit record that has not been stored yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplicationEvent {
    pub application_id: i64,
    pub event_type: String,
    pub details: String,
}

impl NewApplicationEvent {
    pub fn new(
        application_id: i64,
        event_type: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            application_id,
            event_type: event_type.into(),
            details: details.into(),
        }
    }
}
