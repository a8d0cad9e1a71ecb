//! Company model (the organization an application was sent to)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked company
///
/// Companies are unique by their normalized name, so "Stripe", " stripe " and
/// "STRIPE" all refer to the same row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Local database ID
    pub id: i64,
    /// Name as first entered by the user
    pub name: String,
    /// Lower-cased, whitespace-collapsed name used for lookups and matching
    pub normalized_name: String,
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            normalized_name: normalize_name(&name),
            name: name.trim().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Normalize a company name: trim, lower-case and collapse inner whitespace
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
