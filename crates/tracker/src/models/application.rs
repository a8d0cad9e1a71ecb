//! Application model (one role applied for at one company)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of an application
///
/// `Offer` and `Rejected` are terminal: the sync engine never picks a
/// terminal application as the target of an incoming email.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    #[default]
    Applied,
    Interview,
    Offer,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 4] = [
        ApplicationStatus::Applied,
        ApplicationStatus::Interview,
        ApplicationStatus::Offer,
        ApplicationStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "APPLIED",
            ApplicationStatus::Interview => "INTERVIEW",
            ApplicationStatus::Offer => "OFFER",
            ApplicationStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Offer | ApplicationStatus::Rejected)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for status strings outside the known set
#[derive(Debug, thiserror::Error)]
#[error("Unknown application status: {0:?}")]
pub struct StatusParseError(pub String);

impl FromStr for ApplicationStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == upper)
            .ok_or_else(|| StatusParseError(s.to_string()))
    }
}

/// A tracked job application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub company_id: i64,
    pub title: String,
    pub description: String,
    pub job_link: String,
    /// Which resume version was sent
    pub resume_link: Option<String>,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create an application
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub company_id: i64,
    pub title: String,
    pub description: String,
    pub job_link: String,
    pub resume_link: Option<String>,
    pub status: ApplicationStatus,
}

impl NewApplication {
    pub fn new(company_id: i64, title: impl Into<String>) -> Self {
        Self {
            company_id,
            title: title.into(),
            description: String::new(),
            job_link: String::new(),
            resume_link: None,
            status: ApplicationStatus::Applied,
        }
    }

    pub fn status(mut self, status: ApplicationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn job_link(mut self, job_link: impl Into<String>) -> Self {
        self.job_link = job_link.into();
        self
    }

    pub fn resume_link(mut self, resume_link: Option<String>) -> Self {
        self.resume_link = resume_link;
        self
    }
}
