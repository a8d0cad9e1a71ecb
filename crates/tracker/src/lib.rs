//! Tracker crate - Job application tracking driven by email
//!
//! This crate provides:
//! - Domain models (Company, Application, ApplicationEvent, MailMessage)
//! - Gmail API client and OAuth token handling
//! - Oracle (LLM) access for disambiguation, classification and extraction
//! - Storage trait abstractions with SQLite and in-memory backends
//! - The email sync engine and its periodic watcher
//! - A job service for creating and listing tracked applications
//!
//! The crate has no UI dependencies; the `jobwatch` binary is a thin CLI on top.

pub mod config;
pub mod gmail;
pub mod jobs;
pub mod models;
pub mod oracle;
pub mod storage;
pub mod sync;

pub use config::{FullSyncSettings, GmailCredentials, OracleSettings, TrackerConfig};
pub use gmail::{GmailAuth, GmailClient};
pub use jobs::{ApplicationSummary, JobCreationRequest, JobDetails, JobService};
pub use models::{
    Application, ApplicationEvent, ApplicationStatus, Company, EmailAddress, MailMessage,
    MessageId, NewApplication, NewApplicationEvent, SyncState,
};
pub use oracle::{GeminiOracle, Oracle, ReplyParseError};
pub use storage::{InMemoryTrackerStore, SqliteTrackerStore, TrackerStore};
pub use sync::{
    ChangeSet, CycleError, CycleReport, Deadline, MailSource, RetryPolicy, SourceError,
    SyncEngine, SyncOptions, SyncStrategy, Watcher, WatcherHandle,
};
