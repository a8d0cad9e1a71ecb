//! Email change synchronization
//!
//! Finds new mail relevant to tracked applications and turns it into status
//! updates. Operations are idempotent: processed messages are remembered and
//! the mailbox cursor only moves forward, so a failed cycle can simply be run
//! again.

mod deadline;
mod engine;
mod fetch;
pub mod matcher;
mod progress;
pub mod resolve;
mod retry;
mod source;
mod watcher;

pub use deadline::Deadline;
pub use engine::{CycleError, CycleReport, SyncEngine, SyncOptions, SyncStrategy};
pub use fetch::{Fetcher, Listing};
pub use matcher::{CompanyMatch, MatchRule, match_company};
pub use progress::{CursorStore, Deduplicator};
pub use resolve::{Disambiguation, MessageOutcome, StatusReply, StatusVerdict};
pub use retry::RetryPolicy;
pub use source::{ChangeSet, MailSource, SourceError};
pub use watcher::{Watcher, WatcherCommand, WatcherHandle};
