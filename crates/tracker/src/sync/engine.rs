//! Sync cycle orchestration
//!
//! One cycle:
//! 1. Read the cursor. Unset means full sync, otherwise incremental sync from
//!    the cursor. An expired cursor falls back to full sync once.
//! 2. For each candidate: skip if already processed, fetch it, match it to a
//!    company, pick the application, classify, apply the transition, then
//!    mark it processed.
//! 3. Advance the cursor to the listing's position if it moved forward.
//!
//! The whole cycle runs under one deadline. Per-message effects persist even
//! when a later step fails; the cursor is only written by a cycle that
//! completes in time.

use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::deadline::Deadline;
use super::fetch::{Fetcher, Listing};
use super::matcher::match_company;
use super::progress::{CursorStore, Deduplicator};
use super::resolve::{self, Disambiguation, MessageOutcome};
use super::retry::RetryPolicy;
use super::source::{MailSource, SourceError};
use crate::config::{FullSyncSettings, TrackerConfig};
use crate::models::{MailMessage, MessageId};
use crate::oracle::Oracle;
use crate::storage::TrackerStore;

/// Why a cycle did not complete
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("A sync cycle is already running")]
    AlreadyRunning,

    #[error("Mailbox listing failed: {0}")]
    Remote(SourceError),

    #[error("Storage failure: {0:#}")]
    Storage(anyhow::Error),

    #[error("Sync cycle exceeded its deadline")]
    Timeout,
}

impl From<SourceError> for CycleError {
    fn from(error: SourceError) -> Self {
        if error.is_timeout() {
            CycleError::Timeout
        } else {
            CycleError::Remote(error)
        }
    }
}

impl From<anyhow::Error> for CycleError {
    fn from(error: anyhow::Error) -> Self {
        CycleError::Storage(error)
    }
}

/// Engine settings
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Mailbox identity the cursor is stored under
    pub mailbox: String,
    pub cycle_timeout: Duration,
    pub full_sync: FullSyncSettings,
    pub listing_retry: RetryPolicy,
    pub fetch_retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}

impl SyncOptions {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            mailbox: config.mailbox.clone(),
            cycle_timeout: config.cycle_timeout(),
            full_sync: config.full_sync.clone(),
            listing_retry: config.listing_retry,
            fetch_retry: config.fetch_retry,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncStrategy {
    #[default]
    Full,
    Incremental,
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStrategy::Full => f.write_str("full"),
            SyncStrategy::Incremental => f.write_str("incremental"),
        }
    }
}

/// Statistics from one completed cycle
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    /// Strategy whose listing was processed
    pub strategy: SyncStrategy,
    /// Incremental sync hit an expired cursor and full sync ran instead
    pub fell_back: bool,
    /// Candidate IDs listed
    pub candidates: usize,
    /// Candidates skipped as already processed
    pub duplicates: usize,
    /// Candidates that could not be fetched
    pub fetch_failures: usize,
    pub unmatched: usize,
    pub no_target: usize,
    pub ambiguous: usize,
    pub classification_failures: usize,
    pub unchanged: usize,
    /// Applications whose status changed
    pub updated: usize,
    pub cursor_before: Option<u64>,
    pub cursor_after: Option<u64>,
    pub duration_ms: u64,
}

impl CycleReport {
    fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Unmatched => self.unmatched += 1,
            MessageOutcome::NoEligibleTarget { .. } => self.no_target += 1,
            MessageOutcome::Ambiguous { .. } => self.ambiguous += 1,
            MessageOutcome::ClassificationFailed { .. } => self.classification_failures += 1,
            MessageOutcome::Unchanged { .. } => self.unchanged += 1,
            MessageOutcome::Updated { .. } => self.updated += 1,
        }
    }

    /// Candidates that went through matching and classification
    pub fn processed(&self) -> usize {
        self.unmatched
            + self.no_target
            + self.ambiguous
            + self.classification_failures
            + self.unchanged
            + self.updated
    }

    pub fn cursor_advanced(&self) -> bool {
        self.cursor_after != self.cursor_before
    }
}

/// Clears the running flag when a cycle ends, however it ends
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs sync cycles against injected mailbox, oracle and store handles
///
/// At most one cycle runs at a time per engine; a concurrent call fails with
/// [`CycleError::AlreadyRunning`] without touching any state.
pub struct SyncEngine {
    fetcher: Fetcher,
    oracle: Arc<dyn Oracle>,
    store: Arc<dyn TrackerStore>,
    cursor: CursorStore,
    dedup: Deduplicator,
    cycle_timeout: Duration,
    running: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn MailSource>,
        oracle: Arc<dyn Oracle>,
        store: Arc<dyn TrackerStore>,
        options: SyncOptions,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(
                source,
                options.full_sync,
                options.listing_retry,
                options.fetch_retry,
            ),
            oracle,
            cursor: CursorStore::new(store.clone(), options.mailbox),
            dedup: Deduplicator::new(store.clone()),
            store,
            cycle_timeout: options.cycle_timeout,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one sync cycle
    pub fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let _guard = RunningGuard::acquire(&self.running).ok_or(CycleError::AlreadyRunning)?;

        let start = Instant::now();
        let deadline = Deadline::after(self.cycle_timeout);
        let mut report = CycleReport::default();

        let cursor = self.cursor.load()?;
        report.cursor_before = cursor;
        report.cursor_after = cursor;

        let listing = self.list_candidates(cursor, &deadline, &mut report)?;
        report.candidates = listing.ids.len();

        for id in &listing.ids {
            deadline.check()?;
            self.process_candidate(id, &deadline, &mut report)?;
        }

        // A late cycle must not move the cursor past messages it never handled
        deadline.check()?;

        if self.cursor.advance(listing.position)? {
            report.cursor_after = Some(listing.position);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Sync cycle done ({}{}): {} candidates, {} duplicates, {} updated, cursor {:?} -> {:?} in {}ms",
            report.strategy,
            if report.fell_back { ", after fallback" } else { "" },
            report.candidates,
            report.duplicates,
            report.updated,
            report.cursor_before,
            report.cursor_after,
            report.duration_ms
        );

        Ok(report)
    }

    /// Choose the strategy and list candidates, falling back to full sync
    /// once if the stored cursor has expired
    fn list_candidates(
        &self,
        cursor: Option<u64>,
        deadline: &Deadline,
        report: &mut CycleReport,
    ) -> Result<Listing, CycleError> {
        let Some(since) = cursor else {
            info!("No stored cursor for {}; running full sync", self.cursor.mailbox());
            report.strategy = SyncStrategy::Full;
            return Ok(self.fetcher.full_sync(deadline)?);
        };

        report.strategy = SyncStrategy::Incremental;
        match self.fetcher.incremental_sync(since, deadline) {
            Ok(listing) => Ok(listing),
            Err(e) if e.is_not_found() => {
                warn!("Cursor {} expired ({}); falling back to full sync", since, e);
                report.strategy = SyncStrategy::Full;
                report.fell_back = true;
                Ok(self.fetcher.full_sync(deadline)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn process_candidate(
        &self,
        id: &MessageId,
        deadline: &Deadline,
        report: &mut CycleReport,
    ) -> Result<(), CycleError> {
        if self.dedup.is_processed(id)? {
            debug!("Message {} already processed; skipping", id);
            report.duplicates += 1;
            return Ok(());
        }

        let Some(message) = self.fetcher.expand(id, deadline)? else {
            report.fetch_failures += 1;
            return Ok(());
        };

        let outcome = self.process_message(&message, deadline)?;
        self.dedup.mark_processed(id)?;
        report.record(&outcome);
        Ok(())
    }

    /// Match, resolve, classify and apply one message
    fn process_message(
        &self,
        message: &MailMessage,
        deadline: &Deadline,
    ) -> Result<MessageOutcome, CycleError> {
        let prefix = message.log_prefix();

        let companies = self.store.list_companies()?;
        let Some(matched) = match_company(&message.subject, &message.from, &companies) else {
            debug!("{} No matching company", prefix);
            return Ok(MessageOutcome::Unmatched);
        };
        let company = matched.company;
        info!("{} Matched company {:?} by {}", prefix, company.name, matched.rule);

        let application = match resolve::disambiguate(
            self.store.as_ref(),
            self.oracle.as_ref(),
            &company,
            message,
            deadline,
        )? {
            Disambiguation::Target(application) => application,
            Disambiguation::NoEligibleTarget => {
                info!("{} No active application at {}", prefix, company.name);
                return Ok(MessageOutcome::NoEligibleTarget {
                    company_id: company.id,
                });
            }
            Disambiguation::Ambiguous => {
                return Ok(MessageOutcome::Ambiguous {
                    company_id: company.id,
                });
            }
        };

        let Some(reply) =
            resolve::classify(self.oracle.as_ref(), &company, &application, message, deadline)?
        else {
            return Ok(MessageOutcome::ClassificationFailed {
                application_id: application.id,
            });
        };

        let outcome = resolve::apply_transition(self.store.as_ref(), &application, &reply)?;
        match &outcome {
            MessageOutcome::Updated { from, to, .. } => info!(
                "{} {} ({}): {} -> {}",
                prefix, company.name, application.title, from, to
            ),
            _ => debug!("{} {:?}: no status change", prefix, reply.status),
        }

        Ok(outcome)
    }
}
