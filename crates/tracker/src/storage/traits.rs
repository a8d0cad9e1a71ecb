//! Storage trait definitions

use crate::models::{
    Application, ApplicationEvent, ApplicationStatus, Company, MessageId, NewApplication,
    NewApplicationEvent, SyncState,
};
use anyhow::Result;

/// Trait for tracker storage operations
///
/// Abstracts over the SQLite store and the in-memory store used in tests.
/// Every failure is a local storage failure and is fatal to a sync cycle.
pub trait TrackerStore: Send + Sync {
    /// Find a company by normalized name, creating it if missing
    fn find_or_create_company(&self, name: &str) -> Result<Company>;

    fn get_company(&self, id: i64) -> Result<Option<Company>>;

    /// List all companies, ordered by id ascending
    fn list_companies(&self) -> Result<Vec<Company>>;

    fn create_application(&self, application: NewApplication) -> Result<Application>;

    fn get_application(&self, id: i64) -> Result<Option<Application>>;

    /// List all applications, most recently created first
    fn list_applications(&self) -> Result<Vec<Application>>;

    /// List a company's applications, ordered by id ascending
    fn list_applications_for_company(&self, company_id: i64) -> Result<Vec<Application>>;

    /// List a company's applications that are still in progress
    ///
    /// Terminal statuses (offer, rejected) are excluded.
    fn list_active_applications(&self, company_id: i64) -> Result<Vec<Application>> {
        Ok(self
            .list_applications_for_company(company_id)?
            .into_iter()
            .filter(|app| !app.status.is_terminal())
            .collect())
    }

    /// Set an application's status; fails if the application does not exist
    fn update_application_status(&self, id: i64, status: ApplicationStatus) -> Result<()>;

    fn append_event(&self, event: NewApplicationEvent) -> Result<ApplicationEvent>;

    /// List an application's events, oldest first
    fn list_events(&self, application_id: i64) -> Result<Vec<ApplicationEvent>>;

    /// Change status and append the matching audit event together
    fn record_transition(
        &self,
        application_id: i64,
        status: ApplicationStatus,
        event: NewApplicationEvent,
    ) -> Result<ApplicationEvent> {
        self.update_application_status(application_id, status)?;
        self.append_event(event)
    }

    fn is_processed(&self, id: &MessageId) -> Result<bool>;

    /// Record a message as handled; marking twice is a no-op
    fn mark_processed(&self, id: &MessageId) -> Result<()>;

    fn count_processed(&self) -> Result<usize>;

    fn get_sync_state(&self, mailbox: &str) -> Result<Option<SyncState>>;

    /// Store `history_id` as the mailbox cursor if it is strictly greater
    ///
    /// Returns whether the stored cursor changed. An unset cursor is always
    /// written.
    fn advance_cursor(&self, mailbox: &str, history_id: u64) -> Result<bool>;
}
