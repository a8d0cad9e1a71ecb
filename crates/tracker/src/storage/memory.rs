//! In-memory storage implementation
//!
//! Used by tests; nothing survives the process.

use anyhow::{Result, bail};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use super::TrackerStore;
use crate::models::{
    Application, ApplicationEvent, ApplicationStatus, Company, MessageId, NewApplication,
    NewApplicationEvent, SyncState, normalize_name,
};

/// In-memory implementation of TrackerStore
///
/// Uses maps protected by RwLocks for thread-safe access. BTreeMaps keep
/// companies and applications in id order.
pub struct InMemoryTrackerStore {
    companies: RwLock<BTreeMap<i64, Company>>,
    applications: RwLock<BTreeMap<i64, Application>>,
    events: RwLock<Vec<ApplicationEvent>>,
    processed: RwLock<HashSet<String>>,
    sync_states: RwLock<HashMap<String, SyncState>>,
    next_id: AtomicI64,
}

impl InMemoryTrackerStore {
    pub fn new() -> Self {
        Self {
            companies: RwLock::new(BTreeMap::new()),
            applications: RwLock::new(BTreeMap::new()),
            events: RwLock::new(Vec::new()),
            processed: RwLock::new(HashSet::new()),
            sync_states: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for InMemoryTrackerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerStore for InMemoryTrackerStore {
    fn find_or_create_company(&self, name: &str) -> Result<Company> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            bail!("Company name must not be empty");
        }

        let mut companies = self.companies.write().unwrap();
        if let Some(existing) = companies.values().find(|c| c.normalized_name == normalized) {
            return Ok(existing.clone());
        }

        let company = Company::new(self.next_id(), name.trim());
        companies.insert(company.id, company.clone());
        Ok(company)
    }

    fn get_company(&self, id: i64) -> Result<Option<Company>> {
        Ok(self.companies.read().unwrap().get(&id).cloned())
    }

    fn list_companies(&self) -> Result<Vec<Company>> {
        Ok(self.companies.read().unwrap().values().cloned().collect())
    }

    fn create_application(&self, application: NewApplication) -> Result<Application> {
        if !self
            .companies
            .read()
            .unwrap()
            .contains_key(&application.company_id)
        {
            bail!("Company {} not found", application.company_id);
        }

        let now = Utc::now();
        let app = Application {
            id: self.next_id(),
            company_id: application.company_id,
            title: application.title,
            description: application.description,
            job_link: application.job_link,
            resume_link: application.resume_link,
            status: application.status,
            created_at: now,
            updated_at: now,
        };

        self.applications
            .write()
            .unwrap()
            .insert(app.id, app.clone());
        Ok(app)
    }

    fn get_application(&self, id: i64) -> Result<Option<Application>> {
        Ok(self.applications.read().unwrap().get(&id).cloned())
    }

    fn list_applications(&self) -> Result<Vec<Application>> {
        Ok(self
            .applications
            .read()
            .unwrap()
            .values()
            .rev()
            .cloned()
            .collect())
    }

    fn list_applications_for_company(&self, company_id: i64) -> Result<Vec<Application>> {
        Ok(self
            .applications
            .read()
            .unwrap()
            .values()
            .filter(|app| app.company_id == company_id)
            .cloned()
            .collect())
    }

    fn update_application_status(&self, id: i64, status: ApplicationStatus) -> Result<()> {
        let mut applications = self.applications.write().unwrap();
        let Some(app) = applications.get_mut(&id) else {
            bail!("Application {} not found", id);
        };
        app.status = status;
        app.updated_at = Utc::now();
        Ok(())
    }

    fn append_event(&self, event: NewApplicationEvent) -> Result<ApplicationEvent> {
        let event = ApplicationEvent {
            id: self.next_id(),
            application_id: event.application_id,
            event_type: event.event_type,
            details: event.details,
            created_at: Utc::now(),
        };
        self.events.write().unwrap().push(event.clone());
        Ok(event)
    }

    fn list_events(&self, application_id: i64) -> Result<Vec<ApplicationEvent>> {
        Ok(self
            .events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.application_id == application_id)
            .cloned()
            .collect())
    }

    fn is_processed(&self, id: &MessageId) -> Result<bool> {
        Ok(self.processed.read().unwrap().contains(id.as_str()))
    }

    fn mark_processed(&self, id: &MessageId) -> Result<()> {
        self.processed
            .write()
            .unwrap()
            .insert(id.as_str().to_string());
        Ok(())
    }

    fn count_processed(&self) -> Result<usize> {
        Ok(self.processed.read().unwrap().len())
    }

    fn get_sync_state(&self, mailbox: &str) -> Result<Option<SyncState>> {
        Ok(self.sync_states.read().unwrap().get(mailbox).cloned())
    }

    fn advance_cursor(&self, mailbox: &str, history_id: u64) -> Result<bool> {
        let mut states = self.sync_states.write().unwrap();

        let next = match states.get(mailbox) {
            Some(current) => current.clone().advanced(history_id),
            None => Some(SyncState::new(mailbox, history_id)),
        };

        match next {
            Some(state) => {
                states.insert(mailbox.to_string(), state);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EMAIL_UPDATE;

    #[test]
    fn test_company_dedup_and_order() {
        let store = InMemoryTrackerStore::new();
        let acme = store.find_or_create_company("Acme").unwrap();
        let globex = store.find_or_create_company("Globex").unwrap();
        assert_eq!(store.find_or_create_company("ACME").unwrap().id, acme.id);

        let ids: Vec<i64> = store.list_companies().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![acme.id, globex.id]);
    }

    #[test]
    fn test_application_requires_company() {
        let store = InMemoryTrackerStore::new();
        assert!(store.create_application(NewApplication::new(99, "Ghost")).is_err());
    }

    #[test]
    fn test_transition_and_events() {
        let store = InMemoryTrackerStore::new();
        let company = store.find_or_create_company("Acme").unwrap();
        let app = store
            .create_application(NewApplication::new(company.id, "Backend"))
            .unwrap();

        store
            .record_transition(
                app.id,
                ApplicationStatus::Rejected,
                NewApplicationEvent::new(app.id, EMAIL_UPDATE, "rejected"),
            )
            .unwrap();

        assert_eq!(
            store.get_application(app.id).unwrap().unwrap().status,
            ApplicationStatus::Rejected
        );
        assert_eq!(store.list_events(app.id).unwrap().len(), 1);
        assert!(store.list_active_applications(company.id).unwrap().is_empty());
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let store = InMemoryTrackerStore::new();
        assert!(store.advance_cursor("default", 10).unwrap());
        assert!(!store.advance_cursor("default", 5).unwrap());
        assert!(!store.advance_cursor("default", 10).unwrap());
        assert_eq!(store.get_sync_state("default").unwrap().unwrap().history_id, 10);
    }
}
