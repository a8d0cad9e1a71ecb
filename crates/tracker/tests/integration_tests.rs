//! Integration tests for the tracker crate
//!
//! These drive full sync cycles against a scripted mailbox and oracle and
//! check what ends up in storage.

use anyhow::{Result, anyhow, bail};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracker::models::{
    Application, ApplicationEvent, ApplicationStatus, Company, EMAIL_UPDATE, MailMessage,
    MessageId, NewApplication, NewApplicationEvent, SyncState,
};
use tracker::storage::{InMemoryTrackerStore, SqliteTrackerStore, TrackerStore};
use tracker::sync::{
    ChangeSet, CycleError, Deadline, MailSource, RetryPolicy, SourceError, SyncEngine,
    SyncOptions, SyncStrategy,
};
use tracker::{JobCreationRequest, JobService, Oracle};

/// Scripted remote mailbox
#[derive(Default)]
struct FakeSource {
    messages: Mutex<HashMap<String, MailMessage>>,
    search_results: Mutex<Vec<MessageId>>,
    position: AtomicU64,
    /// Answers for `list_changes`, consumed in order; empty means "no changes"
    changes: Mutex<VecDeque<Result<ChangeSet, SourceError>>>,
    fetch_delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeSource {
    fn at(position: u64) -> Self {
        let source = Self::default();
        source.position.store(position, Ordering::SeqCst);
        source
    }

    /// Add a message that the full-sync search returns
    fn add_searchable(&self, message: MailMessage) {
        self.search_results.lock().unwrap().push(message.id.clone());
        self.add_message(message);
    }

    fn add_message(&self, message: MailMessage) {
        self.messages
            .lock()
            .unwrap()
            .insert(message.id.as_str().to_string(), message);
    }

    fn script_changes(&self, answer: Result<ChangeSet, SourceError>) {
        self.changes.lock().unwrap().push_back(answer);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl MailSource for FakeSource {
    fn list_messages(
        &self,
        _query: &str,
        max_results: usize,
        _deadline: &Deadline,
    ) -> Result<Vec<MessageId>, SourceError> {
        self.calls.lock().unwrap().push("list".to_string());
        Ok(self
            .search_results
            .lock()
            .unwrap()
            .iter()
            .take(max_results)
            .cloned()
            .collect())
    }

    fn current_position(&self, _deadline: &Deadline) -> Result<u64, SourceError> {
        self.calls.lock().unwrap().push("position".to_string());
        Ok(self.position.load(Ordering::SeqCst))
    }

    fn list_changes(&self, since: u64, _deadline: &Deadline) -> Result<ChangeSet, SourceError> {
        self.calls.lock().unwrap().push(format!("changes:{}", since));
        self.changes.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ChangeSet {
                added: vec![],
                position: Some(self.position.load(Ordering::SeqCst)),
            })
        })
    }

    fn get_message(&self, id: &MessageId, _deadline: &Deadline) -> Result<MailMessage, SourceError> {
        self.calls.lock().unwrap().push(format!("get:{}", id));
        if let Some(delay) = self.fetch_delay {
            std::thread::sleep(delay);
        }
        self.messages
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }
}

/// Oracle that replays canned replies in order
#[derive(Default)]
struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::default(),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, prompt: &str, _deadline: &Deadline) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted reply left"))
    }
}

fn fast_options() -> SyncOptions {
    SyncOptions {
        listing_retry: RetryPolicy::new(3, 10),
        fetch_retry: RetryPolicy::new(2, 5),
        ..SyncOptions::default()
    }
}

fn engine(
    source: &Arc<FakeSource>,
    oracle: &Arc<ScriptedOracle>,
    store: &Arc<dyn TrackerStore>,
) -> SyncEngine {
    SyncEngine::new(source.clone(), oracle.clone(), store.clone(), fast_options())
}

fn track(store: &Arc<dyn TrackerStore>, company: &str, title: &str) -> Application {
    JobService::new(store.clone())
        .create_job(JobCreationRequest {
            company_name: company.to_string(),
            title: title.to_string(),
            ..Default::default()
        })
        .unwrap()
}

fn cursor(store: &Arc<dyn TrackerStore>) -> Option<u64> {
    store
        .get_sync_state("default")
        .unwrap()
        .map(|state| state.history_id)
}

#[test]
fn test_first_cycle_runs_full_sync_and_anchors_cursor() {
    let source = Arc::new(FakeSource::at(1200));
    let oracle = Arc::new(ScriptedOracle::default());
    let store: Arc<dyn TrackerStore> = Arc::new(InMemoryTrackerStore::new());

    let report = engine(&source, &oracle, &store).run_cycle().unwrap();

    assert_eq!(report.strategy, SyncStrategy::Full);
    assert_eq!(report.candidates, 0);
    assert_eq!(source.calls(), vec!["list", "position"]);
    assert_eq!(cursor(&store), Some(1200));
    assert_eq!(report.cursor_after, Some(1200));
}

#[test]
fn test_second_cycle_is_incremental_from_cursor() {
    let source = Arc::new(FakeSource::at(1200));
    let oracle = Arc::new(ScriptedOracle::default());
    let store: Arc<dyn TrackerStore> = Arc::new(InMemoryTrackerStore::new());
    let engine = engine(&source, &oracle, &store);

    engine.run_cycle().unwrap();
    source.position.store(1300, Ordering::SeqCst);
    let report = engine.run_cycle().unwrap();

    assert_eq!(report.strategy, SyncStrategy::Incremental);
    assert!(source.calls().contains(&"changes:1200".to_string()));
    assert_eq!(cursor(&store), Some(1300));
}

#[test]
fn test_expired_cursor_falls_back_to_full_sync() {
    let source = Arc::new(FakeSource::at(5000));
    source.add_searchable(MailMessage::new(
        "m1",
        "Interview invitation",
        "Globex Recruiting <talent@globex.com>",
        "We'd love to chat.",
    ));
    source.script_changes(Err(SourceError::NotFound("startHistoryId too old".to_string())));

    let store: Arc<dyn TrackerStore> = Arc::new(InMemoryTrackerStore::new());
    store.advance_cursor("default", 10).unwrap();
    let app = track(&store, "Globex", "Platform Engineer");

    let oracle = Arc::new(ScriptedOracle::replying(&[
        r#"{"status": "INTERVIEW", "summary": "Invited to chat"}"#,
    ]));
    let report = engine(&source, &oracle, &store).run_cycle().unwrap();

    assert!(report.fell_back);
    assert_eq!(report.strategy, SyncStrategy::Full);
    assert_eq!(report.updated, 1);
    assert_eq!(source.count_calls("changes:"), 1);
    assert_eq!(cursor(&store), Some(5000));
    assert_eq!(
        store.get_application(app.id).unwrap().unwrap().status,
        ApplicationStatus::Interview
    );
}

#[test]
fn test_sender_domain_matches_company() {
    let source = Arc::new(FakeSource::at(10));
    source.add_searchable(MailMessage::new(
        "m1",
        "Regarding your application",
        "jobs@acme.com",
        "Unfortunately we are not moving forward.",
    ));

    let store: Arc<dyn TrackerStore> = Arc::new(InMemoryTrackerStore::new());
    let app = track(&store, "Acme", "Backend Engineer");
    let oracle = Arc::new(ScriptedOracle::replying(&[
        "```json\n{\"status\": \"REJECTED\", \"summary\": \"Not moving forward\"}\n```",
    ]));

    let report = engine(&source, &oracle, &store).run_cycle().unwrap();
    assert_eq!(report.updated, 1);

    // Single active application: only the status prompt goes to the oracle
    assert_eq!(oracle.calls(), 1);
    assert!(oracle.prompts.lock().unwrap()[0].contains("The user applied to a job at \"Acme\""));

    let events: Vec<ApplicationEvent> = store.list_events(app.id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EMAIL_UPDATE);
    assert!(events[0].details.contains("from APPLIED to REJECTED"));
}

#[test]
fn test_transient_listing_errors_exhaust_retries() {
    let source = Arc::new(FakeSource::at(900));
    for _ in 0..3 {
        source.script_changes(Err(SourceError::Transient("503".to_string())));
    }

    let store: Arc<dyn TrackerStore> = Arc::new(InMemoryTrackerStore::new());
    store.advance_cursor("default", 100).unwrap();
    let oracle = Arc::new(ScriptedOracle::default());

    let result = engine(&source, &oracle, &store).run_cycle();
    match result {
        Err(CycleError::Remote(SourceError::Exhausted { attempts, .. })) => assert_eq!(attempts, 3),
        other => panic!("expected exhausted retries, got {:?}", other),
    }

    assert_eq!(source.count_calls("changes:"), 3);
    assert_eq!(source.count_calls("list"), 0);
    assert_eq!(cursor(&store), Some(100));
}

#[test]
fn test_missing_message_is_not_retried() {
    let source = Arc::new(FakeSource::at(50));
    source.search_results.lock().unwrap().push(MessageId::new("deleted"));

    let store: Arc<dyn TrackerStore> = Arc::new(InMemoryTrackerStore::new());
    let oracle = Arc::new(ScriptedOracle::default());

    let report = engine(&source, &oracle, &store).run_cycle().unwrap();
    assert_eq!(report.fetch_failures, 1);
    assert_eq!(source.count_calls("get:deleted"), 1);
    assert_eq!(cursor(&store), Some(50));
}

#[test]
fn test_processed_messages_are_not_reclassified() {
    let source = Arc::new(FakeSource::at(10));
    source.add_searchable(MailMessage::new(
        "m1",
        "Initech application received",
        "noreply@initech.com",
        "Thanks for applying",
    ));

    let store: Arc<dyn TrackerStore> = Arc::new(InMemoryTrackerStore::new());
    track(&store, "Initech", "SRE");
    let oracle = Arc::new(ScriptedOracle::replying(&[
        r#"{"status": "NO_CHANGE", "summary": "Acknowledgement"}"#,
    ]));

    let engine = engine(&source, &oracle, &store);
    let first = engine.run_cycle().unwrap();
    assert_eq!(first.unchanged, 1);

    // The change log reports the same message again
    source.script_changes(Ok(ChangeSet {
        added: vec![MessageId::new("m1")],
        position: Some(11),
    }));
    let second = engine.run_cycle().unwrap();

    assert_eq!(second.duplicates, 1);
    assert_eq!(oracle.calls(), 1);
    assert_eq!(source.count_calls("get:m1"), 1);
    assert_eq!(cursor(&store), Some(11));
}

#[test]
fn test_ambiguous_and_malformed_replies_change_nothing() {
    let source = Arc::new(FakeSource::at(10));
    source.add_searchable(MailMessage::new("m1", "Hooli update", "hr@hooli.com", "Generic update"));
    source.add_searchable(MailMessage::new("m2", "Pied Piper", "team@piedpiper.com", "Let's talk"));

    let store: Arc<dyn TrackerStore> = Arc::new(InMemoryTrackerStore::new());
    let backend = track(&store, "Hooli", "Backend");
    let frontend = track(&store, "Hooli", "Frontend");
    let piper = track(&store, "Pied Piper", "Compression Engineer");

    let oracle = Arc::new(ScriptedOracle::replying(&[
        r#"{"index": 5}"#,
        "I think they want to interview you!",
    ]));
    let report = engine(&source, &oracle, &store).run_cycle().unwrap();

    assert_eq!(report.ambiguous, 1);
    assert_eq!(report.classification_failures, 1);
    assert_eq!(report.updated, 0);

    for app in [&backend, &frontend, &piper] {
        assert_eq!(
            store.get_application(app.id).unwrap().unwrap().status,
            ApplicationStatus::Applied
        );
        assert!(store.list_events(app.id).unwrap().is_empty());
    }

    // Both count as handled
    assert!(store.is_processed(&MessageId::new("m1")).unwrap());
    assert!(store.is_processed(&MessageId::new("m2")).unwrap());
}

#[test]
fn test_terminal_applications_are_left_alone() {
    let source = Arc::new(FakeSource::at(10));
    source.add_searchable(MailMessage::new("m1", "Acme offer update", "jobs@acme.com", "..."));

    let store: Arc<dyn TrackerStore> = Arc::new(InMemoryTrackerStore::new());
    let app = track(&store, "Acme", "Backend");
    store
        .update_application_status(app.id, ApplicationStatus::Offer)
        .unwrap();

    let oracle = Arc::new(ScriptedOracle::default());
    let report = engine(&source, &oracle, &store).run_cycle().unwrap();

    assert_eq!(report.no_target, 1);
    assert_eq!(oracle.calls(), 0);
}

#[test]
fn test_deadline_aborts_cycle_without_cursor_write() {
    let source = Arc::new(FakeSource {
        fetch_delay: Some(Duration::from_millis(150)),
        ..FakeSource::at(700)
    });
    for id in ["a", "b", "c", "d"] {
        source.add_searchable(MailMessage::new(id, "newsletter", "news@example.com", ""));
    }

    let store: Arc<dyn TrackerStore> = Arc::new(InMemoryTrackerStore::new());
    let oracle = Arc::new(ScriptedOracle::default());
    let options = SyncOptions {
        cycle_timeout: Duration::from_millis(200),
        ..fast_options()
    };

    let result = SyncEngine::new(source.clone(), oracle, store.clone(), options).run_cycle();

    assert!(matches!(result, Err(CycleError::Timeout)));
    assert_eq!(cursor(&store), None);
    assert!(store.count_processed().unwrap() < 4);
}

/// Store whose processed-message writes fail
struct BrokenStore {
    inner: InMemoryTrackerStore,
}

impl TrackerStore for BrokenStore {
    fn find_or_create_company(&self, name: &str) -> Result<Company> {
        self.inner.find_or_create_company(name)
    }
    fn get_company(&self, id: i64) -> Result<Option<Company>> {
        self.inner.get_company(id)
    }
    fn list_companies(&self) -> Result<Vec<Company>> {
        self.inner.list_companies()
    }
    fn create_application(&self, application: NewApplication) -> Result<Application> {
        self.inner.create_application(application)
    }
    fn get_application(&self, id: i64) -> Result<Option<Application>> {
        self.inner.get_application(id)
    }
    fn list_applications(&self) -> Result<Vec<Application>> {
        self.inner.list_applications()
    }
    fn list_applications_for_company(&self, company_id: i64) -> Result<Vec<Application>> {
        self.inner.list_applications_for_company(company_id)
    }
    fn update_application_status(&self, id: i64, status: ApplicationStatus) -> Result<()> {
        self.inner.update_application_status(id, status)
    }
    fn append_event(&self, event: NewApplicationEvent) -> Result<ApplicationEvent> {
        self.inner.append_event(event)
    }
    fn list_events(&self, application_id: i64) -> Result<Vec<ApplicationEvent>> {
        self.inner.list_events(application_id)
    }
    fn is_processed(&self, id: &MessageId) -> Result<bool> {
        self.inner.is_processed(id)
    }
    fn mark_processed(&self, _id: &MessageId) -> Result<()> {
        bail!("disk I/O error")
    }
    fn count_processed(&self) -> Result<usize> {
        self.inner.count_processed()
    }
    fn get_sync_state(&self, mailbox: &str) -> Result<Option<SyncState>> {
        self.inner.get_sync_state(mailbox)
    }
    fn advance_cursor(&self, mailbox: &str, history_id: u64) -> Result<bool> {
        self.inner.advance_cursor(mailbox, history_id)
    }
}

#[test]
fn test_storage_failure_aborts_cycle_without_cursor_write() {
    let source = Arc::new(FakeSource::at(300));
    source.add_searchable(MailMessage::new("m1", "hello", "someone@example.com", ""));

    let store: Arc<dyn TrackerStore> = Arc::new(BrokenStore {
        inner: InMemoryTrackerStore::new(),
    });
    let oracle = Arc::new(ScriptedOracle::default());

    let result = engine(&source, &oracle, &store).run_cycle();
    assert!(matches!(result, Err(CycleError::Storage(_))));
    assert_eq!(cursor(&store), None);
}

#[test]
fn test_sqlite_end_to_end_keeps_cursor_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tracker.test.sqlite");

    let source = Arc::new(FakeSource::at(2000));
    source.add_searchable(MailMessage::new(
        "m1",
        "Offer letter from Umbrella",
        "\"Umbrella HR\" <hr@umbrella.com>",
        "We are pleased to offer you the position.",
    ));

    let store: Arc<dyn TrackerStore> = Arc::new(SqliteTrackerStore::new(&db_path).unwrap());
    let app = track(&store, "Umbrella", "Research Engineer");
    let oracle = Arc::new(ScriptedOracle::replying(&[
        r#"{"status": "OFFER", "summary": "Offer extended"}"#,
    ]));
    let engine = engine(&source, &oracle, &store);

    engine.run_cycle().unwrap();
    assert_eq!(cursor(&store), Some(2000));
    assert_eq!(
        store.get_application(app.id).unwrap().unwrap().status,
        ApplicationStatus::Offer
    );

    // A change log that reports an older position must not move the cursor back
    source.script_changes(Ok(ChangeSet {
        added: vec![],
        position: Some(1500),
    }));
    let report = engine.run_cycle().unwrap();
    assert!(!report.cursor_advanced());
    assert_eq!(cursor(&store), Some(2000));

    // Reopening the database sees the same state
    drop(engine);
    drop(store);
    let reopened = SqliteTrackerStore::new(&db_path).unwrap();
    assert_eq!(reopened.get_sync_state("default").unwrap().unwrap().history_id, 2000);
    assert!(reopened.is_processed(&MessageId::new("m1")).unwrap());
    assert_eq!(reopened.list_events(app.id).unwrap().len(), 1);
}
