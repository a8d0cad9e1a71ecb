//! SQLite-based tracker storage

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::TrackerStore;
use crate::models::{
    Application, ApplicationEvent, ApplicationStatus, Company, MessageId, NewApplication,
    NewApplicationEvent, SyncState, normalize_name,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE companies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                normalized_name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                job_link TEXT NOT NULL DEFAULT '',
                resume_link TEXT,
                status TEXT NOT NULL DEFAULT 'APPLIED'
                    CHECK (status IN ('APPLIED', 'INTERVIEW', 'OFFER', 'REJECTED')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (company_id) REFERENCES companies(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_applications_company ON applications(company_id, status);

            -- Append-only audit trail
            CREATE TABLE application_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                details TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (application_id) REFERENCES applications(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_application_events_application
                ON application_events(application_id, id);

            -- Messages already handled by a sync cycle
            CREATE TABLE processed_messages (
                message_id TEXT PRIMARY KEY,
                processed_at TEXT NOT NULL
            );

            -- Sync cursor per mailbox
            CREATE TABLE sync_state (
                mailbox TEXT PRIMARY KEY,
                history_id INTEGER NOT NULL,
                last_sync_at TEXT NOT NULL,
                sync_version INTEGER NOT NULL DEFAULT 1
            );
            "#,
        ),
    ])
}

const APPLICATION_COLUMNS: &str =
    "id, company_id, title, description, job_link, resume_link, status, created_at, updated_at";

/// SQLite-based tracker storage
pub struct SqliteTrackerStore {
    conn: Mutex<Connection>,
}

impl SqliteTrackerStore {
    /// Open (or create) the database at `db_path` and migrate it to the latest schema
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }

        let mut conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;

        // WAL lets the CLI read while the watcher writes; foreign_keys is
        // required for ON DELETE CASCADE.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_applications(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Application>> {
        let mut stmt = conn.prepare(sql)?;
        let applications = stmt
            .query_map(params, application_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(applications)
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn company_from_row(row: &Row) -> rusqlite::Result<Company> {
    let created_at: String = row.get(3)?;
    Ok(Company {
        id: row.get(0)?,
        name: row.get(1)?,
        normalized_name: row.get(2)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn application_from_row(row: &Row) -> rusqlite::Result<Application> {
    let status: String = row.get(6)?;
    let status = status
        .parse::<ApplicationStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Application {
        id: row.get(0)?,
        company_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        job_link: row.get(4)?,
        resume_link: row.get(5)?,
        status,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn event_from_row(row: &Row) -> rusqlite::Result<ApplicationEvent> {
    let created_at: String = row.get(4)?;
    Ok(ApplicationEvent {
        id: row.get(0)?,
        application_id: row.get(1)?,
        event_type: row.get(2)?,
        details: row.get(3)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn insert_event(conn: &Connection, event: NewApplicationEvent) -> Result<ApplicationEvent> {
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO application_events (application_id, event_type, details, created_at)
         VALUES (?, ?, ?, ?)",
        params![
            event.application_id,
            event.event_type,
            event.details,
            created_at.to_rfc3339()
        ],
    )
    .with_context(|| format!("Failed to append event for application {}", event.application_id))?;

    Ok(ApplicationEvent {
        id: conn.last_insert_rowid(),
        application_id: event.application_id,
        event_type: event.event_type,
        details: event.details,
        created_at,
    })
}

fn set_status(conn: &Connection, id: i64, status: ApplicationStatus) -> Result<()> {
    let changed = conn.execute(
        "UPDATE applications SET status = ?, updated_at = ? WHERE id = ?",
        params![status.as_str(), Utc::now().to_rfc3339(), id],
    )?;
    if changed == 0 {
        bail!("Application {} not found", id);
    }
    Ok(())
}

impl TrackerStore for SqliteTrackerStore {
    fn find_or_create_company(&self, name: &str) -> Result<Company> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            bail!("Company name must not be empty");
        }

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO companies (name, normalized_name, created_at) VALUES (?, ?, ?)
             ON CONFLICT(normalized_name) DO NOTHING",
            params![name.trim(), normalized, Utc::now().to_rfc3339()],
        )?;

        let company = conn.query_row(
            "SELECT id, name, normalized_name, created_at FROM companies WHERE normalized_name = ?",
            [&normalized],
            company_from_row,
        )?;
        Ok(company)
    }

    fn get_company(&self, id: i64) -> Result<Option<Company>> {
        let conn = self.conn.lock().unwrap();
        let company = conn
            .query_row(
                "SELECT id, name, normalized_name, created_at FROM companies WHERE id = ?",
                [id],
                company_from_row,
            )
            .optional()?;
        Ok(company)
    }

    fn list_companies(&self) -> Result<Vec<Company>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, name, normalized_name, created_at FROM companies ORDER BY id")?;
        let companies = stmt
            .query_map([], company_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(companies)
    }

    fn create_application(&self, application: NewApplication) -> Result<Application> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO applications
             (company_id, title, description, job_link, resume_link, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                application.company_id,
                application.title,
                application.description,
                application.job_link,
                application.resume_link,
                application.status.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .with_context(|| format!("Failed to create application {:?}", application.title))?;

        Ok(Application {
            id: conn.last_insert_rowid(),
            company_id: application.company_id,
            title: application.title,
            description: application.description,
            job_link: application.job_link,
            resume_link: application.resume_link,
            status: application.status,
            created_at: now,
            updated_at: now,
        })
    }

    fn get_application(&self, id: i64) -> Result<Option<Application>> {
        let conn = self.conn.lock().unwrap();
        let application = conn
            .query_row(
                &format!("SELECT {} FROM applications WHERE id = ?", APPLICATION_COLUMNS),
                [id],
                application_from_row,
            )
            .optional()?;
        Ok(application)
    }

    fn list_applications(&self) -> Result<Vec<Application>> {
        let conn = self.conn.lock().unwrap();
        Self::query_applications(
            &conn,
            &format!(
                "SELECT {} FROM applications ORDER BY created_at DESC, id DESC",
                APPLICATION_COLUMNS
            ),
            [],
        )
    }

    fn list_applications_for_company(&self, company_id: i64) -> Result<Vec<Application>> {
        let conn = self.conn.lock().unwrap();
        Self::query_applications(
            &conn,
            &format!(
                "SELECT {} FROM applications WHERE company_id = ? ORDER BY id",
                APPLICATION_COLUMNS
            ),
            [company_id],
        )
    }

    fn list_active_applications(&self, company_id: i64) -> Result<Vec<Application>> {
        let conn = self.conn.lock().unwrap();
        Self::query_applications(
            &conn,
            &format!(
                "SELECT {} FROM applications
                 WHERE company_id = ? AND status NOT IN ('REJECTED', 'OFFER')
                 ORDER BY id",
                APPLICATION_COLUMNS
            ),
            [company_id],
        )
    }

    fn update_application_status(&self, id: i64, status: ApplicationStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        set_status(&conn, id, status)
    }

    fn append_event(&self, event: NewApplicationEvent) -> Result<ApplicationEvent> {
        let conn = self.conn.lock().unwrap();
        insert_event(&conn, event)
    }

    fn list_events(&self, application_id: i64) -> Result<Vec<ApplicationEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, application_id, event_type, details, created_at
             FROM application_events WHERE application_id = ? ORDER BY id",
        )?;
        let events = stmt
            .query_map([application_id], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn record_transition(
        &self,
        application_id: i64,
        status: ApplicationStatus,
        event: NewApplicationEvent,
    ) -> Result<ApplicationEvent> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        set_status(&tx, application_id, status)?;
        let event = insert_event(&tx, event)?;

        tx.commit()
            .with_context(|| format!("Failed to commit transition for application {}", application_id))?;
        Ok(event)
    }

    fn is_processed(&self, id: &MessageId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM processed_messages WHERE message_id = ?",
            [id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn mark_processed(&self, id: &MessageId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO processed_messages (message_id, processed_at) VALUES (?, ?)",
            params![id.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn count_processed(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM processed_messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn get_sync_state(&self, mailbox: &str) -> Result<Option<SyncState>> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(String, i64, String, u32)> = conn
            .query_row(
                "SELECT mailbox, history_id, last_sync_at, sync_version
                 FROM sync_state WHERE mailbox = ?",
                [mailbox],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((mailbox, history_id, last_sync_at, sync_version)) = row else {
            return Ok(None);
        };

        let history_id = u64::try_from(history_id)
            .with_context(|| format!("Stored cursor {} is negative", history_id))?;

        Ok(Some(SyncState {
            mailbox,
            history_id,
            last_sync_at: parse_timestamp(&last_sync_at),
            sync_version,
        }))
    }

    fn advance_cursor(&self, mailbox: &str, history_id: u64) -> Result<bool> {
        let history_id = i64::try_from(history_id)
            .with_context(|| format!("Cursor {} does not fit in SQLite INTEGER", history_id))?;

        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT INTO sync_state (mailbox, history_id, last_sync_at, sync_version)
             VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(mailbox) DO UPDATE SET
                 history_id = excluded.history_id,
                 last_sync_at = excluded.last_sync_at
             WHERE excluded.history_id > sync_state.history_id",
            params![mailbox, history_id, Utc::now().to_rfc3339()],
        )?;

        Ok(changed > 0)
    }
}
