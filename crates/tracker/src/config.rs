//! Configuration loading for the tracker
//!
//! Two things live here:
//! - [`GmailCredentials`]: OAuth client credentials, from the Google Cloud
//!   Console JSON file or from environment variables.
//! - [`TrackerConfig`]: sync tuning, loaded from `tracker.json` in the config
//!   directory (every field optional) with environment overrides on top.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::RetryPolicy;

/// Credentials filename in the jobtrack config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// Tracker settings filename in the jobtrack config directory
pub const CONFIG_FILE: &str = "tracker.json";

/// Default SQLite database filename in the config directory
pub const DATABASE_FILE: &str = "tracker.db";

/// Overrides the database path
pub const DB_ENV: &str = "JOBTRACK_DB";

/// Overrides the mailbox identity the cursor is bound to
pub const MAILBOX_ENV: &str = "JOBTRACK_MAILBOX";

/// Upper bound for `cycle_timeout_secs` (one day)
pub const MAX_CYCLE_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// OAuth credentials for Gmail API access
#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google Cloud Console credential file format
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
}

impl GmailCredentials {
    /// Load credentials from the config directory file, else the environment
    pub fn load() -> Result<Self> {
        if config::config_exists(CREDENTIALS_FILE) {
            let creds: GoogleCredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Self::from_credential_file(creds);
        }

        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // Desktop ("installed") and "web" client types share the same fields
        let installed = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
        })
    }

    /// Parse credentials from JSON string (Google Cloud Console format)
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    /// Load credentials from `GMAIL_CLIENT_ID` / `GMAIL_CLIENT_SECRET`
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GMAIL_CLIENT_ID")
            .context("GMAIL_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("GMAIL_CLIENT_SECRET")
            .context("GMAIL_CLIENT_SECRET environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Default credentials file path (~/.config/jobtrack/google-credentials.json)
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }

    pub fn is_available() -> bool {
        if config::config_exists(CREDENTIALS_FILE) {
            return true;
        }
        std::env::var("GMAIL_CLIENT_ID").is_ok() && std::env::var("GMAIL_CLIENT_SECRET").is_ok()
    }
}

/// Full-sync relevance filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FullSyncSettings {
    /// Subject keywords, OR-ed together
    pub keywords: Vec<String>,
    /// Only messages newer than this many days
    pub window_days: u32,
    /// Cap on listed messages
    pub max_results: usize,
    /// Read the mailbox position before running the query instead of after
    pub anchor_before_query: bool,
}

impl Default for FullSyncSettings {
    fn default() -> Self {
        Self {
            keywords: ["application", "interview", "update", "offer", "rejected", "status"]
                .into_iter()
                .map(String::from)
                .collect(),
            window_days: 7,
            max_results: 50,
            anchor_before_query: false,
        }
    }
}

impl FullSyncSettings {
    /// Gmail search query for the relevance filter
    pub fn query(&self) -> String {
        format!(
            "subject:({}) newer_than:{}d",
            self.keywords.join(" OR "),
            self.window_days
        )
    }
}

/// Oracle (Gemini) settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub model: String,
    pub temperature: f32,
    /// Upper bound for a single oracle request
    pub request_timeout_secs: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.1,
            request_timeout_secs: 60,
        }
    }
}

impl OracleSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Tracker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Mailbox identity the sync cursor is bound to
    pub mailbox: String,
    /// SQLite database path; defaults to `tracker.db` in the config directory
    pub database_path: Option<PathBuf>,
    pub sync_interval_secs: u64,
    pub cycle_timeout_secs: u64,
    pub full_sync: FullSyncSettings,
    pub listing_retry: RetryPolicy,
    pub fetch_retry: RetryPolicy,
    pub gemini: OracleSettings,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            mailbox: "default".to_string(),
            database_path: None,
            sync_interval_secs: 60,
            cycle_timeout_secs: 120,
            full_sync: FullSyncSettings::default(),
            listing_retry: RetryPolicy::listing(),
            fetch_retry: RetryPolicy::fetch(),
            gemini: OracleSettings::default(),
        }
    }
}

impl TrackerConfig {
    /// Load from `path`, or from `tracker.json` in the config directory
    ///
    /// A missing default file yields the defaults. Environment overrides are
    /// applied in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => config::load_json_file(path)
                .with_context(|| format!("Failed to load tracker config {}", path.display()))?,
            None if config::config_exists(CONFIG_FILE) => config::load_json(CONFIG_FILE)?,
            None => Self::default(),
        };

        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON string; absent fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("Failed to parse tracker config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject timings the watcher and engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_secs == 0 {
            bail!("sync_interval_secs must be at least 1");
        }
        if !(1..=MAX_CYCLE_TIMEOUT_SECS).contains(&self.cycle_timeout_secs) {
            bail!(
                "cycle_timeout_secs must be between 1 and {}, got {}",
                MAX_CYCLE_TIMEOUT_SECS,
                self.cycle_timeout_secs
            );
        }
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(db) = std::env::var(DB_ENV)
            && !db.trim().is_empty()
        {
            self.database_path = Some(PathBuf::from(db));
        }
        if let Ok(mailbox) = std::env::var(MAILBOX_ENV)
            && !mailbox.trim().is_empty()
        {
            self.mailbox = mailbox;
        }
        self
    }

    /// Resolved database path
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => config::config_path(DATABASE_FILE)
                .context("Could not determine config directory for the database"),
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}
