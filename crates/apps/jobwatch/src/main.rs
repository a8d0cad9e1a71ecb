//! jobwatch - keeps job application statuses in sync with your mailbox
//!
//! Commands:
//! - `jobwatch login` - authorize Gmail access in the browser
//! - `jobwatch logout` - forget the stored Gmail token
//! - `jobwatch watch` - run sync cycles periodically (default)
//! - `jobwatch sync-once` - run a single cycle and print its report
//! - `jobwatch add-job` - start tracking an application
//! - `jobwatch extract` - pull job details out of a posting page
//! - `jobwatch status` - list tracked applications

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracker::{
    GeminiOracle, GmailAuth, GmailClient, GmailCredentials, JobCreationRequest, JobService,
    SqliteTrackerStore, SyncEngine, SyncOptions, TrackerConfig, TrackerStore, Watcher,
};

#[derive(Debug, Parser)]
#[command(name = "jobwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Tracker config file (defaults to ~/.config/jobtrack/tracker.json)
    #[arg(long, env = "JOBTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Authorize read access to Gmail
    Login,
    /// Remove the stored Gmail token
    Logout,
    /// Run sync cycles on a timer until interrupted
    Watch {
        /// Seconds between cycles (overrides the config file)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
    /// Run one sync cycle
    SyncOnce,
    /// Start tracking a job application
    AddJob {
        #[arg(long)]
        company: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        link: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        resume: Option<String>,
        /// Initial status (APPLIED, INTERVIEW, OFFER, REJECTED)
        #[arg(long)]
        status: Option<String>,
    },
    /// Extract job details from a saved posting (HTML or text); `-` reads stdin
    Extract {
        input: PathBuf,
        /// Also start tracking the extracted job
        #[arg(long)]
        create: bool,
        /// Job link to store when creating
        #[arg(long, default_value = "")]
        link: String,
    },
    /// List tracked applications
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();
    let mut tracker_config = TrackerConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        tracker_config.database_path = Some(db);
    }

    let db_path = tracker_config.database_path()?;
    let store: Arc<dyn TrackerStore> = Arc::new(SqliteTrackerStore::new(&db_path)?);
    info!("Using database {}", db_path.display());

    match cli.command.unwrap_or(Commands::Watch { interval: None }) {
        Commands::Login => {
            gmail_auth()?.login()?;
            println!("Gmail access granted.");
            Ok(())
        }
        Commands::Logout => {
            gmail_auth()?.logout()?;
            println!("Gmail token removed.");
            Ok(())
        }
        Commands::Watch { interval } => {
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| tracker_config.sync_interval());
            watch(&tracker_config, store, interval)
        }
        Commands::SyncOnce => sync_once(&tracker_config, store),
        Commands::AddJob {
            company,
            title,
            link,
            description,
            resume,
            status,
        } => {
            let app = JobService::new(store).create_job(JobCreationRequest {
                company_name: company,
                title,
                description,
                job_link: link,
                resume_link: resume,
                status,
            })?;
            println!("Created application {} ({})", app.id, app.status);
            Ok(())
        }
        Commands::Extract {
            input,
            create,
            link,
        } => extract(&tracker_config, store, &input, create, link),
        Commands::Status { json } => status(store, json),
    }
}

fn gmail_auth() -> Result<GmailAuth> {
    let credentials = GmailCredentials::load().context("Gmail credentials not configured")?;
    GmailAuth::new(credentials)
}

fn build_engine(config: &TrackerConfig, store: Arc<dyn TrackerStore>) -> Result<SyncEngine> {
    let auth = gmail_auth()?;
    if !auth.is_authenticated() {
        bail!(
            "No usable Gmail token at {}; run `jobwatch login` first",
            auth.token_path().display()
        );
    }

    let source = Arc::new(GmailClient::new(auth));
    let oracle = Arc::new(GeminiOracle::from_env(config.gemini.clone())?);
    info!("Oracle model: {}", oracle.model());

    Ok(SyncEngine::new(
        source,
        oracle,
        store,
        SyncOptions::from_config(config),
    ))
}

fn watch(config: &TrackerConfig, store: Arc<dyn TrackerStore>, interval: Duration) -> Result<()> {
    let engine = Arc::new(build_engine(config, store)?);
    let watcher = Watcher::new(engine, interval)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let handle = watcher.spawn();

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        info!("Interrupted; waiting for the current cycle to finish");
        handle.stop().await;
        Ok(())
    })
}

fn sync_once(config: &TrackerConfig, store: Arc<dyn TrackerStore>) -> Result<()> {
    let engine = build_engine(config, store)?;
    let report = engine.run_cycle()?;

    println!("strategy:        {}", report.strategy);
    println!("fell back:       {}", report.fell_back);
    println!("candidates:      {}", report.candidates);
    println!("duplicates:      {}", report.duplicates);
    println!("fetch failures:  {}", report.fetch_failures);
    println!("unmatched:       {}", report.unmatched);
    println!("no target:       {}", report.no_target);
    println!("ambiguous:       {}", report.ambiguous);
    println!("parse failures:  {}", report.classification_failures);
    println!("unchanged:       {}", report.unchanged);
    println!("updated:         {}", report.updated);
    println!(
        "cursor:          {:?} -> {:?}",
        report.cursor_before, report.cursor_after
    );
    println!("duration:        {}ms", report.duration_ms);
    Ok(())
}

fn extract(
    config: &TrackerConfig,
    store: Arc<dyn TrackerStore>,
    input: &Path,
    create: bool,
    link: String,
) -> Result<()> {
    let raw = if input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?
    };

    let oracle = Arc::new(GeminiOracle::from_env(config.gemini.clone())?);
    let service = JobService::new(store).with_oracle(oracle);
    let details = service.extract_job_details(&raw)?;
    println!("{}", serde_json::to_string_pretty(&details)?);

    if create {
        let request = details
            .into_request(link)
            .context("Extraction did not find both a company and a role title")?;
        let app = service.create_job(request)?;
        println!("Created application {} ({})", app.id, app.status);
    }

    Ok(())
}

fn status(store: Arc<dyn TrackerStore>, json: bool) -> Result<()> {
    let applications = JobService::new(store).list_applications()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&applications)?);
        return Ok(());
    }

    if applications.is_empty() {
        println!("No applications tracked yet.");
        return Ok(());
    }

    for summary in applications {
        let app = &summary.application;
        println!(
            "{:>5}  {:<10}  {:<24}  {}",
            app.id,
            app.status.as_str(),
            summary.company.name,
            app.title
        );
    }
    Ok(())
}
