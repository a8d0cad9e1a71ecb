//! Job service: the outward operations on tracked applications
//!
//! Creating jobs, extracting job details from a posting page and listing what
//! is tracked. These only insert or read; status changes come from sync.

use anyhow::{Context, Result, bail};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::models::{Application, ApplicationStatus, Company, NewApplication};
use crate::oracle::{Oracle, parse_json_reply, prompts};
use crate::storage::TrackerStore;
use crate::sync::Deadline;

/// Budget for one extraction request
const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(90);

/// Input for creating a tracked job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobCreationRequest {
    pub company_name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub job_link: String,
    #[serde(default)]
    pub resume_link: Option<String>,
    /// Initial status; `APPLIED` when absent
    #[serde(default)]
    pub status: Option<String>,
}

/// Structured details pulled from a job posting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDetails {
    pub company_name: Option<String>,
    pub role_title: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tech_stack: Vec<String>,
    pub salary_range: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl JobDetails {
    /// Turn extracted details into a creation request, if the essentials are present
    pub fn into_request(self, job_link: impl Into<String>) -> Option<JobCreationRequest> {
        Some(JobCreationRequest {
            company_name: self.company_name.filter(|s| !s.trim().is_empty())?,
            title: self.role_title.filter(|s| !s.trim().is_empty())?,
            description: self.description.unwrap_or_default(),
            job_link: job_link.into(),
            resume_link: None,
            status: None,
        })
    }
}

/// An application with its company, for listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationSummary {
    pub company: Company,
    pub application: Application,
}

pub struct JobService {
    store: Arc<dyn TrackerStore>,
    oracle: Option<Arc<dyn Oracle>>,
}

impl JobService {
    pub fn new(store: Arc<dyn TrackerStore>) -> Self {
        Self {
            store,
            oracle: None,
        }
    }

    /// Enable [`JobService::extract_job_details`]
    pub fn with_oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Create an application, creating its company on first use
    pub fn create_job(&self, request: JobCreationRequest) -> Result<Application> {
        if request.title.trim().is_empty() {
            bail!("Job title must not be empty");
        }

        let status = match request.status.as_deref() {
            Some(s) => s.parse::<ApplicationStatus>()?,
            None => ApplicationStatus::default(),
        };

        let company = self
            .store
            .find_or_create_company(&request.company_name)
            .with_context(|| format!("Failed to resolve company {:?}", request.company_name))?;

        let application = self.store.create_application(
            NewApplication::new(company.id, request.title.trim())
                .status(status)
                .description(request.description)
                .job_link(request.job_link)
                .resume_link(request.resume_link),
        )?;

        info!(
            "Tracking {} at {} (application {}, {})",
            application.title, company.name, application.id, application.status
        );
        Ok(application)
    }

    /// Ask the oracle for structured details from raw posting HTML or text
    pub fn extract_job_details(&self, raw: &str) -> Result<JobDetails> {
        let oracle = self
            .oracle
            .as_ref()
            .context("Job extraction needs an oracle; set GEMINI_API_KEY")?;

        if raw.trim().is_empty() {
            bail!("Nothing to extract from: input is empty");
        }

        let deadline = Deadline::after(EXTRACTION_TIMEOUT);
        let reply = oracle.complete(&prompts::extraction_prompt(raw), &deadline)?;
        let details = parse_json_reply(&reply).context("Failed to parse extracted job details")?;
        Ok(details)
    }

    /// All applications with their companies, most recent first
    pub fn list_applications(&self) -> Result<Vec<ApplicationSummary>> {
        let companies = self.store.list_companies()?;

        self.store
            .list_applications()?
            .into_iter()
            .map(|application| {
                let company = companies
                    .iter()
                    .find(|c| c.id == application.company_id)
                    .cloned()
                    .with_context(|| {
                        format!("Application {} has no company", application.id)
                    })?;
                Ok(ApplicationSummary {
                    company,
                    application,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryTrackerStore;

    struct FixedOracle(&'static str);

    impl Oracle for FixedOracle {
        fn complete(&self, prompt: &str, _deadline: &Deadline) -> Result<String> {
            assert!(prompt.contains("RAW CONTENT:"));
            Ok(self.0.to_string())
        }
    }

    fn request(company: &str, title: &str) -> JobCreationRequest {
        JobCreationRequest {
            company_name: company.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_job_defaults_to_applied() {
        let service = JobService::new(Arc::new(InMemoryTrackerStore::new()));
        let app = service.create_job(request("Acme", "Backend Engineer")).unwrap();
        assert_eq!(app.status, ApplicationStatus::Applied);
    }

    #[test]
    fn test_create_job_reuses_company() {
        let store = Arc::new(InMemoryTrackerStore::new());
        let service = JobService::new(store.clone());

        let a = service.create_job(request("Acme", "Backend")).unwrap();
        let b = service.create_job(request(" ACME ", "Frontend")).unwrap();
        assert_eq!(a.company_id, b.company_id);
        assert_eq!(store.list_companies().unwrap().len(), 1);
    }

    #[test]
    fn test_create_job_validates_input() {
        let service = JobService::new(Arc::new(InMemoryTrackerStore::new()));
        assert!(service.create_job(request("", "Backend")).is_err());
        assert!(service.create_job(request("Acme", "  ")).is_err());

        let mut bad_status = request("Acme", "Backend");
        bad_status.status = Some("HIRED".to_string());
        assert!(service.create_job(bad_status).is_err());

        let mut interview = request("Acme", "Backend");
        interview.status = Some("interview".to_string());
        assert_eq!(
            service.create_job(interview).unwrap().status,
            ApplicationStatus::Interview
        );
    }

    #[test]
    fn test_extract_job_details() {
        let service = JobService::new(Arc::new(InMemoryTrackerStore::new())).with_oracle(Arc::new(
            FixedOracle(
                r#"```json
{"company_name": "Acme", "role_title": "Rust Engineer", "location": "Remote",
 "description": "Build things", "tech_stack": ["Rust", "SQLite"], "salary_range": null}
```"#,
            ),
        ));

        let details = service.extract_job_details("<html>posting</html>").unwrap();
        assert_eq!(details.company_name.as_deref(), Some("Acme"));
        assert_eq!(details.tech_stack, vec!["Rust", "SQLite"]);
        assert_eq!(details.salary_range, None);

        let request = details.into_request("https://acme.example/jobs/1").unwrap();
        assert_eq!(request.title, "Rust Engineer");
    }

    #[test]
    fn test_extract_tolerates_null_tech_stack() {
        let service = JobService::new(Arc::new(InMemoryTrackerStore::new()))
            .with_oracle(Arc::new(FixedOracle(r#"{"company_name": null, "tech_stack": null}"#)));

        let details = service.extract_job_details("text").unwrap();
        assert!(details.tech_stack.is_empty());
        assert!(details.into_request("").is_none());
    }

    #[test]
    fn test_extract_without_oracle_fails() {
        let service = JobService::new(Arc::new(InMemoryTrackerStore::new()));
        assert!(service.extract_job_details("text").is_err());
    }

    #[test]
    fn test_list_applications() {
        let service = JobService::new(Arc::new(InMemoryTrackerStore::new()));
        service.create_job(request("Acme", "Backend")).unwrap();
        service.create_job(request("Globex", "Data")).unwrap();

        let listed = service.list_applications().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].company.name, "Globex");
        assert_eq!(listed[1].application.title, "Backend");
    }
}
