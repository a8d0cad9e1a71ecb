//! Target resolution and status classification
//!
//! Once a message is attributed to a company, this module picks the
//! application it is about, asks the oracle what the message means for that
//! application's status, and applies the resulting transition.
//!
//! Oracle failures never abort a cycle: a failed or malformed reply simply
//! leaves the message without an effect. The one exception is a failure
//! caused by the cycle deadline, which is reported as a timeout.

use anyhow::Result;
use log::{debug, info, warn};
use serde::Deserialize;

use super::deadline::Deadline;
use super::engine::CycleError;
use crate::models::{
    Application, ApplicationStatus, Company, EMAIL_UPDATE, MailMessage, NewApplicationEvent,
};
use crate::oracle::{Oracle, parse_json_reply, prompts};
use crate::storage::TrackerStore;

/// Which application a message is about
#[derive(Debug, Clone, PartialEq)]
pub enum Disambiguation {
    /// The company has no application in progress
    NoEligibleTarget,
    Target(Application),
    /// Several candidates and the oracle could not (or did not) pick one
    Ambiguous,
}

/// Oracle verdict on a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusVerdict {
    Rejected,
    Interview,
    Offer,
    NoChange,
    Unknown,
}

impl StatusVerdict {
    /// Status this verdict moves an application to, if any
    pub fn status(self) -> Option<ApplicationStatus> {
        match self {
            StatusVerdict::Rejected => Some(ApplicationStatus::Rejected),
            StatusVerdict::Interview => Some(ApplicationStatus::Interview),
            StatusVerdict::Offer => Some(ApplicationStatus::Offer),
            StatusVerdict::NoChange | StatusVerdict::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusReply {
    pub status: StatusVerdict,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct RoleReply {
    index: i64,
}

/// What happened to one message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Unmatched,
    NoEligibleTarget {
        company_id: i64,
    },
    Ambiguous {
        company_id: i64,
    },
    ClassificationFailed {
        application_id: i64,
    },
    Unchanged {
        application_id: i64,
        verdict: StatusVerdict,
    },
    Updated {
        application_id: i64,
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
}

/// Call the oracle, turning non-deadline failures into `None`
fn ask(oracle: &dyn Oracle, prompt: &str, deadline: &Deadline) -> Result<Option<String>, CycleError> {
    match oracle.complete(prompt, deadline) {
        Ok(reply) => Ok(Some(reply)),
        Err(_) if deadline.is_expired() => Err(CycleError::Timeout),
        Err(e) => {
            warn!("Oracle call failed: {:#}", e);
            Ok(None)
        }
    }
}

/// Pick the application at `company` that `message` is about
///
/// A single active application is taken as-is. Several are put to the oracle
/// as a numbered list. `-1` means the email is about none of them; an
/// out-of-range index or any oracle failure leaves the message ambiguous.
pub fn disambiguate(
    store: &dyn TrackerStore,
    oracle: &dyn Oracle,
    company: &Company,
    message: &MailMessage,
    deadline: &Deadline,
) -> Result<Disambiguation, CycleError> {
    let mut candidates = store.list_active_applications(company.id)?;

    match candidates.len() {
        0 => return Ok(Disambiguation::NoEligibleTarget),
        1 => return Ok(Disambiguation::Target(candidates.remove(0))),
        _ => {}
    }

    let titles: Vec<&str> = candidates.iter().map(|app| app.title.as_str()).collect();
    let prompt = prompts::role_prompt(&titles, &message.subject, &message.body);

    let Some(raw) = ask(oracle, &prompt, deadline)? else {
        return Ok(Disambiguation::Ambiguous);
    };

    let reply: RoleReply = match parse_json_reply(&raw) {
        Ok(reply) => reply,
        Err(e) => {
            warn!("{} Could not parse role reply: {}", message.log_prefix(), e);
            return Ok(Disambiguation::Ambiguous);
        }
    };

    if reply.index == -1 {
        info!(
            "{} Email fits none of the roles at {}",
            message.log_prefix(),
            company.name
        );
        return Ok(Disambiguation::NoEligibleTarget);
    }

    match usize::try_from(reply.index) {
        Ok(index) if index < candidates.len() => {
            debug!(
                "{} Oracle picked role {} of {}",
                message.log_prefix(),
                index,
                candidates.len()
            );
            Ok(Disambiguation::Target(candidates.swap_remove(index)))
        }
        _ => {
            info!(
                "{} Ambiguous email for {} (index {}); skipping",
                message.log_prefix(),
                company.name,
                reply.index
            );
            Ok(Disambiguation::Ambiguous)
        }
    }
}

/// Ask the oracle what `message` means for `application`
///
/// Returns `None` when the call fails or the reply is malformed.
pub fn classify(
    oracle: &dyn Oracle,
    company: &Company,
    application: &Application,
    message: &MailMessage,
    deadline: &Deadline,
) -> Result<Option<StatusReply>, CycleError> {
    let prompt = prompts::status_prompt(
        &company.name,
        application.status,
        &message.subject,
        &message.body,
    );

    let Some(raw) = ask(oracle, &prompt, deadline)? else {
        return Ok(None);
    };

    match parse_json_reply::<StatusReply>(&raw) {
        Ok(reply) => Ok(Some(reply)),
        Err(e) => {
            warn!("{} Could not parse status reply: {}", message.log_prefix(), e);
            Ok(None)
        }
    }
}

/// Status to move to, or `None` when the verdict changes nothing
pub fn next_status(current: ApplicationStatus, verdict: StatusVerdict) -> Option<ApplicationStatus> {
    verdict.status().filter(|status| *status != current)
}

/// Apply a verdict: at most one status update plus exactly one audit event
pub fn apply_transition(
    store: &dyn TrackerStore,
    application: &Application,
    reply: &StatusReply,
) -> Result<MessageOutcome> {
    let Some(to) = next_status(application.status, reply.status) else {
        return Ok(MessageOutcome::Unchanged {
            application_id: application.id,
            verdict: reply.status,
        });
    };

    let details = format!(
        "Status changed from {} to {}. Summary: {}",
        application.status, to, reply.summary
    );
    store.record_transition(
        application.id,
        to,
        NewApplicationEvent::new(application.id, EMAIL_UPDATE, details),
    )?;

    Ok(MessageOutcome::Updated {
        application_id: application.id,
        from: application.status,
        to,
    })
}
