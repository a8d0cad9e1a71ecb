//! Prompt builders for the oracle tasks

use crate::models::ApplicationStatus;

/// Body characters sent when picking between several roles
pub const ROLE_BODY_LIMIT: usize = 1000;
/// Body characters sent when classifying a status change
pub const STATUS_BODY_LIMIT: usize = 3000;
/// Raw page characters sent for job detail extraction
pub const EXTRACTION_LIMIT: usize = 20_000;

/// Cut `s` to at most `max` characters, on a character boundary
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Ask which of several roles at one company an email is about
///
/// Expected reply: `{"index": <n>}` with `-1` for "cannot tell".
pub fn role_prompt(titles: &[&str], subject: &str, body: &str) -> String {
    let titles_list: String = titles
        .iter()
        .enumerate()
        .map(|(i, title)| format!("{}. {}\n", i, title))
        .collect();

    format!(
        r#"I have multiple job applications at this company. Based on the email, identify which role is being discussed.

Candidate Roles:
{titles_list}
Email Subject: {subject}
Email Body Snippet: {body}

Task: Return ONLY the JSON object with the index of the matched role.
If the email is generic (e.g. "Update on your application") and doesn't specify a role, return index -1.

Example Output: {{"index": 0}} or {{"index": -1}}"#,
        body = truncate_chars(body, ROLE_BODY_LIMIT),
    )
}

/// Ask what an email means for the status of one application
///
/// Expected reply: `{"status": "...", "summary": "..."}`.
pub fn status_prompt(
    company: &str,
    current_status: ApplicationStatus,
    subject: &str,
    body: &str,
) -> String {
    let body = if body.chars().count() > STATUS_BODY_LIMIT {
        format!("{}...(truncated)", truncate_chars(body, STATUS_BODY_LIMIT))
    } else {
        body.to_string()
    };

    format!(
        r#"You are an AI Job Application Tracker. Your goal is to keep the user's database up to date.

CONTEXT:
The user applied to a job at "{company}".
Current Status in DB: "{current_status}".

INCOMING EMAIL:
Subject: {subject}
Body: {body}

TASK:
Analyze the email and determine if the status of the application has changed.

RULES:
1. If the email is a rejection (e.g., "unfortunately", "not moving forward"), status is "REJECTED".
2. If the email is an invite to chat, phone screen, or interview, status is "INTERVIEW".
3. If the email is an offer letter, status is "OFFER".
4. If the email is just an acknowledgement ("received"), a newsletter, or asking for login details, status is "NO_CHANGE".
5. If the email is totally unrelated (spam), status is "UNKNOWN".

OUTPUT FORMAT:
Return ONLY a valid JSON object. Do not write "Here is the JSON" or use Markdown blocks.
{{
    "status": "REJECTED" | "INTERVIEW" | "OFFER" | "NO_CHANGE" | "UNKNOWN",
    "summary": "A very short, 10-word summary of the email content."
}}"#
    )
}

/// Ask for structured job details from a raw job posting page
pub fn extraction_prompt(raw: &str) -> String {
    format!(
        r#"You are an expert Job Data Extraction Agent. Analyze the provided raw HTML/Text from a job posting and extract structured data.

INSTRUCTIONS:
1. Identify the core job details.
2. Ignore navigation menus, footers, "similar jobs" lists, and site advertisements.
3. Format the output as valid JSON only. Do not wrap the output in markdown code blocks.

OUTPUT SCHEMA:
{{
    "company_name": "Name of the company",
    "role_title": "Job title",
    "location": "Job location or 'Remote'",
    "description": "A clean summary focused on responsibilities and requirements, without HTML tags",
    "tech_stack": ["technologies", "mentioned"],
    "salary_range": "The salary string if explicitly mentioned, otherwise null"
}}

If a piece of information is missing, set the value to null. Do not guess.

RAW CONTENT:
{}"#,
        truncate_chars(raw, EXTRACTION_LIMIT)
    )
}
