//! Company matching for incoming mail
//!
//! A message is attributed to at most one tracked company. Three rules are
//! tried in order, each across every company before the next rule:
//! 1. the company name appears in the subject
//! 2. the company name appears in the sender's display name
//! 3. the company name appears in the sender's domain
//!
//! Within a rule the company with the lowest id wins. Names shorter than three
//! characters are ignored; they match far too much.

use std::fmt;

use crate::models::{Company, EmailAddress};

/// Shortest normalized company name that takes part in matching
pub const MIN_NAME_LEN: usize = 3;

/// Which rule produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Subject,
    DisplayName,
    Domain,
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchRule::Subject => "subject",
            MatchRule::DisplayName => "sender name",
            MatchRule::Domain => "sender domain",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanyMatch {
    pub company: Company,
    pub rule: MatchRule,
}

/// Sender header split into the parts the rules look at, lower-cased
#[derive(Debug, Default, PartialEq)]
struct Sender {
    display_name: String,
    domain: String,
}

impl Sender {
    /// An unparseable header is treated as a bare address with no display name
    fn parse(from: &str) -> Self {
        let address =
            EmailAddress::parse(from).unwrap_or_else(|| EmailAddress::new(from.trim()));

        Self {
            display_name: address.name.as_deref().unwrap_or_default().to_lowercase(),
            domain: address.domain().unwrap_or_default().to_lowercase(),
        }
    }
}

/// Find the company a message is about
pub fn match_company(subject: &str, from: &str, companies: &[Company]) -> Option<CompanyMatch> {
    let subject = subject.to_lowercase();
    let sender = Sender::parse(from);

    let mut eligible: Vec<&Company> = companies
        .iter()
        .filter(|c| c.normalized_name.chars().count() >= MIN_NAME_LEN)
        .collect();
    eligible.sort_by_key(|c| c.id);

    let rules = [
        (MatchRule::Subject, subject.as_str()),
        (MatchRule::DisplayName, sender.display_name.as_str()),
        (MatchRule::Domain, sender.domain.as_str()),
    ];

    rules.into_iter().find_map(|(rule, haystack)| {
        eligible
            .iter()
            .find(|c| haystack.contains(c.normalized_name.as_str()))
            .map(|company| CompanyMatch {
                company: (*company).clone(),
                rule,
            })
    })
}
