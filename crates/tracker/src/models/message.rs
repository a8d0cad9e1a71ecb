//! Message model for mail pulled from the remote mailbox

use serde::{Deserialize, Serialize};

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An email address with optional display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "Stripe Recruiting")
    pub name: Option<String>,
    /// Email address (e.g., "jobs@stripe.com")
    pub email: String,
}

impl EmailAddress {
    /// Create a new email address with just the email
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new email address with a display name
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Parse a sender header such as `"Stripe Recruiting" <jobs@stripe.com>`
    ///
    /// Returns `None` when the header is not a single well-formed address:
    /// the address part must contain exactly one `@` with text on both sides
    /// and no whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();

        if let Some(angle_start) = s.rfind('<') {
            let angle_end = s.rfind('>')?;
            if angle_end < angle_start || !s[angle_end + 1..].trim().is_empty() {
                return None;
            }
            let email = s[angle_start + 1..angle_end].trim();
            if !is_plain_address(email) {
                return None;
            }
            let name = s[..angle_start].trim().trim_matches('"').trim();
            return Some(Self {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                email: email.to_string(),
            });
        }

        if is_plain_address(s) {
            return Some(Self::new(s));
        }

        None
    }

    /// Domain part of the address (text after the `@`)
    pub fn domain(&self) -> Option<&str> {
        let mut parts = self.email.split('@');
        let (_, domain) = (parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        Some(domain)
    }

    /// Format the email address for display
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

fn is_plain_address(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) || s.matches('@').count() != 1 {
        return false;
    }
    s.split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
}

/// A fully fetched message, reduced to what the sync pipeline needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Gmail message ID
    pub id: MessageId,
    /// Subject header (empty when missing)
    pub subject: String,
    /// Raw `From` header, unparsed
    pub from: String,
    /// Decoded body: plain text when available, otherwise HTML, otherwise empty
    pub body: String,
}

impl MailMessage {
    pub fn new(
        id: impl Into<MessageId>,
        subject: impl Into<String>,
        from: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            from: from.into(),
            body: body.into(),
        }
    }

    /// Short label used as a log prefix for this message
    pub fn log_prefix(&self) -> String {
        let short: String = self.subject.chars().take(20).collect();
        if short.len() < self.subject.len() {
            format!("[Email: {}...]", short)
        } else {
            format!("[Email: {}]", short)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_email_with_name() {
        let addr = EmailAddress::parse("Stripe Recruiting <jobs@stripe.com>").unwrap();
        assert_eq!(addr.name, Some("Stripe Recruiting".to_string()));
        assert_eq!(addr.email, "jobs@stripe.com");
    }

    #[test]
    fn test_parse_email_with_quoted_name() {
        let addr = EmailAddress::parse("\"Acme Talent\" <talent@acme.io>").unwrap();
        assert_eq!(addr.name, Some("Acme Talent".to_string()));
        assert_eq!(addr.email, "talent@acme.io");
    }

    #[test]
    fn test_parse_email_without_name() {
        let addr = EmailAddress::parse("john@example.com").unwrap();
        assert_eq!(addr.name, None);
        assert_eq!(addr.email, "john@example.com");
    }

    #[test]
    fn test_parse_email_with_angle_brackets_no_name() {
        let addr = EmailAddress::parse("<john@example.com>").unwrap();
        assert_eq!(addr.name, None);
        assert_eq!(addr.email, "john@example.com");
    }

    #[test]
    fn test_parse_rejects_malformed_headers() {
        assert!(EmailAddress::parse("Recruiting Team").is_none());
        assert!(EmailAddress::parse("a@b@c.com").is_none());
        assert!(EmailAddress::parse("Name <not an address>").is_none());
        assert!(EmailAddress::parse("Name <x@y.com> trailing").is_none());
        assert!(EmailAddress::parse("").is_none());
    }

    #[test]
    fn test_domain() {
        assert_eq!(EmailAddress::new("jobs@acme.com").domain(), Some("acme.com"));
        assert_eq!(EmailAddress::new("no-at-sign").domain(), None);
    }

    #[test]
    fn test_display() {
        let addr = EmailAddress::with_name("John Doe", "john@example.com");
        assert_eq!(addr.display(), "John Doe <john@example.com>");
        assert_eq!(EmailAddress::new("john@example.com").display(), "john@example.com");
    }

    #[test]
    fn test_log_prefix_truncates_long_subjects() {
        let msg = MailMessage::new("m1", "Update on your application to Stripe", "", "");
        assert_eq!(msg.log_prefix(), "[Email: Update on your appli...]");

        let exact = MailMessage::new("m3", "Interview invitation", "", "");
        assert_eq!(exact.log_prefix(), "[Email: Interview invitation]");

        let short = MailMessage::new("m2", "Offer", "", "");
        assert_eq!(short.log_prefix(), "[Email: Offer]");
    }
}
