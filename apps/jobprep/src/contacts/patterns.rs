//! Address guessing. No network; always answers when a domain is known.

use async_trait::async_trait;

use super::{Contact, ContactError, ContactSource};

pub const GENERIC_CONFIDENCE: f64 = 0.3;
pub const PERSON_CONFIDENCE: f64 = 0.4;

/// Hiring inboxes, most likely first.
const GENERIC_INBOXES: [&str; 6] = ["careers", "jobs", "hiring", "hr", "info", "contact"];

/// Common corporate address formats for a named person, most common first.
pub fn person_addresses(first: &str, last: &str, domain: &str) -> Vec<String> {
    let clean = |s: &str| -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect()
    };
    let (first, last) = (clean(first), clean(last));
    if first.is_empty() || last.is_empty() {
        return Vec::new();
    }
    let (f, l) = (&first[..1], &last[..1]);
    [
        format!("{first}.{last}"),
        format!("{first}{last}"),
        first.clone(),
        format!("{f}{last}"),
        format!("{first}{l}"),
        format!("{f}.{last}"),
        format!("{last}.{first}"),
        format!("{first}_{last}"),
        format!("{first}-{last}"),
        last.clone(),
    ]
    .into_iter()
    .map(|local| format!("{local}@{domain}"))
    .collect()
}

pub fn generic_addresses(domain: &str) -> Vec<String> {
    GENERIC_INBOXES
        .iter()
        .map(|inbox| format!("{inbox}@{domain}"))
        .collect()
}

/// Guesses generic hiring inboxes at the company domain.
pub struct PatternSource;

#[async_trait]
impl ContactSource for PatternSource {
    fn name(&self) -> &'static str {
        "pattern"
    }

    async fn find(&self, company: &str, domain: &str) -> Result<Vec<Contact>, ContactError> {
        Ok(generic_addresses(domain)
            .into_iter()
            .map(|email| Contact {
                name: None,
                email,
                title: None,
                company: company.to_string(),
                domain: domain.to_string(),
                confidence: GENERIC_CONFIDENCE,
                source: self.name().to_string(),
                verified: false,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_addresses() {
        let addresses = person_addresses("Mary-Jane", "O'Neil", "acme.com");
        assert_eq!(addresses[0], "maryjane.oneil@acme.com");
        assert_eq!(addresses[3], "moneil@acme.com");
        assert_eq!(addresses.len(), 10);
        assert!(person_addresses("", "Doe", "acme.com").is_empty());
    }

    #[tokio::test]
    async fn test_pattern_source_generic_inboxes() {
        let found = PatternSource.find("Acme", "acme.com").await.unwrap();
        let emails: Vec<&str> = found.iter().map(|c| c.email.as_str()).collect();
        assert_eq!(
            emails,
            vec![
                "careers@acme.com",
                "jobs@acme.com",
                "hiring@acme.com",
                "hr@acme.com",
                "info@acme.com",
                "contact@acme.com"
            ]
        );
        assert!(found.iter().all(|c| c.confidence == GENERIC_CONFIDENCE && !c.verified));
    }
}
