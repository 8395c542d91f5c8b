//! Built-in outreach templates. Slots are `{name}` and filled by `render`.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static RE_SLOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("slot regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmailTemplate {
    pub name: &'static str,
    pub subject: &'static str,
    pub body: &'static str,
}

pub const PROFESSIONAL: EmailTemplate = EmailTemplate {
    name: "professional",
    subject: "Application for {job_title} at {company_name}",
    body: "Dear {contact_name},

I hope this email finds you well. I am writing to express my strong interest in the {job_title} position at {company_name}.

{personalized_introduction}

{experience_highlight}

{skills_alignment}

I have attached my resume for your review and would welcome the opportunity to discuss how my background can contribute to {company_name}'s continued success.

Thank you for your time and consideration. I look forward to hearing from you.

Best regards,
{sender_name}
{sender_contact}",
};

pub const CONVERSATIONAL: EmailTemplate = EmailTemplate {
    name: "conversational",
    subject: "Excited about the {job_title} role at {company_name}",
    body: "Hi {contact_name},

I came across the {job_title} opening at {company_name} and couldn't help but get excited about it.

{personalized_introduction}

{experience_highlight}

{skills_alignment}

I'd love to chat about how I can contribute to the team. My resume is attached, and I'm happy to talk whenever suits you.

Thanks for your time!

Best,
{sender_name}
{sender_contact}",
};

pub const TECHNICAL: EmailTemplate = EmailTemplate {
    name: "technical",
    subject: "{job_title} application - {sender_name}",
    body: "Dear {contact_name},

I am writing to apply for the {job_title} position at {company_name}. As an engineer working with {key_technologies}, I am particularly drawn to this opportunity.

{technical_experience_highlight}

{problem_solving_example}

{technical_skills_alignment}

I have attached my resume with details of my technical background and would appreciate the chance to discuss how my skills fit your team's needs.

Thank you for your consideration.

Best regards,
{sender_name}
{sender_contact}",
};

pub const ALL: [EmailTemplate; 3] = [PROFESSIONAL, CONVERSATIONAL, TECHNICAL];

impl EmailTemplate {
    pub fn by_name(name: &str) -> Option<EmailTemplate> {
        let name = name.trim();
        ALL.into_iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn names() -> Vec<&'static str> {
        ALL.iter().map(|t| t.name).collect()
    }

    pub fn render_subject(&self, slots: &[(&str, &str)]) -> String {
        fill(self.subject, slots).trim().to_string()
    }

    pub fn render_body(&self, slots: &[(&str, &str)]) -> String {
        collapse_blank_lines(&fill(self.body, slots))
    }
}

/// One pass over the template: values are never rescanned for slots.
/// Unknown slots are left as-is.
fn fill(text: &str, slots: &[(&str, &str)]) -> String {
    RE_SLOT
        .replace_all(text, |caps: &Captures| {
            match slots.iter().find(|(key, _)| *key == &caps[1]) {
                Some((_, value)) => value.trim().to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Trims trailing whitespace per line and collapses runs of blank lines to one.
pub fn collapse_blank_lines(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() && out.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
