//! Markdown resume model: parse, edit, render.
//!
//! Expected layout (section names are matched loosely):
//!
//! ```text
//! # Name
//! **Headline**
//! email | phone | linkedin
//!
//! ## Summary
//! ## Experience        ### Title — Company, *dates | place*, - bullets
//! ## Skills            - **Category:** a, b, c
//! ## Education
//! ## <anything else>   kept verbatim
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeDocument {
    pub name: String,
    pub headline: Option<String>,
    pub contact_lines: Vec<String>,
    pub summary: String,
    pub experience: Vec<Experience>,
    pub skills: Vec<SkillGroup>,
    pub education: Vec<String>,
    pub extra_sections: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub title: String,
    pub company: Option<String>,
    /// Raw "dates | location" line without the emphasis markers.
    pub meta: Option<String>,
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillGroup {
    pub category: String,
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Header,
    Summary,
    Experience,
    Skills,
    Education,
    Other,
}

fn classify(heading: &str) -> Section {
    let h = heading.to_lowercase();
    if h.contains("summary") || h.contains("profile") || h == "about" {
        Section::Summary
    } else if h.contains("experience") || h.contains("employment") || h.contains("work history") {
        Section::Experience
    } else if h.contains("skill") {
        Section::Skills
    } else if h.contains("education") {
        Section::Education
    } else {
        Section::Other
    }
}

impl ResumeDocument {
    pub fn parse(markdown: &str) -> Self {
        let mut doc = ResumeDocument::default();
        let mut section = Section::Header;
        let mut other_title = String::new();
        let mut other_body: Vec<String> = Vec::new();
        let mut summary: Vec<String> = Vec::new();

        let flush_other = |doc: &mut ResumeDocument, title: &mut String, body: &mut Vec<String>| {
            if !title.is_empty() {
                doc.extra_sections
                    .push((std::mem::take(title), body.join("\n").trim().to_string()));
            }
            body.clear();
        };

        for raw in markdown.lines() {
            let line = raw.trim();

            if let Some(name) = line.strip_prefix("# ") {
                doc.name = name.trim().to_string();
                section = Section::Header;
                continue;
            }
            if let Some(heading) = line.strip_prefix("## ") {
                if section == Section::Other {
                    flush_other(&mut doc, &mut other_title, &mut other_body);
                }
                section = classify(heading.trim());
                if section == Section::Other {
                    other_title = heading.trim().to_string();
                }
                continue;
            }
            if section == Section::Other {
                other_body.push(raw.trim_end().to_string());
                continue;
            }
            if line.is_empty() || line == "---" {
                continue;
            }

            match section {
                Section::Header => {
                    if doc.headline.is_none() && is_bold_line(line) && doc.contact_lines.is_empty() {
                        doc.headline = Some(line.trim_matches('*').trim().to_string());
                    } else {
                        doc.contact_lines.push(line.to_string());
                    }
                }
                Section::Summary => summary.push(line.to_string()),
                Section::Experience => {
                    if let Some(heading) = line.strip_prefix("### ") {
                        let (title, company, meta) = split_role(heading.trim());
                        doc.experience.push(Experience {
                            title,
                            company,
                            meta,
                            ..Default::default()
                        });
                    } else if let Some(current) = doc.experience.last_mut() {
                        if let Some(bullet) = bullet_text(line) {
                            current.bullets.push(bullet.to_string());
                        } else if current.meta.is_none() && current.bullets.is_empty() {
                            current.meta = Some(line.trim_matches('*').trim().to_string());
                        } else if let Some(last) = current.bullets.last_mut() {
                            // wrapped bullet continuation
                            last.push(' ');
                            last.push_str(line);
                        }
                    }
                }
                Section::Skills => {
                    if let Some(group) = parse_skill_line(line) {
                        doc.skills.push(group);
                    }
                }
                Section::Education => doc.education.push(line.to_string()),
                Section::Other => {}
            }
        }
        if section == Section::Other {
            flush_other(&mut doc, &mut other_title, &mut other_body);
        }

        doc.summary = summary.join(" ");
        doc
    }

    /// Best-effort structure for text pulled out of a PDF: the first line is
    /// the name, known section names become headings, "•" bullets become "-".
    pub fn from_plain_text(text: &str) -> Self {
        let mut markdown = Vec::new();
        let mut section = Section::Header;
        let mut seen_name = false;
        let mut last_was_bullet = true;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if !seen_name {
                markdown.push(format!("# {line}"));
                seen_name = true;
                continue;
            }
            if is_heading_word(line) {
                section = classify(line);
                markdown.push(format!("## {}", title_case(line)));
                last_was_bullet = true;
                continue;
            }
            let bullet = line
                .strip_prefix('•')
                .or_else(|| line.strip_prefix('▪'))
                .or_else(|| line.strip_prefix("- "))
                .or_else(|| line.strip_prefix("* "))
                .map(str::trim);
            match (section, bullet) {
                (Section::Experience, Some(b)) | (Section::Skills, Some(b)) => {
                    markdown.push(format!("- {b}"));
                    last_was_bullet = true;
                }
                (Section::Experience, None) if last_was_bullet => {
                    markdown.push(format!("### {line}"));
                    last_was_bullet = false;
                }
                (Section::Skills, None) => markdown.push(format!("- {line}")),
                (_, Some(b)) => markdown.push(format!("- {b}")),
                _ => markdown.push(line.to_string()),
            }
        }

        Self::parse(&markdown.join("\n"))
    }

    pub fn all_skills(&self) -> impl Iterator<Item = &str> {
        self.skills.iter().flat_map(|g| g.skills.iter().map(String::as_str))
    }

    /// Moves `emphasized` skills to the front of their group, and groups that
    /// contain any of them to the front of the list. Order is otherwise kept.
    pub fn reorder_skills(&mut self, emphasized: &[String]) {
        let rank = |skill: &str| {
            emphasized
                .iter()
                .position(|e| e.eq_ignore_ascii_case(skill))
                .unwrap_or(usize::MAX)
        };
        for group in &mut self.skills {
            group.skills.sort_by_key(|s| rank(s.as_str()));
        }
        self.skills
            .sort_by_key(|g| g.skills.iter().map(|s| rank(s.as_str())).min().unwrap_or(usize::MAX));
    }

    /// Condensed text handed to the model.
    pub fn outline(&self) -> String {
        let mut out = format!("Name: {}\n", self.name);
        if let Some(headline) = &self.headline {
            out.push_str(&format!("Headline: {headline}\n"));
        }
        out.push_str(&format!("Summary: {}\n\nExperience:\n", self.summary));
        for (i, exp) in self.experience.iter().enumerate() {
            out.push_str(&format!(
                "[{i}] {}{}\n",
                exp.title,
                exp.company
                    .as_deref()
                    .map(|c| format!(" — {c}"))
                    .unwrap_or_default()
            ));
            for bullet in &exp.bullets {
                out.push_str(&format!("    - {bullet}\n"));
            }
        }
        out.push_str("\nSkills:\n");
        for group in &self.skills {
            out.push_str(&format!("- {}: {}\n", group.category, group.skills.join(", ")));
        }
        out
    }

    pub fn to_markdown(&self) -> String {
        let mut lines = vec![format!("# {}", self.name)];
        if let Some(headline) = &self.headline {
            lines.push(format!("**{headline}**"));
        }
        lines.extend(self.contact_lines.iter().cloned());
        lines.push(String::new());

        if !self.summary.is_empty() {
            lines.push("## Summary".into());
            lines.push(self.summary.clone());
            lines.push(String::new());
        }

        if !self.experience.is_empty() {
            lines.push("## Experience".into());
            lines.push(String::new());
            for exp in &self.experience {
                match &exp.company {
                    Some(company) => lines.push(format!("### {} — {company}", exp.title)),
                    None => lines.push(format!("### {}", exp.title)),
                }
                if let Some(meta) = &exp.meta {
                    lines.push(format!("*{meta}*"));
                }
                lines.extend(exp.bullets.iter().map(|b| format!("- {b}")));
                lines.push(String::new());
            }
        }

        if !self.skills.is_empty() {
            lines.push("## Skills".into());
            for group in &self.skills {
                lines.push(format!("- **{}:** {}", group.category, group.skills.join(", ")));
            }
            lines.push(String::new());
        }

        if !self.education.is_empty() {
            lines.push("## Education".into());
            lines.extend(self.education.iter().cloned());
            lines.push(String::new());
        }

        for (title, body) in &self.extra_sections {
            lines.push(format!("## {title}"));
            lines.push(body.clone());
            lines.push(String::new());
        }

        lines.join("\n").trim_end().to_string() + "\n"
    }
}

fn is_bold_line(line: &str) -> bool {
    line.len() > 4 && line.starts_with("**") && line.ends_with("**")
}

fn bullet_text(line: &str) -> Option<&str> {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix('•'))
        .map(str::trim)
        .filter(|b| !b.is_empty())
}

/// "Title | Company | Dates", "Title — Company" or "Title at Company".
/// Returns title, company and the heading's trailing meta, if any.
fn split_role(heading: &str) -> (String, Option<String>, Option<String>) {
    let non_empty = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());

    if heading.contains(" | ") {
        let mut parts = heading.splitn(3, " | ");
        let title = parts.next().unwrap_or_default().trim().to_string();
        let company = parts.next().and_then(non_empty);
        let meta = parts.next().and_then(non_empty);
        return (title, company, meta);
    }
    for sep in [" — ", " – ", " at ", " - "] {
        if let Some((title, company)) = heading.split_once(sep) {
            return (title.trim().to_string(), non_empty(company), None);
        }
    }
    (heading.to_string(), None, None)
}

/// "- **Category:** a, b" or "- Category: a, b".
fn parse_skill_line(line: &str) -> Option<SkillGroup> {
    let body = bullet_text(line).unwrap_or(line).replace("**", "");
    let (category, list) = body.split_once(':')?;
    let skills: Vec<String> = list
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!skills.is_empty()).then(|| SkillGroup {
        category: category.trim().to_string(),
        skills,
    })
}

fn is_heading_word(line: &str) -> bool {
    let words = line.split_whitespace().count();
    let upper = line.chars().any(char::is_alphabetic)
        && line
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(char::is_uppercase);
    upper && words <= 4 && classify(line) != Section::Other
}

fn title_case(line: &str) -> String {
    line.split_whitespace()
        .map(|w| {
            let lower = w.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
