//! Text heuristics applied to every feed entry.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static RE_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static RE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("space regex"));
static RE_VIEW_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/jobs/view/(?:[^/?#]*-)?(\d+)").expect("view id regex"));
static RE_CURRENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"currentJobId=(\d+)").expect("current id regex"));
static RE_TITLE_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\s+at\s+(.+?)(?:\s+in\s+(.+))?$").expect("title regex")
});
static RE_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Location[:\s]+([^,\n.]+)").expect("location regex"));

static EMPLOYMENT_TYPES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bFull[- ]?time\b",
        r"(?i)\bPart[- ]?time\b",
        r"(?i)\bContract\b",
        r"(?i)\bTemporary\b",
        r"(?i)\bInternship\b",
        r"(?i)\bFreelance\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("employment regex"))
    .collect()
});

static EXPERIENCE_LEVELS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bEntry[- ]?level\b",
        r"(?i)\bJunior\b",
        r"(?i)\bSenior\b",
        r"(?i)\bLead\b",
        r"(?i)\bPrincipal\b",
        r"(?i)\bManager\b",
        r"(?i)\bDirector\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("experience regex"))
    .collect()
});

static SALARY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\$[\d,]+k?(?:\s*-\s*\$?[\d,]+k?)?(?:\s*(?:per\s+|/\s*)?(?:year|annually|yr))?",
        r"(?i)\b[\d,]+k?(?:\s*-\s*[\d,]+k?)?\s*(?:per\s+|/\s*)(?:year|annually|yr)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("salary regex"))
    .collect()
});

/// Strips HTML tags, decodes the common entities and collapses whitespace.
pub fn clean_text(text: &str) -> String {
    let stripped = RE_TAGS.replace_all(text, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    RE_SPACE.replace_all(decoded.trim(), " ").into_owned()
}

/// LinkedIn job id from `/jobs/view/<id>`, `/jobs/view/<slug>-<id>` or `currentJobId=<id>`.
pub fn extract_job_id(url: &str) -> Option<String> {
    RE_VIEW_ID
        .captures(url)
        .or_else(|| RE_CURRENT_ID.captures(url))
        .map(|c| c[1].to_string())
}

/// Drops tracking query strings and fragments from LinkedIn job-view URLs
/// so the same posting always maps to the same ledger key.
pub fn canonical_url(link: &str) -> String {
    let Ok(mut url) = Url::parse(link.trim()) else {
        return link.trim().to_string();
    };
    let is_linkedin = url
        .host_str()
        .map(|h| h.ends_with("linkedin.com"))
        .unwrap_or(false);
    if is_linkedin && url.path().contains("/jobs/view/") {
        url.set_query(None);
        url.set_fragment(None);
    }
    url.to_string()
}

/// Splits "Title at Company in Location" into its parts.
/// Returns the title unchanged when there is no " at ".
pub fn split_title(title: &str) -> (String, Option<String>, Option<String>) {
    match RE_TITLE_AT.captures(title.trim()) {
        Some(caps) => (
            caps[1].trim().to_string(),
            caps.get(2).map(|m| m.as_str().trim().to_string()),
            caps.get(3).map(|m| m.as_str().trim().to_string()),
        ),
        None => (title.trim().to_string(), None, None),
    }
}

pub fn find_location(description: &str) -> Option<String> {
    RE_LOCATION
        .captures(description)
        .map(|c| c[1].trim().to_string())
        .filter(|l| !l.is_empty())
}

pub fn employment_type(text: &str) -> Option<String> {
    first_match(&EMPLOYMENT_TYPES, text)
}

pub fn experience_level(text: &str) -> Option<String> {
    first_match(&EXPERIENCE_LEVELS, text)
}

pub fn salary_range(text: &str) -> Option<String> {
    first_match(&SALARY, text)
}

fn first_match(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str().trim().to_string())
}
