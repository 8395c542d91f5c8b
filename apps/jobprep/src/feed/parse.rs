//! Turns a fetched listing body into postings.
//!
//! Two shapes are understood: RSS 2.0 feeds, and the HTML job-card fragments
//! returned by LinkedIn's guest search endpoint.

use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use crate::feed::extract::{
    canonical_url, clean_text, employment_type, experience_level, extract_job_id, find_location,
    salary_range, split_title,
};
use crate::feed::FeedError;
use crate::models::JobPosting;

/// One listing entry before normalization.
#[derive(Debug, Default)]
struct RawEntry {
    title: String,
    link: String,
    description: String,
    company: Option<String>,
    location: Option<String>,
    salary: Option<String>,
    published: Option<DateTime<Utc>>,
}

/// Parses either shape, choosing by content sniffing.
pub fn parse_listing(body: &str, source: &str) -> Result<Vec<JobPosting>, FeedError> {
    let head = body.trim_start();
    let entries = if head.starts_with("<?xml") || head.contains("<rss") {
        rss_entries(body)?
    } else {
        html_entries(body)?
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| into_posting(entry, source))
        .collect())
}

fn rss_entries(body: &str) -> Result<Vec<RawEntry>, FeedError> {
    let channel = rss::Channel::read_from(body.as_bytes())
        .map_err(|e| FeedError::Parse(e.to_string()))?;

    Ok(channel
        .items()
        .iter()
        .map(|item| RawEntry {
            title: item.title().unwrap_or_default().to_string(),
            link: item
                .link()
                .or_else(|| item.guid().map(|g| g.value()))
                .unwrap_or_default()
                .to_string(),
            description: item
                .description()
                .or_else(|| item.content())
                .unwrap_or_default()
                .to_string(),
            published: item
                .pub_date()
                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                .map(|d| d.with_timezone(&Utc)),
            ..Default::default()
        })
        .collect())
}

fn html_entries(body: &str) -> Result<Vec<RawEntry>, FeedError> {
    let document = Html::parse_fragment(body);
    let card = selector("div.base-card, div.base-search-card, div.job-search-card")?;
    let link = selector("a.base-card__full-link, a[href*='/jobs/view/']")?;
    let title = selector("h3.base-search-card__title, .base-search-card__title")?;
    let company = selector("h4.base-search-card__subtitle, .base-search-card__subtitle")?;
    let location = selector("span.job-search-card__location, .job-search-card__location")?;
    let salary = selector("span.job-search-card__salary-info, .job-search-card__salary-info")?;
    let date = selector("time")?;
    let snippet = selector(".base-search-card__snippet, .job-search-card__snippet")?;

    Ok(document
        .select(&card)
        .map(|el| RawEntry {
            title: text_of(&el, &title).unwrap_or_default(),
            link: el
                .select(&link)
                .next()
                .and_then(|a| a.value().attr("href"))
                .unwrap_or_default()
                .to_string(),
            description: text_of(&el, &snippet).unwrap_or_default(),
            company: text_of(&el, &company),
            location: text_of(&el, &location),
            salary: text_of(&el, &salary),
            published: el
                .select(&date)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .and_then(parse_card_date),
        })
        .collect())
}

fn selector(css: &str) -> Result<Selector, FeedError> {
    Selector::parse(css).map_err(|e| FeedError::Parse(format!("selector '{css}': {e}")))
}

fn text_of(el: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel)
        .next()
        .map(|n| clean_text(&n.text().collect::<Vec<_>>().join(" ")))
        .filter(|t| !t.is_empty())
}

fn parse_card_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        })
}

fn into_posting(entry: RawEntry, source: &str) -> Option<JobPosting> {
    let title = clean_text(&entry.title);
    let link = entry.link.trim();
    if title.is_empty() || link.is_empty() {
        warn!("Skipping feed entry missing title or link (title={title:?})");
        return None;
    }

    let description = clean_text(&entry.description);
    let (title, title_company, title_location) = if entry.company.is_some() {
        (title, None, None)
    } else {
        split_title(&title)
    };

    let company = entry
        .company
        .or(title_company)
        .unwrap_or_else(|| "Unknown".to_string());
    let location = entry
        .location
        .or(title_location)
        .or_else(|| find_location(&description));

    let haystack = format!("{title} {description}");

    Some(JobPosting {
        url: canonical_url(link),
        external_id: extract_job_id(link),
        salary_range: entry.salary.or_else(|| salary_range(&description)),
        employment_type: employment_type(&description),
        experience_level: experience_level(&haystack),
        title,
        company,
        location,
        description,
        posted_at: entry.published,
        source_feed: Some(source.to_string()),
    })
}
