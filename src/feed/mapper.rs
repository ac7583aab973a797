use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::{Enclosure, FeedEntry, DEFAULT_RELEASE_NOTES};
use crate::release::EligibleRelease;

const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S +0000";

/// Formats a timestamp the way appcast `<pubDate>` elements expect.
pub fn format_pub_date(dt: DateTime<Utc>) -> String {
    dt.format(PUB_DATE_FORMAT).to_string()
}

/// Parses a GitHub `published_at` value.
///
/// Accepts RFC 3339 with `Z` or an explicit offset (converted to UTC), and
/// naive date-times or plain dates, which are taken as UTC.
pub fn parse_published_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let normalized = match raw.strip_suffix('Z') {
        Some(stem) => format!("{stem}+00:00"),
        None => raw.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Maps an eligible release to its feed entry.
///
/// `now` stands in for a missing or unparseable publication date.
pub fn entry_from_release(release: &EligibleRelease<'_>, now: DateTime<Utc>) -> FeedEntry {
    let version = release.version().to_string();
    let record = release.record;

    let published = match record.published_at.as_deref() {
        Some(raw) => parse_published_at(raw).unwrap_or_else(|| {
            tracing::warn!(
                tag = %record.tag_name,
                published_at = %raw,
                "Unparseable publication date, using current time"
            );
            now
        }),
        None => now,
    };

    let body = record
        .body
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .unwrap_or(DEFAULT_RELEASE_NOTES);
    let description = format!(
        "<h2>Version {}</h2><p>{}</p>",
        quick_xml::escape::escape(version.as_str()),
        quick_xml::escape::escape(body)
    );

    FeedEntry {
        title: Some(format!("Version {version}")),
        pub_date: Some(format_pub_date(published)),
        description: Some(description),
        enclosure: Some(Enclosure::new(
            release.asset.browser_download_url.as_str(),
            version.as_str(),
            release.asset.size,
        )),
        extensions: Vec::new(),
        version,
    }
}

/// Builds the entry for a release supplied by hand rather than fetched.
pub fn manual_entry(version: &str, url: &str, length: u64, now: DateTime<Utc>) -> FeedEntry {
    FeedEntry {
        version: version.to_string(),
        title: Some(format!("Version {version}")),
        pub_date: Some(format_pub_date(now)),
        description: Some(format!(
            "<h2>New Version {}</h2><p>{DEFAULT_RELEASE_NOTES}</p>",
            quick_xml::escape::escape(version)
        )),
        enclosure: Some(Enclosure::new(url, version, length)),
        extensions: Vec::new(),
    }
}
