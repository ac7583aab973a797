//! Reconciles feed entries into a [`FeedDocument`].
//!
//! Two modes with deliberately different ordering policies:
//!
//! - [`full_resync`] discards every entry and rebuilds the set from the
//!   release list, then sorts by title, descending, as plain strings
//!   ("Version 10.0" sorts before "Version 2.0").
//! - [`upsert`] replaces the entries for one version and puts the new entry
//!   first, leaving the rest in place.
//!
//! Both only mutate the in-memory document; persisting is the caller's job.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::feed::{entry_from_release, FeedDocument, FeedEntry};
use crate::release::{FilterPolicy, ReleaseRecord, SkipReason};

/// Outcome of a [`full_resync`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncReport {
    /// Entries present before the resync.
    pub removed: usize,
    /// Versions added, in release-list order.
    pub added: Vec<String>,
    /// Releases left out, with the tag and reason.
    pub skipped: Vec<(String, SkipReason)>,
}

/// Outcome of an [`upsert`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// Existing entries for the same version that were replaced.
    pub replaced: usize,
}

/// Rebuilds the document's entries from `releases`.
///
/// Ineligible releases are logged and skipped. A release whose version was
/// already added by an earlier release in the list is skipped as a duplicate.
pub fn full_resync(
    doc: &mut FeedDocument,
    releases: &[ReleaseRecord],
    policy: &FilterPolicy,
    now: DateTime<Utc>,
) -> ResyncReport {
    let mut report = ResyncReport {
        removed: doc.entries.len(),
        ..ResyncReport::default()
    };
    doc.entries.clear();

    let mut seen: HashSet<String> = HashSet::new();
    for record in releases {
        let eligible = match policy.evaluate(record) {
            Ok(eligible) => eligible,
            Err(reason) => {
                tracing::warn!(tag = %record.tag_name, reason = %reason, "Skipping release");
                report.skipped.push((record.tag_name.clone(), reason));
                continue;
            }
        };

        let version = eligible.version().to_string();
        if !seen.insert(version.clone()) {
            let reason = SkipReason::DuplicateVersion(version);
            tracing::warn!(tag = %record.tag_name, reason = %reason, "Skipping release");
            report.skipped.push((record.tag_name.clone(), reason));
            continue;
        }

        doc.entries.push(entry_from_release(&eligible, now));
        tracing::info!(tag = %record.tag_name, version = %version, "Added release");
        report.added.push(version);
    }

    // Stable, descending, plain string comparison of titles.
    doc.entries.sort_by(|a, b| b.title.cmp(&a.title));
    report
}

/// Replaces every entry advertising `entry.version` and inserts `entry` at
/// the head of the feed.
pub fn upsert(doc: &mut FeedDocument, entry: FeedEntry) -> UpsertReport {
    let before = doc.entries.len();
    doc.entries
        .retain(|existing| existing.enclosure_version() != Some(entry.version.as_str()));
    let replaced = before - doc.entries.len();

    if replaced > 0 {
        tracing::info!(
            version = %entry.version,
            replaced = replaced,
            "Removed existing entry for version"
        );
    }

    doc.entries.insert(0, entry);
    UpsertReport { replaced }
}
