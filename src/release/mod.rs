//! GitHub release records: wire types, acquisition and eligibility.
//!
//! - [`source`] - one best-effort fetch of the releases endpoint
//! - [`filter`] - decides which releases become feed entries

mod filter;
mod source;

pub use filter::{EligibleRelease, FilterPolicy, SkipReason, INSTALLER_SUFFIX};
pub use source::{FetchError, ReleaseSource};

use serde::Deserialize;

/// One release as reported by `GET /repos/{owner}/{repo}/releases`.
///
/// Only the fields the feed needs are modeled; everything else in the
/// response is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseRecord {
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    pub size: u64,
}

impl ReleaseRecord {
    /// Feed version for this release: the tag with one leading `v` removed.
    pub fn version(&self) -> &str {
        version_from_tag(&self.tag_name)
    }
}

/// Strips a single leading `v` from a release tag.
pub fn version_from_tag(tag: &str) -> &str {
    tag.strip_prefix('v').unwrap_or(tag)
}

/// Decodes a releases response body.
///
/// The body must be a JSON array. Elements that do not match the release
/// shape are skipped with a warning instead of failing the whole response.
pub fn decode_releases(bytes: &[u8]) -> Result<Vec<ReleaseRecord>, serde_json::Error> {
    let raw: Vec<serde_json::Value> = serde_json::from_slice(bytes)?;
    let total = raw.len();

    let records: Vec<ReleaseRecord> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(index = index, error = %e, "Skipping malformed release record");
                None
            }
        })
        .collect();

    if records.len() < total {
        tracing::debug!(
            decoded = records.len(),
            total = total,
            "Some release records were not decodable"
        );
    }
    Ok(records)
}
