//! Run orchestration: lock, load-or-create, merge, save.
//!
//! Every run follows the same shape. The feed is only written after the merge
//! completed; any earlier failure leaves the file on disk untouched.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::feed::{manual_entry, FeedDocument, FeedError};
use crate::merge::{self, ResyncReport, UpsertReport};
use crate::release::{FilterPolicy, ReleaseSource};
use crate::util::{validate_http_url, FeedLock, LockError};

/// Exit code for runs that could not complete.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for malformed command arguments.
pub const EXIT_USAGE: i32 = 2;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The release API returned nothing (or the fetch failed).
    #[error("No releases found for {0}")]
    NoReleases(String),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Lock(#[from] LockError),

    /// Arguments were rejected before any I/O happened.
    #[error("{0}")]
    Usage(String),
}

impl SyncError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Usage(_) => EXIT_USAGE,
            SyncError::NoReleases(_) | SyncError::Feed(_) | SyncError::Lock(_) => EXIT_FAILURE,
        }
    }
}

/// Result of a full resync run.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub fetched: usize,
    pub report: ResyncReport,
    /// True when no feed existed and a new one was built.
    pub created: bool,
    /// The serialized feed, exactly as written (or as it would be, on a dry run).
    pub rendered: String,
    pub written: bool,
}

/// Result of a single-version upsert run.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub version: String,
    pub report: UpsertReport,
    pub created: bool,
    pub rendered: String,
    pub written: bool,
}

/// Validated arguments for [`App::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRequest {
    pub version: String,
    pub url: String,
    pub size: u64,
}

impl UpsertRequest {
    /// Validates raw `<VERSION> <URL> <SIZE>` arguments.
    pub fn parse(version: &str, url: &str, size: &str) -> Result<Self, SyncError> {
        let version = version.trim();
        if version.is_empty() {
            return Err(SyncError::Usage("version must not be empty".to_string()));
        }
        validate_http_url(url.trim())
            .map_err(|e| SyncError::Usage(format!("invalid asset URL '{url}': {e}")))?;
        let size = size.trim().parse::<u64>().map_err(|_| {
            SyncError::Usage(format!("size must be a non-negative byte count, got '{size}'"))
        })?;

        Ok(Self {
            version: version.to_string(),
            url: url.trim().to_string(),
            size,
        })
    }
}

pub struct App {
    config: Config,
    client: reqwest::Client,
    policy: FilterPolicy,
}

impl App {
    /// Builds an app with an HTTP client configured from `config`.
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.as_str());
        if config.request_timeout_secs > 0 {
            builder = builder.connect_timeout(Duration::from_secs(config.request_timeout_secs));
        }
        Ok(Self::with_client(config, builder.build()?))
    }

    pub fn with_client(config: Config, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            policy: FilterPolicy::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn release_source(&self) -> ReleaseSource {
        ReleaseSource::new(
            self.client.clone(),
            self.config.api_base_url.as_str(),
            self.config.repository.as_str(),
            self.config.request_timeout_secs,
        )
    }

    fn feed_path(&self) -> &Path {
        &self.config.feed_path
    }

    fn lock_unless(&self, dry_run: bool) -> Result<Option<FeedLock>, SyncError> {
        if dry_run {
            return Ok(None);
        }
        Ok(Some(FeedLock::acquire(self.feed_path())?))
    }

    /// Loads the current feed without modifying anything on disk.
    pub fn load(&self) -> Result<(FeedDocument, bool), SyncError> {
        Ok(FeedDocument::load_or_create(
            self.feed_path(),
            &self.config.feed_metadata(),
        )?)
    }

    fn finish(&self, doc: &FeedDocument, dry_run: bool) -> Result<String, SyncError> {
        if dry_run {
            return Ok(doc.to_xml_string()?);
        }
        let rendered = doc.save(self.feed_path())?;
        tracing::info!(path = %self.feed_path().display(), "Feed written");
        Ok(rendered)
    }

    /// Rebuilds the feed from every release of the configured repository.
    ///
    /// An empty release list aborts the run before the feed is touched.
    pub async fn sync(&self, dry_run: bool, now: DateTime<Utc>) -> Result<SyncOutcome, SyncError> {
        let _lock = self.lock_unless(dry_run)?;

        let source = self.release_source();
        tracing::info!(repository = %source.repository(), "Fetching releases");
        let releases = source.fetch().await;
        if releases.is_empty() {
            return Err(SyncError::NoReleases(self.config.repository.clone()));
        }
        tracing::info!(count = releases.len(), "Found releases");

        let (mut doc, created) = self.load()?;
        let report = merge::full_resync(&mut doc, &releases, &self.policy, now);
        if report.added.is_empty() {
            tracing::warn!(
                fetched = releases.len(),
                "No eligible releases; feed will have no entries"
            );
        }

        let rendered = self.finish(&doc, dry_run)?;
        Ok(SyncOutcome {
            fetched: releases.len(),
            report,
            created,
            rendered,
            written: !dry_run,
        })
    }

    /// Replaces or inserts the entry for one hand-supplied release.
    pub fn upsert(
        &self,
        request: &UpsertRequest,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, SyncError> {
        let _lock = self.lock_unless(dry_run)?;

        let (mut doc, created) = self.load()?;
        let entry = manual_entry(&request.version, &request.url, request.size, now);
        let report = merge::upsert(&mut doc, entry);

        let rendered = self.finish(&doc, dry_run)?;
        Ok(UpsertOutcome {
            version: request.version.clone(),
            report,
            created,
            rendered,
            written: !dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_request_parse() {
        let req = UpsertRequest::parse(" 1.2.0 ", "https://host/a.exe", "1024").unwrap();
        assert_eq!(
            req,
            UpsertRequest {
                version: "1.2.0".to_string(),
                url: "https://host/a.exe".to_string(),
                size: 1024,
            }
        );
    }

    #[test]
    fn test_upsert_request_rejects_bad_arguments() {
        let cases = [
            ("", "https://host/a.exe", "1"),
            ("1.0", "a.exe", "1"),
            ("1.0", "https://host/a.exe", "12MB"),
            ("1.0", "https://host/a.exe", "-5"),
        ];
        for (version, url, size) in cases {
            let err = UpsertRequest::parse(version, url, size).unwrap_err();
            assert!(matches!(err, SyncError::Usage(_)), "{version} {url} {size}");
            assert_eq!(err.exit_code(), EXIT_USAGE);
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SyncError::NoReleases("o/r".into()).exit_code(), EXIT_FAILURE);
        assert_eq!(
            SyncError::Feed(FeedError::MissingChannel("appcast.xml".into())).exit_code(),
            EXIT_FAILURE
        );
        assert_eq!(
            SyncError::Lock(LockError::Busy("appcast.xml".into())).exit_code(),
            EXIT_FAILURE
        );
    }
}
