use thiserror::Error;

use super::{ReleaseAsset, ReleaseRecord};

/// File-name suffix of the installer asset published for each release.
pub const INSTALLER_SUFFIX: &str = ".exe";

/// Why a release did not become a feed entry.
///
/// Skips are expected steady state (in-progress releases, other platforms),
/// so these are reported as warnings rather than errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("draft release")]
    Draft,
    #[error("prerelease")]
    Prerelease,
    #[error("tag does not yield a version")]
    EmptyVersion,
    #[error("no {0} asset")]
    MissingAsset(String),
    #[error("version {0} already added by another release")]
    DuplicateVersion(String),
}

/// A release that passed [`FilterPolicy::evaluate`], with the asset to announce.
#[derive(Debug, Clone, Copy)]
pub struct EligibleRelease<'a> {
    pub record: &'a ReleaseRecord,
    pub asset: &'a ReleaseAsset,
}

impl EligibleRelease<'_> {
    pub fn version(&self) -> &str {
        self.record.version()
    }
}

/// Eligibility rules for feed inclusion.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    asset_suffix: String,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self::new(INSTALLER_SUFFIX)
    }
}

impl FilterPolicy {
    pub fn new(asset_suffix: impl Into<String>) -> Self {
        Self {
            asset_suffix: asset_suffix.into(),
        }
    }

    /// Accepts published, non-prerelease releases with a non-empty version
    /// and at least one installer asset. The first matching asset wins.
    pub fn evaluate<'a>(&self, record: &'a ReleaseRecord) -> Result<EligibleRelease<'a>, SkipReason> {
        if record.draft {
            return Err(SkipReason::Draft);
        }
        if record.prerelease {
            return Err(SkipReason::Prerelease);
        }
        if record.version().is_empty() {
            return Err(SkipReason::EmptyVersion);
        }

        record
            .assets
            .iter()
            .find(|a| a.name.ends_with(&self.asset_suffix))
            .map(|asset| EligibleRelease { record, asset })
            .ok_or_else(|| SkipReason::MissingAsset(self.asset_suffix.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            browser_download_url: format!("https://host/{name}"),
            size: 10,
        }
    }

    fn release(tag: &str, assets: Vec<ReleaseAsset>) -> ReleaseRecord {
        ReleaseRecord {
            tag_name: tag.to_string(),
            draft: false,
            prerelease: false,
            published_at: None,
            body: None,
            assets,
        }
    }

    #[test]
    fn test_published_release_with_installer_is_eligible() {
        let r = release("v2.0.0", vec![asset("notes.txt"), asset("Setup-2.0.0.exe")]);
        let eligible = FilterPolicy::default().evaluate(&r).unwrap();
        assert_eq!(eligible.version(), "2.0.0");
        assert_eq!(eligible.asset.name, "Setup-2.0.0.exe");
    }

    #[test]
    fn test_first_matching_asset_is_chosen() {
        let r = release("v1", vec![asset("a.exe"), asset("b.exe")]);
        let eligible = FilterPolicy::default().evaluate(&r).unwrap();
        assert_eq!(eligible.asset.name, "a.exe");
    }

    #[test]
    fn test_draft_and_prerelease_skipped() {
        let policy = FilterPolicy::default();

        let mut draft = release("v1.0.0", vec![asset("a.exe")]);
        draft.draft = true;
        assert_eq!(policy.evaluate(&draft).unwrap_err(), SkipReason::Draft);

        let mut pre = release("v1.0.0-beta", vec![asset("a.exe")]);
        pre.prerelease = true;
        assert_eq!(policy.evaluate(&pre).unwrap_err(), SkipReason::Prerelease);
    }

    #[test]
    fn test_missing_installer_asset_skipped() {
        let policy = FilterPolicy::default();
        let none = release("v1.0.0", vec![]);
        assert_eq!(
            policy.evaluate(&none).unwrap_err(),
            SkipReason::MissingAsset(".exe".to_string())
        );

        let other = release("v1.0.0", vec![asset("app.dmg"), asset("app.exe.sig")]);
        assert!(policy.evaluate(&other).is_err());
    }

    #[test]
    fn test_empty_version_skipped() {
        let r = release("v", vec![asset("a.exe")]);
        assert_eq!(
            FilterPolicy::default().evaluate(&r).unwrap_err(),
            SkipReason::EmptyVersion
        );
    }

    #[test]
    fn test_custom_suffix() {
        let r = release("v1", vec![asset("a.exe"), asset("a.msi")]);
        let eligible = FilterPolicy::new(".msi").evaluate(&r).unwrap();
        assert_eq!(eligible.asset.name, "a.msi");
    }
}
