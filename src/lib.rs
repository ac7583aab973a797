//! Keeps a Sparkle appcast in sync with a repository's GitHub releases.
//!
//! - [`release`] - fetch and filter release records
//! - [`feed`] - the appcast document model and its XML form
//! - [`merge`] - full resync and single-version upsert
//! - [`app`] - lock, load, merge and save as one run

pub mod app;
pub mod config;
pub mod feed;
pub mod merge;
pub mod release;
pub mod util;
