//! Appcast feed model, mapping and (de)serialization.
//!
//! - [`xml`] - owned element tree on top of `quick-xml`
//! - [`document`] - the typed feed document, load-or-create and save
//! - [`mapper`] - release record to feed entry conversion

mod document;
mod mapper;
pub mod xml;

pub use document::{Enclosure, FeedDocument, FeedEntry, FeedError, FeedMetadata, XML_DECLARATION};
pub use mapper::{entry_from_release, format_pub_date, manual_entry, parse_published_at};

/// Sparkle appcast extension namespace.
pub const SPARKLE_NS: &str = "http://www.andymatuschak.org/xml-namespaces/sparkle";

/// Platform tag written to every enclosure.
pub const DEFAULT_OS: &str = "windows";

/// MIME type written to every enclosure.
pub const ENCLOSURE_MIME_TYPE: &str = "application/octet-stream";

/// Release body used when a release has none.
pub const DEFAULT_RELEASE_NOTES: &str = "Automatic update via GitHub Release.";
