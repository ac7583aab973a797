use std::path::Path;
use thiserror::Error;

use super::xml::{self, Element, XmlError};
use super::{DEFAULT_OS, ENCLOSURE_MIME_TYPE, SPARKLE_NS};
use crate::util::atomic_write;

/// XML declaration written verbatim ahead of every serialized feed.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

const DEFAULT_PREFIX: &str = "sparkle";

/// Errors that can occur while loading or saving a feed document.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The persisted feed exists but has no `<channel>` element.
    #[error("Channel not found in {0}")]
    MissingChannel(String),

    /// The persisted feed is not well-formed XML.
    #[error("Malformed feed {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: XmlError,
    },

    /// Serializing the document failed.
    #[error(transparent)]
    Xml(#[from] XmlError),

    /// File I/O error.
    #[error("Failed to access feed file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FeedError {
    /// True for the "existing feed is unusable" family, which callers
    /// report as malformed persisted state.
    pub fn is_malformed(&self) -> bool {
        matches!(self, FeedError::MissingChannel(_) | FeedError::Malformed { .. })
    }
}

/// Channel-level metadata used when a feed has to be created from scratch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMetadata {
    pub title: String,
    pub link: String,
    pub description: String,
}

/// The downloadable artifact announced by a [`FeedEntry`].
///
/// Every attribute is optional so that a hand-written enclosure is written
/// back with exactly the attributes it was read with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enclosure {
    pub url: Option<String>,
    /// The Sparkle `version` attribute; upsert matches entries on this alone.
    pub version: Option<String>,
    pub os: Option<String>,
    pub length: Option<u64>,
    pub mime_type: Option<String>,
    /// Attributes we do not model (e.g. `sparkle:edSignature`), in source order.
    /// A non-numeric `length` is kept here verbatim.
    pub extra_attributes: Vec<(String, String)>,
}

impl Enclosure {
    /// Enclosure for a generated entry: Windows installer, binary MIME type.
    pub fn new(url: impl Into<String>, version: impl Into<String>, length: u64) -> Self {
        Self {
            url: Some(url.into()),
            version: Some(version.into()),
            os: Some(DEFAULT_OS.to_string()),
            length: Some(length),
            mime_type: Some(ENCLOSURE_MIME_TYPE.to_string()),
            extra_attributes: Vec::new(),
        }
    }
}

/// One update announcement, serialized as an `<item>`.
///
/// Fields that are `None` were absent from the source item and are not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// The enclosure's Sparkle version, or the `X` of a `Version X` title.
    pub version: String,
    pub title: Option<String>,
    /// RFC-822 style, already formatted.
    pub pub_date: Option<String>,
    /// HTML body, written inside a CDATA section.
    pub description: Option<String>,
    pub enclosure: Option<Enclosure>,
    /// Item children we do not model, kept in source order.
    pub extensions: Vec<Element>,
}

impl FeedEntry {
    /// The Sparkle version attribute on this entry's enclosure, if it has one.
    pub fn enclosure_version(&self) -> Option<&str> {
        self.enclosure.as_ref().and_then(|e| e.version.as_deref())
    }
}

/// In-memory model of the persisted appcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub entries: Vec<FeedEntry>,
    root_name: String,
    root_attributes: Vec<(String, String)>,
    ns_prefix: String,
    channel_extensions: Vec<Element>,
}

impl FeedDocument {
    /// Builds an empty feed with the given channel metadata.
    pub fn new(metadata: &FeedMetadata) -> Self {
        Self {
            title: metadata.title.clone(),
            link: metadata.link.clone(),
            description: metadata.description.clone(),
            entries: Vec::new(),
            root_name: "rss".to_string(),
            root_attributes: vec![
                ("version".to_string(), "2.0".to_string()),
                (format!("xmlns:{DEFAULT_PREFIX}"), SPARKLE_NS.to_string()),
            ],
            ns_prefix: DEFAULT_PREFIX.to_string(),
            channel_extensions: Vec::new(),
        }
    }

    /// Loads the feed at `path`, or builds a fresh one if the file does not exist.
    ///
    /// Returns the document and whether it was newly created. An existing file
    /// that cannot be parsed or lacks a channel is an error; it is never
    /// silently replaced.
    pub fn load_or_create(path: &Path, metadata: &FeedMetadata) -> Result<(Self, bool), FeedError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Created new feed document");
                return Ok((Self::new(metadata), true));
            }
            Err(source) => {
                return Err(FeedError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let doc = Self::parse(&content).map_err(|e| match e {
            FeedError::MissingChannel(_) => FeedError::MissingChannel(path.display().to_string()),
            FeedError::Xml(source) => FeedError::Malformed {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;

        tracing::debug!(
            path = %path.display(),
            entries = doc.entries.len(),
            "Loaded feed document"
        );
        Ok((doc, false))
    }

    /// Parses a serialized feed.
    pub fn parse(content: &str) -> Result<Self, FeedError> {
        let root = xml::parse_document(content)?;
        if root.name != "rss" {
            tracing::warn!(root = %root.name, "Feed root element is not <rss>");
        }

        let channel = root
            .child("channel")
            .ok_or_else(|| FeedError::MissingChannel("<document>".to_string()))?;

        let ns_prefix = root
            .attributes
            .iter()
            .find_map(|(k, v)| {
                k.strip_prefix("xmlns:")
                    .filter(|_| v == SPARKLE_NS)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string());

        let mut root_attributes = root.attributes.clone();
        let declaration = format!("xmlns:{ns_prefix}");
        if !root_attributes.iter().any(|(k, _)| *k == declaration) {
            root_attributes.push((declaration, SPARKLE_NS.to_string()));
        }

        let mut doc = Self {
            title: String::new(),
            link: String::new(),
            description: String::new(),
            entries: Vec::new(),
            root_name: root.name.clone(),
            root_attributes,
            ns_prefix,
            channel_extensions: Vec::new(),
        };

        for child in channel.elements() {
            match child.name.as_str() {
                "title" => doc.title = child.text(),
                "link" => doc.link = child.text(),
                "description" => doc.description = child.text(),
                "item" => {
                    let entry = doc.entry_from_item(child);
                    doc.entries.push(entry);
                }
                _ => doc.channel_extensions.push(child.clone()),
            }
        }

        Ok(doc)
    }

    /// Prefix bound to the Sparkle namespace in this document.
    pub fn namespace_prefix(&self) -> &str {
        &self.ns_prefix
    }

    fn sparkle_attr(&self, local: &str) -> String {
        format!("{}:{}", self.ns_prefix, local)
    }

    fn entry_from_item(&self, item: &Element) -> FeedEntry {
        let version_key = self.sparkle_attr("version");
        let os_key = self.sparkle_attr("os");

        let enclosure = item.child("enclosure").map(|e| {
            let mut enc = Enclosure::default();
            for (key, value) in &e.attributes {
                match key.as_str() {
                    "url" => enc.url = Some(value.clone()),
                    "length" => match value.trim().parse() {
                        Ok(length) => enc.length = Some(length),
                        Err(_) => {
                            tracing::warn!(length = %value, "Non-numeric enclosure length, keeping it as is");
                            enc.extra_attributes.push((key.clone(), value.clone()));
                        }
                    },
                    "type" => enc.mime_type = Some(value.clone()),
                    k if k == version_key => enc.version = Some(value.clone()),
                    k if k == os_key => enc.os = Some(value.clone()),
                    _ => enc.extra_attributes.push((key.clone(), value.clone())),
                }
            }
            enc
        });

        let title = item.child_text("title");
        let version = enclosure
            .as_ref()
            .and_then(|e| e.version.clone())
            .or_else(|| {
                title
                    .as_deref()
                    .and_then(|t| t.strip_prefix("Version "))
                    .map(str::to_string)
            })
            .unwrap_or_default();

        let extensions = item
            .elements()
            .filter(|c| !matches!(c.name.as_str(), "title" | "pubDate" | "description" | "enclosure"))
            .cloned()
            .collect();

        FeedEntry {
            version,
            title,
            pub_date: item.child_text("pubDate"),
            description: item
                .child_text("description")
                .map(|d| unwrap_legacy_cdata(&d)),
            enclosure,
            extensions,
        }
    }

    fn item_element(&self, entry: &FeedEntry) -> Element {
        let mut item = Element::new("item");
        if let Some(title) = &entry.title {
            item.push_child(Element::new("title").with_text(title.as_str()));
        }
        if let Some(pub_date) = &entry.pub_date {
            item.push_child(Element::new("pubDate").with_text(pub_date.as_str()));
        }
        if let Some(description) = &entry.description {
            item.push_child(Element::new("description").with_cdata(description.as_str()));
        }

        if let Some(enc) = &entry.enclosure {
            let modeled = [
                ("url".to_string(), enc.url.clone()),
                (self.sparkle_attr("version"), enc.version.clone()),
                (self.sparkle_attr("os"), enc.os.clone()),
                ("length".to_string(), enc.length.map(|l| l.to_string())),
                ("type".to_string(), enc.mime_type.clone()),
            ];
            let mut e = Element::new("enclosure");
            for (key, value) in modeled {
                if let Some(value) = value {
                    e.set_attr(key, value);
                }
            }
            for (key, value) in &enc.extra_attributes {
                e.set_attr(key.as_str(), value.as_str());
            }
            item.push_child(e);
        }

        for ext in &entry.extensions {
            item.push_child(ext.clone());
        }
        item
    }

    /// Builds the full XML tree for this document.
    pub fn to_element(&self) -> Element {
        let mut channel = Element::new("channel");
        channel.push_child(Element::new("title").with_text(self.title.as_str()));
        channel.push_child(Element::new("link").with_text(self.link.as_str()));
        channel.push_child(Element::new("description").with_text(self.description.as_str()));
        for ext in &self.channel_extensions {
            channel.push_child(ext.clone());
        }
        for entry in &self.entries {
            channel.push_child(self.item_element(entry));
        }

        let mut root = Element::new(self.root_name.as_str());
        root.attributes = self.root_attributes.clone();
        root.push_child(channel);
        root
    }

    /// Serializes the document: declaration line, then the indented tree.
    pub fn to_xml_string(&self) -> Result<String, FeedError> {
        let body = xml::write_element_tree(&self.to_element())?;
        let mut out = String::with_capacity(XML_DECLARATION.len() + body.len() + 1);
        out.push_str(XML_DECLARATION);
        out.push_str(&body);
        out.push('\n');
        Ok(out)
    }

    /// Rewrites the feed file in full, atomically, returning what was written.
    pub fn save(&self, path: &Path) -> Result<String, FeedError> {
        let content = self.to_xml_string()?;
        atomic_write(path, content.as_bytes()).map_err(|source| FeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(content)
    }
}

/// Older feeds stored the CDATA marker as escaped text; strip that wrapper so
/// it is re-emitted as a real CDATA section.
fn unwrap_legacy_cdata(text: &str) -> String {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
        .unwrap_or(trimmed)
        .to_string()
}
