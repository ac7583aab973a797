//! Minimal owned XML element tree used to round-trip appcast documents.
//!
//! Parsing and writing both go through `quick-xml`. Comments, processing
//! instructions and the DOCTYPE are dropped on load; everything else
//! (elements, attributes in source order, text, CDATA) survives a
//! parse/write cycle.

use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use thiserror::Error;

/// SEC-003: Maximum allowed element nesting depth.
/// Appcasts are four levels deep; anything near this limit is hostile input.
const MAX_XML_DEPTH: usize = 64;

/// Errors raised while reading or writing an XML tree.
#[derive(Debug, Error)]
pub enum XmlError {
    /// The input is not well-formed XML.
    #[error("XML parse error at byte {position}: {message}")]
    Parse { position: u64, message: String },

    /// SEC-003: Nesting depth exceeds safety limit.
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// The document has no root element.
    #[error("XML document has no root element")]
    NoRoot,

    /// The document ended before every element was closed.
    #[error("XML document ended with unclosed element <{0}>")]
    Unclosed(String),

    /// Serialization failed.
    #[error("Failed to write XML: {0}")]
    Write(String),
}

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
}

/// An XML element with attributes kept in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style single text child. Empty text adds nothing.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.children.push(Node::Text(text));
        }
        self
    }

    /// Builder-style single CDATA child. Empty data adds nothing.
    pub fn with_cdata(mut self, data: impl Into<String>) -> Self {
        let data = data.into();
        if !data.is_empty() {
            self.children.push(Node::CData(data));
        }
        self
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Sets an attribute, replacing an existing one with the same key in place.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over child elements, skipping text nodes.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Concatenated text and CDATA content of this element's direct children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(t) | Node::CData(t) => out.push_str(t),
                Node::Element(_) => {}
            }
        }
        out
    }

    /// Text of the first child element named `name`, if present.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(Element::text)
    }
}

/// Parses an XML document into its root element.
///
/// # Security
///
/// SEC-002: `quick-xml` (0.37) never expands `<!ENTITY>` declarations; only the
/// five predefined entities are resolved, so custom entity references surface
/// as parse errors instead of leaking external content.
pub fn parse_document(content: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position();
        let parse_err = |message: String| XmlError::Parse {
            position: position as u64,
            message,
        };

        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_XML_DEPTH {
                    return Err(XmlError::MaxDepthExceeded(MAX_XML_DEPTH));
                }
                stack.push(element_from_start(&e, &reader).map_err(parse_err)?);
            }
            Ok(Event::Empty(e)) => {
                let element = element_from_start(&e, &reader).map_err(parse_err)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                // End names are checked against the open tag by quick-xml itself.
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| parse_err(e.to_string()))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text.into_owned()));
                }
            }
            Ok(Event::CData(e)) => {
                let data = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|e| parse_err(e.to_string()))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::CData(data.into_owned()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_err(e.to_string())),
            // Declarations, comments, PIs and DOCTYPE are not retained.
            Ok(_) => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Unclosed(open.name));
    }
    root.ok_or(XmlError::NoRoot)
}

fn element_from_start(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Element, String> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|err| err.to_string())?
        .to_string();
    let mut element = Element::new(name);

    for attr_result in e.attributes() {
        let attr = attr_result.map_err(|err| err.to_string())?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| err.to_string())?
            .to_string();
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| err.to_string())?
            .into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.push_child(element),
        // A second top-level element is ignored; the first root wins.
        None if root.is_none() => *root = Some(element),
        None => {
            tracing::warn!(element = %element.name, "Ignoring extra top-level XML element");
        }
    }
}

/// Serializes an element tree with two-space indentation.
///
/// No XML declaration is emitted; callers prepend their own.
pub fn write_element_tree(root: &Element) -> Result<String, XmlError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    write_element(&mut writer, root)?;
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| XmlError::Write(e.to_string()))
}

fn write_element(writer: &mut Writer<Cursor<Vec<u8>>>, element: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    for node in &element.children {
        match node {
            Node::Element(child) => write_element(writer, child)?,
            Node::Text(text) => emit(writer, Event::Text(BytesText::new(text)))?,
            // `]]>` cannot appear inside one section; split it across two.
            Node::CData(data) => {
                for section in BytesCData::escaped(data.as_str()) {
                    emit(writer, Event::CData(section))?;
                }
            }
        }
    }
    emit(writer, Event::End(BytesEnd::new(element.name.as_str())))
}

fn emit(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), XmlError> {
    writer
        .write_event(event)
        .map_err(|e| XmlError::Write(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_elements_and_attributes() {
        let content = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:sparkle="http://example.com/ns">
  <channel>
    <title>Updates &amp; more</title>
    <item><enclosure url="https://a/b.exe?x=1&amp;y=2" sparkle:version="1.0"/></item>
  </channel>
</rss>"#;

        let root = parse_document(content).unwrap();
        assert_eq!(root.name, "rss");
        assert_eq!(root.attr("version"), Some("2.0"));
        assert_eq!(root.attr("xmlns:sparkle"), Some("http://example.com/ns"));

        let channel = root.child("channel").unwrap();
        assert_eq!(channel.child_text("title").as_deref(), Some("Updates & more"));

        let enclosure = channel.child("item").unwrap().child("enclosure").unwrap();
        assert_eq!(enclosure.attr("url"), Some("https://a/b.exe?x=1&y=2"));
        assert_eq!(enclosure.attr("sparkle:version"), Some("1.0"));
    }

    #[test]
    fn test_cdata_is_kept_verbatim() {
        let content = "<d><![CDATA[<h2>Hi</h2><p>a & b</p>]]></d>";
        let root = parse_document(content).unwrap();
        assert_eq!(root.children, vec![Node::CData("<h2>Hi</h2><p>a & b</p>".into())]);
    }

    #[test]
    fn test_cdata_terminator_is_split_across_sections() {
        let root = Element::new("d").with_cdata("see a]]>b");
        let written = write_element_tree(&root).unwrap();
        assert_eq!(written, "<d><![CDATA[see a]]]]><![CDATA[>b]]></d>");

        let reparsed = parse_document(&written).unwrap();
        assert_eq!(reparsed.text(), "see a]]>b");
        let rewritten = Element::new("d").with_cdata(reparsed.text());
        assert_eq!(write_element_tree(&rewritten).unwrap(), written);
    }

    #[test]
    fn test_empty_text_writes_empty_element() {
        let root = Element::new("d").with_text("").with_cdata("");
        assert!(root.children.is_empty());
        assert_eq!(write_element_tree(&root).unwrap(), "<d/>");
    }

    #[test]
    fn test_malformed_xml_error() {
        assert!(matches!(
            parse_document("<rss><channel></rss>"),
            Err(XmlError::Parse { .. })
        ));
    }

    #[test]
    fn test_unclosed_document_error() {
        assert!(matches!(
            parse_document("<rss><channel>"),
            Err(XmlError::Unclosed(_))
        ));
    }

    #[test]
    fn test_empty_document_has_no_root() {
        assert!(matches!(
            parse_document("<?xml version=\"1.0\"?>"),
            Err(XmlError::NoRoot)
        ));
    }

    #[test]
    fn test_deeply_nested_document_rejected() {
        let mut doc = String::new();
        for _ in 0..100 {
            doc.push_str("<a>");
        }
        for _ in 0..100 {
            doc.push_str("</a>");
        }
        assert!(matches!(
            parse_document(&doc),
            Err(XmlError::MaxDepthExceeded(MAX_XML_DEPTH))
        ));
    }

    #[test]
    fn test_custom_entity_not_expanded() {
        // SEC-002: Entities declared in the DOCTYPE must never be substituted.
        let content = r#"<?xml version="1.0"?>
<!DOCTYPE rss [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<rss><channel><title>&xxe;</title></channel></rss>"#;

        match parse_document(content) {
            Ok(root) => {
                let title = root.child("channel").and_then(|c| c.child_text("title"));
                assert!(!title.unwrap_or_default().contains("root:"));
            }
            Err(_) => {
                // Rejection is the expected behavior
            }
        }
    }

    #[test]
    fn test_write_indents_two_spaces() {
        let mut root = Element::new("rss").with_attr("version", "2.0");
        let mut channel = Element::new("channel");
        channel.push_child(Element::new("title").with_text("T & U"));
        channel.push_child(Element::new("enclosure").with_attr("url", "https://x/y?a=1&b=2"));
        root.push_child(channel);

        let written = write_element_tree(&root).unwrap();
        assert_eq!(
            written,
            "<rss version=\"2.0\">\n  <channel>\n    <title>T &amp; U</title>\n    \
             <enclosure url=\"https://x/y?a=1&amp;b=2\"/>\n  </channel>\n</rss>"
        );
    }

    #[test]
    fn test_write_then_parse_preserves_tree() {
        let mut root = Element::new("rss");
        let mut item = Element::new("item");
        item.push_child(Element::new("description").with_cdata("<p>x</p>"));
        item.push_child(
            Element::new("enclosure")
                .with_attr("url", "https://host/a.exe")
                .with_attr("sparkle:os", "windows"),
        );
        root.push_child(item);

        let reparsed = parse_document(&write_element_tree(&root).unwrap()).unwrap();
        assert_eq!(reparsed, root);
    }

    #[test]
    fn test_set_attr_replaces_in_place() {
        let mut e = Element::new("e").with_attr("a", "1").with_attr("b", "2");
        e.set_attr("a", "3");
        assert_eq!(
            e.attributes,
            vec![("a".to_string(), "3".to_string()), ("b".to_string(), "2".to_string())]
        );
    }
}
