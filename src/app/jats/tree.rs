//! Generic tagged tree over XML documents
//!
//! Documents are parsed into owned [`Element`]s with attribute lists and
//! ordered children. Names are kept verbatim, namespace prefix included.
//! Queries are depth-first searches parameterised by a predicate, so callers
//! express "first `article-id` whose `pub-id-type` is `doi`" without writing
//! their own traversal.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::{MetadataError, MetadataResult};

/// A node of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
}

/// An element with its attributes and children in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Name without its namespace prefix
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Value of the first attribute called `name`
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether attribute `name` equals `value`
    pub fn has_attr(&self, name: &str, value: &str) -> bool {
        self.attr(name) == Some(value)
    }

    /// Direct child elements
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child element called `name`
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|element| element.name == name)
    }

    /// Concatenated text of all descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(text) => out.push_str(text),
                XmlNode::Element(element) => element.collect_text(out),
            }
        }
    }

    /// First descendant (or self) matching `predicate`, depth-first preorder
    pub fn find<P>(&self, predicate: P) -> Option<&Element>
    where
        P: Fn(&Element) -> bool,
    {
        self.find_with(&predicate)
    }

    fn find_with(&self, predicate: &dyn Fn(&Element) -> bool) -> Option<&Element> {
        if predicate(self) {
            return Some(self);
        }
        self.elements().find_map(|child| child.find_with(predicate))
    }

    /// Every descendant (or self) matching `predicate`, depth-first preorder
    pub fn find_all<P>(&self, predicate: P) -> Vec<&Element>
    where
        P: Fn(&Element) -> bool,
    {
        let mut found = Vec::new();
        self.collect_matching(&predicate, &mut found);
        found
    }

    fn collect_matching<'a>(
        &'a self,
        predicate: &dyn Fn(&Element) -> bool,
        found: &mut Vec<&'a Element>,
    ) {
        if predicate(self) {
            found.push(self);
        }
        for child in self.elements() {
            child.collect_matching(predicate, found);
        }
    }

    /// First descendant (or self) called `name`
    pub fn find_named(&self, name: &str) -> Option<&Element> {
        self.find(|element| element.name == name)
    }
}

/// Name of the synthetic node holding the top-level content of a document
pub const DOCUMENT_NODE: &str = "#document";

/// Parse `xml` into a tree rooted at a synthetic [`DOCUMENT_NODE`]
///
/// Mismatched end tags are tolerated: an end tag closes the innermost open
/// element whatever its name, and elements still open at the end of input
/// are closed implicitly.
pub fn parse(xml: &str) -> MetadataResult<Element> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    reader.check_end_names(false);
    reader.expand_empty_elements(false);

    let mut stack = vec![Element::new(DOCUMENT_NODE)];

    loop {
        let event = reader.read_event().map_err(|e| MetadataError::MalformedXml {
            position: reader.buffer_position(),
            reason: e.to_string(),
        })?;

        match event {
            Event::Start(start) => stack.push(open_element(&start, &reader)?),
            Event::Empty(start) => {
                let element = open_element(&start, &reader)?;
                push_child(&mut stack, XmlNode::Element(element));
            }
            Event::End(_) => close_innermost(&mut stack),
            Event::Text(text) => {
                let value = text.unescape().map_err(|e| MetadataError::MalformedXml {
                    position: reader.buffer_position(),
                    reason: e.to_string(),
                })?;
                if !value.is_empty() {
                    push_child(&mut stack, XmlNode::Text(value.into_owned()));
                }
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                push_child(&mut stack, XmlNode::Text(value));
            }
            Event::Eof => break,
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    while stack.len() > 1 {
        close_innermost(&mut stack);
    }
    stack.pop().ok_or(MetadataError::MalformedXml {
        position: xml.len(),
        reason: "empty document".to_string(),
    })
}

fn open_element(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> MetadataResult<Element> {
    let malformed = |reason: String| MetadataError::MalformedXml {
        position: reader.buffer_position(),
        reason,
    };

    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes().with_checks(false) {
        let attribute = attribute.map_err(|e| malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| malformed(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn push_child(stack: &mut [Element], node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn close_innermost(stack: &mut Vec<Element>) {
    // The document node is never closed by a stray end tag
    if stack.len() > 1 {
        if let Some(element) = stack.pop() {
            push_child(stack, XmlNode::Element(element));
        }
    }
}
