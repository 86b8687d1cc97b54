//! Minimal owned XML element tree.
//!
//! NCBI records mix text and inline markup (`<i>`, `<sup>`, `<sub>`) inside
//! titles and abstracts, which serde-based mapping drops. This module keeps the
//! full element tree so text can be collected the way a reader sees it.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::sources::SourceError;

/// A node inside an element
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An XML element with its attributes and children in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Local name, namespace prefix stripped
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, SourceError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| SourceError::Parse(format!("Invalid attribute: {}", e)))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    /// Value of an attribute
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Direct child elements
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// Direct children with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.name == name)
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    /// Follow a `/`-separated path of child names, taking the first match at each step
    pub fn find(&self, path: &str) -> Option<&XmlElement> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |el, step| el.child(step))
    }

    /// All elements matching `path`, where only the last step fans out
    pub fn find_all<'a>(&'a self, path: &'a str) -> Vec<&'a XmlElement> {
        match path.rsplit_once('/') {
            Some((parent, last)) => self
                .find(parent)
                .map(|p| p.children_named(last).collect())
                .unwrap_or_default(),
            None => self.children_named(path).collect(),
        }
    }

    /// All descendants (depth-first, document order) with the given name
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut out = Vec::new();
        self.collect_descendants(name, &mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        for child in self.elements() {
            if child.name == name {
                out.push(child);
            }
            child.collect_descendants(name, out);
        }
    }

    /// All text beneath this element, whitespace-collapsed
    pub fn text(&self) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw);
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Text of the element at `path`, or `None` when absent or blank
    pub fn text_at(&self, path: &str) -> Option<String> {
        self.find(path).map(|e| e.text()).filter(|t| !t.is_empty())
    }
}

/// Parse a document and return its root element
pub fn parse_document(xml: &str) -> Result<XmlElement, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SourceError::Parse(format!("XML error at {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(start) => stack.push(XmlElement::from_start(&start)?),
            Event::Empty(start) => {
                let element = XmlElement::from_start(&start)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| SourceError::Parse("Unbalanced closing tag".to_string()))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    let value = text
                        .unescape()
                        .map(|t| t.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                    parent.children.push(XmlNode::Text(value));
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    parent.children.push(XmlNode::Text(value));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SourceError::Parse("Unexpected end of document".to_string()));
    }
    root.ok_or_else(|| SourceError::Parse("Document has no root element".to_string()))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}
