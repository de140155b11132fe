//! Lossless XML element tree.
//!
//! Attribute values and text are stored in their raw (escaped) form exactly as
//! they appeared in the source, so untouched nodes serialise back unchanged.
//! Accessors unescape on read and setters escape on write.

use std::borrow::Cow;

use quick_xml::{
    Reader,
    escape::{escape, partial_escape, unescape},
    events::{BytesStart, Event},
};

use super::{XlsxError, XlsxResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    self_closing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    declaration: Option<String>,
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn parse(part: &str, xml: &str) -> XlsxResult<Self> {
        let (declaration, body) = split_declaration(xml);
        let mut reader = Reader::from_str(body);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(element_from_start(&e, false)?),
                Event::Empty(e) => {
                    let element = element_from_start(&e, true)?;
                    attach(&mut stack, &mut root, XmlNode::Element(element), part)?;
                }
                Event::End(_) => {
                    let Some(element) = stack.pop() else {
                        return Err(XlsxError::malformed(part, "unbalanced end tag"));
                    };
                    attach(&mut stack, &mut root, XmlNode::Element(element), part)?;
                }
                Event::Text(t) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Text(raw_utf8(part, &t.into_inner())?));
                    }
                }
                Event::CData(c) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::CData(raw_utf8(part, &c.into_inner())?));
                    }
                }
                Event::Comment(c) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Comment(raw_utf8(part, &c.into_inner())?));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XlsxError::malformed(part, "unterminated element"));
        }
        let root = root.ok_or_else(|| XlsxError::malformed(part, "document has no root element"))?;
        Ok(Self { declaration, root })
    }

    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        if let Some(decl) = &self.declaration {
            out.push_str(decl);
        }
        write_element(&mut out, &self.root);
        out
    }
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            self_closing: true,
        }
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Builds a qualified name for a sibling/child element in the same namespace prefix.
    pub fn prefixed(&self, local_name: &str) -> String {
        match self.name.split_once(':') {
            Some((prefix, _)) => format!("{prefix}:{local_name}"),
            None => local_name.to_string(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn attr(&self, key: &str) -> Option<Cow<'_, str>> {
        self.raw_attr(key)
            .map(|raw| unescape(raw).unwrap_or(Cow::Borrowed(raw)))
    }

    pub fn raw_attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        let escaped = escape(value).into_owned();
        if let Some(slot) = self.attrs.iter_mut().find(|(k, _)| k == key) {
            slot.1 = escaped;
        } else {
            self.attrs.push((key.to_string(), escaped));
        }
    }

    pub fn remove_attr(&mut self, key: &str) {
        self.attrs.retain(|(k, _)| k != key);
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn child(&self, local_name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.local_name() == local_name)
    }

    pub fn child_mut(&mut self, local_name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|el| el.local_name() == local_name)
    }

    pub fn child_position(&self, local_name: &str) -> Option<usize> {
        self.children.iter().position(
            |node| matches!(node, XmlNode::Element(el) if el.local_name() == local_name),
        )
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn children_named<'a>(
        &'a self,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |el| el.local_name() == local_name)
    }

    pub fn children_named_mut<'a>(
        &'a mut self,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a mut XmlElement> + 'a {
        self.elements_mut()
            .filter(move |el| el.local_name() == local_name)
    }

    pub fn push_child(&mut self, element: XmlElement) {
        self.self_closing = false;
        self.children.push(XmlNode::Element(element));
    }

    pub fn insert_child(&mut self, index: usize, element: XmlElement) {
        self.self_closing = false;
        let index = index.min(self.children.len());
        self.children.insert(index, XmlNode::Element(element));
    }

    /// Concatenated, unescaped text of the direct text/CDATA children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(raw) => out.push_str(&unescape(raw).unwrap_or(Cow::Borrowed(raw))),
                XmlNode::CData(raw) => out.push_str(raw),
                _ => {}
            }
        }
        out
    }

    /// Text of every descendant `t` element, skipping phonetic runs (`rPh`).
    pub fn rich_text(&self) -> String {
        let mut out = String::new();
        collect_rich_text(self, &mut out);
        out
    }

    pub fn set_text(&mut self, value: &str) {
        self.children = vec![XmlNode::Text(partial_escape(value).into_owned())];
        self.self_closing = false;
    }

    /// Depth-first visit of this element and all descendants.
    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut XmlElement)) {
        visit(self);
        for child in self.elements_mut() {
            child.walk_mut(visit);
        }
    }
}

fn collect_rich_text(element: &XmlElement, out: &mut String) {
    for child in element.elements() {
        match child.local_name() {
            "t" => out.push_str(&child.text()),
            "rPh" => {}
            _ => collect_rich_text(child, out),
        }
    }
}

fn split_declaration(xml: &str) -> (Option<String>, &str) {
    let trimmed = xml.trim_start_matches('\u{feff}');
    if trimmed.starts_with("<?xml")
        && let Some(end) = trimmed.find("?>")
    {
        let rest = &trimmed[end + 2..];
        let split = end + 2 + (rest.len() - rest.trim_start().len());
        return (Some(trimmed[..split].to_string()), &trimmed[split..]);
    }
    (None, trimmed)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    node: XmlNode,
    part: &str,
) -> XlsxResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    match node {
        XmlNode::Element(element) if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        XmlNode::Element(_) => Err(XlsxError::malformed(part, "multiple root elements")),
        _ => Ok(()),
    }
}

fn element_from_start(start: &BytesStart<'_>, self_closing: bool) -> XlsxResult<XmlElement> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|_| XlsxError::Utf8("element name".to_string()))?
        .to_string();
    let mut attrs = Vec::new();
    for attr in start.attributes().with_checks(false) {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|_| XlsxError::Utf8(format!("attribute of <{name}>")))?
            .to_string();
        let value = std::str::from_utf8(&attr.value)
            .map_err(|_| XlsxError::Utf8(format!("attribute '{key}' of <{name}>")))?
            .to_string();
        attrs.push((key, value));
    }
    Ok(XmlElement {
        name,
        attrs,
        children: Vec::new(),
        self_closing,
    })
}

fn raw_utf8(part: &str, bytes: &[u8]) -> XlsxResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| XlsxError::Utf8(part.to_string()))
}

fn write_element(out: &mut String, element: &XmlElement) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        if value.contains('"') {
            out.push_str(&value.replace('"', "&quot;"));
        } else {
            out.push_str(value);
        }
        out.push('"');
    }
    if element.children.is_empty() && element.self_closing {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for node in &element.children {
        match node {
            XmlNode::Element(child) => write_element(out, child),
            XmlNode::Text(raw) => out.push_str(raw),
            XmlNode::CData(raw) => {
                out.push_str("<![CDATA[");
                out.push_str(raw);
                out.push_str("]]>");
            }
            XmlNode::Comment(raw) => {
                out.push_str("<!--");
                out.push_str(raw);
                out.push_str("-->");
            }
        }
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}
