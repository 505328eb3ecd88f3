//! In-memory document used for headless replay and tests.
//!
//! Markup is read as XHTML (every element closed, attributes quoted). A
//! fragment without an `<html>` root is wrapped into `<html><head/><body>`.

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeSet;
use std::path::Path;

use super::event::{
    DomEvent, DomEventDetail, ElementSnapshot, EventKind, KeyEventData, NodeInfo,
};
use crate::error::SelectorError;
use crate::selector::{ParsedSelector, SelectorNode};

pub type NodeId = usize;

/// Tags whose `value` property is a string
const STRING_VALUE_TAGS: &[&str] = &[
    "input", "textarea", "select", "button", "option", "output", "data", "param",
];

/// Tags whose `value` property is numeric
const NUMERIC_VALUE_TAGS: &[&str] = &["li", "meter", "progress"];

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attributes: Vec<(String, String)>,
    value: Option<String>,
    outline: String,
}

#[derive(Debug, Clone)]
enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An event the page received through script rather than from a user
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    pub event_type: String,
    pub target: Option<NodeId>,
    pub key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    location: String,
    scroll: (f64, f64),
    listeners: BTreeSet<EventKind>,
    dispatched: Vec<DispatchedEvent>,
}

impl Document {
    /// Empty `<html><head/><body/></html>` document
    pub fn new(location: impl Into<String>) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: 0,
            body: 0,
            location: location.into(),
            scroll: (0.0, 0.0),
            listeners: BTreeSet::new(),
            dispatched: Vec::new(),
        };
        let root = doc.create_element("html");
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        doc.append_child(root, head);
        doc.append_child(root, body);
        doc.root = root;
        doc.body = body;
        doc
    }

    pub fn parse(markup: &str, location: impl Into<String>) -> Result<Self> {
        let mut doc = Self::new(location);
        let container = doc.create_element("#fragment");

        let mut reader = Reader::from_str(markup);
        reader.trim_text(true);

        let mut stack = vec![container];
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let node = doc.element_from_tag(e);
                    let parent = *stack.last().unwrap_or(&container);
                    doc.append_child(parent, node);
                    stack.push(node);
                }
                Ok(Event::Empty(ref e)) => {
                    let node = doc.element_from_tag(e);
                    let parent = *stack.last().unwrap_or(&container);
                    doc.append_child(parent, node);
                }
                Ok(Event::End(_)) => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                Ok(Event::Text(ref t)) => {
                    let text = t
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                    let parent = *stack.last().unwrap_or(&container);
                    doc.append_text(parent, &text);
                }
                Ok(Event::CData(ref t)) => {
                    let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                    let parent = *stack.last().unwrap_or(&container);
                    doc.append_text(parent, &text);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    anyhow::bail!(
                        "markup parse error at position {}: {}",
                        reader.buffer_position(),
                        e
                    );
                }
                _ => {}
            }
            buf.clear();
        }

        doc.adopt_fragment(container);
        Ok(doc)
    }

    pub fn from_file(path: &Path, location: impl Into<String>) -> Result<Self> {
        let markup = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read page {}", path.display()))?;
        Self::parse(&markup, location)
            .with_context(|| format!("Failed to parse page {}", path.display()))
    }

    fn element_from_tag(&mut self, start: &BytesStart) -> NodeId {
        let tag = String::from_utf8_lossy(start.name().as_ref()).to_lowercase();
        let node = self.create_element(&tag);
        for attr in start.attributes().filter_map(|a| a.ok()) {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            self.set_attribute(node, &key, &value);
        }
        node
    }

    /// Move parsed top-level nodes into place: a parsed `<html>` replaces the
    /// default skeleton, anything else lands in `<body>`.
    fn adopt_fragment(&mut self, container: NodeId) {
        let top = self.nodes[container].children.clone();
        let html = top
            .iter()
            .copied()
            .find(|n| self.tag_name(*n) == "html");

        match html {
            Some(html) => {
                self.detach(html);
                self.root = html;
                let body = self
                    .descendants(html)
                    .into_iter()
                    .find(|n| self.tag_name(*n) == "body");
                self.body = match body {
                    Some(body) => body,
                    None => {
                        let body = self.create_element("body");
                        self.append_child(html, body);
                        body
                    }
                };
            }
            None => {
                for child in top {
                    self.append_child(self.body, child);
                }
            }
        }
    }

    // ---- tree -------------------------------------------------------------

    pub fn document_element(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let tag = tag.to_lowercase();
        let value = if STRING_VALUE_TAGS.contains(&tag.as_str()) {
            Some(String::new())
        } else {
            None
        };
        self.nodes.push(Node {
            data: NodeData::Element(ElementData {
                tag,
                attributes: Vec::new(),
                value,
                outline: String::new(),
            }),
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        self.nodes.push(Node {
            data: NodeData::Text(text.to_string()),
            parent: None,
            children: Vec::new(),
        });
        let node = self.nodes.len() - 1;
        self.append_child(parent, node);

        if self.tag_name(parent) == "textarea" {
            let current = self.text_content(parent);
            if let NodeData::Element(el) = &mut self.nodes[parent].data {
                el.value = Some(current);
            }
        }
    }

    /// Append `child` to `parent`, detaching it from its old parent first
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Remove a node from the tree; it stays allocated but unreachable
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node].parent.take() {
            self.nodes[parent].children.retain(|c| *c != node);
        }
    }

    fn element_data(&self, node: NodeId) -> Option<&ElementData> {
        match self.nodes.get(node).map(|n| &n.data) {
            Some(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    fn element_data_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(node).map(|n| &mut n.data) {
            Some(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element_data(node).is_some()
    }

    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.nodes
            .get(node)
            .and_then(|n| n.parent)
            .filter(|p| self.is_element(*p) && self.tag_name(*p) != "#fragment")
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node]
            .children
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.element_children(node).into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.element_children(current).into_iter().rev());
        }
        out
    }

    /// Every element of the document in document order, root included
    pub fn elements(&self) -> Vec<NodeId> {
        let mut out = vec![self.root];
        out.extend(self.descendants(self.root));
        out
    }

    /// Whether the node is still attached under the document root
    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == self.root {
                return true;
            }
            current = self.nodes.get(n).and_then(|n| n.parent);
        }
        false
    }

    // ---- element properties ----------------------------------------------

    /// Lower-cased tag name, empty for text nodes
    pub fn tag_name(&self, node: NodeId) -> &str {
        self.element_data(node).map(|el| el.tag.as_str()).unwrap_or("")
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element_data(node).and_then(|el| {
            el.attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        })
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(el) = self.element_data_mut(node) else {
            return;
        };
        match el.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => el.attributes.push((name.to_string(), value.to_string())),
        }
        if name == "value" && el.tag == "input" {
            el.value = Some(value.to_string());
        }
    }

    pub fn element_id(&self, node: NodeId) -> &str {
        self.attribute(node, "id").unwrap_or("")
    }

    pub fn class_name(&self, node: NodeId) -> &str {
        self.attribute(node, "class").unwrap_or("")
    }

    pub fn text_content(&self, node: NodeId) -> String {
        match self.nodes.get(node).map(|n| &n.data) {
            Some(NodeData::Text(text)) => text.clone(),
            Some(NodeData::Element(_)) => self.nodes[node]
                .children
                .iter()
                .map(|c| self.text_content(*c))
                .collect(),
            None => String::new(),
        }
    }

    /// Current `value` property, `None` when the element has none
    pub fn value(&self, node: NodeId) -> Option<&str> {
        self.element_data(node).and_then(|el| el.value.as_deref())
    }

    pub fn has_value_property(&self, node: NodeId) -> bool {
        let tag = self.tag_name(node);
        STRING_VALUE_TAGS.contains(&tag) || NUMERIC_VALUE_TAGS.contains(&tag)
    }

    /// Set the `value` property. Returns false for elements without one.
    pub fn set_value(&mut self, node: NodeId, value: &str) -> bool {
        match self.element_data_mut(node) {
            Some(el) if el.value.is_some() => {
                el.value = Some(value.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn outline(&self, node: NodeId) -> &str {
        self.element_data(node).map(|el| el.outline.as_str()).unwrap_or("")
    }

    pub fn set_outline(&mut self, node: NodeId, outline: &str) {
        if let Some(el) = self.element_data_mut(node) {
            el.outline = outline.to_string();
        }
    }

    /// 1-based position among all element siblings (1 for a parentless node)
    pub fn element_index(&self, node: NodeId) -> usize {
        match self.parent_element(node) {
            Some(parent) => self
                .element_children(parent)
                .iter()
                .position(|c| *c == node)
                .map(|i| i + 1)
                .unwrap_or(1),
            None => 1,
        }
    }

    /// 1-based position among same-tag siblings and the number of them
    pub fn same_tag_position(&self, node: NodeId) -> (usize, usize) {
        let Some(parent) = self.parent_element(node) else {
            return (1, 0);
        };
        let tag = self.tag_name(node);
        let same: Vec<NodeId> = self
            .element_children(parent)
            .into_iter()
            .filter(|c| self.tag_name(*c) == tag)
            .collect();
        let index = same.iter().position(|c| *c == node).map(|i| i + 1).unwrap_or(1);
        (index, same.len())
    }

    pub fn element(&self, node: NodeId) -> ElementRef<'_> {
        ElementRef { doc: self, node }
    }

    // ---- lookup -----------------------------------------------------------

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|n| self.element_id(*n) == id)
    }

    /// First element matching `selector` in document order
    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, SelectorError> {
        let parsed = ParsedSelector::parse(selector)?;
        Ok(parsed.first_match(self))
    }

    // ---- window state -----------------------------------------------------

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    pub fn scroll_position(&self) -> (f64, f64) {
        self.scroll
    }

    pub fn scroll_to(&mut self, x: f64, y: f64) {
        self.scroll = (x.max(0.0), y.max(0.0));
    }

    // ---- listeners and dispatched events ---------------------------------

    pub fn add_listener(&mut self, kind: EventKind) {
        self.listeners.insert(kind);
    }

    pub fn remove_listener(&mut self, kind: EventKind) {
        self.listeners.remove(&kind);
    }

    pub fn listeners(&self) -> &BTreeSet<EventKind> {
        &self.listeners
    }

    pub fn record_dispatch(&mut self, event_type: &str, target: Option<NodeId>, key: Option<&str>) {
        self.dispatched.push(DispatchedEvent {
            event_type: event_type.to_string(),
            target,
            key: key.map(str::to_string),
        });
    }

    pub fn dispatched(&self) -> &[DispatchedEvent] {
        &self.dispatched
    }

    /// Number of script-dispatched events of a type, optionally per target
    pub fn count_dispatched(&self, event_type: &str, target: Option<NodeId>) -> usize {
        self.dispatched
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter(|e| target.is_none() || e.target == target)
            .count()
    }

    // ---- status banners ---------------------------------------------------

    /// Create or update a fixed banner `<div id=..>` attached to `<body>`
    pub fn upsert_banner(&mut self, id: &str, text: &str, background: &str) -> NodeId {
        let node = match self.get_element_by_id(id) {
            Some(node) => {
                let children = self.nodes[node].children.clone();
                for child in children {
                    self.detach(child);
                }
                node
            }
            None => {
                let node = self.create_element("div");
                self.set_attribute(node, "id", id);
                self.append_child(self.body, node);
                node
            }
        };
        self.set_attribute(
            node,
            "style",
            &format!("position: fixed; background: {}; color: white;", background),
        );
        self.append_text(node, text);
        node
    }

    /// Remove the element with this id. Returns whether one existed.
    pub fn remove_by_id(&mut self, id: &str) -> bool {
        match self.get_element_by_id(id) {
            Some(node) => {
                self.remove(node);
                true
            }
            None => false,
        }
    }

    // ---- raw event builders ----------------------------------------------

    /// Capture-time view of `node` and its ancestors up to `<body>`
    pub fn snapshot(&self, node: NodeId) -> ElementSnapshot {
        let mut path = Vec::new();
        let mut current = Some(node);
        while let Some(n) = current {
            let (same_tag_index, same_tag_count) = self.same_tag_position(n);
            let is_body = n == self.body;
            path.push(NodeInfo {
                tag_name: self.tag_name(n).to_uppercase(),
                id: self.element_id(n).to_string(),
                class_name: self.class_name(n).to_string(),
                same_tag_index,
                same_tag_count,
                is_body,
            });
            if is_body {
                break;
            }
            current = self.parent_element(n);
        }

        let value = self.value(node);
        ElementSnapshot {
            path,
            text_content: Some(self.text_content(node)),
            has_value: self.has_value_property(node),
            value_length: value.map(|v| v.chars().count()).unwrap_or(0),
        }
    }

    pub fn click_event(&self, node: NodeId, client_x: f64, client_y: f64, timestamp: u64) -> DomEvent {
        DomEvent::new(
            timestamp,
            self.location.clone(),
            DomEventDetail::Click {
                target: self.snapshot(node),
                client_x,
                client_y,
            },
        )
    }

    /// `input_type` is the `InputEvent.inputType` (`insertText`, ...)
    pub fn input_event(&self, node: NodeId, input_type: Option<&str>, timestamp: u64) -> DomEvent {
        DomEvent::new(
            timestamp,
            self.location.clone(),
            DomEventDetail::Input {
                target: self.snapshot(node),
                input_type: input_type.map(str::to_string),
            },
        )
    }

    pub fn key_down_event(&self, key: KeyEventData, timestamp: u64) -> DomEvent {
        DomEvent::new(timestamp, self.location.clone(), DomEventDetail::KeyDown(key))
    }

    pub fn key_up_event(&self, key: KeyEventData, timestamp: u64) -> DomEvent {
        DomEvent::new(timestamp, self.location.clone(), DomEventDetail::KeyUp(key))
    }

    /// Scroll event reporting the current scroll position
    pub fn scroll_event(&self, timestamp: u64) -> DomEvent {
        DomEvent::new(
            timestamp,
            self.location.clone(),
            DomEventDetail::Scroll {
                scroll_x: self.scroll.0,
                scroll_y: self.scroll.1,
            },
        )
    }

    pub fn mouse_move_event(&self, client_x: f64, client_y: f64, timestamp: u64) -> DomEvent {
        DomEvent::new(
            timestamp,
            self.location.clone(),
            DomEventDetail::MouseMove { client_x, client_y },
        )
    }
}

/// Borrowed element handle used for selector generation
#[derive(Debug, Clone, Copy)]
pub struct ElementRef<'a> {
    doc: &'a Document,
    node: NodeId,
}

impl ElementRef<'_> {
    pub fn id(&self) -> NodeId {
        self.node
    }
}

impl SelectorNode for ElementRef<'_> {
    fn tag_name(&self) -> &str {
        self.doc.tag_name(self.node)
    }

    fn element_id(&self) -> &str {
        self.doc.element_id(self.node)
    }

    fn class_name(&self) -> &str {
        self.doc.class_name(self.node)
    }

    fn parent(&self) -> Option<Self> {
        self.doc.parent_element(self.node).map(|node| ElementRef {
            doc: self.doc,
            node,
        })
    }

    fn is_body(&self) -> bool {
        self.node == self.doc.body
    }

    fn same_tag_position(&self) -> (usize, usize) {
        self.doc.same_tag_position(self.node)
    }
}
