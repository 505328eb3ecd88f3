//! Raw DOM events as delivered by a page, before normalization into actions

use serde::{Deserialize, Serialize};

use crate::selector::SelectorNode;

/// The DOM event types the capturer can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Click,
    KeyDown,
    KeyUp,
    Scroll,
    Input,
    MouseMove,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Click,
        EventKind::KeyDown,
        EventKind::KeyUp,
        EventKind::Scroll,
        EventKind::Input,
        EventKind::MouseMove,
    ];

    /// DOM event type name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::KeyDown => "keydown",
            EventKind::KeyUp => "keyup",
            EventKind::Scroll => "scroll",
            EventKind::Input => "input",
            EventKind::MouseMove => "mousemove",
        }
    }
}

/// A raw event observed on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomEvent {
    /// `Date.now()` on the page when the event fired
    pub timestamp: u64,
    /// `location.href` when the event fired
    pub url: String,
    #[serde(flatten)]
    pub detail: DomEventDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DomEventDetail {
    #[serde(rename_all = "camelCase")]
    Click {
        target: ElementSnapshot,
        client_x: f64,
        client_y: f64,
    },
    KeyDown(KeyEventData),
    KeyUp(KeyEventData),
    #[serde(rename_all = "camelCase")]
    Scroll { scroll_x: f64, scroll_y: f64 },
    #[serde(rename_all = "camelCase")]
    Input {
        target: ElementSnapshot,
        #[serde(default)]
        input_type: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    MouseMove { client_x: f64, client_y: f64 },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEventData {
    pub key: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub ctrl_key: bool,
    #[serde(default)]
    pub meta_key: bool,
    #[serde(default)]
    pub shift_key: bool,
    #[serde(default)]
    pub alt_key: bool,
}

impl DomEvent {
    pub fn kind(&self) -> EventKind {
        match self.detail {
            DomEventDetail::Click { .. } => EventKind::Click,
            DomEventDetail::KeyDown(_) => EventKind::KeyDown,
            DomEventDetail::KeyUp(_) => EventKind::KeyUp,
            DomEventDetail::Scroll { .. } => EventKind::Scroll,
            DomEventDetail::Input { .. } => EventKind::Input,
            DomEventDetail::MouseMove { .. } => EventKind::MouseMove,
        }
    }

    pub fn new(timestamp: u64, url: impl Into<String>, detail: DomEventDetail) -> Self {
        Self {
            timestamp,
            url: url.into(),
            detail,
        }
    }
}

/// One element on the path from an event target up to `<body>`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// `tagName` as reported by the DOM
    pub tag_name: String,
    #[serde(default)]
    pub id: String,
    /// `className` when it is a plain string, empty otherwise (SVG)
    #[serde(default)]
    pub class_name: String,
    /// 1-based position among parent's children with the same tag
    #[serde(default = "first_position")]
    pub same_tag_index: usize,
    /// Number of parent's children with the same tag (0 without a parent)
    #[serde(default)]
    pub same_tag_count: usize,
    #[serde(default)]
    pub is_body: bool,
}

fn first_position() -> usize {
    1
}

/// What the capturer needs to know about an event target.
///
/// `path` starts at the target and walks up through its ancestors, ending
/// with `<body>` when the target lives inside it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub path: Vec<NodeInfo>,
    #[serde(default)]
    pub text_content: Option<String>,
    /// Whether the target exposes a `value` property
    #[serde(default)]
    pub has_value: bool,
    /// Length of the string value, 0 otherwise
    #[serde(default)]
    pub value_length: usize,
}

impl ElementSnapshot {
    /// `tagName` of the target itself
    pub fn tag_name(&self) -> &str {
        self.path
            .first()
            .map(|node| node.tag_name.as_str())
            .unwrap_or("")
    }

    /// Selector view of the target, `None` for an empty path
    pub fn target(&self) -> Option<PathNode<'_>> {
        if self.path.is_empty() {
            None
        } else {
            Some(PathNode {
                path: &self.path,
                index: 0,
            })
        }
    }
}

/// Cursor into an [`ElementSnapshot`] path
#[derive(Debug, Clone, Copy)]
pub struct PathNode<'a> {
    path: &'a [NodeInfo],
    index: usize,
}

impl<'a> PathNode<'a> {
    fn info(&self) -> &'a NodeInfo {
        &self.path[self.index]
    }
}

impl SelectorNode for PathNode<'_> {
    fn tag_name(&self) -> &str {
        &self.info().tag_name
    }

    fn element_id(&self) -> &str {
        &self.info().id
    }

    fn class_name(&self) -> &str {
        &self.info().class_name
    }

    fn parent(&self) -> Option<Self> {
        let next = self.index + 1;
        (next < self.path.len()).then_some(PathNode {
            path: self.path,
            index: next,
        })
    }

    fn is_body(&self) -> bool {
        self.info().is_body
    }

    fn same_tag_position(&self) -> (usize, usize) {
        let info = self.info();
        (info.same_tag_index, info.same_tag_count)
    }
}
