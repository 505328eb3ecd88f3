//! Recorded user actions
//!
//! Every captured DOM event is normalized into one [`Action`]. The JSON shape
//! is shared with the extension side of the recorder, so field names follow
//! the DOM spelling (`tagName`, `scrollX`, `ctrlKey`, ...).

use serde::{Deserialize, Serialize};

/// One normalized, replayable unit of user interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Milliseconds since an arbitrary epoch (wall clock at capture time)
    pub timestamp: u64,
    /// Page location at capture time
    pub url: String,
}

/// Action payload, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    Click(ClickAction),
    KeyDown(KeyDownAction),
    KeyUp(KeyUpAction),
    Scroll(ScrollAction),
    Input(InputAction),
    MouseMove(MouseMoveAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickAction {
    pub selector: String,
    pub tag_name: String,
    /// Target text content, truncated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDownAction {
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyUpAction {
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    #[serde(rename = "none")]
    Unchanged,
}

impl ScrollDirection {
    /// Direction of travel from `previous_y` to `current_y`
    pub fn between(previous_y: f64, current_y: f64) -> Self {
        if current_y > previous_y {
            ScrollDirection::Down
        } else if current_y < previous_y {
            ScrollDirection::Up
        } else {
            ScrollDirection::Unchanged
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollAction {
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub scroll_direction: ScrollDirection,
}

/// Form input. Only the length of the value is kept, never its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAction {
    pub selector: String,
    pub tag_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    pub has_value: bool,
    pub value_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseMoveAction {
    pub x: f64,
    pub y: f64,
}

impl Action {
    pub fn new(kind: ActionKind, timestamp: u64, url: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp,
            url: url.into(),
        }
    }

    /// The wire discriminant (`click`, `keydown`, ...)
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Target selector for actions that address an element
    pub fn selector(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::Click(click) => Some(&click.selector),
            ActionKind::Input(input) => Some(&input.selector),
            ActionKind::KeyDown(_)
            | ActionKind::KeyUp(_)
            | ActionKind::Scroll(_)
            | ActionKind::MouseMove(_) => None,
        }
    }

    /// Short human readable description used in progress output
    pub fn describe(&self) -> String {
        match &self.kind {
            ActionKind::Click(click) => format!("click {}", click.selector),
            ActionKind::KeyDown(key) => {
                let mut combo = Vec::new();
                if key.ctrl_key {
                    combo.push("Ctrl");
                }
                if key.meta_key {
                    combo.push("Meta");
                }
                if key.alt_key {
                    combo.push("Alt");
                }
                if key.shift_key {
                    combo.push("Shift");
                }
                combo.push(key.key.as_str());
                format!("keydown {}", combo.join("+"))
            }
            ActionKind::KeyUp(key) => format!("keyup {}", key.key),
            ActionKind::Scroll(scroll) => {
                format!("scroll to ({}, {})", scroll.scroll_x, scroll.scroll_y)
            }
            ActionKind::Input(input) => {
                format!("input {} ({} chars)", input.selector, input.value_length)
            }
            ActionKind::MouseMove(pos) => format!("mousemove ({}, {})", pos.x, pos.y),
        }
    }
}

impl ActionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::Click(_) => "click",
            ActionKind::KeyDown(_) => "keydown",
            ActionKind::KeyUp(_) => "keyup",
            ActionKind::Scroll(_) => "scroll",
            ActionKind::Input(_) => "input",
            ActionKind::MouseMove(_) => "mousemove",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_click_wire_shape() {
        let action = Action::new(
            ActionKind::Click(ClickAction {
                selector: "#submit".to_string(),
                tag_name: "BUTTON".to_string(),
                text: Some("Send".to_string()),
                position: Position { x: 12.0, y: 40.0 },
            }),
            1_700_000_000_000,
            "https://example.com/form",
        );

        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "click");
        assert_eq!(value["selector"], "#submit");
        assert_eq!(value["tagName"], "BUTTON");
        assert_eq!(value["position"]["x"], 12.0);
        assert_eq!(value["timestamp"], 1_700_000_000_000u64);
    }

    #[test]
    fn test_parse_extension_actions() {
        let raw = json!([
            {"type": "keydown", "timestamp": 10, "key": "Enter", "code": "Enter",
             "ctrlKey": false, "metaKey": false, "shiftKey": false, "altKey": false,
             "url": "https://example.com"},
            {"type": "scroll", "timestamp": 20, "scrollX": 0, "scrollY": 300,
             "scrollDirection": "down", "url": "https://example.com"},
            {"type": "input", "timestamp": 30, "selector": "form > input:nth-child(2)",
             "tagName": "INPUT", "hasValue": true, "valueLength": 4,
             "url": "https://example.com"},
            {"type": "mousemove", "timestamp": 40, "x": 100, "y": 50,
             "url": "https://example.com"}
        ]);

        let actions: Vec<Action> = serde_json::from_value(raw).unwrap();
        assert_eq!(actions.len(), 4);
        assert_eq!(actions[0].type_name(), "keydown");
        match &actions[1].kind {
            ActionKind::Scroll(scroll) => {
                assert_eq!(scroll.scroll_y, 300.0);
                assert_eq!(scroll.scroll_direction, ScrollDirection::Down);
            }
            other => panic!("unexpected action {:?}", other),
        }
        match &actions[2].kind {
            ActionKind::Input(input) => {
                assert_eq!(input.input_type, None);
                assert_eq!(input.value_length, 4);
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(actions[2].selector(), Some("form > input:nth-child(2)"));
    }

    #[test]
    fn test_scroll_direction_none_spelling() {
        let value = serde_json::to_value(ScrollDirection::Unchanged).unwrap();
        assert_eq!(value, json!("none"));
        assert_eq!(ScrollDirection::between(10.0, 10.0), ScrollDirection::Unchanged);
        assert_eq!(ScrollDirection::between(10.0, 4.0), ScrollDirection::Up);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let raw = json!({"type": "drag", "timestamp": 1, "url": ""});
        assert!(serde_json::from_value::<Action>(raw).is_err());
    }

    #[test]
    fn test_describe_key_combo() {
        let action = Action::new(
            ActionKind::KeyDown(KeyDownAction {
                key: "s".to_string(),
                code: "KeyS".to_string(),
                ctrl_key: true,
                meta_key: false,
                shift_key: true,
                alt_key: false,
            }),
            0,
            "",
        );
        assert_eq!(action.describe(), "keydown Ctrl+Shift+s");
    }
}
