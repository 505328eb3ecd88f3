use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::dom::{DomEvent, EventKind};
use crate::model::{KeyDownAction, KeyUpAction};

/// Key event phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPhase {
    Down,
    Up,
}

impl KeyPhase {
    pub fn event_type(&self) -> &'static str {
        match self {
            KeyPhase::Down => "keydown",
            KeyPhase::Up => "keyup",
        }
    }
}

/// Keyboard event to synthesize on the document
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStroke {
    pub key: String,
    pub code: String,
    pub ctrl_key: bool,
    pub meta_key: bool,
    pub shift_key: bool,
    pub alt_key: bool,
}

impl From<&KeyDownAction> for KeyStroke {
    fn from(action: &KeyDownAction) -> Self {
        Self {
            key: action.key.clone(),
            code: action.code.clone(),
            ctrl_key: action.ctrl_key,
            meta_key: action.meta_key,
            shift_key: action.shift_key,
            alt_key: action.alt_key,
        }
    }
}

/// Key-up actions only carry the key
impl From<&KeyUpAction> for KeyStroke {
    fn from(action: &KeyUpAction) -> Self {
        Self {
            key: action.key.clone(),
            ..Default::default()
        }
    }
}

/// Fixed status banners shown on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Recording,
    Playback,
}

impl Indicator {
    pub fn element_id(&self) -> &'static str {
        match self {
            Indicator::Recording => "browser-recorder-indicator",
            Indicator::Playback => "browser-recorder-playback-indicator",
        }
    }

    pub fn background(&self) -> &'static str {
        match self {
            Indicator::Recording => "#ff4444",
            Indicator::Playback => "#4444ff",
        }
    }
}

/// Access to one page's document, for capture and replay
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Driver name (e.g., "memory", "chromium")
    fn driver_name(&self) -> &str;

    /// Current `location.href`
    async fn location(&self) -> Result<String>;

    /// Whether `selector` resolves to an element. Unparsable selectors
    /// resolve to nothing.
    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Native click on the first match. Returns false when nothing matches.
    async fn click(&self, selector: &str) -> Result<bool>;

    /// Outline the element for `duration`, then restore its previous style
    async fn highlight(&self, selector: &str, duration: Duration) -> Result<()>;

    /// Dispatch a bubbling keyboard event on the document
    async fn dispatch_key(&self, phase: KeyPhase, stroke: &KeyStroke) -> Result<()>;

    async fn scroll_to(&self, x: f64, y: f64) -> Result<()>;

    /// Set the element's value and dispatch a bubbling `input` event.
    /// Returns false when nothing matches.
    async fn fill(&self, selector: &str, value: &str) -> Result<bool>;

    /// Start observing the given event types in the capture phase
    async fn attach_listeners(&self, kinds: &[EventKind]) -> Result<()>;

    async fn detach_listeners(&self) -> Result<()>;

    /// Raw events observed since the last call
    async fn drain_events(&self) -> Result<Vec<DomEvent>>;

    /// Show the banner, creating it if needed, with `text`
    async fn show_indicator(&self, indicator: Indicator, text: &str) -> Result<()>;

    async fn remove_indicator(&self, indicator: Indicator) -> Result<()>;
}
