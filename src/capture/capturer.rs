//! Recording state machine
//!
//! Turns raw DOM events into [`Action`]s while recording, buffers them and
//! hands them to a [`BatchSink`] in batches. Flushing on a timer is driven
//! by the owner (see the page runner); the capturer flushes on its own only
//! when the buffer reaches `batch_size`.

use std::collections::BTreeMap;
use std::time::Duration;

use super::sink::BatchSink;
use crate::dom::{DomEvent, DomEventDetail, EventKind};
use crate::model::{
    Action, ActionKind, ClickAction, InputAction, KeyDownAction, KeyUpAction, MouseMoveAction,
    Position, ScrollAction, ScrollDirection,
};
use crate::selector::generate_selector;

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub flush_interval: Duration,
    /// Buffer length that forces an immediate flush
    pub batch_size: usize,
    /// Minimum Manhattan distance (px) between recorded mouse positions
    pub mousemove_threshold: f64,
    /// Click text is truncated to this many characters
    pub text_limit: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(100),
            batch_size: 10,
            mousemove_threshold: 50.0,
            text_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Idle,
    Recording,
}

/// Per-session memory shared by the event handlers
#[derive(Debug, Clone)]
pub struct CaptureState {
    pub settings: CaptureSettings,
    pub last_mouse: Position,
    pub last_scroll_y: f64,
}

impl CaptureState {
    fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            last_mouse: Position::default(),
            last_scroll_y: 0.0,
        }
    }

    fn reset(&mut self) {
        self.last_mouse = Position::default();
        self.last_scroll_y = 0.0;
    }
}

/// Result of feeding one event to a handler
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Handled {
    pub action: Option<Action>,
    /// The event must not reach page handlers. Events are drained after
    /// the page dispatched them, so the page side applies this rule itself:
    /// `capture_shim.js` stops a click whenever its target path is not bare
    /// `<body>`, the same condition `on_click` reports here.
    pub stop_propagation: bool,
}

impl Handled {
    pub fn ignored() -> Self {
        Self::default()
    }

    fn record(action: Action) -> Self {
        Self {
            action: Some(action),
            stop_propagation: false,
        }
    }
}

pub type Handler = fn(&DomEvent, &mut CaptureState) -> Handled;

#[derive(Debug, Clone, Copy)]
pub struct Listener {
    pub handler: Handler,
    /// Registered for the capture phase
    pub capture: bool,
}

/// Event type to handler table. A kind is either registered or not.
#[derive(Debug, Clone, Default)]
pub struct Subscriptions {
    listeners: BTreeMap<EventKind, Listener>,
}

impl Subscriptions {
    /// Register a handler; replaces an existing one for the same kind
    pub fn register(&mut self, kind: EventKind, handler: Handler, capture: bool) {
        self.listeners.insert(kind, Listener { handler, capture });
    }

    pub fn unregister(&mut self, kind: EventKind) -> bool {
        self.listeners.remove(&kind).is_some()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn get(&self, kind: EventKind) -> Option<&Listener> {
        self.listeners.get(&kind)
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.listeners.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// The full handler set, every one in the capture phase
pub fn default_handlers() -> [(EventKind, Handler); 6] {
    [
        (EventKind::Click, on_click as Handler),
        (EventKind::KeyDown, on_key_down as Handler),
        (EventKind::KeyUp, on_key_up as Handler),
        (EventKind::Scroll, on_scroll as Handler),
        (EventKind::Input, on_input as Handler),
        (EventKind::MouseMove, on_mouse_move as Handler),
    ]
}

pub struct Capturer<S: BatchSink> {
    status: CaptureStatus,
    subscriptions: Subscriptions,
    buffer: Vec<Action>,
    state: CaptureState,
    last_timestamp: u64,
    sink: S,
}

impl<S: BatchSink> Capturer<S> {
    pub fn new(settings: CaptureSettings, sink: S) -> Self {
        Self {
            status: CaptureStatus::Idle,
            subscriptions: Subscriptions::default(),
            buffer: Vec::new(),
            state: CaptureState::new(settings),
            last_timestamp: 0,
            sink,
        }
    }

    /// Idle -> Recording. Returns false (and does nothing) when already
    /// recording.
    pub fn start(&mut self) -> bool {
        if self.status == CaptureStatus::Recording {
            return false;
        }

        self.status = CaptureStatus::Recording;
        self.buffer.clear();
        self.state.reset();
        self.last_timestamp = 0;
        for (kind, handler) in default_handlers() {
            self.subscriptions.register(kind, handler, true);
        }
        log::info!("capture started ({} listeners)", self.subscriptions.len());
        true
    }

    /// Recording -> Idle with a final flush. Returns false when already idle.
    pub fn stop(&mut self) -> bool {
        if self.status == CaptureStatus::Idle {
            return false;
        }

        self.status = CaptureStatus::Idle;
        self.subscriptions.clear();
        let flushed = self.flush();
        log::info!("capture stopped, final flush of {} actions", flushed);
        true
    }

    /// Feed one raw event. Returns whether the event must stop propagating.
    pub fn handle(&mut self, event: &DomEvent) -> Handled {
        if self.status != CaptureStatus::Recording {
            return Handled::ignored();
        }
        let Some(listener) = self.subscriptions.get(event.kind()).copied() else {
            return Handled::ignored();
        };

        let mut handled = (listener.handler)(event, &mut self.state);
        if let Some(action) = handled.action.as_mut() {
            // Page clocks can step backwards; keep emitted stamps monotonic.
            action.timestamp = action.timestamp.max(self.last_timestamp);
            self.last_timestamp = action.timestamp;
            self.buffer.push(action.clone());
            if self.buffer.len() >= self.state.settings.batch_size {
                self.flush();
            }
        }
        handled
    }

    /// Deliver the buffered actions, if any. Returns how many were sent.
    pub fn flush(&mut self) -> usize {
        if self.buffer.is_empty() {
            return 0;
        }
        let batch = std::mem::take(&mut self.buffer);
        let count = batch.len();
        log::debug!("flushing {} actions", count);
        self.sink.deliver(batch);
        count
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    pub fn is_recording(&self) -> bool {
        self.status == CaptureStatus::Recording
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.state.settings
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

// ---- handlers ---------------------------------------------------------------

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

pub fn on_click(event: &DomEvent, state: &mut CaptureState) -> Handled {
    let DomEventDetail::Click {
        target,
        client_x,
        client_y,
    } = &event.detail
    else {
        return Handled::ignored();
    };

    let selector = target
        .target()
        .map(|node| generate_selector(&node))
        .unwrap_or_default();
    // `<body>` itself has no path; the click is not replayable.
    if selector.is_empty() {
        return Handled::ignored();
    }

    let action = Action::new(
        ActionKind::Click(ClickAction {
            selector,
            tag_name: target.tag_name().to_string(),
            text: target
                .text_content
                .as_deref()
                .map(|text| truncate_chars(text, state.settings.text_limit)),
            position: Position {
                x: *client_x,
                y: *client_y,
            },
        }),
        event.timestamp,
        event.url.clone(),
    );

    Handled {
        action: Some(action),
        stop_propagation: true,
    }
}

pub fn on_key_down(event: &DomEvent, _state: &mut CaptureState) -> Handled {
    let DomEventDetail::KeyDown(key) = &event.detail else {
        return Handled::ignored();
    };

    // Printable keys without Ctrl/Meta are covered by `input`.
    if key.key.chars().count() == 1 && !key.ctrl_key && !key.meta_key {
        return Handled::ignored();
    }

    Handled::record(Action::new(
        ActionKind::KeyDown(KeyDownAction {
            key: key.key.clone(),
            code: key.code.clone(),
            ctrl_key: key.ctrl_key,
            meta_key: key.meta_key,
            shift_key: key.shift_key,
            alt_key: key.alt_key,
        }),
        event.timestamp,
        event.url.clone(),
    ))
}

pub fn on_key_up(event: &DomEvent, _state: &mut CaptureState) -> Handled {
    let DomEventDetail::KeyUp(key) = &event.detail else {
        return Handled::ignored();
    };

    Handled::record(Action::new(
        ActionKind::KeyUp(KeyUpAction {
            key: key.key.clone(),
        }),
        event.timestamp,
        event.url.clone(),
    ))
}

pub fn on_scroll(event: &DomEvent, state: &mut CaptureState) -> Handled {
    let DomEventDetail::Scroll { scroll_x, scroll_y } = &event.detail else {
        return Handled::ignored();
    };

    let direction = ScrollDirection::between(state.last_scroll_y, *scroll_y);
    state.last_scroll_y = *scroll_y;

    Handled::record(Action::new(
        ActionKind::Scroll(ScrollAction {
            scroll_x: *scroll_x,
            scroll_y: *scroll_y,
            scroll_direction: direction,
        }),
        event.timestamp,
        event.url.clone(),
    ))
}

pub fn on_input(event: &DomEvent, _state: &mut CaptureState) -> Handled {
    let DomEventDetail::Input { target, input_type } = &event.detail else {
        return Handled::ignored();
    };

    let selector = target
        .target()
        .map(|node| generate_selector(&node))
        .unwrap_or_default();

    Handled::record(Action::new(
        ActionKind::Input(InputAction {
            selector,
            tag_name: target.tag_name().to_string(),
            input_type: input_type.clone(),
            has_value: target.has_value,
            value_length: target.value_length,
        }),
        event.timestamp,
        event.url.clone(),
    ))
}

pub fn on_mouse_move(event: &DomEvent, state: &mut CaptureState) -> Handled {
    let DomEventDetail::MouseMove { client_x, client_y } = &event.detail else {
        return Handled::ignored();
    };

    let distance =
        (client_x - state.last_mouse.x).abs() + (client_y - state.last_mouse.y).abs();
    if distance < state.settings.mousemove_threshold {
        return Handled::ignored();
    }

    state.last_mouse = Position {
        x: *client_x,
        y: *client_y,
    };

    Handled::record(Action::new(
        ActionKind::MouseMove(MouseMoveAction {
            x: *client_x,
            y: *client_y,
        }),
        event.timestamp,
        event.url.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, KeyEventData};

    const PAGE: &str = r#"
        <div id="app">
            <form>
                <input id="email" type="email" value="a@b.c" />
                <button id="submit">Send</button>
                <p class="note">Terms</p>
            </form>
        </div>
    "#;

    fn capturer() -> Capturer<Vec<Vec<Action>>> {
        Capturer::new(CaptureSettings::default(), Vec::new())
    }

    fn key(key: &str) -> KeyEventData {
        KeyEventData {
            key: key.to_string(),
            code: String::new(),
            ..Default::default()
        }
    }

    #[test]
    fn test_start_stop_idempotent() {
        let mut capturer = capturer();
        assert!(capturer.start());
        assert!(!capturer.start());
        assert_eq!(capturer.subscriptions().len(), 6);
        assert!(capturer.stop());
        assert!(!capturer.stop());
        assert!(capturer.subscriptions().is_empty());
    }

    #[test]
    fn test_idle_ignores_events() {
        let doc = Document::parse(PAGE, "https://example.com/").unwrap();
        let mut capturer = capturer();
        let submit = doc.get_element_by_id("submit").unwrap();
        let handled = capturer.handle(&doc.click_event(submit, 1.0, 2.0, 10));
        assert_eq!(handled, Handled::ignored());
        assert_eq!(capturer.buffered(), 0);
    }

    #[test]
    fn test_click_on_id_element() {
        let doc = Document::parse(PAGE, "https://example.com/").unwrap();
        let mut capturer = capturer();
        capturer.start();

        let submit = doc.get_element_by_id("submit").unwrap();
        let handled = capturer.handle(&doc.click_event(submit, 15.0, 30.0, 1000));
        assert!(handled.stop_propagation);

        let action = handled.action.unwrap();
        match &action.kind {
            ActionKind::Click(click) => {
                assert_eq!(click.selector, "#submit");
                assert_eq!(click.tag_name, "BUTTON");
                assert_eq!(click.text.as_deref(), Some("Send"));
                assert_eq!(click.position, Position { x: 15.0, y: 30.0 });
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(action.url, "https://example.com/");
    }

    #[test]
    fn test_click_on_body_is_skipped() {
        let doc = Document::parse(PAGE, "https://example.com/").unwrap();
        let mut capturer = capturer();
        capturer.start();
        let handled = capturer.handle(&doc.click_event(doc.body(), 0.0, 0.0, 1));
        assert!(handled.action.is_none());
        assert!(!handled.stop_propagation);
    }

    #[test]
    fn test_click_text_truncated() {
        let long = "x".repeat(150);
        let doc = Document::parse(&format!("<p>{}</p>", long), "").unwrap();
        let mut capturer = capturer();
        capturer.start();
        let p = doc.element_children(doc.body())[0];
        let action = capturer.handle(&doc.click_event(p, 0.0, 0.0, 1)).action.unwrap();
        match action.kind {
            ActionKind::Click(click) => assert_eq!(click.text.unwrap().len(), 100),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_keydown_filter() {
        let doc = Document::new("");
        let mut capturer = capturer();
        capturer.start();

        assert!(capturer.handle(&doc.key_down_event(key("a"), 1)).action.is_none());
        assert!(capturer.handle(&doc.key_down_event(key("Enter"), 2)).action.is_some());

        let mut ctrl_a = key("a");
        ctrl_a.ctrl_key = true;
        assert!(capturer.handle(&doc.key_down_event(ctrl_a, 3)).action.is_some());

        // Shift and Alt do not make a printable key interesting.
        let mut alt_a = key("a");
        alt_a.alt_key = true;
        assert!(capturer.handle(&doc.key_down_event(alt_a, 4)).action.is_none());

        assert!(capturer.handle(&doc.key_up_event(key("a"), 5)).action.is_some());
    }

    #[test]
    fn test_mousemove_threshold() {
        let doc = Document::new("");
        let mut capturer = capturer();
        capturer.start();

        assert!(capturer.handle(&doc.mouse_move_event(20.0, 20.0, 1)).action.is_none());
        assert!(capturer.handle(&doc.mouse_move_event(30.0, 20.0, 2)).action.is_some());
        // 25 px from (30, 20): below the threshold
        assert!(capturer.handle(&doc.mouse_move_event(45.0, 30.0, 3)).action.is_none());
        // exactly 50 px is recorded
        assert!(capturer.handle(&doc.mouse_move_event(60.0, 40.0, 4)).action.is_some());
    }

    #[test]
    fn test_scroll_direction_tracks_previous() {
        let mut doc = Document::new("");
        let mut capturer = capturer();
        capturer.start();

        let mut directions = Vec::new();
        for y in [200.0, 200.0, 50.0] {
            doc.scroll_to(0.0, y);
            let action = capturer.handle(&doc.scroll_event(1)).action.unwrap();
            if let ActionKind::Scroll(scroll) = action.kind {
                directions.push(scroll.scroll_direction);
            }
        }
        assert_eq!(
            directions,
            vec![ScrollDirection::Down, ScrollDirection::Unchanged, ScrollDirection::Up]
        );
    }

    #[test]
    fn test_input_records_length_only() {
        let doc = Document::parse(PAGE, "https://example.com/").unwrap();
        let mut capturer = capturer();
        capturer.start();

        let email = doc.get_element_by_id("email").unwrap();
        let action = capturer
            .handle(&doc.input_event(email, Some("insertText"), 5))
            .action
            .unwrap();
        let json = serde_json::to_string(&action).unwrap();
        assert!(!json.contains("a@b.c"));
        match action.kind {
            ActionKind::Input(input) => {
                assert_eq!(input.selector, "#email");
                assert!(input.has_value);
                assert_eq!(input.value_length, 5);
                assert_eq!(input.input_type.as_deref(), Some("insertText"));
            }
            other => panic!("unexpected action {:?}", other),
        }

        let note = doc.query_selector("p.note").unwrap().unwrap();
        let action = capturer.handle(&doc.input_event(note, None, 6)).action.unwrap();
        match action.kind {
            ActionKind::Input(input) => {
                assert!(!input.has_value);
                assert_eq!(input.value_length, 0);
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_tenth_action_flushes_once() {
        let doc = Document::new("");
        let mut capturer = capturer();
        capturer.start();

        for i in 0..10 {
            capturer.handle(&doc.key_up_event(key("Tab"), i));
        }
        assert_eq!(capturer.sink().len(), 1);
        assert_eq!(capturer.sink()[0].len(), 10);
        assert_eq!(capturer.buffered(), 0);
    }

    #[test]
    fn test_stop_flushes_remainder() {
        let doc = Document::new("");
        let mut capturer = capturer();
        capturer.start();
        for i in 0..3 {
            capturer.handle(&doc.key_up_event(key("Tab"), i));
        }
        assert!(capturer.sink().is_empty());
        capturer.stop();
        assert_eq!(capturer.sink().len(), 1);
        assert_eq!(capturer.sink()[0].len(), 3);
    }

    #[test]
    fn test_empty_flush_sends_nothing() {
        let mut capturer = capturer();
        capturer.start();
        assert_eq!(capturer.flush(), 0);
        capturer.stop();
        assert!(capturer.sink().is_empty());
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let doc = Document::new("");
        let mut capturer = capturer();
        capturer.start();
        for ts in [100, 90, 120] {
            capturer.handle(&doc.key_up_event(key("Tab"), ts));
        }
        capturer.stop();
        let stamps: Vec<u64> = capturer.sink()[0].iter().map(|a| a.timestamp).collect();
        assert_eq!(stamps, vec![100, 100, 120]);
    }

    #[test]
    fn test_restart_resets_session_state() {
        let doc = Document::new("");
        let mut capturer = capturer();
        capturer.start();
        capturer.handle(&doc.mouse_move_event(100.0, 100.0, 1));
        capturer.stop();

        capturer.start();
        // far from the origin, close to the previous session's last position
        assert!(capturer.handle(&doc.mouse_move_event(110.0, 100.0, 2)).action.is_some());
    }

    #[test]
    fn test_unregistered_kind_ignored() {
        let doc = Document::new("");
        let mut capturer = capturer();
        capturer.start();
        capturer.subscriptions.unregister(EventKind::KeyUp);
        assert!(capturer.handle(&doc.key_up_event(key("Tab"), 1)).action.is_none());
    }
}
