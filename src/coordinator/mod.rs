//! Background coordinator
//!
//! Owns the recording state machine and the aggregated [`ActionLog`]. Page
//! runners send it `RECORDED_ACTIONS` batches; the CLI sends it commands.
//! All handling is synchronous: one message in, one [`Reply`] out.

pub mod tabs;

use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::messages::{Message, TabId};
use crate::model::{Action, ActionLog, ImportSource};
use crate::storage::{export_to_dir, LogStore};
use crate::utils::now_millis;

pub use tabs::{ChannelTabs, Tabs};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordingState {
    Idle,
    Recording {
        tab: TabId,
        session_id: Uuid,
        started_at: u64,
    },
}

impl RecordingState {
    pub fn is_recording(&self) -> bool {
        matches!(self, RecordingState::Recording { .. })
    }
}

/// Answer to one coordinator message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Ack,
    #[serde(rename_all = "camelCase")]
    Status {
        is_recording: bool,
        recording_data: ActionLog,
    },
    Exported {
        path: PathBuf,
    },
    Failed {
        error: String,
    },
}

impl Reply {
    fn failed(error: impl std::fmt::Display) -> Self {
        Reply::Failed {
            error: error.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Reply::Failed { .. })
    }
}

pub struct Coordinator<T: Tabs, S: LogStore> {
    tabs: T,
    store: S,
    export_dir: PathBuf,
    state: RecordingState,
    log: ActionLog,
    clock: fn() -> u64,
}

impl<T: Tabs, S: LogStore> Coordinator<T, S> {
    /// Build a coordinator, restoring the last persisted log from `store`
    pub fn new(tabs: T, store: S, export_dir: impl Into<PathBuf>) -> Self {
        let log = match store.load() {
            Ok(Some(log)) => {
                log::debug!("restored recording with {} actions", log.len());
                log
            }
            Ok(None) => ActionLog::default(),
            Err(e) => {
                log::warn!("ignoring stored recording: {}", e);
                ActionLog::default()
            }
        };
        Self {
            tabs,
            store,
            export_dir: export_dir.into(),
            state: RecordingState::Idle,
            log,
            clock: now_millis,
        }
    }

    /// Replace the wall clock (milliseconds since the epoch)
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &RecordingState {
        &self.state
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tabs(&self) -> &T {
        &self.tabs
    }

    pub fn tabs_mut(&mut self) -> &mut T {
        &mut self.tabs
    }

    pub fn handle(&mut self, message: Message) -> Reply {
        log::debug!("coordinator <- {}", message.name());
        match message {
            Message::StartRecording { tab_id } => self.start_recording(tab_id),
            Message::StopRecording => self.stop_recording(),
            Message::RecordedActions { actions } => self.append(actions),
            Message::GetStatus => Reply::Status {
                is_recording: self.state.is_recording(),
                recording_data: self.log.clone(),
            },
            Message::ClearRecording => self.clear(),
            Message::ExportData => self.export(),
            Message::ImportData { data } => self.import(data),
            Message::StartPlayback { data } => self.start_playback(data),
            Message::PlaybackPaused | Message::PlaybackResumed | Message::PlaybackStopped => {
                self.forward_to_active(message)
            }
            other => {
                log::debug!("coordinator ignores {}", other.name());
                Reply::Ack
            }
        }
    }

    fn start_recording(&mut self, tab_id: Option<TabId>) -> Reply {
        if self.state.is_recording() {
            log::debug!("already recording");
            return Reply::Ack;
        }
        let Some(tab) = tab_id.or_else(|| self.tabs.active_tab()) else {
            return Reply::failed("no tab to record");
        };

        let started_at = (self.clock)();
        let url = self.tabs.tab_url(tab).unwrap_or_else(|e| {
            log::error!("failed to get tab info: {:#}", e);
            String::new()
        });
        self.log = ActionLog::new(url, started_at);

        let session_id = Uuid::new_v4();
        self.state = RecordingState::Recording {
            tab,
            session_id,
            started_at,
        };
        self.notify(tab, Message::RecordingStarted);
        log::info!("recording started for tab {} (session {})", tab, session_id);
        Reply::Ack
    }

    fn stop_recording(&mut self) -> Reply {
        let RecordingState::Recording { tab, session_id, .. } = self.state else {
            return Reply::Ack;
        };
        self.state = RecordingState::Idle;
        self.notify(tab, Message::RecordingStopped);
        log::info!(
            "recording {} stopped, {} actions",
            session_id,
            self.log.len()
        );
        self.persist()
    }

    fn append(&mut self, actions: Vec<Action>) -> Reply {
        let added = self.log.extend_ordered(actions);
        log::debug!("appended {} actions, {} total", added, self.log.len());
        if self.state.is_recording() {
            Reply::Ack
        } else {
            // The final flush lands after stop; keep the slot current.
            self.persist()
        }
    }

    fn clear(&mut self) -> Reply {
        if let RecordingState::Recording { tab, .. } = self.state {
            self.notify(tab, Message::RecordingStopped);
        }
        self.state = RecordingState::Idle;
        self.log = ActionLog::new("", (self.clock)());
        self.persist()
    }

    fn export(&self) -> Reply {
        match export_to_dir(&self.log, &self.export_dir, (self.clock)()) {
            Ok(path) => {
                log::info!("exported {} actions to {}", self.log.len(), path.display());
                Reply::Exported { path }
            }
            Err(e) => {
                log::error!("export failed: {}", e);
                Reply::failed(e)
            }
        }
    }

    fn import(&mut self, data: serde_json::Value) -> Reply {
        let source = match data {
            serde_json::Value::String(text) => ImportSource::Text(text),
            value => ImportSource::Value(value),
        };
        let log = match ActionLog::import(source) {
            Ok(log) => log,
            Err(e) => {
                log::error!("failed to import data: {}", e);
                return Reply::failed(e);
            }
        };

        if let RecordingState::Recording { tab, .. } = self.state {
            self.notify(tab, Message::RecordingStopped);
        }
        self.state = RecordingState::Idle;
        self.log = log;
        log::info!("imported {} actions", self.log.len());
        self.persist()
    }

    fn start_playback(&mut self, data: Option<ActionLog>) -> Reply {
        let Some(tab) = self.tabs.active_tab() else {
            log::error!("no active tab found");
            return Reply::failed("no active tab found");
        };
        let data = data.unwrap_or_else(|| self.log.clone());
        match self.tabs.send(tab, Message::PlaybackStarted { data }) {
            Ok(()) => Reply::Ack,
            Err(e) => {
                log::error!("failed to start playback: {:#}", e);
                Reply::failed(format!("{:#}", e))
            }
        }
    }

    fn forward_to_active(&mut self, message: Message) -> Reply {
        match self.tabs.active_tab() {
            Some(tab) => {
                self.notify(tab, message);
                Reply::Ack
            }
            None => Reply::failed("no active tab found"),
        }
    }

    /// Transport failures are logged; state is left for an explicit stop.
    fn notify(&self, tab: TabId, message: Message) {
        if let Err(e) = self.tabs.send(tab, message) {
            log::error!("{:#}", e);
        }
    }

    fn persist(&mut self) -> Reply {
        match self.store.save(&self.log) {
            Ok(()) => Reply::Ack,
            Err(e) => {
                log::error!("failed to persist recording: {}", e);
                Reply::failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionKind, KeyUpAction};
    use crate::storage::MemoryStore;
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn fixed_clock() -> u64 {
        1_700_000_000_000
    }

    fn setup() -> (
        Coordinator<ChannelTabs, MemoryStore>,
        TabId,
        UnboundedReceiver<Message>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut tabs = ChannelTabs::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let tab = tabs.open("https://example.com/login", tx);
        let coordinator =
            Coordinator::new(tabs, MemoryStore::new(), dir.path()).with_clock(fixed_clock);
        (coordinator, tab, rx, dir)
    }

    fn keyup(key: &str, ts: u64) -> Action {
        Action::new(
            ActionKind::KeyUp(KeyUpAction {
                key: key.to_string(),
            }),
            ts,
            "https://example.com/login",
        )
    }

    fn is_recording(coordinator: &mut Coordinator<ChannelTabs, MemoryStore>) -> bool {
        match coordinator.handle(Message::GetStatus) {
            Reply::Status { is_recording, .. } => is_recording,
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_start_and_stop_notify_tab_and_persist() {
        let (mut c, tab, mut rx, _dir) = setup();

        assert_eq!(c.handle(Message::StartRecording { tab_id: Some(tab) }), Reply::Ack);
        assert!(is_recording(&mut c));
        assert_eq!(rx.try_recv().unwrap(), Message::RecordingStarted);
        assert_eq!(c.log().url, "https://example.com/login");
        assert_eq!(c.log().timestamp, fixed_clock());

        // Second start is a no-op.
        c.handle(Message::StartRecording { tab_id: Some(tab) });
        assert!(rx.try_recv().is_err());

        c.handle(Message::RecordedActions {
            actions: vec![keyup("a", 10), keyup("b", 20)],
        });
        assert_eq!(c.store().saves(), 0);

        c.handle(Message::StopRecording);
        assert!(!is_recording(&mut c));
        assert_eq!(rx.try_recv().unwrap(), Message::RecordingStopped);
        assert_eq!(c.store().saves(), 1);
        assert_eq!(c.store().load().unwrap().unwrap().len(), 2);

        // Stop while idle is a no-op.
        c.handle(Message::StopRecording);
        assert_eq!(c.store().saves(), 1);
    }

    #[test]
    fn test_batch_after_stop_is_appended_and_persisted() {
        let (mut c, tab, _rx, _dir) = setup();
        c.handle(Message::StartRecording { tab_id: Some(tab) });
        c.handle(Message::StopRecording);

        c.handle(Message::RecordedActions {
            actions: vec![keyup("Enter", 30)],
        });
        assert_eq!(c.log().len(), 1);
        assert_eq!(c.store().saves(), 2);
        assert_eq!(c.store().load().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_tab_records_with_empty_url() {
        let (mut c, _tab, _rx, _dir) = setup();
        assert_eq!(c.handle(Message::StartRecording { tab_id: Some(42) }), Reply::Ack);
        assert!(c.state().is_recording());
        assert_eq!(c.log().url, "");
    }

    #[test]
    fn test_invalid_import_leaves_log_untouched() {
        let (mut c, _tab, _rx, _dir) = setup();
        c.handle(Message::RecordedActions {
            actions: vec![keyup("a", 1)],
        });
        let before = c.log().clone();
        let saves = c.store().saves();

        let reply = c.handle(Message::ImportData {
            data: json!("{not json"),
        });
        assert!(reply.is_failed());
        let reply = c.handle(Message::ImportData {
            data: json!({"url": 5}),
        });
        assert!(reply.is_failed());

        assert_eq!(c.log(), &before);
        assert_eq!(c.store().saves(), saves);
    }

    #[test]
    fn test_import_text_and_value() {
        let (mut c, tab, mut rx, _dir) = setup();
        c.handle(Message::StartRecording { tab_id: Some(tab) });
        rx.try_recv().unwrap();

        let text = r#"{"url":"https://a.test/","timestamp":5,"actions":[{"type":"keyup","key":"x","timestamp":6,"url":"https://a.test/"}]}"#;
        assert_eq!(c.handle(Message::ImportData { data: json!(text) }), Reply::Ack);
        assert!(!c.state().is_recording());
        assert_eq!(rx.try_recv().unwrap(), Message::RecordingStopped);
        assert_eq!(c.log().url, "https://a.test/");
        assert_eq!(c.store().load().unwrap().unwrap().len(), 1);

        let value = json!({"url": "https://b.test/", "timestamp": 1, "actions": []});
        assert_eq!(c.handle(Message::ImportData { data: value }), Reply::Ack);
        assert_eq!(c.log().url, "https://b.test/");
    }

    #[test]
    fn test_clear_persists_empty_log() {
        let (mut c, _tab, _rx, _dir) = setup();
        c.handle(Message::RecordedActions {
            actions: vec![keyup("a", 1)],
        });
        assert_eq!(c.handle(Message::ClearRecording), Reply::Ack);
        assert!(c.log().is_empty());
        assert!(c.store().load().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_export_writes_timestamped_file() {
        let (mut c, _tab, _rx, dir) = setup();
        c.handle(Message::RecordedActions {
            actions: vec![keyup("a", 1)],
        });
        match c.handle(Message::ExportData) {
            Reply::Exported { path } => {
                assert_eq!(path, dir.path().join("recording-1700000000000.json"));
                let text = std::fs::read_to_string(path).unwrap();
                assert_eq!(&ActionLog::import(text).unwrap(), c.log());
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_playback_goes_to_active_tab() {
        let (mut c, _tab, mut rx, _dir) = setup();
        c.handle(Message::RecordedActions {
            actions: vec![keyup("a", 1)],
        });

        assert_eq!(c.handle(Message::StartPlayback { data: None }), Reply::Ack);
        match rx.try_recv().unwrap() {
            Message::PlaybackStarted { data } => assert_eq!(&data, c.log()),
            other => panic!("unexpected message {:?}", other),
        }

        c.handle(Message::PlaybackPaused);
        assert_eq!(rx.try_recv().unwrap(), Message::PlaybackPaused);
    }

    #[test]
    fn test_playback_without_tab_is_reported() {
        let mut c = Coordinator::new(ChannelTabs::new(), MemoryStore::new(), ".");
        assert!(c.handle(Message::StartPlayback { data: None }).is_failed());
    }

    #[test]
    fn test_restores_persisted_log() {
        let mut store = MemoryStore::new();
        let mut log = ActionLog::new("https://a.test/", 1);
        log.actions.push(keyup("a", 2));
        store.save(&log).unwrap();

        let c = Coordinator::new(ChannelTabs::new(), store, ".");
        assert_eq!(c.log(), &log);
        assert!(!c.state().is_recording());
    }

    #[test]
    fn test_status_reply_shape() {
        let reply = Reply::Status {
            is_recording: false,
            recording_data: ActionLog::new("", 0),
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["isRecording"], json!(false));
        assert_eq!(value["recordingData"]["actions"], json!([]));
    }
}
