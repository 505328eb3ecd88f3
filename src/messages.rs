//! Messages exchanged between the coordinator and page runners.
//!
//! Serialized with a `type` tag in SCREAMING_SNAKE_CASE, the same envelope
//! the browser extension uses.

use serde::{Deserialize, Serialize};

use crate::model::{Action, ActionLog};

/// Identifier of a browser tab / page
pub type TabId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    // ---- to the coordinator ----
    StartRecording {
        #[serde(default, rename = "tabId", skip_serializing_if = "Option::is_none")]
        tab_id: Option<TabId>,
    },
    StopRecording,
    /// A flushed capture batch
    RecordedActions { actions: Vec<Action> },
    GetStatus,
    ClearRecording,
    ExportData,
    /// `data` is either JSON text or an already-parsed log
    ImportData { data: serde_json::Value },
    StartPlayback {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<ActionLog>,
    },

    // ---- to a page ----
    RecordingStarted,
    RecordingStopped,
    PlaybackStarted { data: ActionLog },
    PlaybackPaused,
    PlaybackResumed,
    PlaybackStopped,
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::StartRecording { .. } => "START_RECORDING",
            Message::StopRecording => "STOP_RECORDING",
            Message::RecordedActions { .. } => "RECORDED_ACTIONS",
            Message::GetStatus => "GET_STATUS",
            Message::ClearRecording => "CLEAR_RECORDING",
            Message::ExportData => "EXPORT_DATA",
            Message::ImportData { .. } => "IMPORT_DATA",
            Message::StartPlayback { .. } => "START_PLAYBACK",
            Message::RecordingStarted => "RECORDING_STARTED",
            Message::RecordingStopped => "RECORDING_STOPPED",
            Message::PlaybackStarted { .. } => "PLAYBACK_STARTED",
            Message::PlaybackPaused => "PLAYBACK_PAUSED",
            Message::PlaybackResumed => "PLAYBACK_RESUMED",
            Message::PlaybackStopped => "PLAYBACK_STOPPED",
        }
    }
}
