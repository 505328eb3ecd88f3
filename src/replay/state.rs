use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::timing::Pacing;
use crate::model::{Action, ActionLog};

/// Replay lifecycle of one page
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
    Completed,
}

impl PlaybackStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackStatus::Playing | PlaybackStatus::Paused)
    }
}

/// A loaded log and the replay cursor over it.
///
/// `cursor` is the index of the next action to execute and never exceeds
/// the log length.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    log: Option<ActionLog>,
    cursor: usize,
    status: PlaybackStatus,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self {
            log: None,
            cursor: 0,
            status: PlaybackStatus::Idle,
        }
    }

    /// Load `log` and begin at its first action. Ignored while a replay is
    /// already playing.
    pub fn start(&mut self, log: ActionLog) -> bool {
        if self.status == PlaybackStatus::Playing {
            return false;
        }
        self.log = Some(log);
        self.cursor = 0;
        self.status = PlaybackStatus::Playing;
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.status != PlaybackStatus::Playing {
            return false;
        }
        self.status = PlaybackStatus::Paused;
        true
    }

    /// Continue from the cursor
    pub fn resume(&mut self) -> bool {
        if self.status != PlaybackStatus::Paused {
            return false;
        }
        self.status = PlaybackStatus::Playing;
        true
    }

    /// Back to Idle from any state, rewinding the cursor
    pub fn stop(&mut self) -> bool {
        if self.status == PlaybackStatus::Idle {
            return false;
        }
        self.status = PlaybackStatus::Idle;
        self.cursor = 0;
        self.log = None;
        true
    }

    pub fn complete(&mut self) {
        self.status = PlaybackStatus::Completed;
    }

    /// Take the action under the cursor and advance. `None` when not
    /// playing or when the log is exhausted.
    pub fn next_action(&mut self) -> Option<Action> {
        if self.status != PlaybackStatus::Playing {
            return None;
        }
        let action = self.log.as_ref()?.actions.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(action)
    }

    /// Wait before the action under the cursor, `None` at the end of the log
    pub fn delay_after(&self, previous: &Action, pacing: &Pacing) -> Option<Duration> {
        let next = self.log.as_ref()?.actions.get(self.cursor)?;
        Some(pacing.delay_between(previous, next))
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total(&self) -> usize {
        self.log.as_ref().map(|log| log.len()).unwrap_or(0)
    }

    pub fn log(&self) -> Option<&ActionLog> {
        self.log.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionKind, KeyUpAction};

    fn log(n: u64) -> ActionLog {
        let mut log = ActionLog::new("https://example.com", 0);
        for i in 0..n {
            log.actions.push(Action::new(
                ActionKind::KeyUp(KeyUpAction {
                    key: format!("k{}", i),
                }),
                i * 100,
                "https://example.com",
            ));
        }
        log
    }

    #[test]
    fn test_lifecycle() {
        let mut session = PlaybackSession::new();
        assert!(!session.pause());
        assert!(session.start(log(3)));
        assert!(!session.start(log(1)));
        assert_eq!(session.total(), 3);

        let first = session.next_action().unwrap();
        assert_eq!(session.cursor(), 1);
        assert_eq!(
            session.delay_after(&first, &Pacing::default()),
            Some(Duration::from_millis(100))
        );

        assert!(session.pause());
        assert!(session.next_action().is_none());
        assert!(session.resume());
        assert!(session.next_action().is_some());
        assert!(session.next_action().is_some());
        assert!(session.next_action().is_none());
        assert_eq!(session.cursor(), 3);

        session.complete();
        assert_eq!(session.status(), PlaybackStatus::Completed);
        assert!(session.start(log(2)));
        assert_eq!(session.cursor(), 0);
    }

    #[test]
    fn test_stop_rewinds() {
        let mut session = PlaybackSession::new();
        session.start(log(2));
        session.next_action();
        assert!(session.stop());
        assert_eq!(session.cursor(), 0);
        assert_eq!(session.status(), PlaybackStatus::Idle);
        assert!(!session.stop());
    }

    #[test]
    fn test_last_action_has_no_delay() {
        let mut session = PlaybackSession::new();
        session.start(log(1));
        let only = session.next_action().unwrap();
        assert!(session.delay_after(&only, &Pacing::default()).is_none());
    }
}
