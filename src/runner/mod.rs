//! Per-page event loop
//!
//! A [`PageRunner`] owns everything that lives "inside" one page: the
//! capturer, the playback session and their timers. It reacts to messages
//! from the coordinator, raw events drained from the page and timer ticks,
//! one at a time, so no two handlers ever interleave.

pub mod events;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::capture::{CaptureSettings, Capturer, ChannelSink};
use crate::driver::{Indicator, PageDriver};
use crate::messages::Message;
use crate::model::ActionLog;
use crate::replay::{execute, PlaybackSession, PlaybackStatus, ReplaySettings, StepOutcome};
use crate::timer::Timer;

pub use events::{ConsoleEventListener, EventEmitter, RunnerEvent};

pub const RECORDING_TEXT: &str = "🔴 REC";
pub const PLAYING_TEXT: &str = "▶️ PLAYING";
pub const PAUSED_TEXT: &str = "⏸️ PAUSED";
pub const COMPLETED_TEXT: &str = "✅ COMPLETED";

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSettings {
    pub capture: CaptureSettings,
    pub replay: ReplaySettings,
    /// How often raw events are drained from the page while recording
    pub poll_interval: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
            replay: ReplaySettings::default(),
            poll_interval: Duration::from_millis(50),
        }
    }
}

pub struct PageRunner {
    driver: Arc<dyn PageDriver>,
    capturer: Capturer<ChannelSink>,
    playback: PlaybackSession,
    settings: RunnerSettings,
    flush_timer: Timer,
    poll_timer: Timer,
    step_timer: Timer,
    missing: usize,
    events: EventEmitter,
}

impl PageRunner {
    /// `outbox` receives the flushed capture batches
    pub fn new(
        driver: Arc<dyn PageDriver>,
        settings: RunnerSettings,
        outbox: UnboundedSender<Message>,
        events: EventEmitter,
    ) -> Self {
        Self {
            driver,
            capturer: Capturer::new(settings.capture.clone(), ChannelSink::new(outbox)),
            playback: PlaybackSession::new(),
            settings,
            flush_timer: Timer::new(),
            poll_timer: Timer::new(),
            step_timer: Timer::new(),
            missing: 0,
            events,
        }
    }

    /// Process messages until the inbox closes, then shut down capture and
    /// playback.
    pub async fn run(mut self, mut inbox: UnboundedReceiver<Message>) -> Result<()> {
        log::debug!("page runner started on {} driver", self.driver.driver_name());

        loop {
            tokio::select! {
                message = inbox.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => break,
                },
                _ = self.poll_timer.wait() => self.poll_events().await,
                _ = self.flush_timer.wait() => self.flush(),
                _ = self.step_timer.wait() => self.step().await,
            }
        }

        self.stop_capture().await;
        if self.playback.status().is_active() {
            self.stop_playback().await;
        }
        log::debug!("page runner finished");
        Ok(())
    }

    pub async fn handle_message(&mut self, message: Message) {
        match message {
            Message::RecordingStarted => self.start_capture().await,
            Message::RecordingStopped => self.stop_capture().await,
            Message::PlaybackStarted { data } => self.start_playback(data).await,
            Message::PlaybackPaused => self.pause_playback().await,
            Message::PlaybackResumed => self.resume_playback().await,
            Message::PlaybackStopped => self.stop_playback().await,
            other => log::debug!("page ignores {}", other.name()),
        }
    }

    // ---- capture ----------------------------------------------------------

    async fn start_capture(&mut self) {
        if !self.capturer.start() {
            log::debug!("capture already running");
            return;
        }

        let kinds = self.capturer.subscriptions().kinds();
        if let Err(e) = self.driver.attach_listeners(&kinds).await {
            log::error!("failed to attach capture listeners: {:#}", e);
        }
        self.indicator(Indicator::Recording, RECORDING_TEXT).await;

        self.flush_timer.every(self.settings.capture.flush_interval);
        self.poll_timer.every(self.settings.poll_interval);

        let url = self.driver.location().await.unwrap_or_default();
        self.events.emit(RunnerEvent::RecordingStarted { url });
    }

    async fn stop_capture(&mut self) {
        if !self.capturer.is_recording() {
            return;
        }

        // Pick up whatever the page queued since the last poll.
        self.poll_events().await;
        self.capturer.stop();
        self.flush_timer.cancel();
        self.poll_timer.cancel();

        if let Err(e) = self.driver.detach_listeners().await {
            log::error!("failed to detach capture listeners: {:#}", e);
        }
        if let Err(e) = self.driver.remove_indicator(Indicator::Recording).await {
            log::warn!("failed to remove recording indicator: {:#}", e);
        }
        self.events.emit(RunnerEvent::RecordingStopped);
    }

    async fn poll_events(&mut self) {
        let events = match self.driver.drain_events().await {
            Ok(events) => events,
            Err(e) => {
                log::warn!("failed to drain page events: {:#}", e);
                return;
            }
        };
        for event in &events {
            self.capturer.handle(event);
        }
    }

    fn flush(&mut self) {
        let count = self.capturer.flush();
        if count > 0 {
            self.events.emit(RunnerEvent::BatchFlushed { count });
        }
    }

    // ---- playback ---------------------------------------------------------

    async fn start_playback(&mut self, log: ActionLog) {
        if !self.playback.start(log) {
            log::info!("playback already running, ignoring start");
            return;
        }
        self.step_timer.cancel();
        self.missing = 0;

        let total = self.playback.total();
        log::info!("playback started, {} actions", total);
        self.events.emit(RunnerEvent::PlaybackStarted { total });
        self.indicator(Indicator::Playback, PLAYING_TEXT).await;

        self.step().await;
    }

    async fn pause_playback(&mut self) {
        if !self.playback.pause() {
            return;
        }
        self.step_timer.cancel();
        self.indicator(Indicator::Playback, PAUSED_TEXT).await;
        self.events.emit(RunnerEvent::PlaybackPaused {
            index: self.playback.cursor(),
        });
    }

    async fn resume_playback(&mut self) {
        if !self.playback.resume() {
            return;
        }
        self.events.emit(RunnerEvent::PlaybackResumed {
            index: self.playback.cursor(),
        });
        self.step_timer.once(Duration::ZERO);
    }

    async fn stop_playback(&mut self) {
        self.step_timer.cancel();
        if !self.playback.stop() {
            return;
        }
        if let Err(e) = self.driver.remove_indicator(Indicator::Playback).await {
            log::warn!("failed to remove playback indicator: {:#}", e);
        }
        self.events.emit(RunnerEvent::PlaybackStopped);
    }

    /// Execute the action under the cursor and schedule the next one
    async fn step(&mut self) {
        if self.playback.status() != PlaybackStatus::Playing {
            return;
        }

        let index = self.playback.cursor();
        let total = self.playback.total();
        let Some(action) = self.playback.next_action() else {
            self.finish_playback().await;
            return;
        };

        let mut next_delay = None;
        match execute(&action, self.driver.as_ref(), &self.settings.replay).await {
            Ok(StepOutcome::TargetMissing(selector)) => {
                self.missing += 1;
                self.events
                    .emit(RunnerEvent::TargetMissing { index, selector });
            }
            Ok(_) => {
                self.events.emit(RunnerEvent::ActionExecuted {
                    index,
                    total,
                    description: action.describe(),
                });
            }
            Err(e) => {
                log::error!("failed to execute {}: {:#}", action.describe(), e);
                self.events.emit(RunnerEvent::ActionFailed {
                    index,
                    error: format!("{:#}", e),
                });
                // Move on without waiting.
                next_delay = Some(Duration::ZERO);
            }
        }

        self.indicator(
            Indicator::Playback,
            &format!("{} ({}/{})", PLAYING_TEXT, index + 1, total),
        )
        .await;

        let pacing = self.settings.replay.pacing;
        match self.playback.delay_after(&action, &pacing) {
            Some(delay) => self.step_timer.once(next_delay.unwrap_or(delay)),
            None => self.finish_playback().await,
        }
    }

    async fn finish_playback(&mut self) {
        self.step_timer.cancel();
        self.playback.complete();
        self.indicator(Indicator::Playback, COMPLETED_TEXT).await;
        log::info!(
            "playback completed, {} actions, {} targets missing",
            self.playback.total(),
            self.missing
        );
        self.events.emit(RunnerEvent::PlaybackCompleted {
            total: self.playback.total(),
            missing: self.missing,
        });
    }

    async fn indicator(&self, indicator: Indicator, text: &str) {
        if let Err(e) = self.driver.show_indicator(indicator, text).await {
            log::warn!("failed to update indicator: {:#}", e);
        }
    }
}
