use tokio::sync::broadcast;

/// Page runner events for real-time updates
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    // Capture events
    RecordingStarted {
        url: String,
    },
    RecordingStopped,
    BatchFlushed {
        count: usize,
    },

    // Playback events
    PlaybackStarted {
        total: usize,
    },
    ActionExecuted {
        index: usize,
        total: usize,
        description: String,
    },
    TargetMissing {
        index: usize,
        selector: String,
    },
    ActionFailed {
        index: usize,
        error: String,
    },
    PlaybackPaused {
        index: usize,
    },
    PlaybackResumed {
        index: usize,
    },
    PlaybackStopped,
    PlaybackCompleted {
        total: usize,
        missing: usize,
    },
}

/// Event emitter for broadcasting runner events
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<RunnerEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<RunnerEvent>) {
        let (sender, receiver) = broadcast::channel(256);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: RunnerEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }
}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<RunnerEvent>) {
        use colored::Colorize;
        use std::io::IsTerminal;

        let mut progress: Option<ProgressBar> = None;

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("console listener skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                RunnerEvent::RecordingStarted { url } => {
                    println!("\n{} Recording {}", "🔴".red(), url.cyan());
                    println!("   Press Ctrl+C to stop");
                }

                RunnerEvent::RecordingStopped => {
                    println!("{} Recording stopped", "■".blue().bold());
                }

                RunnerEvent::BatchFlushed { count } => {
                    log::debug!("{} actions captured", count);
                }

                RunnerEvent::PlaybackStarted { total } => {
                    println!("\n{} Replaying {} actions", "▶".green().bold(), total);
                    let pb = if std::io::stdout().is_terminal() {
                        ProgressBar::new(total as u64)
                    } else {
                        ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::hidden())
                    };
                    if let Ok(style) =
                        ProgressStyle::default_bar().template("  [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                    {
                        pb.set_style(style.progress_chars("=> "));
                    }
                    progress = Some(pb);
                }

                RunnerEvent::ActionExecuted {
                    index, description, ..
                } => match &progress {
                    Some(pb) => {
                        pb.set_position(index as u64 + 1);
                        pb.set_message(description.dimmed().to_string());
                    }
                    None => println!("  {} {}", "✓".green(), description),
                },

                RunnerEvent::TargetMissing { index, selector } => {
                    let line = format!(
                        "  {} [{}] target not found: {}",
                        "○".yellow(),
                        index + 1,
                        selector
                    );
                    match &progress {
                        Some(pb) => {
                            pb.set_position(index as u64 + 1);
                            pb.println(line);
                        }
                        None => println!("{}", line),
                    }
                }

                RunnerEvent::ActionFailed { index, error } => {
                    let line = format!("  {} [{}] {}", "✗".red(), index + 1, error);
                    match &progress {
                        Some(pb) => pb.println(line),
                        None => println!("{}", line),
                    }
                }

                RunnerEvent::PlaybackPaused { index } => {
                    if let Some(pb) = &progress {
                        pb.set_message(format!("{} paused at {}", "⏸".yellow(), index));
                    }
                }

                RunnerEvent::PlaybackResumed { .. } => {
                    if let Some(pb) = &progress {
                        pb.set_message(String::new());
                    }
                }

                RunnerEvent::PlaybackStopped => {
                    if let Some(pb) = progress.take() {
                        pb.abandon();
                    }
                    println!("{} Playback stopped", "■".blue().bold());
                }

                RunnerEvent::PlaybackCompleted { total, missing } => {
                    if let Some(pb) = progress.take() {
                        pb.finish_and_clear();
                    }
                    println!("{} Playback completed", "✅".green());
                    println!(
                        "  {} executed, {} not found",
                        (total - missing).to_string().green(),
                        missing.to_string().yellow()
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emitter_broadcasts_to_subscribers() {
        let (emitter, mut first) = EventEmitter::new();
        let mut second = emitter.subscribe();
        emitter.emit(RunnerEvent::PlaybackStarted { total: 3 });

        assert_eq!(first.recv().await.unwrap(), RunnerEvent::PlaybackStarted { total: 3 });
        assert_eq!(second.recv().await.unwrap(), RunnerEvent::PlaybackStarted { total: 3 });
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let emitter = EventEmitter::default();
        emitter.emit(RunnerEvent::RecordingStopped);
    }
}
