use std::time::Duration;
use tokio::time::Instant;

/// Cancellable one-shot or periodic timer for use inside `tokio::select!`.
///
/// Cancelling takes effect immediately: a disarmed timer's [`Timer::wait`]
/// never resolves, so a callback can not fire after `cancel` returns.
#[derive(Debug, Default)]
pub struct Timer {
    deadline: Option<Instant>,
    period: Option<Duration>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire once after `delay`, replacing any pending schedule
    pub fn once(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
        self.period = None;
    }

    /// Fire every `period`, first after one period
    pub fn every(&mut self, period: Duration) {
        self.deadline = Some(Instant::now() + period);
        self.period = Some(period);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.period = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Wait for the next tick. One-shot timers disarm when they fire,
    /// periodic ones re-arm.
    pub async fn wait(&mut self) {
        let Some(deadline) = self.deadline else {
            return std::future::pending().await;
        };
        tokio::time::sleep_until(deadline).await;
        self.deadline = self.period.map(|period| Instant::now() + period);
    }
}
