use std::time::Duration;

use crate::model::{Action, ActionLog};

/// Bounds applied to the recorded gap between two actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(10),
            max: Duration::from_millis(5000),
        }
    }
}

impl Pacing {
    /// Wait between `current` and `next`: the recorded gap clamped to
    /// `[min, max]`. Out-of-order stamps count as a zero gap.
    pub fn delay_between(&self, current: &Action, next: &Action) -> Duration {
        let gap = Duration::from_millis(next.timestamp.saturating_sub(current.timestamp));
        gap.clamp(self.min, self.max.max(self.min))
    }

    /// Every inter-action delay of a log, in order
    pub fn delays(&self, log: &ActionLog) -> Vec<Duration> {
        log.actions
            .windows(2)
            .map(|pair| self.delay_between(&pair[0], &pair[1]))
            .collect()
    }

    /// Total wall time a replay of `log` will wait between actions
    pub fn total(&self, log: &ActionLog) -> Duration {
        self.delays(log).into_iter().sum()
    }
}
