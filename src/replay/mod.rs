//! Replay: timed execution of an action log against a page

pub mod executor;
pub mod state;
pub mod timing;

pub use executor::{execute, ReplaySettings, StepOutcome};
pub use state::{PlaybackSession, PlaybackStatus};
pub use timing::Pacing;
