//! Event capture: normalization of raw DOM events into actions

pub mod capturer;
pub mod sink;

pub use capturer::{CaptureSettings, CaptureStatus, Capturer, Handled, Subscriptions};
pub use sink::{BatchSink, ChannelSink};
