//! Shared data model: actions and the action log

pub mod action;
pub mod action_log;

pub use action::{
    Action, ActionKind, ClickAction, InputAction, KeyDownAction, KeyUpAction, MouseMoveAction,
    Position, ScrollAction, ScrollDirection,
};
pub use action_log::{ActionLog, ImportSource, LogSummary};
