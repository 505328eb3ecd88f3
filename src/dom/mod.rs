//! Page model: raw DOM events and an in-memory document

pub mod document;
pub mod event;

pub use document::{DispatchedEvent, Document, ElementRef, NodeId};
pub use event::{DomEvent, DomEventDetail, ElementSnapshot, EventKind, KeyEventData, NodeInfo};
