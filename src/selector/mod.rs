//! Selector generation and lookup

pub mod query;
pub mod resolver;

pub use query::ParsedSelector;
pub use resolver::{generate_selector, SelectorNode, MAX_CLASSES};
