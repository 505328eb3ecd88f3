pub mod memory;
pub mod traits;
pub mod web;

pub use memory::MemoryPage;
pub use traits::{Indicator, KeyPhase, KeyStroke, PageDriver};
pub use web::{BrowserConfig, BrowserPage};
