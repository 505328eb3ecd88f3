pub mod capture;
pub mod coordinator;
pub mod dom;
pub mod driver;
pub mod error;
pub mod messages;
pub mod model;
pub mod replay;
pub mod runner;
pub mod selector;
pub mod storage;
pub mod timer;
pub mod utils;

// Re-export common items
pub use coordinator::{Coordinator, Reply};
pub use messages::Message;
pub use model::{Action, ActionLog};
