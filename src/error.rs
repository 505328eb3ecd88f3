use thiserror::Error;

/// Failure to import an action log. The caller's state is never touched
/// when this is returned.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("not a recording: {0}")]
    InvalidShape(#[source] serde_json::Error),
}

/// A selector string the query engine cannot parse
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported selector `{selector}`: {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

impl SelectorError {
    pub fn new(selector: &str, reason: impl Into<String>) -> Self {
        Self {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

/// Persistence failures of the recording slot
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stored recording is corrupt: {0}")]
    Corrupt(#[from] ImportError),

    #[error("failed to encode recording: {0}")]
    Encode(#[source] serde_json::Error),
}
