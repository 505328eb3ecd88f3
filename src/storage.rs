//! Persistence of the single recording slot, and file export

use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::model::ActionLog;

/// The one persisted recording. Every save replaces the previous one.
pub trait LogStore: Send {
    fn load(&self) -> Result<Option<ActionLog>, StoreError>;
    fn save(&mut self, log: &ActionLog) -> Result<(), StoreError>;
}

/// JSON file on disk
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/browser-recorder/recording.json`
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("browser-recorder")
            .join("recording.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl LogStore for FileStore {
    fn load(&self) -> Result<Option<ActionLog>, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        Ok(Some(ActionLog::import(text)?))
    }

    fn save(&mut self, log: &ActionLog) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_string(log).map_err(StoreError::Encode)?;
        // Write then rename so a crash never leaves a truncated slot.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        log::debug!("saved {} actions to {}", log.len(), self.path.display());
        Ok(())
    }
}

/// In-process slot, counting writes
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Option<ActionLog>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl LogStore for MemoryStore {
    fn load(&self) -> Result<Option<ActionLog>, StoreError> {
        Ok(self.slot.clone())
    }

    fn save(&mut self, log: &ActionLog) -> Result<(), StoreError> {
        self.slot = Some(log.clone());
        self.saves += 1;
        Ok(())
    }
}

/// File name used for exports taken at `timestamp_ms`
pub fn export_file_name(timestamp_ms: u64) -> String {
    format!("recording-{}.json", timestamp_ms)
}

/// Write `log` as pretty JSON into `dir`. Returns the written path.
pub fn export_to_dir(log: &ActionLog, dir: &Path, timestamp_ms: u64) -> Result<PathBuf, StoreError> {
    let path = dir.join(export_file_name(timestamp_ms));
    let io_error = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(io_error)?;
    let json = log.to_pretty_json().map_err(StoreError::Encode)?;
    std::fs::write(&path, json).map_err(io_error)?;
    Ok(path)
}
