use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::capture::CaptureSettings;
use crate::driver::BrowserConfig;
use crate::replay::{Pacing, ReplaySettings};
use crate::runner::RunnerSettings;
use crate::storage::FileStore;

/// Prefix of the environment variables that override file settings
pub const ENV_PREFIX: &str = "BROWSER_RECORDER_";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Interval between capture flushes (ms)
    pub flush_interval_ms: u64,

    /// Buffered actions that force an early flush
    pub batch_size: usize,

    /// Minimum pointer travel before a mouse move is recorded (px)
    pub mousemove_threshold_px: f64,

    /// Click text truncation (characters)
    pub text_limit: usize,

    /// Replay delay clamp (ms)
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Click highlight duration (ms)
    pub highlight_ms: u64,

    /// Character used to refill recorded inputs
    pub placeholder_char: char,

    /// How often the browser page is drained for raw events (ms)
    pub poll_interval_ms: u64,

    pub export_dir: PathBuf,

    /// Persisted recording slot; the platform data dir when unset
    pub store_path: Option<PathBuf>,

    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush_interval_ms: 100,
            batch_size: 10,
            mousemove_threshold_px: 50.0,
            text_limit: 100,
            min_delay_ms: 10,
            max_delay_ms: 5000,
            highlight_ms: 200,
            placeholder_char: '*',
            poll_interval_ms: 50,
            export_dir: PathBuf::from("."),
            store_path: None,
            headless: false,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

impl Config {
    /// Read `path` (YAML) if given, then apply `BROWSER_RECORDER_*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_yaml(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Override fields from variables named `BROWSER_RECORDER_<FIELD>`.
    /// Unparsable values are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |field: &str| lookup(&format!("{}{}", ENV_PREFIX, field));

        override_from(&lookup, "FLUSH_INTERVAL_MS", &mut self.flush_interval_ms);
        override_from(&lookup, "BATCH_SIZE", &mut self.batch_size);
        override_from(&lookup, "MOUSEMOVE_THRESHOLD_PX", &mut self.mousemove_threshold_px);
        override_from(&lookup, "TEXT_LIMIT", &mut self.text_limit);
        override_from(&lookup, "MIN_DELAY_MS", &mut self.min_delay_ms);
        override_from(&lookup, "MAX_DELAY_MS", &mut self.max_delay_ms);
        override_from(&lookup, "HIGHLIGHT_MS", &mut self.highlight_ms);
        override_from(&lookup, "PLACEHOLDER_CHAR", &mut self.placeholder_char);
        override_from(&lookup, "POLL_INTERVAL_MS", &mut self.poll_interval_ms);
        override_from(&lookup, "EXPORT_DIR", &mut self.export_dir);

        if let Some(path) = lookup("STORE_PATH") {
            self.store_path = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup("HEADLESS") {
            self.headless = value == "true" || value == "1";
        }
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batchSize must be at least 1");
        }
        if self.flush_interval_ms == 0 {
            anyhow::bail!("flushIntervalMs must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("pollIntervalMs must be at least 1");
        }
        if self.min_delay_ms > self.max_delay_ms {
            anyhow::bail!(
                "minDelayMs ({}) exceeds maxDelayMs ({})",
                self.min_delay_ms,
                self.max_delay_ms
            );
        }
        Ok(())
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            capture: CaptureSettings {
                flush_interval: Duration::from_millis(self.flush_interval_ms),
                batch_size: self.batch_size,
                mousemove_threshold: self.mousemove_threshold_px,
                text_limit: self.text_limit,
            },
            replay: ReplaySettings {
                pacing: Pacing {
                    min: Duration::from_millis(self.min_delay_ms),
                    max: Duration::from_millis(self.max_delay_ms),
                },
                highlight: Duration::from_millis(self.highlight_ms),
                placeholder: self.placeholder_char,
            },
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn browser_config(&self) -> BrowserConfig {
        BrowserConfig {
            headless: self.headless,
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            executable: None,
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(FileStore::default_path)
    }
}

fn override_from<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, field: &str, target: &mut T) {
    let Some(raw) = lookup(field) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *target = value,
        Err(_) => log::warn!("ignoring {}{}={:?}: not a valid value", ENV_PREFIX, field, raw),
    }
}
