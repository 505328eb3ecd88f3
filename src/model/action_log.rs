use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::action::Action;
use crate::error::ImportError;

/// Ordered collection of actions plus the page the recording started on.
///
/// Actions are kept in non-decreasing `timestamp` order; replay pacing is
/// derived from the deltas between neighbours.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionLog {
    /// Origin page at recording start
    #[serde(default)]
    pub url: String,
    /// Recording start time (ms)
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Input accepted by [`ActionLog::import`]
#[derive(Debug, Clone)]
pub enum ImportSource {
    /// Raw JSON text (e.g. the contents of an exported file)
    Text(String),
    /// An already-parsed JSON document
    Value(serde_json::Value),
}

impl From<&str> for ImportSource {
    fn from(text: &str) -> Self {
        ImportSource::Text(text.to_string())
    }
}

impl From<String> for ImportSource {
    fn from(text: String) -> Self {
        ImportSource::Text(text)
    }
}

impl From<serde_json::Value> for ImportSource {
    fn from(value: serde_json::Value) -> Self {
        ImportSource::Value(value)
    }
}

/// Statistics shown by `status`
#[derive(Debug, Clone, PartialEq)]
pub struct LogSummary {
    /// Host of the origin page, or the raw url when it has none
    pub host: String,
    pub action_count: usize,
    /// Last action timestamp minus recording start, in ms
    pub duration_ms: u64,
    pub counts: BTreeMap<&'static str, usize>,
}

impl LogSummary {
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}

static URL_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://(?:[^@/?#]*@)?([^/:?#]+)").unwrap());

impl ActionLog {
    pub fn new(url: impl Into<String>, timestamp: u64) -> Self {
        Self {
            url: url.into(),
            timestamp,
            actions: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Append a batch, lifting any timestamp that would step backwards so
    /// the log stays ordered. Returns the number of appended actions.
    pub fn extend_ordered(&mut self, batch: impl IntoIterator<Item = Action>) -> usize {
        let mut floor = self.actions.last().map(|a| a.timestamp).unwrap_or(0);
        let before = self.actions.len();
        for mut action in batch {
            if action.timestamp < floor {
                log::debug!(
                    "lifting out-of-order {} timestamp {} -> {}",
                    action.type_name(),
                    action.timestamp,
                    floor
                );
                action.timestamp = floor;
            }
            floor = action.timestamp;
            self.actions.push(action);
        }
        self.actions.len() - before
    }

    /// Whether timestamps are non-decreasing
    pub fn is_ordered(&self) -> bool {
        self.actions
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    }

    /// Pretty-printed JSON, the export format
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a log from JSON text or an already-parsed value
    pub fn import(source: impl Into<ImportSource>) -> Result<Self, ImportError> {
        let value = match source.into() {
            ImportSource::Text(text) => {
                serde_json::from_str::<serde_json::Value>(&text).map_err(ImportError::InvalidJson)?
            }
            ImportSource::Value(value) => value,
        };

        let log: ActionLog = serde_json::from_value(value).map_err(ImportError::InvalidShape)?;
        if !log.is_ordered() {
            log::warn!(
                "imported recording has out-of-order timestamps; replay will clamp the gaps"
            );
        }
        Ok(log)
    }

    pub fn summary(&self) -> LogSummary {
        let host = URL_HOST
            .captures(&self.url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| {
                if self.url.is_empty() {
                    "-".to_string()
                } else {
                    self.url.clone()
                }
            });

        let duration_ms = self
            .actions
            .last()
            .map(|last| last.timestamp.saturating_sub(self.timestamp))
            .unwrap_or(0);

        let mut counts = BTreeMap::new();
        for action in &self.actions {
            *counts.entry(action.type_name()).or_insert(0) += 1;
        }

        LogSummary {
            host,
            action_count: self.actions.len(),
            duration_ms,
            counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::action::{ActionKind, KeyUpAction, MouseMoveAction};
    use serde_json::json;

    fn keyup(ts: u64) -> Action {
        Action::new(
            ActionKind::KeyUp(KeyUpAction {
                key: "Tab".to_string(),
            }),
            ts,
            "https://shop.example.com/cart",
        )
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut log = ActionLog::new("https://shop.example.com/cart", 1000);
        log.extend_ordered(vec![
            keyup(1010),
            Action::new(
                ActionKind::MouseMove(MouseMoveAction { x: 80.5, y: 12.0 }),
                1200,
                "https://shop.example.com/cart",
            ),
        ]);

        let text = log.to_pretty_json().unwrap();
        assert!(text.contains("\n  \"url\""));
        let back = ActionLog::import(text.as_str()).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn test_import_parsed_value() {
        let value = json!({
            "url": "https://example.com",
            "timestamp": 5,
            "actions": [{"type": "keyup", "timestamp": 6, "key": "a", "url": "https://example.com"}]
        });
        let log = ActionLog::import(value).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.timestamp, 5);
    }

    #[test]
    fn test_import_invalid_json() {
        let err = ActionLog::import("{not json").unwrap_err();
        assert!(matches!(err, ImportError::InvalidJson(_)));
    }

    #[test]
    fn test_import_wrong_shape() {
        let err = ActionLog::import(json!({"actions": "nope"})).unwrap_err();
        assert!(matches!(err, ImportError::InvalidShape(_)));
    }

    #[test]
    fn test_extend_ordered_lifts_backwards_timestamps() {
        let mut log = ActionLog::new("", 0);
        assert_eq!(log.extend_ordered(vec![keyup(50), keyup(40), keyup(60)]), 3);
        let stamps: Vec<u64> = log.actions.iter().map(|a| a.timestamp).collect();
        assert_eq!(stamps, vec![50, 50, 60]);
        assert!(log.is_ordered());
    }

    #[test]
    fn test_summary() {
        let mut log = ActionLog::new("https://user@shop.example.com:8443/cart?x=1", 1000);
        log.extend_ordered(vec![keyup(1500), keyup(3500)]);
        let summary = log.summary();
        assert_eq!(summary.host, "shop.example.com");
        assert_eq!(summary.action_count, 2);
        assert_eq!(summary.duration_ms, 2500);
        assert_eq!(summary.duration_secs(), 2.5);
        assert_eq!(summary.counts.get("keyup"), Some(&2));
    }

    #[test]
    fn test_summary_empty_log() {
        let summary = ActionLog::default().summary();
        assert_eq!(summary.host, "-");
        assert_eq!(summary.duration_ms, 0);
        assert!(summary.counts.is_empty());
    }
}
