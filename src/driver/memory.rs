//! Driver over an in-memory [`Document`]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::traits::{Indicator, KeyPhase, KeyStroke, PageDriver};
use crate::dom::{Document, DomEvent, EventKind, NodeId};

pub const HIGHLIGHT_OUTLINE: &str = "3px solid #ff4444";

/// Outline to restore once the most recent highlight of a node expires
struct Highlight {
    original: String,
    generation: u64,
}

pub struct MemoryPage {
    document: Arc<Mutex<Document>>,
    pending: Mutex<VecDeque<DomEvent>>,
    highlights: Arc<Mutex<HashMap<NodeId, Highlight>>>,
}

impl MemoryPage {
    pub fn new(document: Document) -> Self {
        Self {
            document: Arc::new(Mutex::new(document)),
            pending: Mutex::new(VecDeque::new()),
            highlights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Shared handle to the underlying document
    pub fn document(&self) -> Arc<Mutex<Document>> {
        self.document.clone()
    }

    /// Queue a raw event as if a user had produced it. Dropped unless a
    /// listener for its kind is attached.
    pub async fn user_event(&self, event: DomEvent) -> bool {
        let listening = self
            .document
            .lock()
            .await
            .listeners()
            .contains(&event.kind());
        if listening {
            self.pending.lock().await.push_back(event);
        }
        listening
    }

    fn find(doc: &Document, selector: &str) -> Option<NodeId> {
        match doc.query_selector(selector) {
            Ok(found) => found,
            Err(e) => {
                log::debug!("{}", e);
                None
            }
        }
    }
}

#[async_trait]
impl PageDriver for MemoryPage {
    fn driver_name(&self) -> &str {
        "memory"
    }

    async fn location(&self) -> Result<String> {
        Ok(self.document.lock().await.location().to_string())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let doc = self.document.lock().await;
        Ok(Self::find(&doc, selector).is_some())
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        let mut doc = self.document.lock().await;
        match Self::find(&doc, selector) {
            Some(node) => {
                doc.record_dispatch("click", Some(node), None);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn highlight(&self, selector: &str, duration: Duration) -> Result<()> {
        let mut doc = self.document.lock().await;
        let Some(node) = Self::find(&doc, selector) else {
            return Ok(());
        };
        let generation = {
            let mut highlights = self.highlights.lock().await;
            let entry = highlights.entry(node).or_insert_with(|| Highlight {
                original: doc.outline(node).to_string(),
                generation: 0,
            });
            entry.generation += 1;
            entry.generation
        };
        doc.set_outline(node, HIGHLIGHT_OUTLINE);
        drop(doc);

        let document = self.document.clone();
        let highlights = self.highlights.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // Lock order matches `highlight`: document, then highlights.
            let mut doc = document.lock().await;
            let mut highlights = highlights.lock().await;
            // A newer highlight of the same node owns the revert.
            if highlights.get(&node).map(|h| h.generation) == Some(generation) {
                if let Some(highlight) = highlights.remove(&node) {
                    doc.set_outline(node, &highlight.original);
                }
            }
        });
        Ok(())
    }

    async fn dispatch_key(&self, phase: KeyPhase, stroke: &KeyStroke) -> Result<()> {
        let mut doc = self.document.lock().await;
        doc.record_dispatch(phase.event_type(), None, Some(&stroke.key));
        Ok(())
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<()> {
        self.document.lock().await.scroll_to(x, y);
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<bool> {
        let mut doc = self.document.lock().await;
        let Some(node) = Self::find(&doc, selector) else {
            return Ok(false);
        };
        if !doc.set_value(node, value) {
            // Expando property on elements without a native value
            doc.set_attribute(node, "data-value", value);
        }
        doc.record_dispatch("input", Some(node), None);
        Ok(true)
    }

    async fn attach_listeners(&self, kinds: &[EventKind]) -> Result<()> {
        let mut doc = self.document.lock().await;
        for kind in kinds {
            doc.add_listener(*kind);
        }
        Ok(())
    }

    async fn detach_listeners(&self) -> Result<()> {
        let mut doc = self.document.lock().await;
        for kind in EventKind::ALL {
            doc.remove_listener(kind);
        }
        Ok(())
    }

    async fn drain_events(&self) -> Result<Vec<DomEvent>> {
        Ok(self.pending.lock().await.drain(..).collect())
    }

    async fn show_indicator(&self, indicator: Indicator, text: &str) -> Result<()> {
        self.document.lock().await.upsert_banner(
            indicator.element_id(),
            text,
            indicator.background(),
        );
        Ok(())
    }

    async fn remove_indicator(&self, indicator: Indicator) -> Result<()> {
        self.document
            .lock()
            .await
            .remove_by_id(indicator.element_id());
        Ok(())
    }
}
