use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

use crate::messages::{Message, TabId};

/// How the coordinator reaches the pages it controls
pub trait Tabs: Send {
    /// Current url of `tab`
    fn tab_url(&self, tab: TabId) -> Result<String>;

    /// The tab playback commands go to, if any
    fn active_tab(&self) -> Option<TabId>;

    fn send(&self, tab: TabId, message: Message) -> Result<()>;
}

struct TabEntry {
    url: String,
    sender: UnboundedSender<Message>,
}

/// Tabs backed by the inbox channels of page runners
#[derive(Default)]
pub struct ChannelTabs {
    tabs: HashMap<TabId, TabEntry>,
    active: Option<TabId>,
    next_id: TabId,
}

impl ChannelTabs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page runner's inbox. The first tab opened becomes active.
    pub fn open(&mut self, url: impl Into<String>, sender: UnboundedSender<Message>) -> TabId {
        self.next_id += 1;
        let id = self.next_id;
        self.tabs.insert(
            id,
            TabEntry {
                url: url.into(),
                sender,
            },
        );
        if self.active.is_none() {
            self.active = Some(id);
        }
        log::debug!("opened tab {}", id);
        id
    }

    pub fn activate(&mut self, tab: TabId) -> bool {
        if self.tabs.contains_key(&tab) {
            self.active = Some(tab);
            true
        } else {
            false
        }
    }

    pub fn set_url(&mut self, tab: TabId, url: impl Into<String>) {
        if let Some(entry) = self.tabs.get_mut(&tab) {
            entry.url = url.into();
        }
    }

    /// Drop the tab's inbox, which ends its runner
    pub fn close(&mut self, tab: TabId) -> bool {
        let removed = self.tabs.remove(&tab).is_some();
        if self.active == Some(tab) {
            self.active = self.tabs.keys().min().copied();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }
}

impl Tabs for ChannelTabs {
    fn tab_url(&self, tab: TabId) -> Result<String> {
        self.tabs
            .get(&tab)
            .map(|entry| entry.url.clone())
            .ok_or_else(|| anyhow!("no such tab: {}", tab))
    }

    fn active_tab(&self) -> Option<TabId> {
        self.active
    }

    fn send(&self, tab: TabId, message: Message) -> Result<()> {
        let entry = self
            .tabs
            .get(&tab)
            .ok_or_else(|| anyhow!("no such tab: {}", tab))?;
        let name = message.name();
        entry
            .sender
            .send(message)
            .map_err(|_| anyhow!("tab {} is gone, {} not delivered", tab, name))
    }
}
