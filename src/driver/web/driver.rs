//! Page driver for a live Chromium page, using Playwright
//!
//! Capture runs through a small in-page shim (`capture_shim.js`) that queues
//! raw events with their target's ancestor chain; the runner drains the queue
//! on a short poll interval. All normalization happens on the Rust side.

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use playwright::api::{Browser, BrowserContext, Page, Viewport};
use playwright::Playwright;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::dom::{DomEvent, EventKind};
use crate::driver::memory::HIGHLIGHT_OUTLINE;
use crate::driver::traits::{Indicator, KeyPhase, KeyStroke, PageDriver};

const CAPTURE_SHIM: &str = include_str!("capture_shim.js");

/// Browser launch configuration
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Explicit browser binary; discovered when `None`
    pub executable: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        let headless = std::env::var("BROWSER_RECORDER_HEADLESS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            headless,
            viewport_width: 1280,
            viewport_height: 720,
            executable: None,
        }
    }
}

/// A single Chromium page
pub struct BrowserPage {
    #[allow(dead_code)]
    playwright: Arc<Playwright>,
    #[allow(dead_code)]
    browser: Arc<Browser>,
    #[allow(dead_code)]
    context: Arc<BrowserContext>,
    page: Arc<Mutex<Page>>,
    /// Set once the shim went missing while listening, to warn only once
    shim_lost: AtomicBool,
}

impl BrowserPage {
    /// Launch Chromium and open a blank page
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let playwright = Playwright::initialize()
            .await
            .context("Failed to initialize Playwright")?;

        let chromium = playwright.chromium();
        let browser = launch_chromium(&chromium, &config).await?;
        let context = browser.context_builder().build().await?;
        let page = context.new_page().await?;

        page.set_viewport_size(Viewport {
            width: config.viewport_width as i32,
            height: config.viewport_height as i32,
        })
        .await?;

        Ok(Self {
            playwright: Arc::new(playwright),
            browser: Arc::new(browser),
            context: Arc::new(context),
            page: Arc::new(Mutex::new(page)),
            shim_lost: AtomicBool::new(false),
        })
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        let page = self.page.lock().await;
        page.goto_builder(url)
            .goto()
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        Ok(())
    }

    /// Run `js` against the first element matching `selector`. Returns
    /// false when the selector matches nothing or cannot be parsed.
    async fn with_element(&self, selector: &str, js: &str) -> Result<bool> {
        let page = self.page.lock().await;
        let handle = match page.query_selector(selector).await {
            Ok(handle) => handle,
            Err(e) => {
                log::debug!("selector `{}` rejected by the page: {}", selector, e);
                None
            }
        };
        match handle {
            Some(handle) => {
                page.evaluate::<_, ()>(js, handle).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl PageDriver for BrowserPage {
    fn driver_name(&self) -> &str {
        "chromium"
    }

    async fn location(&self) -> Result<String> {
        let page = self.page.lock().await;
        let href: String = page.evaluate("() => window.location.href", ()).await?;
        Ok(href)
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let page = self.page.lock().await;
        Ok(matches!(page.query_selector(selector).await, Ok(Some(_))))
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        self.with_element(selector, "el => el.click()").await
    }

    async fn highlight(&self, selector: &str, duration: Duration) -> Result<()> {
        let js = format!(
            "el => {{ \
               const h = el.__browserRecorderHighlight || \
                 (el.__browserRecorderHighlight = {{ original: el.style.outline, pending: 0 }}); \
               h.pending += 1; \
               el.style.outline = '{}'; \
               setTimeout(() => {{ \
                 h.pending -= 1; \
                 if (h.pending === 0) {{ \
                   el.style.outline = h.original; \
                   delete el.__browserRecorderHighlight; \
                 }} \
               }}, {}); \
             }}",
            HIGHLIGHT_OUTLINE,
            duration.as_millis()
        );
        self.with_element(selector, &js).await?;
        Ok(())
    }

    async fn dispatch_key(&self, phase: KeyPhase, stroke: &KeyStroke) -> Result<()> {
        let js = format!(
            "s => document.dispatchEvent(new KeyboardEvent('{}', {{ key: s.key, code: s.code, \
             ctrlKey: s.ctrlKey, metaKey: s.metaKey, shiftKey: s.shiftKey, altKey: s.altKey, \
             bubbles: true }}))",
            phase.event_type()
        );
        let page = self.page.lock().await;
        page.evaluate::<_, ()>(&js, stroke.clone()).await?;
        Ok(())
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<()> {
        let page = self.page.lock().await;
        let js = format!("window.scrollTo({}, {})", x, y);
        page.evaluate::<_, ()>(&js, ()).await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<bool> {
        let js = format!(
            "el => {{ el.value = {}; el.dispatchEvent(new Event('input', {{ bubbles: true }})); }}",
            serde_json::to_string(value)?
        );
        self.with_element(selector, &js).await
    }

    async fn attach_listeners(&self, kinds: &[EventKind]) -> Result<()> {
        let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        let page = self.page.lock().await;
        page.evaluate::<_, ()>(CAPTURE_SHIM, ()).await?;
        let js = format!(
            "window.__browserRecorder.attach({})",
            serde_json::to_string(&names)?
        );
        page.evaluate::<_, ()>(&js, ()).await?;
        self.shim_lost.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn detach_listeners(&self) -> Result<()> {
        let page = self.page.lock().await;
        page.evaluate::<_, ()>(
            "window.__browserRecorder && window.__browserRecorder.detach()",
            (),
        )
        .await?;
        Ok(())
    }

    async fn drain_events(&self) -> Result<Vec<DomEvent>> {
        let page = self.page.lock().await;
        let raw: serde_json::Value = page
            .evaluate(
                "() => window.__browserRecorder ? window.__browserRecorder.drain() : null",
                (),
            )
            .await?;
        drop(page);

        let Some(items) = raw.as_array() else {
            // The shim does not survive navigation.
            if !self.shim_lost.swap(true, Ordering::Relaxed) {
                log::warn!("capture shim missing from page; events after navigation are lost");
            }
            return Ok(Vec::new());
        };

        let mut events = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<DomEvent>(item.clone()) {
                Ok(event) => events.push(event),
                Err(e) => log::warn!("skipping malformed page event: {}", e),
            }
        }
        Ok(events)
    }

    async fn show_indicator(&self, indicator: Indicator, text: &str) -> Result<()> {
        let js = format!(
            r#"() => {{
                let el = document.getElementById('{id}');
                if (!el) {{
                    el = document.createElement('div');
                    el.id = '{id}';
                    el.style.cssText = '{style}';
                    document.body.appendChild(el);
                }}
                el.textContent = {text};
            }}"#,
            id = indicator.element_id(),
            style = indicator_style(indicator),
            text = serde_json::to_string(text)?
        );
        let page = self.page.lock().await;
        page.evaluate::<_, ()>(&js, ()).await?;
        Ok(())
    }

    async fn remove_indicator(&self, indicator: Indicator) -> Result<()> {
        let js = format!(
            "() => {{ const el = document.getElementById('{}'); if (el) el.remove(); }}",
            indicator.element_id()
        );
        let page = self.page.lock().await;
        page.evaluate::<_, ()>(&js, ()).await?;
        Ok(())
    }
}

fn indicator_style(indicator: Indicator) -> String {
    format!(
        "position: fixed; top: 10px; right: 10px; background: {}; color: white; \
         padding: 5px 10px; border-radius: 4px; font-size: 12px; font-weight: bold; \
         z-index: 2147483647; font-family: Arial, sans-serif; \
         box-shadow: 0 2px 4px rgba(0,0,0,0.3);",
        indicator.background()
    )
}

async fn launch_chromium(
    chromium: &playwright::api::BrowserType,
    config: &BrowserConfig,
) -> Result<Browser> {
    let mut launcher = chromium.launcher();
    launcher = launcher.headless(config.headless);

    let env_path = std::env::var("PLAYWRIGHT_CHROMIUM_EXECUTABLE_PATH")
        .ok()
        .map(PathBuf::from);

    let executable = config
        .executable
        .clone()
        .or(env_path)
        .or_else(find_system_browser);

    if let Some(ref path) = executable {
        println!("{} Using browser: {}", "🌐".blue(), path.display());
        launcher = launcher.executable(path);
    } else {
        println!(
            "{} No browser executable found. Attempting default launch...",
            "ℹ".blue()
        );
    }

    let args: Vec<String> = [
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-dev-shm-usage",
        "--disable-gpu",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    launcher = launcher.args(&args);
    launcher.launch().await.context("Failed to launch Chromium")
}

fn find_system_browser() -> Option<PathBuf> {
    let common_paths = [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
    ];

    for path in common_paths {
        let p = std::path::Path::new(path);
        if p.exists() {
            return Some(p.to_path_buf());
        }
    }

    ["google-chrome", "chromium", "chromium-browser"]
        .iter()
        .find_map(|name| which::which(name).ok())
}
