use anyhow::Result;
use std::time::Duration;

use super::timing::Pacing;
use crate::driver::{KeyPhase, KeyStroke, PageDriver};
use crate::model::{Action, ActionKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySettings {
    pub pacing: Pacing,
    /// How long a clicked element stays outlined
    pub highlight: Duration,
    /// Character repeated `valueLength` times to refill inputs
    pub placeholder: char,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            pacing: Pacing::default(),
            highlight: Duration::from_millis(200),
            placeholder: '*',
        }
    }
}

/// What happened to one replayed action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Executed,
    /// The selector resolved to nothing; the action was skipped
    TargetMissing(String),
    /// Recorded for completeness only (mouse moves)
    Skipped,
}

/// Apply one action to the page
pub async fn execute(
    action: &Action,
    driver: &dyn PageDriver,
    settings: &ReplaySettings,
) -> Result<StepOutcome> {
    match &action.kind {
        ActionKind::Click(click) => {
            if driver.click(&click.selector).await? {
                driver.highlight(&click.selector, settings.highlight).await?;
                Ok(StepOutcome::Executed)
            } else {
                log::warn!("click target not found: {}", click.selector);
                Ok(StepOutcome::TargetMissing(click.selector.clone()))
            }
        }
        ActionKind::KeyDown(key) => {
            driver
                .dispatch_key(KeyPhase::Down, &KeyStroke::from(key))
                .await?;
            Ok(StepOutcome::Executed)
        }
        ActionKind::KeyUp(key) => {
            driver
                .dispatch_key(KeyPhase::Up, &KeyStroke::from(key))
                .await?;
            Ok(StepOutcome::Executed)
        }
        ActionKind::Scroll(scroll) => {
            driver.scroll_to(scroll.scroll_x, scroll.scroll_y).await?;
            Ok(StepOutcome::Executed)
        }
        ActionKind::Input(input) => {
            let value: String = std::iter::repeat(settings.placeholder)
                .take(input.value_length)
                .collect();
            if driver.fill(&input.selector, &value).await? {
                Ok(StepOutcome::Executed)
            } else {
                log::warn!("input target not found: {}", input.selector);
                Ok(StepOutcome::TargetMissing(input.selector.clone()))
            }
        }
        ActionKind::MouseMove(_) => Ok(StepOutcome::Skipped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::driver::MemoryPage;
    use crate::model::{ClickAction, InputAction, KeyDownAction, Position, ScrollAction, ScrollDirection};

    fn page() -> MemoryPage {
        MemoryPage::new(
            Document::parse(
                r#"<form id="f"><input id="pw" type="password" /><button id="submit">Go</button></form>"#,
                "https://example.com/",
            )
            .unwrap(),
        )
    }

    fn click(selector: &str) -> Action {
        Action::new(
            ActionKind::Click(ClickAction {
                selector: selector.to_string(),
                tag_name: "BUTTON".to_string(),
                text: None,
                position: Position::default(),
            }),
            0,
            "https://example.com/",
        )
    }

    #[tokio::test]
    async fn test_click_found_and_missing() {
        let page = page();
        let settings = ReplaySettings::default();
        assert_eq!(
            execute(&click("#submit"), &page, &settings).await.unwrap(),
            StepOutcome::Executed
        );
        assert_eq!(
            execute(&click("#gone"), &page, &settings).await.unwrap(),
            StepOutcome::TargetMissing("#gone".to_string())
        );
    }

    #[tokio::test]
    async fn test_input_refilled_with_placeholder() {
        let page = page();
        let action = Action::new(
            ActionKind::Input(InputAction {
                selector: "#pw".to_string(),
                tag_name: "INPUT".to_string(),
                input_type: Some("insertText".to_string()),
                has_value: true,
                value_length: 6,
            }),
            0,
            "",
        );
        execute(&action, &page, &ReplaySettings::default())
            .await
            .unwrap();

        let doc = page.document();
        let doc = doc.lock().await;
        let pw = doc.get_element_by_id("pw").unwrap();
        assert_eq!(doc.value(pw), Some("******"));
    }

    #[tokio::test]
    async fn test_scroll_and_keys() {
        let page = page();
        let settings = ReplaySettings::default();
        let scroll = Action::new(
            ActionKind::Scroll(ScrollAction {
                scroll_x: 0.0,
                scroll_y: 640.0,
                scroll_direction: ScrollDirection::Down,
            }),
            0,
            "",
        );
        execute(&scroll, &page, &settings).await.unwrap();

        let key = Action::new(
            ActionKind::KeyDown(KeyDownAction {
                key: "Enter".to_string(),
                code: "Enter".to_string(),
                ctrl_key: false,
                meta_key: false,
                shift_key: false,
                alt_key: false,
            }),
            0,
            "",
        );
        execute(&key, &page, &settings).await.unwrap();

        let doc = page.document();
        let doc = doc.lock().await;
        assert_eq!(doc.scroll_position(), (0.0, 640.0));
        assert_eq!(doc.count_dispatched("keydown", None), 1);
        assert_eq!(doc.dispatched()[0].key.as_deref(), Some("Enter"));
    }
}
