//! Expands lazily-rendered sections ("View more" / "Show more")

use std::time::Duration;

use crate::accessor::{ClickPath, Control, ControlKind, ProductPage};
use crate::ArchiveConfig;

/// Clicks every expand control so the full text lands in the DOM
#[derive(Debug, Clone)]
pub struct ContentExpander {
    scroll_pause: Duration,
    click_pause: Duration,
}

impl ContentExpander {
    pub fn new(scroll_pause: Duration, click_pause: Duration) -> Self {
        Self {
            scroll_pause,
            click_pause,
        }
    }

    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self::new(config.expand_scroll_pause, config.expand_click_pause)
    }

    /// Click all expand controls. Never fails; returns how many clicks landed.
    ///
    /// Controls are clicked last to first: an expanded button may drop out
    /// of the DOM, which only shifts the indexes after it.
    pub async fn expand(&self, page: &dyn ProductPage) -> usize {
        let count = match page.count_controls(ControlKind::Expand).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Error finding \"View more\" buttons: {}", e);
                return 0;
            }
        };

        tracing::debug!("Found {} \"View more\" button(s).", count);
        if count == 0 {
            tracing::warn!("No \"View more\" buttons found on the page.");
            return 0;
        }

        let mut clicked = 0;
        for index in (0..count).rev() {
            let control = Control::expand(index);
            let result = async {
                page.scroll_into_view(control).await?;
                tokio::time::sleep(self.scroll_pause).await;
                page.click(control, ClickPath::Native).await?;
                tokio::time::sleep(self.click_pause).await;
                crate::Result::Ok(())
            }
            .await;

            match result {
                Ok(()) => {
                    clicked += 1;
                    tracing::debug!("Clicked \"View more\" button #{}", index + 1);
                }
                Err(e) => tracing::warn!("Could not click button #{}: {}", index + 1, e),
            }
        }
        clicked
    }
}
