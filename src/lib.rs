//! # product-archiver
//!
//! Archive e-commerce product pages through a real Chrome session.
//!
//! For every numeric product identifier, the archiver loads the product page,
//! waits for it to settle (escalating to an operator when a captcha wall is
//! suspected), expands lazily-rendered sections, extracts the title, options,
//! specifications, and description, and writes one self-contained folder:
//! `info.json`, `page.html`, `print.pdf`, plus every gallery and description
//! image.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use product_archiver::{
//!     ArchiveConfig, Browser, BrowserConfig, HttpFetcher, InputSource, ProductArchiver,
//!     RunOptions, ScrapeRunner, TerminalPrompt,
//! };
//!
//! #[tokio::main]
//! async fn main() -> product_archiver::Result<()> {
//!     let ids = InputSource::from_arg("1005006123456 1005006654321").extract()?;
//!
//!     let browser = Browser::launch(BrowserConfig::default()).await?;
//!     let archiver = ProductArchiver::new(
//!         ArchiveConfig::default(),
//!         Arc::new(HttpFetcher::new()?),
//!         Arc::new(TerminalPrompt),
//!     );
//!
//!     let summary = ScrapeRunner::new(browser, archiver, "products", RunOptions::default())
//!         .run(ids)
//!         .await?;
//!     println!("{} archived", summary.archived);
//!     Ok(())
//! }
//! ```

use std::time::Duration;

pub mod accessor;
pub mod archiver;
pub mod browser;
pub mod cdp;
pub mod download;
pub mod error;
pub mod expand;
pub mod extract;
pub mod gallery;
pub mod ids;
pub mod page;
pub mod readiness;
pub mod record;
pub mod retry;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use accessor::{BrowserSession, ClickPath, Control, ControlKind, ProductPage};
pub use archiver::{Outcome, ProductArchiver};
pub use browser::Browser;
pub use download::{AssetDownloader, Fetch, HttpFetcher};
pub use error::{Error, Result};
pub use expand::ContentExpander;
pub use extract::FieldExtractor;
pub use gallery::{GallerySaver, ImageReport};
pub use ids::{extract_ids, InputSource};
pub use page::ChromePage;
pub use readiness::{Escalation, Readiness, ReadinessDetector, TerminalPrompt, Unattended};
pub use record::{ProductFolder, ProductId, ProductRecord};
pub use retry::{Backoff, RetryPolicy};
pub use runner::{RunOptions, RunState, RunSummary, ScrapeRunner};

/// Configuration for the Chrome session
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Headless mode. Off by default: captcha walls need a visible window.
    pub headless: bool,
    /// Path to Chrome/Chromium binary (None = search well-known locations)
    pub chrome_path: Option<String>,
    /// Custom user agent (None = Chrome's own)
    pub user_agent: Option<String>,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Extra command-line switches
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_path: None,
            user_agent: None,
            viewport_width: 1920,
            viewport_height: 1080,
            extra_args: Vec::new(),
        }
    }
}

impl BrowserConfig {
    /// Create a headless config
    pub fn headless() -> Self {
        Self {
            headless: true,
            ..Default::default()
        }
    }
}

/// Per-identifier timing, limits, and retry policies
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Product URL with an `{id}` placeholder
    pub url_template: String,
    /// Bound on each title / not-found probe
    pub probe_timeout: Duration,
    /// Pause between a failed title probe and the not-found probe
    pub probe_pause: Duration,
    /// Failed readiness attempts before giving up on the page
    pub readiness_cap: u32,
    /// Ask the operator for help every this many failed attempts (0 = never)
    pub escalate_every: u32,
    /// Pause after readiness before expanding sections
    pub settle_delay: Duration,
    pub expand_scroll_pause: Duration,
    pub expand_click_pause: Duration,
    /// Bound on waiting for thumbnails and each full-size image
    pub gallery_timeout: Duration,
    /// Pause after clicking a thumbnail
    pub thumbnail_pause: Duration,
    /// Also save `print.pdf`
    pub save_pdf: bool,
    /// Retry for the whole per-identifier pipeline
    pub page_retry: RetryPolicy,
    /// Retry for a single image download
    pub download_retry: RetryPolicy,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            url_template: "https://vi.aliexpress.com/item/{id}.html".into(),
            probe_timeout: Duration::from_secs(5),
            probe_pause: Duration::from_millis(500),
            readiness_cap: 200,
            escalate_every: 10,
            settle_delay: Duration::from_millis(500),
            expand_scroll_pause: Duration::from_millis(500),
            expand_click_pause: Duration::from_secs(1),
            gallery_timeout: Duration::from_secs(10),
            thumbnail_pause: Duration::from_millis(500),
            save_pdf: true,
            page_retry: RetryPolicy::constant(3, Duration::from_secs(10)),
            download_retry: RetryPolicy::exponential(5, Duration::from_secs(1)),
        }
    }
}

impl ArchiveConfig {
    /// URL of the product page for `id`
    pub fn product_url(&self, id: ProductId) -> String {
        self.url_template.replace("{id}", &id.to_string())
    }

    /// Upper bound on automated waiting for one identifier, excluding
    /// operator time and the pipeline after readiness
    pub fn worst_case_readiness(&self) -> Duration {
        let per_attempt = self.probe_timeout * 2 + self.probe_pause;
        let per_page = per_attempt * self.readiness_cap;
        let retries = self.page_retry.max_attempts.max(1);
        per_page * retries + self.page_retry.base_delay * retries.saturating_sub(1)
    }
}
