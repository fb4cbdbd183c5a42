//! Page accessor capability
//!
//! The archiving pipeline never sees a selector. It talks to a product page
//! through [`ProductPage`], which answers in terms of the page's meaning
//! (title, option blocks, thumbnails) and hands back raw snapshots. The
//! Chrome-backed implementation lives in [`crate::page`]; tests plug in an
//! in-memory fake.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

/// One selectable option as it appears in the DOM
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawOption {
    /// `title` attribute of the option element
    #[serde(default)]
    pub title: Option<String>,
    /// `alt` attribute of an image inside the option
    #[serde(default)]
    pub alt: Option<String>,
    /// Visible text
    #[serde(default)]
    pub text: String,
}

/// A property block (Color, Size, ...) and its options
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PropertyBlock {
    /// Raw heading text, e.g. `"Color: Red"`
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub options: Vec<RawOption>,
}

/// One specification row; titles and descriptions pair up by index
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SpecificationRow {
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub descriptions: Vec<String>,
}

/// Interactive element families the pipeline drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// "View more" / "Show more" buttons outside the reviews section
    Expand,
    /// Gallery thumbnails
    Thumbnail,
}

/// A specific control, addressed by its document-order index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub kind: ControlKind,
    pub index: usize,
}

impl Control {
    pub fn expand(index: usize) -> Self {
        Self {
            kind: ControlKind::Expand,
            index,
        }
    }

    pub fn thumbnail(index: usize) -> Self {
        Self {
            kind: ControlKind::Thumbnail,
            index,
        }
    }
}

/// How to deliver a click
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickPath {
    /// `element.click()` from script
    Programmatic,
    /// Real mouse press/release at the element's center
    Native,
}

/// Everything the pipeline needs from a live product page.
///
/// Locators that find nothing return empty values, not errors. Errors mean
/// the page or the session itself misbehaved.
#[async_trait]
pub trait ProductPage: Send + Sync {
    /// Load `url` in the page
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait up to `timeout` for the product title; `None` on timeout
    async fn probe_title(&self, timeout: Duration) -> Result<Option<String>>;

    /// Wait up to `timeout` for the not-found marker
    async fn probe_not_found(&self, timeout: Duration) -> Result<bool>;

    /// Current title text without waiting
    async fn title(&self) -> Result<Option<String>>;

    async fn property_blocks(&self) -> Result<Vec<PropertyBlock>>;

    async fn specification_rows(&self) -> Result<Vec<SpecificationRow>>;

    /// Text of the description container, `None` if it is absent
    async fn description_text(&self) -> Result<Option<String>>;

    /// `src` of every image inside the description container, in order
    async fn description_image_sources(&self) -> Result<Vec<Option<String>>>;

    /// Number of controls of `kind` currently in the DOM
    async fn count_controls(&self, kind: ControlKind) -> Result<usize>;

    /// Wait up to `timeout` for at least one control of `kind`; returns the count (0 on timeout)
    async fn wait_for_controls(&self, kind: ControlKind, timeout: Duration) -> Result<usize>;

    async fn scroll_into_view(&self, control: Control) -> Result<()>;

    async fn click(&self, control: Control, path: ClickPath) -> Result<()>;

    /// Wait up to `timeout` for the full-size gallery image to show a `src`
    /// other than `previous`. `None` if it never swaps.
    async fn full_image_source(
        &self,
        previous: Option<&str>,
        timeout: Duration,
    ) -> Result<Option<String>>;

    /// Current rendered markup
    async fn markup(&self) -> Result<String>;

    /// Print the page to PDF
    async fn print_pdf(&self) -> Result<Vec<u8>>;
}

/// A browser session that owns one product page for the whole run
#[async_trait]
pub trait BrowserSession: Send + Sync {
    fn page(&self) -> &dyn ProductPage;

    /// Release the session. Safe to call once at the end of a run.
    async fn close(&self) -> Result<()>;
}
