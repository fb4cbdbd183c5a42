//! Chrome-backed product page
//!
//! Every locator the archiver depends on lives here. Each [`ProductPage`]
//! read is a single `Runtime.evaluate` that returns a JSON snapshot, so the
//! DOM is walked in the page and nothing holds remote object handles.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::accessor::{
    ClickPath, Control, ControlKind, ProductPage, PropertyBlock, SpecificationRow,
};
use crate::cdp::{MouseButton, MouseEventType, Session};
use crate::error::{Error, Result};

const TITLE_XPATH: &str = "//h1[@data-pl='product-title']";
const NOT_FOUND_XPATH: &str = "//div[contains(@class, 'not-found--desc')]";
const PROPERTY_BLOCK_XPATH: &str = "//div[contains(@class, 'sku-item--property')]";
const PROPERTY_TITLE_XPATH: &str = ".//div[contains(@class, 'sku-item--title')]//span";
const PROPERTY_OPTION_XPATH: &str =
    ".//div[contains(@class, 'sku-item--skus')]//div[contains(@class, 'sku-item--')]";
const EXPAND_BUTTON_XPATH: &str = "//button[.//span[contains(text(), 'View more') or contains(text(), 'Show more')] and not(ancestor::*[contains(@class, 'review--wrap')])]";
const SPEC_ROW_CSS: &str = "ul[class^='specification--list'] > li";
const SPEC_TITLE_CSS: &str = "div[class^='specification--title'] span";
const SPEC_DESC_CSS: &str = "div[class^='specification--desc'] span";
const DESCRIPTION_ID: &str = "product-description";
const THUMBNAIL_CSS: &str = "div[class^='slider--item--']";
const FULL_IMAGE_CSS: &str = "img[class^='magnifier--image--']";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// XPath snapshot helper prepended to scripts that need it
const XPATH_HELPER: &str = "const xpath = (expr, root) => { \
    const r = document.evaluate(expr, root || document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
    const out = []; \
    for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); \
    return out; \
};";

/// Escape a string for safe use in JavaScript string literals
fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('"', "\\\"")
        .replace('`', "\\`")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace("${", "\\${")
}

/// Wrap statements in an IIFE with the XPath helper in scope
fn script(body: &str) -> String {
    format!("(() => {{ {} {} }})()", XPATH_HELPER, body)
}

/// JS expression evaluating to the array of controls of `kind`
fn controls_js(kind: ControlKind) -> String {
    match kind {
        ControlKind::Expand => format!("xpath(\"{}\")", escape_js_string(EXPAND_BUTTON_XPATH)),
        ControlKind::Thumbnail => format!(
            "Array.from(document.querySelectorAll(\"{}\"))",
            escape_js_string(THUMBNAIL_CSS)
        ),
    }
}

/// Script body binding `el` to a control, returning `missing` if it is gone
fn with_control(control: Control, missing: &str, then: &str) -> String {
    script(&format!(
        "const el = {}[{}]; if (!el) return {}; {}",
        controls_js(control.kind),
        control.index,
        missing,
        then
    ))
}

#[derive(Debug, Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

/// The product tab, driven over CDP
pub struct ChromePage {
    session: Session,
}

impl ChromePage {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Get the underlying CDP session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Evaluate JavaScript and deserialize the result (`undefined` reads as `null`)
    pub async fn evaluate<T: DeserializeOwned>(&self, expression: &str) -> Result<T> {
        let result = self.session.evaluate(expression).await?;

        if let Some(exception) = result.exception_details {
            return Err(Error::Script(exception.message()));
        }

        Ok(serde_json::from_value(
            result.result.value.unwrap_or(Value::Null),
        )?)
    }

    /// Poll `expression` until it yields a non-null value or `timeout` passes.
    ///
    /// Script errors and CDP errors count as "not yet": they are what a page
    /// in the middle of navigating produces.
    async fn wait_for_value<T: DeserializeOwned>(
        &self,
        expression: &str,
        timeout: Duration,
    ) -> Result<Option<T>> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.evaluate::<Option<T>>(expression).await {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(e @ (Error::Script(_) | Error::Cdp { .. })) => {
                    tracing::trace!("Probe not ready: {}", e);
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Press and release the left button at a viewport point
    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        self.session
            .dispatch_mouse_event(
                MouseEventType::MouseMoved,
                x,
                y,
                None,
                None,
            )
            .await?;
        self.session
            .dispatch_mouse_event(
                MouseEventType::MousePressed,
                x,
                y,
                Some(MouseButton::Left),
                Some(1),
            )
            .await?;

        tokio::time::sleep(Duration::from_millis(50)).await;

        self.session
            .dispatch_mouse_event(
                MouseEventType::MouseReleased,
                x,
                y,
                Some(MouseButton::Left),
                Some(1),
            )
            .await
    }
}

#[async_trait]
impl ProductPage for ChromePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        tracing::debug!("Navigating to {}", url);
        let result = self.session.navigate(url).await?;
        if let Some(error) = result.error_text {
            return Err(Error::Navigation(format!("{}: {}", url, error)));
        }
        // Let the old document go away before anyone probes
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    async fn probe_title(&self, timeout: Duration) -> Result<Option<String>> {
        let expr = script(&format!(
            "const h = xpath(\"{}\")[0]; return h ? h.innerText.trim() : null;",
            escape_js_string(TITLE_XPATH)
        ));
        self.wait_for_value(&expr, timeout).await
    }

    async fn probe_not_found(&self, timeout: Duration) -> Result<bool> {
        let expr = script(&format!(
            "return xpath(\"{}\").length > 0 ? true : null;",
            escape_js_string(NOT_FOUND_XPATH)
        ));
        Ok(self
            .wait_for_value::<bool>(&expr, timeout)
            .await?
            .unwrap_or(false))
    }

    async fn title(&self) -> Result<Option<String>> {
        self.probe_title(Duration::ZERO).await
    }

    async fn property_blocks(&self) -> Result<Vec<PropertyBlock>> {
        let expr = script(&format!(
            "return xpath(\"{blocks}\").map(block => {{ \
                const heading = xpath(\"{title}\", block)[0]; \
                return {{ \
                    heading: heading ? heading.innerText : \"\", \
                    options: xpath(\"{options}\", block).map(o => {{ \
                        const img = o.querySelector(\"img\"); \
                        return {{ \
                            title: o.getAttribute(\"title\"), \
                            alt: img ? img.getAttribute(\"alt\") : null, \
                            text: o.innerText || \"\" \
                        }}; \
                    }}) \
                }}; \
            }});",
            blocks = escape_js_string(PROPERTY_BLOCK_XPATH),
            title = escape_js_string(PROPERTY_TITLE_XPATH),
            options = escape_js_string(PROPERTY_OPTION_XPATH),
        ));
        self.evaluate(&expr).await
    }

    async fn specification_rows(&self) -> Result<Vec<SpecificationRow>> {
        let expr = script(&format!(
            "const texts = (li, sel) => Array.from(li.querySelectorAll(sel)).map(e => e.innerText); \
             return Array.from(document.querySelectorAll(\"{rows}\")).map(li => ({{ \
                titles: texts(li, \"{titles}\"), \
                descriptions: texts(li, \"{descs}\") \
             }}));",
            rows = escape_js_string(SPEC_ROW_CSS),
            titles = escape_js_string(SPEC_TITLE_CSS),
            descs = escape_js_string(SPEC_DESC_CSS),
        ));
        self.evaluate(&expr).await
    }

    async fn description_text(&self) -> Result<Option<String>> {
        let expr = script(&format!(
            "const d = document.getElementById(\"{}\"); return d ? d.innerText : null;",
            DESCRIPTION_ID
        ));
        self.evaluate(&expr).await
    }

    async fn description_image_sources(&self) -> Result<Vec<Option<String>>> {
        let expr = script(&format!(
            "const d = document.getElementById(\"{}\"); \
             if (!d) return []; \
             return Array.from(d.querySelectorAll(\"img\")).map(i => i.getAttribute(\"src\") ? i.src : null);",
            DESCRIPTION_ID
        ));
        self.evaluate(&expr).await
    }

    async fn count_controls(&self, kind: ControlKind) -> Result<usize> {
        let expr = script(&format!("return {}.length;", controls_js(kind)));
        self.evaluate(&expr).await
    }

    async fn wait_for_controls(&self, kind: ControlKind, timeout: Duration) -> Result<usize> {
        let expr = script(&format!(
            "const n = {}.length; return n > 0 ? n : null;",
            controls_js(kind)
        ));
        Ok(self
            .wait_for_value::<usize>(&expr, timeout)
            .await?
            .unwrap_or(0))
    }

    async fn scroll_into_view(&self, control: Control) -> Result<()> {
        let expr = with_control(
            control,
            "false",
            "el.scrollIntoView({block: 'center'}); return true;",
        );
        if !self.evaluate::<bool>(&expr).await? {
            return Err(Error::ElementNotFound(format!("{:?}", control)));
        }
        Ok(())
    }

    async fn click(&self, control: Control, path: ClickPath) -> Result<()> {
        match path {
            ClickPath::Programmatic => {
                let expr = with_control(control, "false", "el.click(); return true;");
                if !self.evaluate::<bool>(&expr).await? {
                    return Err(Error::ElementNotFound(format!("{:?}", control)));
                }
                Ok(())
            }
            ClickPath::Native => {
                let expr = with_control(
                    control,
                    "null",
                    "el.scrollIntoView({block: 'center'}); \
                     const r = el.getBoundingClientRect(); \
                     if (r.width === 0 && r.height === 0) return null; \
                     return { x: r.left + r.width / 2, y: r.top + r.height / 2 };",
                );
                let point = self
                    .evaluate::<Option<Point>>(&expr)
                    .await?
                    .ok_or_else(|| {
                        Error::ElementNotFound(format!("{:?} has no clickable box", control))
                    })?;
                self.click_at(point.x, point.y).await
            }
        }
    }

    async fn full_image_source(
        &self,
        previous: Option<&str>,
        timeout: Duration,
    ) -> Result<Option<String>> {
        self.wait_for_value(&full_image_js(previous), timeout).await
    }

    async fn markup(&self) -> Result<String> {
        self.evaluate("document.documentElement.outerHTML").await
    }

    async fn print_pdf(&self) -> Result<Vec<u8>> {
        self.session.print_to_pdf().await
    }
}

/// Magnified image `src`, or null while it is missing or still `previous`
fn full_image_js(previous: Option<&str>) -> String {
    let stale = match previous {
        Some(src) => format!(" && img.src !== \"{}\"", escape_js_string(src)),
        None => String::new(),
    };
    script(&format!(
        "const img = document.querySelector(\"{}\"); \
         return img && img.src{} ? img.src : null;",
        escape_js_string(FULL_IMAGE_CSS),
        stale
    ))
}
