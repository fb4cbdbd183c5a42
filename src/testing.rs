//! In-memory fakes for the page, fetch, and escalation seams

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::accessor::{
    BrowserSession, ClickPath, Control, ControlKind, ProductPage, PropertyBlock, SpecificationRow,
};
use crate::download::Fetch;
use crate::error::{Error, Result};
use crate::ids::extract_ids;
use crate::readiness::Escalation;
use crate::retry::RetryPolicy;
use crate::ArchiveConfig;

/// Config with every pause set to zero
pub fn instant_config() -> ArchiveConfig {
    ArchiveConfig {
        url_template: "https://shop.test/item/{id}.html".into(),
        probe_timeout: Duration::ZERO,
        probe_pause: Duration::ZERO,
        readiness_cap: 20,
        escalate_every: 10,
        settle_delay: Duration::ZERO,
        expand_scroll_pause: Duration::ZERO,
        expand_click_pause: Duration::ZERO,
        gallery_timeout: Duration::ZERO,
        thumbnail_pause: Duration::ZERO,
        save_pdf: true,
        page_retry: RetryPolicy::constant(3, Duration::ZERO),
        download_retry: RetryPolicy::constant(5, Duration::ZERO),
    }
}

/// What one simulated product page looks like
#[derive(Debug, Clone)]
pub struct Fixture {
    /// `None` means the title never renders
    pub title: Option<String>,
    /// 1-based title probe on which the title first shows
    pub title_on_probe: u32,
    /// 1-based probe on which the not-found marker first shows
    pub not_found_on_probe: Option<u32>,
    pub blocks: Vec<PropertyBlock>,
    pub rows: Vec<SpecificationRow>,
    pub description: Option<String>,
    pub description_images: Vec<Option<String>>,
    /// Full-size `src` revealed by each thumbnail
    pub thumbnails: Vec<Option<String>>,
    /// Thumbnails whose native click is intercepted
    pub broken_native_thumbnails: Vec<usize>,
    /// Thumbnails that never swap the magnified image
    pub stuck_thumbnails: Vec<usize>,
    pub expand_controls: usize,
    pub broken_expand: Vec<usize>,
    pub markup: String,
    /// How many `markup()` calls fail before it starts working
    pub markup_failures: u32,
}

impl Fixture {
    pub fn ready(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            title_on_probe: 1,
            not_found_on_probe: None,
            blocks: Vec::new(),
            rows: Vec::new(),
            description: Some(String::new()),
            description_images: Vec::new(),
            thumbnails: Vec::new(),
            broken_native_thumbnails: Vec::new(),
            stuck_thumbnails: Vec::new(),
            expand_controls: 0,
            broken_expand: Vec::new(),
            markup: format!("<html><h1>{}</h1></html>", title),
            markup_failures: 0,
        }
    }

    pub fn not_found() -> Self {
        Self {
            title: None,
            not_found_on_probe: Some(1),
            description: None,
            markup: "<html>not found</html>".into(),
            ..Self::ready("")
        }
    }

    pub fn stuck() -> Self {
        Self {
            title: None,
            not_found_on_probe: None,
            ..Self::not_found()
        }
    }
}

/// Simulated browser tab serving one fixture per product id
#[derive(Default)]
pub struct FakePage {
    fixtures: Mutex<HashMap<u64, Fixture>>,
    current: Mutex<Option<u64>>,
    probes_since_nav: AtomicU32,
    active_thumbnail: Mutex<Option<usize>>,
    navigations: Mutex<Vec<String>>,
    clicks: Mutex<Vec<(Control, ClickPath)>>,
    scrolls: Mutex<Vec<Control>>,
    image_reads: Mutex<Vec<Option<String>>>,
    pub title_probes: AtomicU32,
    pub not_found_probes: AtomicU32,
    pub closed: AtomicU32,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, id: u64, fixture: Fixture) -> Self {
        self.fixtures.lock().unwrap().insert(id, fixture);
        self
    }

    /// A page already navigated to `id`
    pub async fn single(id: u64, fixture: Fixture) -> Self {
        let page = Self::new().with(id, fixture);
        page.navigate(&format!("https://shop.test/item/{}.html", id))
            .await
            .unwrap();
        page
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> Vec<(Control, ClickPath)> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn scrolls(&self) -> Vec<Control> {
        self.scrolls.lock().unwrap().clone()
    }

    /// The `previous` source passed to each `full_image_source` call
    pub fn image_reads(&self) -> Vec<Option<String>> {
        self.image_reads.lock().unwrap().clone()
    }

    fn with_fixture<T>(&self, f: impl FnOnce(&mut Fixture) -> T) -> Result<T> {
        let id = self
            .current
            .lock()
            .unwrap()
            .ok_or_else(|| Error::Navigation("no page loaded".into()))?;
        let mut fixtures = self.fixtures.lock().unwrap();
        let fixture = fixtures
            .entry(id)
            .or_insert_with(|| Fixture::ready(&format!("Product {}", id)));
        Ok(f(fixture))
    }
}

#[async_trait]
impl ProductPage for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let id = extract_ids(url)?
            .last()
            .copied()
            .ok_or_else(|| Error::Navigation(format!("no id in {}", url)))?;
        self.navigations.lock().unwrap().push(url.to_string());
        *self.current.lock().unwrap() = Some(id.get());
        *self.active_thumbnail.lock().unwrap() = None;
        self.probes_since_nav.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn probe_title(&self, _timeout: Duration) -> Result<Option<String>> {
        self.title_probes.fetch_add(1, Ordering::SeqCst);
        let probe = self.probes_since_nav.fetch_add(1, Ordering::SeqCst) + 1;
        self.with_fixture(|f| match &f.title {
            Some(title) if probe >= f.title_on_probe => Some(title.clone()),
            _ => None,
        })
    }

    async fn probe_not_found(&self, _timeout: Duration) -> Result<bool> {
        self.not_found_probes.fetch_add(1, Ordering::SeqCst);
        let probe = self.probes_since_nav.load(Ordering::SeqCst);
        self.with_fixture(|f| matches!(f.not_found_on_probe, Some(k) if probe >= k))
    }

    async fn title(&self) -> Result<Option<String>> {
        self.with_fixture(|f| f.title.clone())
    }

    async fn property_blocks(&self) -> Result<Vec<PropertyBlock>> {
        self.with_fixture(|f| f.blocks.clone())
    }

    async fn specification_rows(&self) -> Result<Vec<SpecificationRow>> {
        self.with_fixture(|f| f.rows.clone())
    }

    async fn description_text(&self) -> Result<Option<String>> {
        self.with_fixture(|f| f.description.clone())
    }

    async fn description_image_sources(&self) -> Result<Vec<Option<String>>> {
        self.with_fixture(|f| f.description_images.clone())
    }

    async fn count_controls(&self, kind: ControlKind) -> Result<usize> {
        self.with_fixture(|f| match kind {
            ControlKind::Expand => f.expand_controls,
            ControlKind::Thumbnail => f.thumbnails.len(),
        })
    }

    async fn wait_for_controls(&self, kind: ControlKind, _timeout: Duration) -> Result<usize> {
        self.count_controls(kind).await
    }

    async fn scroll_into_view(&self, control: Control) -> Result<()> {
        self.scrolls.lock().unwrap().push(control);
        Ok(())
    }

    async fn click(&self, control: Control, path: ClickPath) -> Result<()> {
        let (broken, stuck) = self.with_fixture(|f| match control.kind {
            ControlKind::Expand => (f.broken_expand.contains(&control.index), false),
            ControlKind::Thumbnail => (
                path == ClickPath::Native && f.broken_native_thumbnails.contains(&control.index),
                f.stuck_thumbnails.contains(&control.index),
            ),
        })?;
        if broken {
            return Err(Error::ElementNotFound(format!("{:?} #{}", control.kind, control.index)));
        }
        self.clicks.lock().unwrap().push((control, path));
        if control.kind == ControlKind::Thumbnail && !stuck {
            *self.active_thumbnail.lock().unwrap() = Some(control.index);
        }
        Ok(())
    }

    async fn full_image_source(
        &self,
        previous: Option<&str>,
        _timeout: Duration,
    ) -> Result<Option<String>> {
        self.image_reads
            .lock()
            .unwrap()
            .push(previous.map(str::to_string));
        let active = *self.active_thumbnail.lock().unwrap();
        let shown =
            self.with_fixture(|f| active.and_then(|i| f.thumbnails.get(i).cloned().flatten()))?;
        Ok(shown.filter(|src| Some(src.as_str()) != previous))
    }

    async fn markup(&self) -> Result<String> {
        self.with_fixture(|f| {
            if f.markup_failures > 0 {
                f.markup_failures -= 1;
                Err(Error::cdp("Runtime.evaluate", -32000, "Execution context was destroyed"))
            } else {
                Ok(f.markup.clone())
            }
        })?
    }

    async fn print_pdf(&self) -> Result<Vec<u8>> {
        Ok(b"%PDF-1.4 fake".to_vec())
    }
}

/// Session wrapper around a shared [`FakePage`]
pub struct FakeSession<'a> {
    pub page: &'a FakePage,
}

#[async_trait]
impl BrowserSession for FakeSession<'_> {
    fn page(&self) -> &dyn ProductPage {
        self.page
    }

    async fn close(&self) -> Result<()> {
        self.page.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Serves canned bytes per URL, optionally failing the first N requests
#[derive(Default)]
pub struct FakeFetch {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl FakeFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(self, url: &str, body: &[u8]) -> Self {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_vec());
        self
    }

    pub fn failing(self, url: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(url.to_string(), times);
        self
    }

    pub fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetch for FakeFetch {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

        if let Some(remaining) = self.failures.lock().unwrap().get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::HttpStatus {
                    url: url.to_string(),
                    status: 503,
                });
            }
        }

        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Records each escalation; optionally refuses
#[derive(Default)]
pub struct CountingEscalation {
    seen: Mutex<Vec<u32>>,
    abort: bool,
}

impl CountingEscalation {
    pub fn aborting() -> Self {
        Self {
            seen: Mutex::default(),
            abort: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn attempts(&self) -> Vec<u32> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Escalation for CountingEscalation {
    async fn escalate(&self, attempt: u32) -> Result<()> {
        self.seen.lock().unwrap().push(attempt);
        if self.abort {
            Err(Error::EscalationAborted { attempt })
        } else {
            Ok(())
        }
    }
}
