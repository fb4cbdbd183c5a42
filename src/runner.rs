//! Run loop over an identifier list
//!
//! The runner is the only component that lives across identifiers. It owns
//! the browser session and the set of identifiers already handled in this
//! run, and closes the session whatever happens.

use std::collections::HashSet;
use std::path::PathBuf;

use rand::seq::SliceRandom;

use crate::accessor::BrowserSession;
use crate::archiver::{Outcome, ProductArchiver};
use crate::error::Result;
use crate::record::ProductId;

/// Identifiers already handled in this process
#[derive(Debug, Clone, Default)]
pub struct RunState {
    done: HashSet<ProductId>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self, id: ProductId) -> bool {
        self.done.contains(&id)
    }

    /// Returns false if `id` was already recorded
    pub fn mark_done(&mut self, id: ProductId) -> bool {
        self.done.insert(id)
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }
}

/// Knobs for the run loop
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Shuffle identifiers before processing
    pub shuffle: bool,
    /// Log a failed identifier and move on instead of ending the run
    pub continue_on_error: bool,
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub archived: usize,
    pub not_found: usize,
    pub skipped_duplicates: usize,
    pub failed: Vec<ProductId>,
}

/// Drives [`ProductArchiver`] over a list of identifiers with one session
pub struct ScrapeRunner<S: BrowserSession> {
    session: S,
    archiver: ProductArchiver,
    save_root: PathBuf,
    options: RunOptions,
    state: RunState,
}

impl<S: BrowserSession> ScrapeRunner<S> {
    pub fn new(
        session: S,
        archiver: ProductArchiver,
        save_root: impl Into<PathBuf>,
        options: RunOptions,
    ) -> Self {
        Self {
            session,
            archiver,
            save_root: save_root.into(),
            options,
            state: RunState::new(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Process every identifier, then close the session.
    ///
    /// Unless `continue_on_error` is set, the first identifier that exhausts
    /// its retries ends the run with that error; folders already written stay.
    pub async fn run(mut self, mut ids: Vec<ProductId>) -> Result<RunSummary> {
        tracing::info!("Starting scrape of {} product IDs...", ids.len());
        if self.options.shuffle {
            ids.shuffle(&mut rand::thread_rng());
        }

        let result = self.process(&ids).await;

        if let Err(e) = self.session.close().await {
            tracing::warn!("Failed to close browser session: {}", e);
        }

        let summary = result?;
        tracing::info!(
            "Finished scrape: {} archived, {} not found, {} duplicates skipped, {} failed",
            summary.archived,
            summary.not_found,
            summary.skipped_duplicates,
            summary.failed.len()
        );
        Ok(summary)
    }

    async fn process(&mut self, ids: &[ProductId]) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for &id in ids {
            if self.state.is_done(id) {
                tracing::info!("Skipping already processed product ID: {}", id);
                summary.skipped_duplicates += 1;
                continue;
            }

            match self
                .archiver
                .archive(self.session.page(), id, &self.save_root)
                .await
            {
                Ok(Outcome::Archived { .. }) => summary.archived += 1,
                Ok(Outcome::NotFound) => summary.not_found += 1,
                Err(e) if self.options.continue_on_error => {
                    tracing::error!("Giving up on product {}: {}", id, e);
                    summary.failed.push(id);
                    continue;
                }
                Err(e) => {
                    tracing::error!("Giving up on product {}; stopping the run: {}", id, e);
                    return Err(e);
                }
            }
            self.state.mark_done(id);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::{instant_config, CountingEscalation, FakeFetch, FakePage, FakeSession, Fixture};
    use crate::ArchiveConfig;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn ids(values: &[u64]) -> Vec<ProductId> {
        values.iter().copied().map(ProductId::new).collect()
    }

    fn runner<'a>(
        page: &'a FakePage,
        root: &std::path::Path,
        config: ArchiveConfig,
        options: RunOptions,
    ) -> ScrapeRunner<FakeSession<'a>> {
        let archiver = ProductArchiver::new(
            config,
            Arc::new(FakeFetch::new()),
            Arc::new(CountingEscalation::default()),
        );
        ScrapeRunner::new(FakeSession { page }, archiver, root, options)
    }

    #[test]
    fn test_run_state() {
        let mut state = RunState::new();
        assert!(state.mark_done(ProductId::new(111111)));
        assert!(!state.mark_done(ProductId::new(111111)));
        assert!(state.is_done(ProductId::new(111111)));
        assert_eq!(state.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_processed_once() {
        let root = tempfile::tempdir().unwrap();
        let page = FakePage::new();
        let input = crate::ids::extract_ids("111111 222222 111111").unwrap();

        let summary = runner(&page, root.path(), instant_config(), RunOptions::default())
            .run(input)
            .await
            .unwrap();

        assert_eq!(
            page.navigations(),
            vec![
                "https://shop.test/item/111111.html",
                "https://shop.test/item/222222.html"
            ]
        );
        assert_eq!(summary.archived, 2);
        assert_eq!(summary.skipped_duplicates, 1);
        assert!(root.path().join("111111/info.json").exists());
        assert!(root.path().join("222222/info.json").exists());
        assert_eq!(page.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_counts_as_done() {
        let root = tempfile::tempdir().unwrap();
        let page = FakePage::new().with(333333, Fixture::not_found());

        let summary = runner(&page, root.path(), instant_config(), RunOptions::default())
            .run(ids(&[333333, 333333]))
            .await
            .unwrap();

        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.skipped_duplicates, 1);
        assert_eq!(page.navigations().len(), 1);
        assert!(!root.path().join("333333/page.html").exists());
    }

    #[tokio::test]
    async fn test_fatal_identifier_stops_run_and_closes_session() {
        let root = tempfile::tempdir().unwrap();
        let page = FakePage::new().with(500002, Fixture::stuck());
        let config = ArchiveConfig {
            readiness_cap: 1,
            ..instant_config()
        };

        let err = runner(&page, root.path(), config, RunOptions::default())
            .run(ids(&[500001, 500002, 500003]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RetryExhausted { .. }));
        assert!(root.path().join("500001/info.json").exists());
        assert!(!root.path().join("500003").exists());
        assert_eq!(page.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_continue_on_error_skips_failed_identifier() {
        let root = tempfile::tempdir().unwrap();
        let page = FakePage::new().with(500002, Fixture::stuck());
        let config = ArchiveConfig {
            readiness_cap: 1,
            ..instant_config()
        };
        let options = RunOptions {
            continue_on_error: true,
            ..RunOptions::default()
        };

        let summary = runner(&page, root.path(), config, options)
            .run(ids(&[500001, 500002, 500003]))
            .await
            .unwrap();

        assert_eq!(summary.archived, 2);
        assert_eq!(summary.failed, ids(&[500002]));
        assert!(root.path().join("500003/info.json").exists());
    }

    #[tokio::test]
    async fn test_shuffle_keeps_every_identifier() {
        let root = tempfile::tempdir().unwrap();
        let page = FakePage::new();
        let options = RunOptions {
            shuffle: true,
            ..RunOptions::default()
        };

        let summary = runner(&page, root.path(), instant_config(), options)
            .run(ids(&[600001, 600002, 600003, 600004]))
            .await
            .unwrap();

        assert_eq!(summary.archived, 4);
        let mut seen = page.navigations();
        seen.sort();
        assert_eq!(seen.len(), 4);
        assert!(seen[0].ends_with("600001.html"));
    }
}
