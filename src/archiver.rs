//! Per-identifier archiving pipeline
//!
//! navigate -> readiness -> expand -> extract -> info.json -> page.html ->
//! print.pdf -> gallery images -> description images
//!
//! The whole pipeline is retried as a unit: a stale DOM or a network blip
//! halfway through is cheaper to recover from by starting over.

use std::path::Path;
use std::sync::Arc;

use crate::accessor::ProductPage;
use crate::download::{AssetDownloader, Fetch};
use crate::error::Result;
use crate::expand::ContentExpander;
use crate::extract::FieldExtractor;
use crate::gallery::{GallerySaver, ImageReport};
use crate::readiness::{Escalation, Readiness, ReadinessDetector};
use crate::record::{ProductFolder, ProductId, ProductRecord};
use crate::ArchiveConfig;

/// How one identifier ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Archived {
        title: String,
        gallery: ImageReport,
        description: ImageReport,
    },
    NotFound,
}

/// Archives one product page into its folder
pub struct ProductArchiver {
    config: ArchiveConfig,
    fetch: Arc<dyn Fetch>,
    escalation: Arc<dyn Escalation>,
}

impl ProductArchiver {
    pub fn new(config: ArchiveConfig, fetch: Arc<dyn Fetch>, escalation: Arc<dyn Escalation>) -> Self {
        Self {
            config,
            fetch,
            escalation,
        }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Archive `product_id` under `save_root`, retrying the whole pipeline
    pub async fn archive(
        &self,
        page: &dyn ProductPage,
        product_id: ProductId,
        save_root: &Path,
    ) -> Result<Outcome> {
        self.config
            .page_retry
            .run(&format!("Product {}", product_id), |attempt| async move {
                if attempt > 1 {
                    tracing::info!("Restarting product {} (attempt {})", product_id, attempt);
                }
                self.archive_once(page, product_id, save_root).await
            })
            .await
    }

    async fn archive_once(
        &self,
        page: &dyn ProductPage,
        product_id: ProductId,
        save_root: &Path,
    ) -> Result<Outcome> {
        let url = self.config.product_url(product_id);
        tracing::info!("Loading product info from {}", url);
        page.navigate(&url).await?;

        let folder = ProductFolder::create(save_root, product_id)?;

        let detector = ReadinessDetector::from_config(&self.config);
        let title = match detector.wait(page, self.escalation.as_ref()).await? {
            Readiness::Ready(title) => title,
            Readiness::NotFound => {
                tracing::error!("Product ID {} not found. Skipping.", product_id);
                folder.write_record(&ProductRecord::not_found(product_id))?;
                return Ok(Outcome::NotFound);
            }
        };

        tokio::time::sleep(self.config.settle_delay).await;
        ContentExpander::from_config(&self.config)
            .expand(page)
            .await;

        let record = FieldExtractor.extract(page, product_id, &title).await?;
        folder.write_record(&record)?;
        tracing::debug!("Product info saved.");

        folder.write_markup(&page.markup().await?)?;

        if self.config.save_pdf {
            folder.write_pdf(&page.print_pdf().await?)?;
        }

        let downloader = AssetDownloader::new(self.fetch.as_ref(), &self.config.download_retry);
        let saver = GallerySaver::new(&downloader, &self.config);
        let gallery = saver.save_gallery(page, &folder).await?;
        let description = saver.save_description_images(page, &folder).await?;

        tracing::info!(
            "Archived {} ({} gallery, {} description images)",
            product_id,
            gallery.saved,
            description.saved
        );

        Ok(Outcome::Archived {
            title: record.title,
            gallery,
            description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::SpecificationRow;
    use crate::error::Error;
    use crate::testing::{instant_config, CountingEscalation, FakeFetch, FakePage, Fixture};

    fn archiver(config: ArchiveConfig, fetch: FakeFetch) -> ProductArchiver {
        ProductArchiver::new(config, Arc::new(fetch), Arc::new(CountingEscalation::default()))
    }

    #[tokio::test]
    async fn test_archives_full_folder() {
        let root = tempfile::tempdir().unwrap();
        let page = FakePage::new().with(
            400001,
            Fixture {
                rows: vec![SpecificationRow {
                    titles: vec!["Brand".into()],
                    descriptions: vec!["Acme".into()],
                }],
                thumbnails: vec![Some("https://cdn.test/1.jpg".into())],
                description_images: vec![Some("https://cdn.test/d.gif".into())],
                expand_controls: 2,
                ..Fixture::ready("Toaster")
            },
        );
        let fetch = FakeFetch::new()
            .serve("https://cdn.test/1.jpg", b"1")
            .serve("https://cdn.test/d.gif", b"d");

        let outcome = archiver(instant_config(), fetch)
            .archive(&page, ProductId::new(400001), root.path())
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Archived { ref title, .. } if title == "Toaster"));
        let folder = root.path().join("400001");
        for file in ["info.json", "page.html", "print.pdf", "img_01.jpg", "desc_01.gif"] {
            assert!(folder.join(file).exists(), "missing {}", file);
        }

        let record: ProductRecord =
            serde_json::from_slice(&std::fs::read(folder.join("info.json")).unwrap()).unwrap();
        assert_eq!(record.specifications.get("Brand").unwrap(), "Acme");
        assert_eq!(page.navigations(), vec!["https://shop.test/item/400001.html"]);
    }

    #[tokio::test]
    async fn test_not_found_writes_only_record() {
        let root = tempfile::tempdir().unwrap();
        let page = FakePage::new().with(333333, Fixture::not_found());

        let outcome = archiver(instant_config(), FakeFetch::new())
            .archive(&page, ProductId::new(333333), root.path())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::NotFound);
        let folder = root.path().join("333333");
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(folder.join("info.json")).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "product_id": 333333,
                "title": "Not Found",
                "options": {},
                "specifications": {},
                "description": "",
            })
        );
        assert!(!folder.join("page.html").exists());
        assert!(!folder.join("print.pdf").exists());
        assert_eq!(std::fs::read_dir(&folder).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_mid_pipeline_failure_restarts_from_navigation() {
        let root = tempfile::tempdir().unwrap();
        let page = FakePage::new().with(
            400002,
            Fixture {
                markup_failures: 1,
                ..Fixture::ready("Blender")
            },
        );

        let outcome = archiver(instant_config(), FakeFetch::new())
            .archive(&page, ProductId::new(400002), root.path())
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Archived { .. }));
        assert_eq!(page.navigations().len(), 2);
        assert!(root.path().join("400002/page.html").exists());
    }

    #[tokio::test]
    async fn test_stuck_page_exhausts_budget() {
        let root = tempfile::tempdir().unwrap();
        let page = FakePage::new().with(400003, Fixture::stuck());
        let config = ArchiveConfig {
            readiness_cap: 4,
            ..instant_config()
        };

        let err = archiver(config, FakeFetch::new())
            .archive(&page, ProductId::new(400003), root.path())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RetryExhausted { attempts: 3, .. }));
        assert_eq!(page.navigations().len(), 3);
        // counters reset with each outer attempt
        assert_eq!(
            page.title_probes.load(std::sync::atomic::Ordering::SeqCst),
            12
        );
    }

    #[tokio::test]
    async fn test_pdf_optional() {
        let root = tempfile::tempdir().unwrap();
        let page = FakePage::new().with(400004, Fixture::ready("Mug"));
        let config = ArchiveConfig {
            save_pdf: false,
            ..instant_config()
        };

        archiver(config, FakeFetch::new())
            .archive(&page, ProductId::new(400004), root.path())
            .await
            .unwrap();

        assert!(root.path().join("400004/page.html").exists());
        assert!(!root.path().join("400004/print.pdf").exists());
    }
}
