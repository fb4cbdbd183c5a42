//! Gallery and description image capture
//!
//! Full-size gallery URLs only appear after the matching thumbnail is
//! clicked, so each thumbnail is activated in turn and the magnified image's
//! `src` is read back once it differs from the previous one. Description
//! images are read directly.

use std::time::Duration;

use crate::accessor::{ClickPath, Control, ControlKind, ProductPage};
use crate::download::AssetDownloader;
use crate::error::Result;
use crate::record::{ImageRole, ProductFolder};
use crate::ArchiveConfig;

/// Counts for one pass over a set of images
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageReport {
    pub found: usize,
    pub saved: usize,
    pub skipped: usize,
}

impl ImageReport {
    fn record(&mut self, saved: bool) {
        if saved {
            self.saved += 1;
        } else {
            self.skipped += 1;
        }
    }
}

pub struct GallerySaver<'a> {
    downloader: &'a AssetDownloader<'a>,
    timeout: Duration,
    pause: Duration,
}

impl<'a> GallerySaver<'a> {
    pub fn new(downloader: &'a AssetDownloader<'a>, config: &ArchiveConfig) -> Self {
        Self {
            downloader,
            timeout: config.gallery_timeout,
            pause: config.thumbnail_pause,
        }
    }

    /// Click through every thumbnail and save the full-size images as `img_NN`
    pub async fn save_gallery(
        &self,
        page: &dyn ProductPage,
        folder: &ProductFolder,
    ) -> Result<ImageReport> {
        let count = page
            .wait_for_controls(ControlKind::Thumbnail, self.timeout)
            .await?;
        tracing::debug!("Found {} thumbnail elements.", count);
        if count == 0 {
            tracing::warn!("No gallery thumbnails appeared within {:?}", self.timeout);
        }

        let mut report = ImageReport {
            found: count,
            ..ImageReport::default()
        };

        let mut previous: Option<String> = None;
        for index in 0..count {
            let ordinal = index + 1;
            let thumbnail = Control::thumbnail(index);

            page.scroll_into_view(thumbnail).await?;
            page.click(thumbnail, ClickPath::Programmatic).await?;
            if let Err(e) = page.click(thumbnail, ClickPath::Native).await {
                tracing::warn!("Native click on thumbnail {} failed: {}", ordinal, e);
            }
            tokio::time::sleep(self.pause).await;

            let url = page
                .full_image_source(previous.as_deref(), self.timeout)
                .await?;
            let saved = self
                .save(url.as_deref(), folder, ImageRole::Gallery, ordinal)
                .await;
            report.record(saved);
            if url.is_some() {
                previous = url;
            }
        }

        Ok(report)
    }

    /// Save every image embedded in the description as `desc_NN`
    pub async fn save_description_images(
        &self,
        page: &dyn ProductPage,
        folder: &ProductFolder,
    ) -> Result<ImageReport> {
        let sources = page.description_image_sources().await?;
        tracing::debug!("Found {} images in the product description.", sources.len());

        let mut report = ImageReport {
            found: sources.len(),
            ..ImageReport::default()
        };

        for (index, url) in sources.iter().enumerate() {
            let saved = self
                .save(url.as_deref(), folder, ImageRole::Description, index + 1)
                .await;
            report.record(saved);
        }

        Ok(report)
    }

    /// Download one resolved URL; every failure here is a warning
    async fn save(
        &self,
        url: Option<&str>,
        folder: &ProductFolder,
        role: ImageRole,
        ordinal: usize,
    ) -> bool {
        let url = match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => url,
            None => {
                tracing::warn!("No image URL found for {} image {}. Skipping.", role, ordinal);
                return false;
            }
        };

        tracing::info!("Downloading {} image {}: {}", role, ordinal, url);
        match self
            .downloader
            .download(url, folder.path(), &role.stem(ordinal))
            .await
        {
            Ok(path) => {
                tracing::debug!("Saved {}", path.display());
                true
            }
            Err(e) => {
                tracing::warn!("Failed to download {} image {}: {}", role, ordinal, e);
                false
            }
        }
    }
}
