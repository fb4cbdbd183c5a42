//! Asset downloads with bounded retry

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Suffix used when the URL's last segment carries none
const FALLBACK_SUFFIX: &str = "jpg";

/// Fetches raw bytes for a URL
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed [`Fetch`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::build(None)
    }

    /// Use a specific user agent (e.g. the browser's, so CDNs see one client)
    pub fn with_user_agent(user_agent: &str) -> Result<Self> {
        Self::build(Some(user_agent))
    }

    fn build(user_agent: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(10));
        if let Some(user_agent) = user_agent {
            builder = builder.user_agent(user_agent);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Strip surrounding slashes and give protocol-relative URLs a scheme
pub fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("empty image URL: {:?}", raw)));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("https://{}", trimmed))
    }
}

/// File suffix from the URL's last path segment, without query or fragment
pub fn url_suffix(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    match segment.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => ext,
        _ => FALLBACK_SUFFIX,
    }
}

/// Downloads one image into a product folder
pub struct AssetDownloader<'a> {
    fetch: &'a dyn Fetch,
    policy: &'a RetryPolicy,
}

impl<'a> AssetDownloader<'a> {
    pub fn new(fetch: &'a dyn Fetch, policy: &'a RetryPolicy) -> Self {
        Self { fetch, policy }
    }

    /// Fetch `url` and write it to `{folder}/{stem}.{suffix}`.
    ///
    /// The fetch-and-write pair is retried as a unit.
    pub async fn download(&self, url: &str, folder: &Path, stem: &str) -> Result<PathBuf> {
        let url = normalize_url(url)?;
        let path = folder.join(format!("{}.{}", stem, url_suffix(&url)));

        let fetch = self.fetch;
        let url = url.as_str();
        let target = path.as_path();
        self.policy
            .run(&format!("Download of {}", stem), |_| async move {
                let bytes = fetch.get(url).await?;
                std::fs::write(target, &bytes)?;
                Ok::<_, Error>(())
            })
            .await?;

        Ok(path)
    }
}
