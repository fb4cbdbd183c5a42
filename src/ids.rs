//! Product identifier extraction
//!
//! Identifiers are pulled out of free-form text: any run of six or more
//! digits standing on its own word boundaries.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::record::ProductId;

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[0-9]{6,}\b").expect("identifier pattern is valid"))
}

/// Where identifiers come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A file whose whole contents are scanned
    File(PathBuf),
    /// Literal text, scanned as-is
    Text(String),
}

impl InputSource {
    /// Treat `arg` as a file if one exists at that path, otherwise as literal text
    pub fn from_arg(arg: &str) -> Self {
        let path = Path::new(arg);
        if path.is_file() {
            InputSource::File(path.to_path_buf())
        } else {
            InputSource::Text(arg.to_string())
        }
    }

    /// Read the full text of the source
    pub fn read(&self) -> Result<String> {
        match self {
            InputSource::File(path) => Ok(std::fs::read_to_string(path)?),
            InputSource::Text(text) => Ok(text.clone()),
        }
    }

    /// Read the source and extract every identifier in it
    pub fn extract(&self) -> Result<Vec<ProductId>> {
        extract_ids(&self.read()?)
    }
}

/// Extract identifiers in first-seen order. Duplicates are kept.
///
/// A run too long for a [`ProductId`] rejects the whole input rather than
/// silently dropping one product.
pub fn extract_ids(text: &str) -> Result<Vec<ProductId>> {
    id_pattern()
        .find_iter(text)
        .map(|m| {
            let digits = m.as_str();
            digits
                .parse::<u64>()
                .map(ProductId::new)
                .map_err(|_| Error::InvalidInput(format!("identifier out of range: {}", digits)))
        })
        .collect()
}
