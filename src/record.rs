//! Product records and their on-disk folders
//!
//! One identifier maps to one folder under the save root:
//!
//! ```text
//! {save_root}/{product_id}/info.json
//! {save_root}/{product_id}/page.html
//! {save_root}/{product_id}/print.pdf
//! {save_root}/{product_id}/img_NN.ext
//! {save_root}/{product_id}/desc_NN.ext
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Title recorded for identifiers whose page reports non-existence
pub const NOT_FOUND_TITLE: &str = "Not Found";

/// Numeric product identifier (6+ digits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(u64);

impl ProductId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Insertion-ordered string map, serialized as a JSON object
pub type Fields<V> = IndexMap<String, V>;

/// Everything extracted from one product page (serialized as `info.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: ProductId,
    pub title: String,
    /// Option name -> option values, in page order
    pub options: Fields<Vec<String>>,
    /// Specification name -> value; names are unique
    pub specifications: Fields<String>,
    pub description: String,
}

impl ProductRecord {
    /// The record persisted when the page signals that the product does not exist
    pub fn not_found(product_id: ProductId) -> Self {
        Self {
            product_id,
            title: NOT_FOUND_TITLE.to_string(),
            options: Fields::new(),
            specifications: Fields::new(),
            description: String::new(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.title == NOT_FOUND_TITLE
            && self.options.is_empty()
            && self.specifications.is_empty()
            && self.description.is_empty()
    }
}

/// Naming prefix for downloaded images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    /// Full-size gallery image revealed by a thumbnail
    Gallery,
    /// Image embedded in the description container
    Description,
}

impl ImageRole {
    pub fn prefix(self) -> &'static str {
        match self {
            ImageRole::Gallery => "img",
            ImageRole::Description => "desc",
        }
    }

    /// File stem for the 1-based `ordinal`, e.g. `img_01`
    pub fn stem(self, ordinal: usize) -> String {
        format!("{}_{:02}", self.prefix(), ordinal)
    }
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Gallery => f.write_str("gallery"),
            ImageRole::Description => f.write_str("description"),
        }
    }
}

/// On-disk folder for one product. Created idempotently, never deleted.
#[derive(Debug, Clone)]
pub struct ProductFolder {
    path: PathBuf,
}

impl ProductFolder {
    pub const INFO_FILE: &'static str = "info.json";
    pub const PAGE_FILE: &'static str = "page.html";
    pub const PDF_FILE: &'static str = "print.pdf";

    /// Create `{save_root}/{product_id}/` if it does not exist yet
    pub fn create(save_root: &Path, product_id: ProductId) -> Result<Self> {
        let path = save_root.join(product_id.to_string());
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_record(&self, record: &ProductRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record)?;
        std::fs::write(self.path.join(Self::INFO_FILE), json)?;
        Ok(())
    }

    pub fn write_markup(&self, html: &str) -> Result<()> {
        std::fs::write(self.path.join(Self::PAGE_FILE), html)?;
        Ok(())
    }

    pub fn write_pdf(&self, pdf: &[u8]) -> Result<()> {
        std::fs::write(self.path.join(Self::PDF_FILE), pdf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_record_json() {
        let record = ProductRecord::not_found(ProductId::new(333333));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "product_id": 333333,
                "title": "Not Found",
                "options": {},
                "specifications": {},
                "description": "",
            })
        );
        assert!(record.is_not_found());
    }

    #[test]
    fn test_fields_keep_insertion_order() {
        let mut specs = Fields::new();
        specs.insert("Zeta".to_string(), "1".to_string());
        specs.insert("Alpha".to_string(), "2".to_string());
        specs.insert("Zeta".to_string(), "3".to_string());

        let json = serde_json::to_string(&specs).unwrap();
        assert_eq!(json, r#"{"Zeta":"3","Alpha":"2"}"#);

        let back: Fields<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn test_image_stems() {
        assert_eq!(ImageRole::Gallery.stem(1), "img_01");
        assert_eq!(ImageRole::Description.stem(12), "desc_12");
    }

    #[test]
    fn test_folder_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let id = ProductId::new(1005001234);

        let folder = ProductFolder::create(root.path(), id).unwrap();
        folder.write_markup("<html></html>").unwrap();
        let again = ProductFolder::create(root.path(), id).unwrap();

        assert_eq!(folder.path(), again.path());
        assert!(again.path().join(ProductFolder::PAGE_FILE).exists());
    }
}
