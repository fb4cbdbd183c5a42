//! Field extraction from a ready, expanded product page
//!
//! Reads are positional and forgiving: anything the page does not show comes
//! back empty. Options that cannot be named are kept as [`UNRESOLVED_OPTION`]
//! so gaps stay visible in the archive.

use crate::accessor::{ProductPage, PropertyBlock, RawOption, SpecificationRow};
use crate::error::Result;
use crate::record::{Fields, ProductId, ProductRecord};

/// Recorded in place of an option value that could not be resolved
pub const UNRESOLVED_OPTION: &str = "<CONFUSION>";

/// Appended to a specification name until it no longer collides
pub const DUPLICATE_SUFFIX: &str = " (Duplicate)";

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Display value of one option: title attribute, then image alt, then text
pub fn resolve_option(option: &RawOption) -> Option<String> {
    non_empty(option.title.as_deref())
        .or_else(|| non_empty(option.alt.as_deref()))
        .or_else(|| non_empty(Some(&option.text)))
        .map(String::from)
}

/// Property name from a heading like `"Color: Red"`
pub fn property_name(heading: &str) -> &str {
    heading.split(':').next().unwrap_or_default().trim()
}

/// Collect options per property, in page order
pub fn collect_options(blocks: &[PropertyBlock]) -> Fields<Vec<String>> {
    let mut options = Fields::new();

    for block in blocks {
        let name = property_name(&block.heading);
        if name.is_empty() {
            tracing::warn!(
                "Skipping property block without a name ({} options)",
                block.options.len()
            );
            continue;
        }

        let values: &mut Vec<String> = options.entry(name.to_string()).or_default();
        for option in &block.options {
            let value = resolve_option(option).unwrap_or_else(|| {
                tracing::warn!("No title, alt, or text found for option in {}.", name);
                UNRESOLVED_OPTION.to_string()
            });
            values.push(value);
        }
    }

    options
}

/// Pair specification titles with descriptions, disambiguating repeats
pub fn collect_specifications(rows: &[SpecificationRow]) -> Fields<String> {
    let mut specs = Fields::new();

    for row in rows {
        for (title, desc) in row.titles.iter().zip(&row.descriptions) {
            let mut key = title.trim().to_string();
            if key.is_empty() {
                tracing::warn!("Skipping specification with empty name: {:?}", desc);
                continue;
            }
            while specs.contains_key(&key) {
                key.push_str(DUPLICATE_SUFFIX);
            }
            specs.insert(key, desc.trim().to_string());
        }
    }

    specs
}

/// Read title, options, specifications, and description into a record
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldExtractor;

impl FieldExtractor {
    /// `title` is the text captured by the readiness check; it is re-read
    /// from the page only if empty.
    pub async fn extract(
        &self,
        page: &dyn ProductPage,
        product_id: ProductId,
        title: &str,
    ) -> Result<ProductRecord> {
        let title = match title.trim() {
            "" => page.title().await?.unwrap_or_default().trim().to_string(),
            t => t.to_string(),
        };

        let options = collect_options(&page.property_blocks().await?);
        let specifications = collect_specifications(&page.specification_rows().await?);
        let description = page
            .description_text()
            .await?
            .map(|d| d.trim().to_string())
            .unwrap_or_default();

        tracing::debug!(
            "Extracted {} option group(s), {} specification(s), {} description chars",
            options.len(),
            specifications.len(),
            description.len()
        );

        Ok(ProductRecord {
            product_id,
            title,
            options,
            specifications,
            description,
        })
    }
}
