//! Seed the product catalog from a YAML file.
//!
//! # File Format
//!
//! ```yaml
//! products:
//!   - id: smoked-paprika
//!     name: Smoked Paprika
//!     description: Pimentón de la Vera, sweet.
//!     price: "6.50"
//!     imageUrl: https://cdn.tastetrove.example/paprika.jpg
//! ```
//!
//! Existing products with the same ID are overwritten.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use tastetrove_core::Product;
use tastetrove_storefront::db::{self, ProductRepository};

use super::{CommandError, storefront_database_url};

/// Top-level shape of a catalog seed file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogFile {
    pub products: Vec<Product>,
}

/// Outcome of a seeding run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedResult {
    pub inserted: usize,
    pub updated: usize,
}

/// Parse a catalog seed file.
///
/// # Errors
///
/// Returns `CommandError::Yaml` if the content does not match the format.
pub fn parse_catalog(content: &str) -> Result<CatalogFile, CommandError> {
    Ok(serde_yaml::from_str(content)?)
}

/// Check a parsed catalog, returning one message per problem.
#[must_use]
pub fn validate_catalog(catalog: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for product in &catalog.products {
        if !seen.insert(&product.id) {
            errors.push(format!("{}: duplicate product id", product.id));
        }
        if product.name.trim().is_empty() {
            errors.push(format!("{}: name is empty", product.id));
        }
        if product.price.is_negative() {
            errors.push(format!("{}: price {} is negative", product.id, product.price));
        }
    }

    errors
}

/// Upsert every product from a YAML file into the storefront database.
///
/// With `dry_run` the file is parsed and validated only.
///
/// # Errors
///
/// Returns an error if the file cannot be read, fails validation, or a
/// database operation fails.
pub async fn products(file_path: &Path, dry_run: bool) -> Result<SeedResult, CommandError> {
    info!(path = %file_path.display(), "Loading catalog from file");

    let content = tokio::fs::read_to_string(file_path)
        .await
        .map_err(|source| CommandError::Io {
            path: file_path.display().to_string(),
            source,
        })?;
    let catalog = parse_catalog(&content)?;
    info!(products = catalog.products.len(), "Parsed catalog");

    let errors = validate_catalog(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(CommandError::Validation(errors.len()));
    }

    if dry_run {
        info!("Dry run, not writing to the database");
        return Ok(SeedResult::default());
    }

    let database_url = storefront_database_url()?;
    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let repo = ProductRepository::new(&pool);
    let mut result = SeedResult::default();
    for product in &catalog.products {
        if repo.upsert(product).await? {
            result.inserted += 1;
        } else {
            result.updated += 1;
        }
    }

    info!("Seeding complete!");
    info!("  Products inserted: {}", result.inserted);
    info!("  Products updated: {}", result.updated);

    Ok(result)
}
