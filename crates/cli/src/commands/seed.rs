//! Seed the catalog from a YAML file.
//!
//! Products whose name already exists (case-insensitive) are skipped, so the
//! command can be re-run after adding entries to the file.
//!
//! ```yaml
//! products:
//!   - name: Home Jersey 24/25
//!     price: "65.00"
//!     stock: 40
//!     min_stock: 5
//!     category: jerseys
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use kitshop_api::db::{self, products::ProductRepository};
use kitshop_api::models::NewProduct;
use kitshop_core::Money;

/// Top-level layout of a catalog file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub products: Vec<NewProduct>,
}

/// Problems found in a catalog file, one message per entry.
fn validate_catalog(catalog: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, product) in catalog.products.iter().enumerate() {
        let name = product.name.trim();
        let entry = index + 1;
        if name.is_empty() {
            errors.push(format!("entry {entry}: name is required"));
        } else if !seen.insert(name.to_lowercase()) {
            errors.push(format!("entry {entry}: duplicate name '{name}'"));
        }
        if product.category.trim().is_empty() {
            errors.push(format!("entry {entry}: category is required"));
        }
        if product.price <= Money::ZERO {
            errors.push(format!("entry {entry}: price must be positive"));
        }
    }
    errors
}

/// Insert the products of a catalog file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails validation,
/// or a database operation fails.
pub async fn catalog(file_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !file_path.exists() {
        return Err(format!("File not found: {}", file_path.display()).into());
    }

    info!(path = %file_path.display(), "Loading catalog from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(file_path).await?;
    let catalog: CatalogFile = serde_yaml::from_str(&content)?;

    info!(products = catalog.products.len(), "Parsed catalog");

    let errors = validate_catalog(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let database_url = super::database_url()
        .ok_or("KITSHOP_DATABASE_URL (or DATABASE_URL) not set")?;
    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let existing: HashSet<String> =
        sqlx::query_scalar::<_, String>("SELECT lower(name) FROM shop.product")
            .fetch_all(&pool)
            .await?
            .into_iter()
            .collect();

    let repo = ProductRepository::new(&pool);
    let mut inserted = 0_usize;
    let mut skipped = 0_usize;

    for product in &catalog.products {
        if existing.contains(&product.name.trim().to_lowercase()) {
            skipped += 1;
            continue;
        }
        let created = repo.create(product).await?;
        info!(product_id = %created.id, name = %created.name, "Product created");
        inserted += 1;
    }

    info!("Seeding complete!");
    info!("  Products inserted: {inserted}");
    info!("  Products skipped (already exist): {skipped}");

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog_yaml() {
        let yaml = r#"
products:
  - name: Home Jersey 24/25
    price: "65.00"
    stock: 40
    min_stock: 5
    category: jerseys
  - name: Training Socks
    price: "9.50"
    category: accessories
"#;
        let catalog: CatalogFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(catalog.products.len(), 2);
        assert_eq!(catalog.products[0].price, Money::from_cents(6_500));
        assert_eq!(catalog.products[1].stock, 0);
        assert!(validate_catalog(&catalog).is_empty());
    }

    #[test]
    fn test_validate_catalog_reports_each_problem() {
        let yaml = r#"
products:
  - name: Scarf
    price: "12.00"
    category: accessories
  - name: scarf
    price: "0.00"
    category: " "
"#;
        let catalog: CatalogFile = serde_yaml::from_str(yaml).unwrap();
        let errors = validate_catalog(&catalog);
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("duplicate"));
    }
}
