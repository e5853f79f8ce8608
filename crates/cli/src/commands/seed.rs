//! Seed the database with stores and products from a YAML file.
//!
//! ```yaml
//! stores:
//!   - slug: acme
//!     name: Acme Apparel
//!     description: Shirts and caps
//!     products:
//!       - name: Logo Tee
//!         price: "19.99"
//!         stock: 12
//!         sizes: [S, M, L]
//!         colors: ["#000000"]
//! ```
//!
//! Stores whose slug already exists are skipped, products included, so the
//! command can be re-run safely.

use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info, warn};

use storehub_storefront::db::{self, RepositoryError};
use storehub_storefront::ledger::PgLedger;
use storehub_storefront::models::NewProduct;

use super::{CommandError, database_url};

/// Top-level seed document.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub stores: Vec<SeedStore>,
}

#[derive(Debug, Deserialize)]
pub struct SeedStore {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
}

impl From<&SeedProduct> for NewProduct {
    fn from(p: &SeedProduct) -> Self {
        Self {
            name: p.name.clone(),
            price: p.price,
            stock: p.stock,
            description: p.description.clone(),
            image_url: p.image_url.clone(),
            available_sizes: p.sizes.clone(),
            available_colors: p.colors.clone(),
        }
    }
}

/// Check a seed document before touching the database.
///
/// Returns one message per problem; empty means valid.
#[must_use]
pub fn validate(file: &SeedFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut slugs = HashSet::new();

    for store in &file.stores {
        let slug = store.slug.trim();
        if slug.is_empty() {
            errors.push(format!("store {:?}: slug is required", store.name));
        } else if !slugs.insert(slug) {
            errors.push(format!("store {slug}: duplicate slug"));
        }
        if store.name.trim().is_empty() {
            errors.push(format!("store {slug}: name is required"));
        }

        for product in &store.products {
            if product.name.trim().is_empty() {
                errors.push(format!("store {slug}: product name is required"));
            }
            if product.price <= Decimal::ZERO {
                errors.push(format!(
                    "store {slug}, product {:?}: price must be greater than 0",
                    product.name
                ));
            }
            if product.stock < 0 {
                errors.push(format!(
                    "store {slug}, product {:?}: stock must not be negative",
                    product.name
                ));
            }
        }
    }

    errors
}

/// Seed stores and products from a YAML file.
///
/// # Errors
///
/// Returns `CommandError` if the file cannot be read or parsed, fails
/// validation, or a database operation fails.
pub async fn from_file(file_path: &str) -> Result<(), CommandError> {
    let path = Path::new(file_path);
    info!(path = %file_path, "Loading seed data from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Io {
            path: file_path.to_string(),
            source,
        })?;
    let file: SeedFile = serde_yaml::from_str(&content)?;

    let errors = validate(&file);
    if !errors.is_empty() {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(CommandError::Invalid(errors.len()));
    }
    info!(stores = file.stores.len(), "Seed file validated");

    let database_url = database_url()?;
    let pool = db::create_pool(&database_url, 2).await?;
    let ledger = PgLedger::new(pool.clone());

    let mut created_stores = 0;
    let mut created_products = 0;
    for seed in &file.stores {
        let store = match ledger
            .create_store(seed.slug.trim(), seed.name.trim(), seed.description.as_deref())
            .await
        {
            Ok(store) => store,
            Err(RepositoryError::Conflict(_)) => {
                warn!(slug = %seed.slug, "Store already exists, skipping");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        created_stores += 1;

        for product in &seed.products {
            ledger
                .create_product(store.id, &NewProduct::from(product))
                .await?;
            created_products += 1;
        }
        info!(slug = %store.slug, store_id = %store.id, products = seed.products.len(), "Store seeded");
    }

    info!("Seeding complete!");
    info!("  Stores created: {created_stores}");
    info!("  Products created: {created_products}");

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> SeedFile {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_and_convert() {
        let file = parse(
            r#"
stores:
  - slug: acme
    name: Acme
    products:
      - name: Tee
        price: "19.99"
        stock: 3
        sizes: [S, M]
"#,
        );
        assert!(validate(&file).is_empty());

        let product = NewProduct::from(&file.stores[0].products[0]);
        assert_eq!(product.price, Decimal::new(1999, 2));
        assert_eq!(product.available_sizes, vec!["S", "M"]);
        assert!(product.available_colors.is_empty());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let file = parse(
            r#"
stores:
  - slug: acme
    name: Acme
    products:
      - { name: Free, price: "0", stock: 1 }
      - { name: Debt, price: "5", stock: -1 }
  - slug: acme
    name: Copy
"#,
        );
        let errors = validate(&file);
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("duplicate slug")));
    }
}
