//! Seed the catalog from a YAML file.
//!
//! ```yaml
//! products:
//!   - name: Canvas Tote
//!     description: Heavy cotton tote bag.
//!     price: "18.50"
//!     image_url: https://example.com/tote.jpg
//! ```

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use cartwheel_core::Price;
use cartwheel_storefront::db::{self, PgCatalog, products::NewProduct};

/// Seed file layout.
#[derive(Debug, Deserialize)]
struct SeedFile {
    products: Vec<SeedProduct>,
}

#[derive(Debug, Deserialize)]
struct SeedProduct {
    name: String,
    #[serde(default)]
    description: String,
    price: Decimal,
    #[serde(default)]
    image_url: String,
}

/// Check every entry, returning one message per problem.
fn validate(products: &[SeedProduct]) -> Vec<String> {
    let mut errors = Vec::new();
    for (index, product) in products.iter().enumerate() {
        if product.name.trim().is_empty() {
            errors.push(format!("product #{}: name is empty", index + 1));
        }
        if let Err(e) = Price::new(product.price) {
            errors.push(format!("product #{} ({}): {e}", index + 1, product.name));
        }
    }
    errors
}

/// Insert products from a YAML file.
///
/// # Arguments
///
/// * `file_path` - Path to the YAML file
/// * `replace` - If true, delete every existing product first
///
/// # Errors
///
/// Returns an error if the database URL is missing, the file cannot be read
/// or fails validation, or a database operation fails.
pub async fn products(file_path: &str, replace: bool) -> Result<(), Box<dyn std::error::Error>> {
    let database_url = super::database_url()?;

    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading products from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let seed: SeedFile = serde_yaml::from_str(&content)?;

    let errors = validate(&seed.products);
    if !errors.is_empty() {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = db::create_pool(&database_url).await?;
    let catalog = PgCatalog::new(pool);
    info!("Connected to database");

    if replace {
        let removed = catalog.delete_all().await?;
        info!(removed, "Removed existing products");
    }

    for product in seed.products {
        let new_product = NewProduct {
            name: product.name.trim().to_string(),
            description: product.description,
            price: Price::new(product.price)?,
            image_url: product.image_url,
        };
        let stored = catalog.insert(&new_product).await?;
        info!(id = %stored.id, name = %stored.name, price = %stored.price, "Inserted product");
    }

    info!(total = catalog.count().await?, "Seeding complete!");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_validate_seed_file() {
        let yaml = r#"
products:
  - name: Canvas Tote
    description: Heavy cotton tote bag.
    price: "18.50"
    image_url: https://example.com/tote.jpg
  - name: Sticker
    price: 2
"#;
        let seed: SeedFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(seed.products.len(), 2);
        assert_eq!(seed.products[1].description, "");
        assert!(validate(&seed.products).is_empty());
    }

    #[test]
    fn test_validate_rejects_negative_price_and_blank_name() {
        let products = vec![SeedProduct {
            name: "  ".to_string(),
            description: String::new(),
            price: Decimal::new(-100, 2),
            image_url: String::new(),
        }];
        assert_eq!(validate(&products).len(), 2);
    }
}
