//! Seed data script - populates the database with a demo catalog
//!
//! Run with: cargo run --bin seed-data
//!
//! This creates:
//! - 3 variants (Color, Size, Material)
//! - 12 products, each with a product variant, a price and an image
//! - A few extra product variants so listings show several values per variant

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

use catalog_api::{
    db,
    entities::{product_variant, variant},
    services::catalog::{CascadeInput, CascadePolicy, ProductCatalogService},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("=== Catalog API Seed Data ===");

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://catalog.db?mode=rwc".to_string());

    let mut options = ConnectOptions::new(database_url.clone());
    options
        .max_connections(5)
        .min_connections(1)
        .connect_timeout(StdDuration::from_secs(10))
        .acquire_timeout(StdDuration::from_secs(10));

    info!("Connecting to database: {}", database_url);
    let db = Database::connect(options).await?;
    db::run_migrations(&db).await?;
    info!("Connected and migrated");

    info!("Creating variants...");
    let variants = create_variants(&db).await?;
    info!("  Created {} variants", variants.len());

    let db = Arc::new(db);
    let catalog = ProductCatalogService::new(db.clone(), 5, CascadePolicy::Atomic);

    info!("Creating products...");
    let created = create_products(&catalog, &variants).await?;
    info!("  Created {} products", created.len());

    info!("Adding extra product variants...");
    let extra = create_extra_product_variants(&db, &variants, &created).await?;
    info!("  Added {} product variants", extra);

    info!("=== Seed Data Complete ===");
    info!("Try these API calls:");
    info!("  curl http://localhost:8080/api/v1/products");
    info!("  curl 'http://localhost:8080/api/v1/products?variant=red&price_to=50'");
    info!("  curl -X POST -d 'variant_group_1={}' http://localhost:8080/api/v1/products", variants[0].id);
    info!("Or explore interactively at: http://localhost:8080/swagger-ui");

    Ok(())
}

async fn create_variants(db: &DatabaseConnection) -> anyhow::Result<Vec<variant::Model>> {
    let data = [
        ("Color", "Colour of the item"),
        ("Size", "Garment or container size"),
        ("Material", "Main material"),
    ];

    let mut created = Vec::with_capacity(data.len());
    for (title, description) in data {
        let model = variant::ActiveModel {
            title: Set(title.to_string()),
            description: Set(Some(description.to_string())),
            active: Set(true),
            ..Default::default()
        }
        .insert(db)
        .await?;
        created.push(model);
    }
    Ok(created)
}

async fn create_products(
    catalog: &ProductCatalogService,
    variants: &[variant::Model],
) -> anyhow::Result<Vec<i32>> {
    // (title, sku, variant index, variant value, price, stock)
    let products_data: [(&str, &str, usize, &str, Decimal, i32); 12] = [
        ("Classic Cotton T-Shirt", "TSH-001", 0, "Black", dec!(24.99), 120),
        ("Slim Fit Denim Jeans", "JNS-001", 1, "32", dec!(89.99), 40),
        ("Merino Wool Sweater", "SWT-001", 2, "Merino", dec!(119.99), 25),
        ("Canvas Backpack 25L", "BAG-001", 0, "Olive", dec!(79.99), 30),
        ("Leather Bifold Wallet", "WLT-001", 2, "Leather", dec!(49.99), 60),
        ("Running Sneakers", "SNK-001", 1, "42", dec!(109.00), 18),
        ("Rain Jacket", "JKT-001", 0, "Red", dec!(139.50), 15),
        ("Wool Beanie", "BNE-001", 0, "Grey", dec!(19.99), 200),
        ("Linen Shirt", "SHR-001", 2, "Linen", dec!(59.00), 45),
        ("Water Bottle 750ml", "BTL-001", 1, "750ml", dec!(29.99), 80),
        ("Silk Scarf", "SCF-001", 2, "Silk", dec!(64.00), 12),
        ("Cargo Shorts", "SHT-001", 0, "Khaki", dec!(39.99), 55),
    ];

    let mut created = Vec::with_capacity(products_data.len());
    for (title, sku, variant_index, value, price, stock) in products_data {
        let input = CascadeInput {
            title: Some(title.to_string()),
            sku: Some(sku.to_string()),
            description: Some(format!("{} from the demo catalog.", title)),
            variant_id: Some(variants[variant_index].id),
            variant_title: Some(value.to_string()),
            price: Some(price),
            stock: Some(stock),
            image_file_path: Some(format!("images/{}.jpg", sku.to_lowercase())),
            thumbnail: Some(format!("images/thumbs/{}.jpg", sku.to_lowercase())),
            ..Default::default()
        };

        match catalog.create_product(input).await {
            Ok(result) => created.push(result.report.product_id),
            Err(e) => warn!("Skipping {}: {}", sku, e),
        }
    }
    Ok(created)
}

async fn create_extra_product_variants(
    db: &DatabaseConnection,
    variants: &[variant::Model],
    product_ids: &[i32],
) -> anyhow::Result<usize> {
    let colors = ["Navy", "White", "Red"];
    let mut count = 0;

    for (product_id, color) in product_ids.iter().zip(colors) {
        product_variant::ActiveModel {
            title: Set(color.to_string()),
            active: Set(true),
            variant_id: Set(variants[0].id),
            product_id: Set(*product_id),
            ..Default::default()
        }
        .insert(db)
        .await?;
        count += 1;
    }
    Ok(count)
}
