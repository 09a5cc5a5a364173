//! Seeds a demo fragrance catalog and a welcome coupon.
//!
//! Run with: cargo run --bin seed-catalog -- --database-url sqlite://fragrance.db?mode=rwc

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;
use uuid::Uuid;

use fragrance_api::{
    auth::{AuthService, ADMIN_ROLE, CUSTOMER_ROLE},
    config::{self, AppConfig},
    db::{self, DbConfig},
    entities::coupon::DiscountType,
    services::{
        catalog::{CatalogService, NewProduct},
        coupons::{CouponService, CreateCouponRequest},
    },
};

#[derive(Debug, Parser)]
#[command(name = "seed-catalog", about = "Populate the storefront with demo fragrances")]
struct Cli {
    /// Database to seed; defaults to DATABASE_URL or the local SQLite file
    #[arg(long)]
    database_url: Option<String>,

    /// Skip creating the SAVE10 coupon
    #[arg(long)]
    no_coupon: bool,

    /// Print an admin and a customer token signed with APP__JWT_SECRET
    #[arg(long)]
    issue_tokens: bool,
}

struct SeedProduct {
    name: &'static str,
    brand: &'static str,
    category: &'static str,
    price: Decimal,
    stock: i32,
}

const CATALOG: &[SeedProduct] = &[
    SeedProduct { name: "Lavender Dream", brand: "Maison Verte", category: "floral", price: dec!(100.00), stock: 25 },
    SeedProduct { name: "Oud Nocturne", brand: "Atelier Noir", category: "woody", price: dec!(245.00), stock: 8 },
    SeedProduct { name: "Citrus Veil", brand: "Maison Verte", category: "fresh", price: dec!(68.50), stock: 40 },
    SeedProduct { name: "Amber Solstice", brand: "Lumen", category: "oriental", price: dec!(132.00), stock: 15 },
    SeedProduct { name: "Sea Salt Neroli", brand: "Lumen", category: "fresh", price: dec!(89.00), stock: 30 },
    SeedProduct { name: "Vetiver Ember", brand: "Atelier Noir", category: "woody", price: dec!(178.00), stock: 5 },
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    let database_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite://fragrance.db?mode=rwc".to_string());

    info!("Connecting to database: {}", database_url);
    let pool = db::establish_connection_with_config(&DbConfig {
        url: database_url,
        ..DbConfig::default()
    })
    .await
    .context("failed to connect to the database")?;
    db::run_migrations(&pool).await.context("failed to run migrations")?;
    let pool = Arc::new(pool);

    let catalog = CatalogService::new(pool.clone());
    for item in CATALOG {
        let product = catalog
            .create_product(NewProduct {
                name: item.name.to_string(),
                brand: Some(item.brand.to_string()),
                category: Some(item.category.to_string()),
                image: Some(format!(
                    "/images/{}.jpg",
                    item.name.to_lowercase().replace(' ', "-")
                )),
                price: item.price,
                discount_percentage: Decimal::ZERO,
                stock: item.stock,
            })
            .await
            .with_context(|| format!("failed to create {}", item.name))?;
        info!("  {} ({}) stock {}", product.name, product.id, product.stock);
    }

    if !cli.no_coupon {
        let now = Utc::now();
        let coupon = CouponService::new(pool.clone())
            .create_coupon(CreateCouponRequest {
                code: "SAVE10".to_string(),
                description: Some("10% off orders of 200 or more".to_string()),
                discount_type: DiscountType::Percentage,
                discount_value: dec!(10),
                min_order_amount: dec!(200),
                max_discount_amount: None,
                usage_limit: Some(100),
                per_user_limit: 1,
                valid_from: now,
                valid_until: now + Duration::days(90),
                applicable_categories: Vec::new(),
                applicable_products: Vec::new(),
            })
            .await
            .context("failed to create coupon")?;
        info!("Coupon {} valid until {}", coupon.code, coupon.valid_until);
    }

    if cli.issue_tokens {
        print_tokens()?;
    }

    info!("Seeded {} products", CATALOG.len());
    Ok(())
}

fn print_tokens() -> Result<()> {
    let cfg: AppConfig = config::load_config().context("tokens need a loadable configuration")?;
    let auth = AuthService::new(&cfg);

    let admin = auth.issue_token(Uuid::new_v4(), &[ADMIN_ROLE])?;
    let customer_id = Uuid::new_v4();
    let customer = auth.issue_token(customer_id, &[CUSTOMER_ROLE])?;

    println!("ADMIN_TOKEN={}", admin);
    println!("CUSTOMER_ID={}", customer_id);
    println!("CUSTOMER_TOKEN={}", customer);
    Ok(())
}
