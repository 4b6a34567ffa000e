//! # Inventory Audit
//!
//! Opens the stores, checks every cached stock figure against the batches
//! and serials behind it, and prints what disagrees.
//!
//! ## Usage
//! ```bash
//! # Store from config.toml / STOCKBOOK_DB_PATH
//! cargo run -p stockbook-db --bin audit
//!
//! # Explicit store file
//! cargo run -p stockbook-db --bin audit -- --db ./stockbook_dev.db
//! ```
//!
//! Exits with status 1 when any discrepancy is found, so it can run from
//! cron or a backup script.

use std::env;
use std::process::ExitCode;
use stockbook_db::config::init_tracing;
use stockbook_db::{DiscrepancyKind, Store, StoreConfig, StoreSettings};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut db_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockbook Inventory Audit");
                println!();
                println!("Usage: audit [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Primary database file (default: from settings)");
                println!("  -h, --help         Show this help message");
                return Ok(ExitCode::SUCCESS);
            }
            _ => {}
        }
        i += 1;
    }

    let config = match db_path {
        Some(path) => StoreConfig::new(path),
        None => StoreSettings::load_or_default().store_config()?,
    };

    println!("🔍 Stockbook Inventory Audit");
    println!("============================");
    println!("Primary: {}", config.primary_path.display());
    println!();

    let store = Store::open(&config).await?;
    let db = store.primary();

    let shop = db.shop().get().await?;
    let products = db.products().count().await?;
    println!("✓ {} active products, negative stock {}", products, allowed(shop.allow_negative_stock));

    let discrepancies = db.inventory().audit().await?;
    store.close().await;

    if discrepancies.is_empty() {
        println!("✓ No discrepancies");
        return Ok(ExitCode::SUCCESS);
    }

    println!("⚠ {} discrepancies", discrepancies.len());
    println!();
    println!("{:<18} {:<16} {:>8} {:>10} {:>10}", "KIND", "PRODUCT", "BATCH", "RECORDED", "EXPECTED");
    for d in &discrepancies {
        let kind = match d.kind {
            DiscrepancyKind::ProductQuantity => "product quantity",
            DiscrepancyKind::BatchQuantity => "batch quantity",
            DiscrepancyKind::NegativeStock => "negative stock",
        };
        let batch = d.batch_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<18} {:<16} {:>8} {:>10} {:>10}",
            kind, d.product_code, batch, d.recorded, d.expected
        );
    }
    println!();
    println!("Run `recompute_product` for the listed products to rebuild cached quantities.");

    Ok(ExitCode::from(1))
}

fn allowed(flag: bool) -> &'static str {
    if flag {
        "allowed"
    } else {
        "blocked"
    }
}
