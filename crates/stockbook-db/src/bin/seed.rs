//! # Demo Catalogue Seeder
//!
//! Populates a fresh store with a small mobile-and-pharmacy catalogue:
//! categories, parties, untracked / batch / serial products, their
//! purchases and a few sales.
//!
//! ## Usage
//! ```bash
//! # Seed ./stockbook_dev.db (and ./database_old.db)
//! cargo run -p stockbook-db --bin seed
//!
//! # Specify database path
//! cargo run -p stockbook-db --bin seed -- --db ./data/database.db
//!
//! # Skip the demo sales
//! cargo run -p stockbook-db --bin seed -- --no-sales
//! ```
//!
//! ## Generated Data
//! - Categories: Mobiles, Accessories, Medicines
//! - Serial products: phones, 3-5 IMEIs each
//! - Batch products: medicines, two lots each with different expiry
//! - Untracked products: cables, covers, chargers
//! - Sales: one walk-in cash sale, one credit sale to a customer with a
//!   part payment, one non-GST estimate

use chrono::{Duration, Local, NaiveDate};
use std::env;
use stockbook_core::{EntityType, PaymentMode, TrackingMode, TransactionType};
use stockbook_db::config::init_tracing;
use stockbook_db::{
    NewNonGstSale, NewNonGstSaleItem, NewParty, NewProduct, NewPurchase, NewPurchaseItem,
    NewSale, NewSaleItem, NewTransaction, Store, StoreConfig,
};

/// (code, name, HSN, MRP in rupees, cost in rupees)
const PHONES: &[(&str, &str, &str, i64, i64)] = &[
    ("SAM-A15", "Samsung Galaxy A15", "85171300", 16_999, 13_800),
    ("RED-13C", "Redmi 13C", "85171300", 9_999, 8_100),
    ("IPH-15", "iPhone 15 128GB", "85171300", 79_900, 68_500),
    ("MOTO-G54", "Moto G54", "85171300", 15_999, 12_900),
];

/// (code, name, HSN, MRP in paise, cost in paise)
const MEDICINES: &[(&str, &str, &str, i64, i64)] = &[
    ("PARA-500", "Paracetamol 500mg (10 tabs)", "30049099", 3_000, 1_800),
    ("CETZ-10", "Cetirizine 10mg (10 tabs)", "30049099", 2_500, 1_200),
    ("ORS-21", "ORS Sachet 21g", "30049099", 2_100, 1_300),
    ("AZI-500", "Azithromycin 500mg (3 tabs)", "30042019", 11_900, 7_400),
];

/// (code, name, MRP in rupees, opening stock)
const ACCESSORIES: &[(&str, &str, i64, i64)] = &[
    ("CBL-USBC-1M", "USB-C Cable 1m", 299, 40),
    ("CHG-20W", "20W Fast Charger", 899, 15),
    ("CVR-A15", "Back Cover Galaxy A15", 249, 25),
    ("TG-UNIV", "Tempered Glass (universal)", 199, 60),
    ("EAR-WIRED", "Wired Earphones", 399, 3),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./stockbook_dev.db");
    let mut with_sales = true;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--no-sales" => with_sales = false,
            "--help" | "-h" => {
                println!("Stockbook Demo Catalogue Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Primary database file (default: ./stockbook_dev.db)");
                println!("      --no-sales     Only seed catalogue and purchases");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = StoreConfig::new(&db_path);
    println!("🌱 Stockbook Demo Seeder");
    println!("========================");
    println!("Primary:   {}", db_path);
    println!("Secondary: {}", config.secondary_path().display());
    println!();

    let store = Store::open(&config).await?;
    let db = store.primary();

    println!("✓ Stores open, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Store already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database files to regenerate.");
        store.close().await;
        return Ok(());
    }

    let today = Local::now().date_naive();
    let start = std::time::Instant::now();

    // Catalogue structure
    let catalog = db.catalog();
    let mobiles = catalog.create_category("Mobiles").await?;
    let accessories = catalog.create_category("Accessories").await?;
    let medicines = catalog.create_category("Medicines").await?;
    let smartphones = catalog.create_subcategory(mobiles.id, "Smartphones").await?;

    let supplier = db
        .suppliers()
        .create(NewParty {
            gstin: Some("27AABCU9603R1ZM".to_string()),
            state: Some("Maharashtra".to_string()),
            ..NewParty::named("Mumbai Mobile Distributors")
        })
        .await?;
    let pharma = db
        .suppliers()
        .create(NewParty::named("Shree Pharma Agencies"))
        .await?;
    let customer = db
        .customers()
        .create(NewParty {
            phone: Some("9820012345".to_string()),
            opening_balance_paise: 50_000,
            ..NewParty::named("Anil Traders")
        })
        .await?;
    println!("✓ Categories and parties");

    // Serial-tracked phones
    let mut first_phone = None;
    for (idx, (code, name, hsn, mrp, cost)) in PHONES.iter().enumerate() {
        let product = db
            .products()
            .create(NewProduct {
                hsn_code: Some(hsn.to_string()),
                gst_rate_bps: 1800,
                mrp_paise: mrp * 100,
                mop_paise: mrp * 95,
                category_id: Some(mobiles.id),
                subcategory_id: Some(smartphones.id),
                tracking_type: TrackingMode::Serial,
                low_stock_threshold: 2,
                ..NewProduct::new(*code, *name)
            })
            .await?;

        let units = 3 + (idx as i64 % 3);
        let serials: Vec<String> = (0..units)
            .map(|n| format!("35{:06}{:05}", idx * 7919 + 100_003, n + 1))
            .collect();
        db.purchases()
            .create(
                NewPurchase {
                    supplier_id: Some(supplier.id),
                    bill_number: Some(format!("MMD/{}", 4100 + idx)),
                    ..NewPurchase::received(
                        today,
                        vec![NewPurchaseItem {
                            serial_numbers: serials.clone(),
                            ..NewPurchaseItem::new(product.id, units, cost * 100)
                        }],
                    )
                },
                today,
            )
            .await?;
        println!("  📱 {:<24} {} units", name, units);

        if first_phone.is_none() {
            first_phone = Some((product.id, serials[0].clone(), mrp * 100));
        }
    }

    // Batch-tracked medicines: two lots each
    let mut first_medicine = None;
    for (idx, (code, name, hsn, mrp, cost)) in MEDICINES.iter().enumerate() {
        let product = db
            .products()
            .create(NewProduct {
                hsn_code: Some(hsn.to_string()),
                gst_rate_bps: 1200,
                mrp_paise: *mrp,
                mop_paise: *mrp,
                category_id: Some(medicines.id),
                tracking_type: TrackingMode::Batch,
                low_stock_threshold: 20,
                ..NewProduct::new(*code, *name)
            })
            .await?;

        let lots = [
            (format!("L{}A", 240 + idx), 30, expiry(today, 120)),
            (format!("L{}B", 240 + idx), 60, expiry(today, 540)),
        ];
        let items = lots
            .iter()
            .map(|(lot, qty, exp)| NewPurchaseItem {
                batch_number: Some(lot.clone()),
                expiry_date: Some(*exp),
                mfg_date: Some(today - Duration::days(60)),
                ..NewPurchaseItem::new(product.id, *qty, *cost)
            })
            .collect();
        db.purchases()
            .create(
                NewPurchase {
                    supplier_id: Some(pharma.id),
                    payment_mode: PaymentMode::BankTransfer,
                    ..NewPurchase::received(today, items)
                },
                today,
            )
            .await?;
        println!("  💊 {:<24} 2 lots", name);

        if first_medicine.is_none() {
            first_medicine = Some((product.id, *mrp));
        }
    }

    // Untracked accessories
    let mut first_accessory = None;
    for (code, name, mrp, stock) in ACCESSORIES {
        let product = db
            .products()
            .create(NewProduct {
                gst_rate_bps: 1800,
                mrp_paise: mrp * 100,
                mop_paise: mrp * 90,
                category_id: Some(accessories.id),
                low_stock_threshold: 5,
                opening_quantity: *stock,
                ..NewProduct::new(*code, *name)
            })
            .await?;
        println!("  🔌 {:<24} {} in stock", name, stock);

        if first_accessory.is_none() {
            first_accessory = Some((product.id, mrp * 100));
        }
    }

    if with_sales {
        println!();
        println!("Recording demo sales...");

        if let (Some((cable_id, cable_price)), Some((med_id, med_price))) =
            (first_accessory, first_medicine)
        {
            let cash = db
                .sales()
                .create(
                    NewSale::new(
                        today,
                        vec![
                            NewSaleItem::new(cable_id, 2, cable_price),
                            NewSaleItem::new(med_id, 3, med_price),
                        ],
                    ),
                    today,
                )
                .await?;
            println!("  🧾 {} walk-in, {}", cash.reference_no, cash.total_amount());
        }

        if let Some((phone_id, serial, price)) = first_phone {
            let credit = db
                .sales()
                .create(
                    NewSale {
                        customer_id: Some(customer.id),
                        payment_mode: PaymentMode::Credit,
                        paid_amount_paise: 500_000,
                        ..NewSale::new(today, vec![NewSaleItem::serial(phone_id, serial, price)])
                    },
                    today,
                )
                .await?;
            println!("  🧾 {} to {}, {}", credit.reference_no, customer.name, credit.total_amount());

            let payment = db
                .transactions()
                .record(
                    NewTransaction {
                        payment_mode: PaymentMode::Upi,
                        ..NewTransaction::new(
                            TransactionType::PaymentIn,
                            EntityType::Customer,
                            customer.id,
                            300_000,
                            today,
                        )
                        .against_bill(credit.id)
                    },
                    today,
                )
                .await?;
            println!("  💰 {} received {}", payment.reference_no, payment.amount());
        }

        let estimate = store
            .non_gst_sales()
            .create(
                NewNonGstSale {
                    customer_name: Some("Walk-in".to_string()),
                    customer_phone: None,
                    sale_date: today,
                    payment_mode: PaymentMode::Cash,
                    paid_amount_paise: 45_000,
                    notes: Some("screen guard fitting".to_string()),
                    items: vec![NewNonGstSaleItem {
                        product_name: "Screen guard fitting".to_string(),
                        quantity: 3,
                        rate_paise: 15_000,
                        discount_paise: 0,
                    }],
                },
                today,
            )
            .await?;
        println!("  📝 {} (non-GST)", estimate.reference_no);
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Seeded {} products in {:?}", db.products().count().await?, elapsed);

    let low = db.products().low_stock().await?;
    println!("  Low stock: {} products", low.len());

    let discrepancies = db.inventory().audit().await?;
    if discrepancies.is_empty() {
        println!("✓ Inventory audit clean");
    } else {
        println!("⚠ Inventory audit found {} discrepancies", discrepancies.len());
    }

    store.close().await;
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn expiry(today: NaiveDate, days: i64) -> NaiveDate {
    today + Duration::days(days)
}
