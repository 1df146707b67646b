//! CSV artifact materialization: one directory per date, one subdirectory
//! per chain, three fixed-name files. UTF-8, no BOM, header row mandatory.
//! These files are the crawl↔ingest boundary and the input to the batch
//! fingerprint, so column sets and order are fixed.

use std::fs;
use std::path::{Path, PathBuf};

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use tracing::debug;

use crate::error::CrawlError;
use crate::model::{product_identity, ChainSnapshot};

pub const STORES_FILE: &str = "stores.csv";
pub const PRODUCTS_FILE: &str = "products.csv";
pub const PRICES_FILE: &str = "prices.csv";

pub const STORE_COLUMNS: [&str; 6] = ["store_id", "name", "type", "address", "city", "zipcode"];
pub const PRODUCT_COLUMNS: [&str; 7] = [
    "product_id",
    "barcode",
    "name",
    "brand",
    "category",
    "unit",
    "quantity",
];
pub const PRICE_COLUMNS: [&str; 7] = [
    "store_id",
    "product_id",
    "price",
    "unit_price",
    "best_price_30",
    "special_price",
    "anchor_price",
];

/// Directory holding one chain's artifact set for one date.
pub fn chain_dir(root: &Path, date: NaiveDate, chain: &str) -> PathBuf {
    root.join(date.format("%Y-%m-%d").to_string()).join(chain)
}

fn money(value: &Option<BigDecimal>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// Write one chain's snapshot as the three artifact files.
///
/// Products without an EAN are written under the synthetic chain-scoped
/// barcode so the artifact is self-contained for any downstream consumer.
pub fn save_chain(dir: &Path, chain: &str, snapshot: &ChainSnapshot) -> Result<(), CrawlError> {
    fs::create_dir_all(dir)?;
    let csv_err = |e: csv::Error| CrawlError::parse_failure(chain, e.to_string());

    let mut stores = csv::Writer::from_path(dir.join(STORES_FILE)).map_err(csv_err)?;
    stores.write_record(STORE_COLUMNS).map_err(csv_err)?;
    for store in &snapshot.stores {
        stores
            .write_record([
                store.store_id.as_str(),
                store.name.as_str(),
                store.store_type.as_str(),
                store.address.as_str(),
                store.city.as_str(),
                store.zipcode.as_str(),
            ])
            .map_err(csv_err)?;
    }
    stores.flush()?;

    let mut products = csv::Writer::from_path(dir.join(PRODUCTS_FILE)).map_err(csv_err)?;
    products.write_record(PRODUCT_COLUMNS).map_err(csv_err)?;
    for product in &snapshot.products {
        let barcode = product_identity(chain, product);
        products
            .write_record([
                product.product_id.as_str(),
                barcode.as_str(),
                product.name.as_str(),
                product.brand.as_str(),
                product.category.as_str(),
                product.unit.as_str(),
                product.quantity.as_str(),
            ])
            .map_err(csv_err)?;
    }
    products.flush()?;

    let mut prices = csv::Writer::from_path(dir.join(PRICES_FILE)).map_err(csv_err)?;
    prices.write_record(PRICE_COLUMNS).map_err(csv_err)?;
    for price in &snapshot.prices {
        prices
            .write_record([
                price.store_id.as_str(),
                price.product_id.as_str(),
                &price.price.to_string(),
                &money(&price.unit_price),
                &money(&price.best_price_30),
                &money(&price.special_price),
                &money(&price.anchor_price),
            ])
            .map_err(csv_err)?;
    }
    prices.flush()?;

    debug!(
        chain,
        stores = snapshot.stores.len(),
        products = snapshot.products.len(),
        prices = snapshot.prices.len(),
        "artifacts written"
    );
    Ok(())
}
