//! Content-addressed batch ingestion: one (chain, date) artifact set is one
//! batch unit. Reprocessing an unchanged unit is a no-op; a changed unit is
//! fully re-ingested; a failed unit leaves no trace and retries from scratch.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use chrono::{NaiveDate, TimeZone, Utc};
use tracing::{info, warn};

use crate::db::store::{
    ensure_chain, fetch_batch_hash, insert_prices, lock_batch, record_batch, upsert_product,
    upsert_store, PriceRow,
};
use crate::db::Db;
use crate::error::CrawlError;
use crate::model::product_identity;

pub mod hash;
pub mod parse;

pub use hash::batch_fingerprint;
pub use parse::{parse_batch_dir, BatchRecords};

/// Rows written by one committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchCounts {
    pub stores: usize,
    pub products: usize,
    pub prices: usize,
}

/// Terminal state of one ingestion attempt. `Failed` is not terminal for the
/// unit: nothing persists from a failed attempt, so a retry starts fresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Unchanged,
    Committed(BatchCounts),
    Failed(String),
}

/// Names one crawl unit: one chain, one date.
pub fn batch_identifier(chain: &str, date: NaiveDate) -> String {
    format!("{chain}/{}", date.format("%Y-%m-%d"))
}

/// Ingest one batch unit from `<root>/<date>/<chain>/`.
///
/// All failure modes are folded into `BatchOutcome::Failed`; the caller
/// never has to distinguish a parse error from a rollback to continue with
/// other units.
pub async fn ingest_batch(db: &Db, root: &Path, date: NaiveDate, chain: &str) -> BatchOutcome {
    match try_ingest_batch(db, root, date, chain).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(chain, %date, error = %e, "batch ingestion failed");
            BatchOutcome::Failed(e.to_string())
        }
    }
}

async fn try_ingest_batch(
    db: &Db,
    root: &Path,
    date: NaiveDate,
    chain: &str,
) -> Result<BatchOutcome, CrawlError> {
    let dir = root.join(date.format("%Y-%m-%d").to_string()).join(chain);
    let identifier = batch_identifier(chain, date);
    let fingerprint = batch_fingerprint(&dir)?;

    // Cheap pre-check outside the transaction; re-checked under the lock.
    {
        let mut conn = db.pool.acquire().await?;
        if fetch_batch_hash(&mut conn, &identifier).await? == Some(fingerprint.clone()) {
            info!(batch = %identifier, "unchanged, skipping");
            return Ok(BatchOutcome::Unchanged);
        }
    }

    // Parse fully before opening the transaction; no locks are held across
    // file IO.
    let records = parse_batch_dir(chain, &dir)?;

    let mut tx = db.pool.begin().await?;
    lock_batch(&mut tx, &identifier).await?;
    if fetch_batch_hash(&mut tx, &identifier).await? == Some(fingerprint.clone()) {
        // A concurrent writer committed the same content while we parsed.
        tx.rollback().await?;
        info!(batch = %identifier, "unchanged under lock, skipping");
        return Ok(BatchOutcome::Unchanged);
    }

    let chain_id = ensure_chain(&mut tx, chain).await?;

    let mut store_keys: HashMap<String, String> = HashMap::new();
    for store in &records.stores {
        let key = upsert_store(&mut tx, chain, chain_id, store).await?;
        store_keys.insert(store.store_id.clone(), key);
    }

    let mut product_ids: HashMap<String, i64> = HashMap::new();
    for product in &records.products {
        let identity = product_identity(chain, product);
        let id = upsert_product(&mut tx, &identity, product, date).await?;
        product_ids.insert(product.product_id.clone(), id);
    }

    let timestamp = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight exists"));
    let mut rows = Vec::with_capacity(records.prices.len());
    let mut unresolved = 0usize;
    for price in &records.prices {
        let (Some(store_id), Some(product_id)) = (
            store_keys.get(&price.store_id),
            product_ids.get(&price.product_id),
        ) else {
            unresolved += 1;
            continue;
        };
        rows.push(PriceRow {
            store_id: store_id.clone(),
            product_id: *product_id,
            timestamp,
            price: price.price.clone(),
            unit_price: price.unit_price.clone(),
            best_price_30: price.best_price_30.clone(),
            special_price: price.special_price.clone(),
            anchor_price: price.anchor_price.clone(),
            anchor_price_date: None,
            initial_price: None,
        });
    }
    if unresolved > 0 {
        warn!(
            batch = %identifier,
            unresolved,
            "price rows referencing unknown store/product skipped"
        );
    }

    let inserted = insert_prices(&mut tx, &rows).await?;
    record_batch(&mut tx, &identifier, &fingerprint).await?;
    tx.commit().await?;

    let counts = BatchCounts {
        stores: records.stores.len(),
        products: records.products.len(),
        prices: inserted as usize,
    };
    info!(
        batch = %identifier,
        stores = counts.stores,
        products = counts.products,
        prices = counts.prices,
        "batch committed"
    );
    Ok(BatchOutcome::Committed(counts))
}

/// Ingest every chain directory found under `<root>/<date>/`, or only the
/// given chains when a selection is provided. Units are processed one at a
/// time here; concurrent callers are serialized per unit by the advisory
/// lock, not by this loop.
pub async fn ingest_run(
    db: &Db,
    root: &Path,
    date: NaiveDate,
    chains: Option<&[String]>,
) -> Result<Vec<(String, BatchOutcome)>> {
    let date_dir = root.join(date.format("%Y-%m-%d").to_string());
    let selected: Vec<String> = match chains {
        Some(names) => names.to_vec(),
        None => {
            let mut found = Vec::new();
            let entries = std::fs::read_dir(&date_dir)?;
            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    found.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            found.sort();
            found
        }
    };

    let mut outcomes = Vec::with_capacity(selected.len());
    for chain in selected {
        let outcome = ingest_batch(db, root, date, &chain).await;
        outcomes.push((chain, outcome));
    }
    Ok(outcomes)
}
