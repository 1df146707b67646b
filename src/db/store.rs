//! Natural-key upserts and the batch ledger, all executed on the caller's
//! transaction so entity writes, price appends and the ledger update commit
//! or roll back together.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, QueryBuilder};

use crate::model::{store_key, ProductRecord, StoreRecord};

/// One fully-resolved price fact ready for insertion.
#[derive(Debug, Clone)]
pub struct PriceRow {
    pub store_id: String,
    pub product_id: i64,
    pub timestamp: DateTime<Utc>,
    pub price: BigDecimal,
    pub unit_price: Option<BigDecimal>,
    pub best_price_30: Option<BigDecimal>,
    pub special_price: Option<BigDecimal>,
    pub anchor_price: Option<BigDecimal>,
    pub anchor_price_date: Option<NaiveDate>,
    pub initial_price: Option<BigDecimal>,
}

/// Resolve the chain id for a name, creating the chain on first reference.
///
/// Insert-on-conflict-do-nothing followed by a select absorbs the race where
/// two concurrent batches create the same chain; neither fails.
pub async fn ensure_chain(conn: &mut PgConnection, name: &str) -> Result<i64, sqlx::Error> {
    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO chains (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING chain_id",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(id) = inserted {
        return Ok(id);
    }
    sqlx::query_scalar("SELECT chain_id FROM chains WHERE name = $1")
        .bind(name)
        .fetch_one(&mut *conn)
        .await
}

/// Upsert one store under its chain-prefixed global key, overwriting
/// metadata with latest-seen values. Returns the global key.
pub async fn upsert_store(
    conn: &mut PgConnection,
    chain: &str,
    chain_id: i64,
    store: &StoreRecord,
) -> Result<String, sqlx::Error> {
    let key = store_key(chain, &store.store_id);
    sqlx::query(
        "INSERT INTO stores (store_id, chain_id, name, store_type, address, city, zipcode)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (store_id) DO UPDATE SET
             name = EXCLUDED.name,
             store_type = EXCLUDED.store_type,
             address = EXCLUDED.address,
             city = EXCLUDED.city,
             zipcode = EXCLUDED.zipcode",
    )
    .bind(&key)
    .bind(chain_id)
    .bind(&store.name)
    .bind(&store.store_type)
    .bind(&store.address)
    .bind(&store.city)
    .bind(&store.zipcode)
    .execute(&mut *conn)
    .await?;
    Ok(key)
}

/// Upsert one product by its global identity (real barcode or synthetic
/// chain-scoped fallback), refreshing catalog attributes. `date_added` is
/// set on first insert only. Returns the surrogate product id.
pub async fn upsert_product(
    conn: &mut PgConnection,
    identity: &str,
    product: &ProductRecord,
    date_added: NaiveDate,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO products (barcode, name, brand, category, unit, quantity, date_added)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (barcode) DO UPDATE SET
             name = EXCLUDED.name,
             brand = EXCLUDED.brand,
             category = EXCLUDED.category,
             unit = EXCLUDED.unit,
             quantity = EXCLUDED.quantity
         RETURNING product_id",
    )
    .bind(identity)
    .bind(&product.name)
    .bind(&product.brand)
    .bind(&product.category)
    .bind(&product.unit)
    .bind(&product.quantity)
    .bind(date_added)
    .fetch_one(&mut *conn)
    .await
}

/// Append price facts. Rows are never updated or deleted; this is a time
/// series, not current state.
pub async fn insert_prices(
    conn: &mut PgConnection,
    rows: &[PriceRow],
) -> Result<u64, sqlx::Error> {
    // 11 binds per row; stay well under the Postgres parameter ceiling.
    const CHUNK: usize = 1000;
    let mut inserted = 0u64;
    for chunk in rows.chunks(CHUNK) {
        let mut builder = QueryBuilder::new(
            "INSERT INTO prices (store_id, product_id, timestamp, price, unit_price, \
             best_price_30, special_price, anchor_price, anchor_price_date, initial_price) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.store_id)
                .push_bind(row.product_id)
                .push_bind(row.timestamp)
                .push_bind(&row.price)
                .push_bind(&row.unit_price)
                .push_bind(&row.best_price_30)
                .push_bind(&row.special_price)
                .push_bind(&row.anchor_price)
                .push_bind(row.anchor_price_date)
                .push_bind(&row.initial_price);
        });
        let result = builder.build().execute(&mut *conn).await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// Last committed fingerprint for a batch identifier, if any.
pub async fn fetch_batch_hash(
    conn: &mut PgConnection,
    batch_identifier: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT files_hash FROM processed_batches WHERE batch_identifier = $1")
        .bind(batch_identifier)
        .fetch_optional(&mut *conn)
        .await
}

/// Record a successful ingestion. Replaces the previous fingerprint for the
/// same identifier; runs on the data transaction so the ledger can never
/// disagree with the committed rows.
pub async fn record_batch(
    conn: &mut PgConnection,
    batch_identifier: &str,
    files_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO processed_batches (batch_identifier, files_hash, processed_at)
         VALUES ($1, $2, now())
         ON CONFLICT (batch_identifier) DO UPDATE SET
             files_hash = EXCLUDED.files_hash,
             processed_at = now()",
    )
    .bind(batch_identifier)
    .bind(files_hash)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Serialize writers of one batch unit for the duration of the transaction.
/// Different units (other chains or dates) proceed concurrently.
pub async fn lock_batch(conn: &mut PgConnection, batch_identifier: &str) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(batch_identifier)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
