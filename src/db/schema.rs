//! Idempotent schema bootstrap. The column sets here are a compatibility
//! surface for downstream readers; change them only with a migration plan.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS chains (
        chain_id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS stores (
        store_id TEXT PRIMARY KEY,
        chain_id BIGINT NOT NULL REFERENCES chains(chain_id),
        name TEXT,
        store_type TEXT,
        address TEXT,
        city TEXT,
        zipcode TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_stores_chain_id ON stores(chain_id)",
    "CREATE TABLE IF NOT EXISTS products (
        product_id BIGSERIAL PRIMARY KEY,
        barcode TEXT NOT NULL UNIQUE,
        name TEXT,
        brand TEXT,
        category TEXT,
        unit TEXT,
        quantity TEXT,
        packaging TEXT,
        date_added DATE
    )",
    "CREATE INDEX IF NOT EXISTS idx_products_barcode ON products(barcode)",
    "CREATE INDEX IF NOT EXISTS idx_products_name ON products(name)",
    "CREATE INDEX IF NOT EXISTS idx_products_brand ON products(brand)",
    "CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)",
    "CREATE TABLE IF NOT EXISTS prices (
        price_id BIGSERIAL PRIMARY KEY,
        store_id TEXT NOT NULL REFERENCES stores(store_id),
        product_id BIGINT NOT NULL REFERENCES products(product_id),
        timestamp TIMESTAMPTZ NOT NULL,
        price NUMERIC(10, 2) NOT NULL,
        unit_price NUMERIC(10, 2),
        best_price_30 NUMERIC(10, 2),
        special_price NUMERIC(10, 2),
        anchor_price NUMERIC(10, 2),
        anchor_price_date DATE,
        initial_price NUMERIC(10, 2)
    )",
    "CREATE INDEX IF NOT EXISTS idx_prices_store_id ON prices(store_id)",
    "CREATE INDEX IF NOT EXISTS idx_prices_product_id ON prices(product_id)",
    "CREATE INDEX IF NOT EXISTS idx_prices_timestamp ON prices(timestamp)",
    "CREATE TABLE IF NOT EXISTS processed_batches (
        batch_identifier TEXT PRIMARY KEY,
        files_hash TEXT NOT NULL,
        processed_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_processed_batches_identifier ON processed_batches(batch_identifier)",
];

pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("database schema ensured");
    Ok(())
}
