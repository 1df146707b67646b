//! End-to-end ingestion tests against a real Postgres instance.
//!
//! Set TEST_DATABASE_URL to run these; without it every test returns early
//! so the default `cargo test` stays network- and database-free. Chain names
//! are uniquified per test so repeated runs against the same database do not
//! interfere with each other.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{NaiveDate, Utc};

use cijene::{batch_identifier, ingest_batch, BatchOutcome, Db};

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_chain(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_{tag}_{}_{n}", Utc::now().timestamp_micros())
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, 27).unwrap()
}

async fn test_db() -> Option<Db> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let db = Db::connect(&url, 5).await.expect("connect test database");
    db.ensure_schema().await.expect("ensure schema");
    Some(db)
}

struct Batch<'a> {
    stores: &'a str,
    products: &'a str,
    prices: &'a str,
}

fn write_batch(root: &Path, chain: &str, batch: &Batch) {
    let dir = root.join("2025-05-27").join(chain);
    std::fs::create_dir_all(&dir).unwrap();
    let stores_header = "store_id,name,type,address,city,zipcode\n";
    let products_header = "product_id,barcode,name,brand,category,unit,quantity\n";
    let prices_header =
        "store_id,product_id,price,unit_price,best_price_30,special_price,anchor_price\n";
    std::fs::write(dir.join("stores.csv"), format!("{stores_header}{}", batch.stores)).unwrap();
    std::fs::write(
        dir.join("products.csv"),
        format!("{products_header}{}", batch.products),
    )
    .unwrap();
    std::fs::write(dir.join("prices.csv"), format!("{prices_header}{}", batch.prices)).unwrap();
}

fn simple_batch() -> Batch<'static> {
    Batch {
        stores: "S1,Konzum Zagreb,supermarket,Ilica 1,Zagreb,10000\n",
        products: "P1,3850123456789,Mlijeko,Dukat,mlijeko,L,1\n",
        prices: "S1,P1,12.99,,,,\n",
    }
}

async fn price_count(db: &Db, store_key: &str) -> i64 {
    sqlx::query_scalar("SELECT count(*) FROM prices WHERE store_id = $1")
        .bind(store_key)
        .fetch_one(&db.pool)
        .await
        .unwrap()
}

async fn ledger_hash(db: &Db, identifier: &str) -> Option<String> {
    sqlx::query_scalar("SELECT files_hash FROM processed_batches WHERE batch_identifier = $1")
        .bind(identifier)
        .fetch_optional(&db.pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn reingesting_an_unchanged_batch_is_a_noop() {
    let Some(db) = test_db().await else { return };
    let tmp = tempfile::tempdir().unwrap();
    let chain = unique_chain("idem");
    write_batch(tmp.path(), &chain, &simple_batch());

    let first = ingest_batch(&db, tmp.path(), date(), &chain).await;
    let BatchOutcome::Committed(counts) = &first else {
        panic!("first ingest should commit, got {first:?}");
    };
    assert_eq!(counts.stores, 1);
    assert_eq!(counts.products, 1);
    assert_eq!(counts.prices, 1);

    let store_key = format!("{chain}:S1");
    let before = price_count(&db, &store_key).await;
    assert_eq!(before, 1);

    let second = ingest_batch(&db, tmp.path(), date(), &chain).await;
    assert_eq!(second, BatchOutcome::Unchanged);
    assert_eq!(price_count(&db, &store_key).await, before);
}

#[tokio::test]
async fn changed_artifacts_reingest_and_history_is_additive() {
    let Some(db) = test_db().await else { return };
    let tmp = tempfile::tempdir().unwrap();
    let chain = unique_chain("change");
    write_batch(tmp.path(), &chain, &simple_batch());
    assert!(matches!(
        ingest_batch(&db, tmp.path(), date(), &chain).await,
        BatchOutcome::Committed(_)
    ));

    // A corrected publication for the same day: one price changed.
    write_batch(
        tmp.path(),
        &chain,
        &Batch {
            stores: "S1,Konzum Zagreb,supermarket,Ilica 1,Zagreb,10000\n",
            products: "P1,3850123456789,Mlijeko,Dukat,mlijeko,L,1\n",
            prices: "S1,P1,13.49,,,,\n",
        },
    );
    assert!(matches!(
        ingest_batch(&db, tmp.path(), date(), &chain).await,
        BatchOutcome::Committed(_)
    ));

    // Both observations remain; price history never loses rows.
    let store_key = format!("{chain}:S1");
    assert_eq!(price_count(&db, &store_key).await, 2);
}

#[tokio::test]
async fn products_without_barcode_stay_chain_scoped() {
    let Some(db) = test_db().await else { return };
    let tmp = tempfile::tempdir().unwrap();
    let chain_a = unique_chain("synth_a");
    let chain_b = unique_chain("synth_b");
    let batch = Batch {
        stores: "S1,Store,supermarket,Ulica 1,Split,21000\n",
        products: "P1,,Kruh,,,kom,1\n",
        prices: "S1,P1,1.49,,,,\n",
    };
    // The crawl writes synthetic identities into the artifact; simulate that.
    let write_synthetic = |chain: &str| {
        let dir = tmp.path().join("2025-05-27").join(chain);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("stores.csv"),
            format!("store_id,name,type,address,city,zipcode\n{}", batch.stores),
        )
        .unwrap();
        std::fs::write(
            dir.join("products.csv"),
            format!(
                "product_id,barcode,name,brand,category,unit,quantity\nP1,{chain}:P1,Kruh,,,kom,1\n"
            ),
        )
        .unwrap();
        std::fs::write(
            dir.join("prices.csv"),
            format!(
                "store_id,product_id,price,unit_price,best_price_30,special_price,anchor_price\n{}",
                batch.prices
            ),
        )
        .unwrap();
    };
    write_synthetic(&chain_a);
    write_synthetic(&chain_b);

    assert!(matches!(
        ingest_batch(&db, tmp.path(), date(), &chain_a).await,
        BatchOutcome::Committed(_)
    ));
    assert!(matches!(
        ingest_batch(&db, tmp.path(), date(), &chain_b).await,
        BatchOutcome::Committed(_)
    ));

    // Identically named products from different chains never merge.
    let count: i64 =
        sqlx::query_scalar("SELECT count(*) FROM products WHERE barcode = ANY($1)")
            .bind(vec![format!("{chain_a}:P1"), format!("{chain_b}:P1")])
            .fetch_one(&db.pool)
            .await
            .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn store_metadata_updates_in_place() {
    let Some(db) = test_db().await else { return };
    let tmp = tempfile::tempdir().unwrap();
    let chain = unique_chain("store");
    write_batch(tmp.path(), &chain, &simple_batch());
    assert!(matches!(
        ingest_batch(&db, tmp.path(), date(), &chain).await,
        BatchOutcome::Committed(_)
    ));

    // Same store, relocated; price changed so the batch re-ingests.
    write_batch(
        tmp.path(),
        &chain,
        &Batch {
            stores: "S1,Konzum Zagreb,supermarket,Vlaška 50,Zagreb,10000\n",
            products: "P1,3850123456789,Mlijeko,Dukat,mlijeko,L,1\n",
            prices: "S1,P1,12.49,,,,\n",
        },
    );
    assert!(matches!(
        ingest_batch(&db, tmp.path(), date(), &chain).await,
        BatchOutcome::Committed(_)
    ));

    let store_key = format!("{chain}:S1");
    let (count, address): (i64, String) = sqlx::query_as(
        "SELECT count(*) OVER (), address FROM stores WHERE store_id = $1 LIMIT 1",
    )
    .bind(&store_key)
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
    assert_eq!(address, "Vlaška 50");
}

#[tokio::test]
async fn failed_batch_leaves_no_ledger_entry_and_retries_cleanly() {
    let Some(db) = test_db().await else { return };
    let tmp = tempfile::tempdir().unwrap();
    let chain = unique_chain("atomic");
    // NUMERIC(10,2) overflow makes the price insert fail inside the
    // transaction, after stores and products were written to it.
    write_batch(
        tmp.path(),
        &chain,
        &Batch {
            stores: "S1,Konzum Zagreb,supermarket,Ilica 1,Zagreb,10000\n",
            products: "P1,3850123456789,Mlijeko,Dukat,mlijeko,L,1\n",
            prices: "S1,P1,99999999999.99,,,,\n",
        },
    );

    let outcome = ingest_batch(&db, tmp.path(), date(), &chain).await;
    assert!(matches!(outcome, BatchOutcome::Failed(_)));

    let identifier = batch_identifier(&chain, date());
    assert_eq!(ledger_hash(&db, &identifier).await, None);
    let store_key = format!("{chain}:S1");
    assert_eq!(price_count(&db, &store_key).await, 0);

    // The corrected publication ingests on retry.
    write_batch(tmp.path(), &chain, &simple_batch());
    assert!(matches!(
        ingest_batch(&db, tmp.path(), date(), &chain).await,
        BatchOutcome::Committed(_)
    ));
    assert!(ledger_hash(&db, &identifier).await.is_some());
    assert_eq!(price_count(&db, &store_key).await, 1);
}

#[tokio::test]
async fn ledger_records_the_batch_under_its_identifier() {
    let Some(db) = test_db().await else { return };
    let tmp = tempfile::tempdir().unwrap();
    let chain = unique_chain("ledger");
    write_batch(tmp.path(), &chain, &simple_batch());

    assert!(matches!(
        ingest_batch(&db, tmp.path(), date(), &chain).await,
        BatchOutcome::Committed(_)
    ));
    let identifier = batch_identifier(&chain, date());
    assert!(identifier.ends_with("/2025-05-27"));
    let hash = ledger_hash(&db, &identifier).await.expect("ledger row");
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}
