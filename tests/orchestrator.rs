//! Crawl orchestration behavior over mock adapters: failure isolation,
//! artifact layout, warning statuses and cancellation.

use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use cijene::error::CrawlError;
use cijene::model::{PriceRecord, ProductRecord, StoreRecord};
use cijene::{crawl, ChainAdapter, ChainRegistry, ChainStatus, CrawlOptions};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, 27).unwrap()
}

fn store(id: &str) -> StoreRecord {
    StoreRecord {
        store_id: id.to_string(),
        name: format!("Store {id}"),
        store_type: "supermarket".to_string(),
        address: "Ilica 1".to_string(),
        city: "Zagreb".to_string(),
        zipcode: "10000".to_string(),
    }
}

fn product(id: &str, barcode: &str) -> ProductRecord {
    ProductRecord {
        product_id: id.to_string(),
        barcode: barcode.to_string(),
        name: format!("Product {id}"),
        brand: String::new(),
        category: String::new(),
        unit: "kom".to_string(),
        quantity: "1".to_string(),
    }
}

fn price(store_id: &str, product_id: &str, amount: &str) -> PriceRecord {
    PriceRecord {
        store_id: store_id.to_string(),
        product_id: product_id.to_string(),
        price: BigDecimal::from_str(amount).unwrap(),
        unit_price: None,
        best_price_30: None,
        special_price: None,
        anchor_price: None,
    }
}

/// Adapter serving fixed in-memory data, or a source failure.
struct FakeAdapter {
    chain: &'static str,
    stores: Vec<StoreRecord>,
    products: Vec<ProductRecord>,
    prices: Vec<PriceRecord>,
    fail: bool,
}

impl FakeAdapter {
    fn healthy(chain: &'static str) -> Self {
        Self {
            chain,
            stores: vec![store("S1")],
            products: vec![product("P1", "3850123456789")],
            prices: vec![price("S1", "P1", "12.99")],
            fail: false,
        }
    }

    fn failing(chain: &'static str) -> Self {
        Self {
            chain,
            stores: vec![],
            products: vec![],
            prices: vec![],
            fail: true,
        }
    }

    fn empty_catalog(chain: &'static str) -> Self {
        Self {
            chain,
            stores: vec![store("S1")],
            products: vec![],
            prices: vec![],
            fail: false,
        }
    }
}

#[async_trait]
impl ChainAdapter for FakeAdapter {
    fn chain(&self) -> &'static str {
        self.chain
    }

    async fn list_stores(&self, _date: NaiveDate) -> Result<Vec<StoreRecord>, CrawlError> {
        if self.fail {
            return Err(CrawlError::source_unavailable(self.chain, "connection refused"));
        }
        Ok(self.stores.clone())
    }

    async fn list_products(&self, _date: NaiveDate) -> Result<Vec<ProductRecord>, CrawlError> {
        if self.fail {
            return Err(CrawlError::source_unavailable(self.chain, "connection refused"));
        }
        Ok(self.products.clone())
    }

    async fn list_prices(&self, _date: NaiveDate) -> Result<Vec<PriceRecord>, CrawlError> {
        if self.fail {
            return Err(CrawlError::source_unavailable(self.chain, "connection refused"));
        }
        Ok(self.prices.clone())
    }
}

fn status_of<'a>(summary: &'a cijene::CrawlSummary, chain: &str) -> &'a ChainStatus {
    &summary
        .outcomes
        .iter()
        .find(|o| o.chain == chain)
        .expect("outcome for chain")
        .status
}

#[tokio::test]
async fn one_failing_chain_does_not_stop_the_others() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = ChainRegistry::from_adapters(vec![
        Arc::new(FakeAdapter::healthy("alpha")),
        Arc::new(FakeAdapter::failing("broken")),
        Arc::new(FakeAdapter::healthy("gamma")),
    ]);

    let summary = crawl(&registry, tmp.path(), &CrawlOptions::for_date(date())).await;

    assert_eq!(summary.outcomes.len(), 3);
    assert!(!summary.all_failed());
    assert_eq!(status_of(&summary, "alpha"), &ChainStatus::Completed);
    assert_eq!(status_of(&summary, "gamma"), &ChainStatus::Completed);
    assert!(status_of(&summary, "broken").is_failed());

    // Healthy chains produced artifacts; the failed one produced none.
    assert!(tmp.path().join("2025-05-27/alpha/prices.csv").exists());
    assert!(tmp.path().join("2025-05-27/gamma/prices.csv").exists());
    assert!(!tmp.path().join("2025-05-27/broken").exists());
}

#[tokio::test]
async fn artifacts_use_fixed_layout_and_headers() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = ChainRegistry::from_adapters(vec![Arc::new(FakeAdapter::healthy("alpha"))]);

    crawl(&registry, tmp.path(), &CrawlOptions::for_date(date())).await;

    let dir = tmp.path().join("2025-05-27").join("alpha");
    let read = |name: &str| std::fs::read_to_string(dir.join(name)).unwrap();

    let stores = read("stores.csv");
    assert!(stores.starts_with("store_id,name,type,address,city,zipcode\n"));
    assert!(stores.contains("S1,Store S1,supermarket,Ilica 1,Zagreb,10000"));

    let products = read("products.csv");
    assert!(products.starts_with("product_id,barcode,name,brand,category,unit,quantity\n"));
    assert!(products.contains("P1,3850123456789,Product P1"));

    let prices = read("prices.csv");
    assert!(prices
        .starts_with("store_id,product_id,price,unit_price,best_price_30,special_price,anchor_price\n"));
    assert!(prices.contains("S1,P1,12.99,,,,"));
}

#[tokio::test]
async fn empty_catalog_completes_with_warning() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = ChainRegistry::from_adapters(vec![Arc::new(FakeAdapter::empty_catalog("alpha"))]);

    let summary = crawl(&registry, tmp.path(), &CrawlOptions::for_date(date())).await;

    assert!(matches!(
        status_of(&summary, "alpha"),
        ChainStatus::CompletedWithWarnings(_)
    ));
    // Artifacts still exist, with headers only beyond stores.
    let dir = tmp.path().join("2025-05-27").join("alpha");
    assert!(dir.join("products.csv").exists());
    let products = std::fs::read_to_string(dir.join("products.csv")).unwrap();
    assert_eq!(products.lines().count(), 1);
}

#[tokio::test]
async fn zero_stores_is_a_chain_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = ChainRegistry::from_adapters(vec![Arc::new(FakeAdapter {
        chain: "alpha",
        stores: vec![],
        products: vec![product("P1", "3850123456789")],
        prices: vec![],
        fail: false,
    })]);

    let summary = crawl(&registry, tmp.path(), &CrawlOptions::for_date(date())).await;
    assert!(summary.all_failed());
    assert!(!tmp.path().join("2025-05-27/alpha").exists());
}

#[tokio::test]
async fn cancellation_skips_chains_not_yet_started() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = ChainRegistry::from_adapters(vec![
        Arc::new(FakeAdapter::healthy("alpha")),
        Arc::new(FakeAdapter::healthy("beta")),
    ]);

    let cancel = Arc::new(AtomicBool::new(true));
    let mut options = CrawlOptions::for_date(date());
    options.concurrency = 1;
    options.cancel = Some(cancel.clone());

    let summary = crawl(&registry, tmp.path(), &options).await;
    assert!(summary.outcomes.is_empty());
    assert!(!tmp.path().join("2025-05-27").exists());

    cancel.store(false, Ordering::SeqCst);
    let summary = crawl(&registry, tmp.path(), &options).await;
    assert_eq!(summary.outcomes.len(), 2);
}

#[tokio::test]
async fn chain_selection_restricts_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = ChainRegistry::from_adapters(vec![
        Arc::new(FakeAdapter::healthy("alpha")),
        Arc::new(FakeAdapter::healthy("beta")),
    ]);

    let mut options = CrawlOptions::for_date(date());
    options.chains = Some(vec!["beta".to_string(), "missing".to_string()]);

    let summary = crawl(&registry, tmp.path(), &options).await;
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.outcomes[0].chain, "beta");
    assert!(!Path::new(&tmp.path().join("2025-05-27/alpha")).exists());
}
