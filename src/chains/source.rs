//! Shared data-acquisition plumbing for the per-chain adapters: HTTP fetch
//! with failure-mode mapping, index-page link extraction, column-map driven
//! price-list CSV parsing, and a per-date snapshot cache so the three list
//! operations of one adapter share a single fetch.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use regex::Regex;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::error::CrawlError;
use crate::model::{ChainSnapshot, PriceRecord, ProductRecord};

/// HTTP client wrapper for one chain's public price-list source.
///
/// Transport-level failures and non-success statuses map to
/// `SourceUnavailable`; the caller decides what counts as format drift.
pub struct HttpSource {
    chain: &'static str,
    client: Client,
}

impl HttpSource {
    /// Fails only when the TLS backend cannot be initialized, in which case
    /// no chain can be crawled at all.
    pub fn new(chain: &'static str, timeout: Duration) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent("cijene-crawler/0.1")
            .build()
            .map_err(|e| CrawlError::source_unavailable(chain, format!("http client: {e}")))?;
        Ok(Self { chain, client })
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, CrawlError> {
        let bytes = self.fetch_bytes(url).await?;
        // Retailer CSVs are nominally UTF-8 but stray bytes do occur.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, CrawlError> {
        debug!(chain = self.chain, url, "fetching");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CrawlError::source_unavailable(self.chain, e.to_string()))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| CrawlError::source_unavailable(self.chain, e.to_string()))?;
        let body = resp
            .bytes()
            .await
            .map_err(|e| CrawlError::source_unavailable(self.chain, e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Extract links with the given extension from an HTML index page, resolved
/// against the page URL. Order is de-duplicated, first occurrence wins.
pub fn extract_links(html: &str, page_url: &str, extension: &str) -> Vec<String> {
    // href attributes only; the index pages are plain link lists.
    let re = Regex::new(r#"href="([^"]+)""#).unwrap();
    let base = Url::parse(page_url).ok();
    let mut seen = Vec::new();
    for cap in re.captures_iter(html) {
        let href = &cap[1];
        if !href.to_ascii_lowercase().ends_with(extension) {
            continue;
        }
        let absolute = match &base {
            Some(b) => match b.join(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            },
            None => href.to_string(),
        };
        if !seen.contains(&absolute) {
            seen.push(absolute);
        }
    }
    seen
}

/// Parse a price string as published by the retailers: comma or dot decimal
/// separator, possibly blank. Blank/invalid yields None.
pub fn parse_decimal(raw: &str) -> Option<BigDecimal> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<BigDecimal>().ok()
}

/// Replace Croatian diacritics with ASCII equivalents, as the importer and
/// several filename parsers expect.
pub fn strip_diacritics(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'š' => 's',
            'đ' => 'd',
            'č' | 'ć' => 'c',
            'ž' => 'z',
            'Š' => 'S',
            'Đ' => 'D',
            'Č' | 'Ć' => 'C',
            'Ž' => 'Z',
            other => other,
        })
        .collect()
}

/// Per-chain mapping from our normalized fields to that retailer's CSV column
/// headers. An empty header means the chain does not publish that column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMap {
    pub product_id: &'static str,
    pub barcode: &'static str,
    pub name: &'static str,
    pub brand: &'static str,
    pub category: &'static str,
    pub unit: &'static str,
    pub quantity: &'static str,
    pub price: &'static str,
    pub unit_price: &'static str,
    pub best_price_30: &'static str,
    pub special_price: &'static str,
    pub anchor_price: &'static str,
}

/// Parse one store's price-list CSV into product and price records.
///
/// Rows without a product id, or without any usable price, are skipped with a
/// warning; a file whose header row lacks the chain's product-id column is
/// format drift and fails as `ParseFailure`.
pub fn parse_price_csv(
    chain: &'static str,
    store_id: &str,
    text: &str,
    delimiter: u8,
    map: &ColumnMap,
) -> Result<(Vec<ProductRecord>, Vec<PriceRecord>), CrawlError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| CrawlError::parse_failure(chain, e.to_string()))?
        .clone();
    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim(), i))
        .collect();

    let col = |name: &str| -> Option<usize> {
        if name.is_empty() {
            None
        } else {
            index.get(name).copied()
        }
    };
    let product_id_col = col(map.product_id).ok_or_else(|| {
        CrawlError::parse_failure(
            chain,
            format!("missing column {:?} in price list", map.product_id),
        )
    })?;
    let price_col = col(map.price);
    let special_col = col(map.special_price);

    let field = |record: &csv::StringRecord, idx: Option<usize>| -> String {
        idx.and_then(|i| record.get(i))
            .unwrap_or_default()
            .trim()
            .to_string()
    };
    let money = |record: &csv::StringRecord, idx: Option<usize>| -> Option<BigDecimal> {
        idx.and_then(|i| record.get(i)).and_then(parse_decimal)
    };

    let mut products = Vec::new();
    let mut prices = Vec::new();
    let mut skipped = 0usize;

    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                debug!(chain, store_id, error = %e, "skipping unreadable row");
                skipped += 1;
                continue;
            }
        };
        let product_id = field(&record, Some(product_id_col));
        if product_id.is_empty() {
            skipped += 1;
            continue;
        }
        // Some chains leave the retail price blank during a special offer;
        // fall back to the special price before giving up on the row.
        let price = match money(&record, price_col).or_else(|| money(&record, special_col)) {
            Some(p) => p,
            None => {
                skipped += 1;
                continue;
            }
        };

        products.push(ProductRecord {
            product_id: product_id.clone(),
            barcode: field(&record, col(map.barcode)),
            name: field(&record, col(map.name)),
            brand: field(&record, col(map.brand)),
            category: field(&record, col(map.category)),
            unit: field(&record, col(map.unit)),
            quantity: field(&record, col(map.quantity)),
        });
        prices.push(PriceRecord {
            store_id: store_id.to_string(),
            product_id,
            price,
            unit_price: money(&record, col(map.unit_price)),
            best_price_30: money(&record, col(map.best_price_30)),
            special_price: money(&record, special_col),
            anchor_price: money(&record, col(map.anchor_price)),
        });
    }

    if skipped > 0 {
        warn!(chain, store_id, skipped, "rows skipped in price list");
    }
    Ok((products, prices))
}

/// Merge one store's parsed rows into the chain snapshot, de-duplicating
/// products by chain-scoped product id. First occurrence wins.
///
/// `seen` is the set of product ids already in the snapshot; the caller keeps
/// it across all stores of one fetch so the merge stays constant-time per row
/// even for chains with hundreds of stores sharing one catalog.
pub fn merge_into_snapshot(
    snapshot: &mut ChainSnapshot,
    seen: &mut HashSet<String>,
    products: Vec<ProductRecord>,
    prices: Vec<PriceRecord>,
) {
    for product in products {
        if seen.insert(product.product_id.clone()) {
            snapshot.products.push(product);
        }
    }
    snapshot.prices.extend(prices);
}

/// One-date snapshot cache. The adapter trait exposes three list operations;
/// fetching the source once per (adapter, date) keeps them cheap without any
/// state shared between adapters.
#[derive(Default)]
pub struct SnapshotCache {
    inner: Mutex<Option<(NaiveDate, Arc<ChainSnapshot>)>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch<F>(
        &self,
        date: NaiveDate,
        fetch: F,
    ) -> Result<Arc<ChainSnapshot>, CrawlError>
    where
        F: Future<Output = Result<ChainSnapshot, CrawlError>>,
    {
        let mut guard = self.inner.lock().await;
        if let Some((cached_date, snapshot)) = guard.as_ref() {
            if *cached_date == date {
                return Ok(Arc::clone(snapshot));
            }
        }
        let snapshot = Arc::new(fetch.await?);
        *guard = Some((date, Arc::clone(&snapshot)));
        Ok(snapshot)
    }
}
