//! Jadranka Trgovina publishes prices for a single location (Market Maxi,
//! Mali Lošinj); the index page links one semicolon-delimited CSV per day,
//! matched by a DDMMYYYY date stamp in the filename.

use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDate;

use crate::chains::source::{
    extract_links, merge_into_snapshot, parse_price_csv, ColumnMap, HttpSource, SnapshotCache,
};
use crate::error::CrawlError;
use crate::model::{ChainSnapshot, StoreRecord};

const CHAIN: &str = "jadranka_trgovina";
const INDEX_URL: &str = "https://jadranka-trgovina.com/cjenici/";

const COLUMNS: ColumnMap = ColumnMap {
    product_id: "ŠIFRA PROIZVODA",
    barcode: "BARKOD",
    name: "NAZIV PROIZVODA",
    brand: "MARKA PROIZVODA",
    category: "KATEGORIJA PROIZVODA",
    unit: "JEDINICA MJERE",
    quantity: "NETO KOLIČINA",
    // Many rows carry only a special price during promotions; the shared
    // parser falls back to it when the retail price is blank.
    price: "MALOPRODAJNA CIJENA",
    unit_price: "CIJENA ZA JEDINICU MJERE",
    best_price_30: "NAJNIŽA CIJENA U POSLJEDNIH 30 DANA",
    special_price: "MPC ZA VRIJEME POSEBNOG OBLIKA PRODAJE",
    anchor_price: "SIDRENA CIJENA NA 2.5.2025",
};

fn fixed_store() -> StoreRecord {
    StoreRecord {
        store_id: "607".to_string(),
        name: "Jadranka Trgovina Market Maxi".to_string(),
        store_type: "market".to_string(),
        address: "Dražica 5".to_string(),
        city: "Mali Lošinj".to_string(),
        zipcode: String::new(),
    }
}

pub(crate) fn find_csv_for_date(links: &[String], date: NaiveDate) -> Option<String> {
    let stamp = date.format("%d%m%Y").to_string();
    links.iter().find(|u| u.contains(&stamp)).cloned()
}

pub struct JadrankaTrgovinaAdapter {
    http: HttpSource,
    pub(crate) cache: SnapshotCache,
}

impl JadrankaTrgovinaAdapter {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self {
            http: HttpSource::new(CHAIN, Duration::from_secs(30))?,
            cache: SnapshotCache::new(),
        })
    }

    async fn fetch(&self, date: NaiveDate) -> Result<ChainSnapshot, CrawlError> {
        let html = self.http.fetch_text(INDEX_URL).await?;
        let links = extract_links(&html, INDEX_URL, ".csv");
        let csv_url = find_csv_for_date(&links, date).ok_or_else(|| {
            CrawlError::parse_failure(CHAIN, format!("no price list for {date}"))
        })?;

        let store = fixed_store();
        let text = self.http.fetch_text(&csv_url).await?;
        let (products, prices) = parse_price_csv(CHAIN, &store.store_id, &text, b';', &COLUMNS)?;

        let mut snapshot = ChainSnapshot {
            stores: vec![store],
            ..Default::default()
        };
        let mut seen = HashSet::new();
        merge_into_snapshot(&mut snapshot, &mut seen, products, prices);
        Ok(snapshot)
    }
}

crate::chains::impl_chain_adapter!(JadrankaTrgovinaAdapter, CHAIN);
