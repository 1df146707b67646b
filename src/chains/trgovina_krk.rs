//! Trgovina Krk lists its stores as headed sections on one index page, each
//! followed by dated CSV links (newest first). Store identity is derived
//! from the section header text.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use tracing::warn;

use crate::chains::source::{
    merge_into_snapshot, parse_price_csv, ColumnMap, HttpSource, SnapshotCache,
};
use crate::error::CrawlError;
use crate::model::{ChainSnapshot, StoreRecord};

const CHAIN: &str = "trgovina-krk";
const INDEX_URL: &str = "https://trgovina-krk.hr/objava-cjenika/";

const COLUMNS: ColumnMap = ColumnMap {
    product_id: "Šifra proizvoda",
    barcode: "Barkod",
    name: "Naziv proizvoda",
    brand: "Marka proizvoda",
    category: "Kategorija proizvoda",
    unit: "Jedinica mjere",
    quantity: "Neto količina",
    price: "Maloprodajna cijena",
    unit_price: "Cijena za jedinicu mjere",
    best_price_30: "Najniža cijena u poslj.30 dana",
    special_price: "MPC za vrijeme posebnog oblika prodaje",
    anchor_price: "Sidrena cijena na 2.5.2025",
};

/// Section headers look like `Supermarket Šet. sv. Bernardina 6C KRK`:
/// an address ending in a number (plus optional letter) followed by the
/// uppercase city name.
fn header_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Supermarket (?P<address>.*?[ 0-9][a-zA-Z]?) (?P<city>[A-ZČĆĐŠŽ][ A-ZČĆĐŠŽ]*)$")
            .unwrap()
    })
}

/// A store section: header div followed by a link list. The orchestrator only
/// needs the header text and the first (most recent) CSV link.
fn section_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<div[^>]*>\s*(?P<header>Supermarket[^<]+?)\s*</div>.*?<a[^>]+href="(?P<href>[^"]+\.csv)""#)
            .unwrap()
    })
}

pub(crate) fn parse_store_from_header(header: &str) -> Option<StoreRecord> {
    let caps = header_pattern().captures(header.trim())?;
    let address = caps["address"].trim().to_string();
    let city = caps["city"].trim().to_string();
    let store_id = format!(
        "{}_{}",
        address.replace(' ', "_").to_lowercase(),
        city.replace(' ', "_").to_lowercase()
    );
    Some(StoreRecord {
        store_id,
        name: format!("Trgovina Krk {city}"),
        store_type: "supermarket".to_string(),
        address,
        city,
        zipcode: String::new(),
    })
}

pub(crate) fn parse_store_sections(html: &str) -> Vec<(StoreRecord, String)> {
    section_pattern()
        .captures_iter(html)
        .filter_map(|caps| {
            let store = parse_store_from_header(&caps["header"])?;
            Some((store, caps["href"].to_string()))
        })
        .collect()
}

pub struct TrgovinaKrkAdapter {
    http: HttpSource,
    pub(crate) cache: SnapshotCache,
}

impl TrgovinaKrkAdapter {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self {
            http: HttpSource::new(CHAIN, Duration::from_secs(30))?,
            cache: SnapshotCache::new(),
        })
    }

    async fn fetch(&self, _date: NaiveDate) -> Result<ChainSnapshot, CrawlError> {
        let html = self.http.fetch_text(INDEX_URL).await?;
        let sections = parse_store_sections(&html);
        if sections.is_empty() {
            return Err(CrawlError::parse_failure(
                CHAIN,
                "no store sections on index page",
            ));
        }

        let mut snapshot = ChainSnapshot::default();
        let mut seen = HashSet::new();
        for (store, csv_url) in sections {
            let text = match self.http.fetch_text(&csv_url).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(chain = CHAIN, store_id = %store.store_id, error = %e, "store price list unavailable");
                    continue;
                }
            };
            let (products, prices) = parse_price_csv(CHAIN, &store.store_id, &text, b';', &COLUMNS)?;
            snapshot.stores.push(store);
            merge_into_snapshot(&mut snapshot, &mut seen, products, prices);
        }
        Ok(snapshot)
    }
}

crate::chains::impl_chain_adapter!(TrgovinaKrkAdapter, CHAIN);
