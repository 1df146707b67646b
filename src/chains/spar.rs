//! Spar/InterSpar publishes a JSON index per date listing one
//! semicolon-delimited CSV per store; store identity is encoded in the
//! underscore-separated CSV filename.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::chains::source::{
    merge_into_snapshot, parse_price_csv, ColumnMap, HttpSource, SnapshotCache,
};
use crate::error::CrawlError;
use crate::model::{ChainSnapshot, StoreRecord};

const CHAIN: &str = "spar";
const BASE_URL: &str = "https://www.spar.hr";

const COLUMNS: ColumnMap = ColumnMap {
    product_id: "šifra",
    barcode: "barkod",
    name: "naziv",
    brand: "marka",
    category: "kategorija proizvoda",
    unit: "jedinica mjere",
    quantity: "neto količina",
    price: "MPC (EUR)",
    unit_price: "cijena za jedinicu mjere (EUR)",
    best_price_30: "Najniža cijena u posljednjih 30 dana (EUR)",
    special_price: "MPC za vrijeme posebnog oblika prodaje (EUR)",
    anchor_price: "sidrena cijena na 2.5.2025. (EUR)",
};

#[derive(Debug, Deserialize)]
struct PriceListIndex {
    files: Vec<PriceListFile>,
}

#[derive(Debug, Deserialize)]
struct PriceListFile {
    name: String,
    #[serde(rename = "URL")]
    url: String,
}

/// Filename format:
/// `<type>_<address_with_underscores>_<zipcode>_<city>_<store_id>_<date>...csv`
fn filename_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<type>[a-z]+)_(?P<address>[a-zA-Z0-9_.]+?)_(?P<zipcode>\d{4,5})_(?P<city>[a-z_.]+?)_(?P<store_id>\d+)_",
        )
        .unwrap()
    })
}

pub(crate) fn parse_store_from_filename(filename: &str) -> Option<StoreRecord> {
    let caps = filename_pattern().captures(filename)?;
    let city = caps["city"].replace('_', " ");
    Some(StoreRecord {
        store_id: caps["store_id"].to_string(),
        name: format!("Spar {city}"),
        store_type: caps["type"].to_string(),
        address: caps["address"].replace('_', " "),
        city,
        zipcode: caps["zipcode"].to_string(),
    })
}

pub struct SparAdapter {
    http: HttpSource,
    pub(crate) cache: SnapshotCache,
}

impl SparAdapter {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self {
            http: HttpSource::new(CHAIN, Duration::from_secs(60))?,
            cache: SnapshotCache::new(),
        })
    }

    async fn fetch(&self, date: NaiveDate) -> Result<ChainSnapshot, CrawlError> {
        let index_url = format!(
            "{BASE_URL}/datoteke_cjenici/Cjenik{}.json",
            date.format("%Y%m%d")
        );
        let body = self.http.fetch_text(&index_url).await?;
        let index: PriceListIndex = serde_json::from_str(&body)
            .map_err(|e| CrawlError::parse_failure(CHAIN, format!("index JSON: {e}")))?;

        let mut snapshot = ChainSnapshot::default();
        let mut seen = HashSet::new();
        for file in index.files {
            let Some(store) = parse_store_from_filename(&file.name) else {
                warn!(chain = CHAIN, filename = %file.name, "unrecognized price list filename");
                continue;
            };
            let text = self.http.fetch_text(&file.url).await?;
            let (products, prices) = parse_price_csv(CHAIN, &store.store_id, &text, b';', &COLUMNS)?;
            snapshot.stores.push(store);
            merge_into_snapshot(&mut snapshot, &mut seen, products, prices);
        }
        Ok(snapshot)
    }
}

crate::chains::impl_chain_adapter!(SparAdapter, CHAIN);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_identity_from_filename() {
        let store = parse_store_from_filename(
            "hipermarket_ulica_grada_vukovara_269_10000_zagreb_8756_20250527_0730.csv",
        )
        .unwrap();
        assert_eq!(store.store_id, "8756");
        assert_eq!(store.store_type, "hipermarket");
        assert_eq!(store.zipcode, "10000");
        assert_eq!(store.city, "zagreb");
        assert_eq!(store.address, "ulica grada vukovara 269");
    }

    #[test]
    fn index_json_shape() {
        let body = r#"{"files":[{"name":"supermarket_ilica_31_10000_zagreb_101_20250527.csv","URL":"https://www.spar.hr/f/101.csv"}]}"#;
        let index: PriceListIndex = serde_json::from_str(body).unwrap();
        assert_eq!(index.files.len(), 1);
        assert!(index.files[0].url.ends_with("101.csv"));
    }
}
