//! Konzum publishes one CSV per store, linked from a paginated index page.
//! Store identity is encoded in the CSV filename.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use tracing::warn;

use crate::chains::source::{
    extract_links, merge_into_snapshot, parse_price_csv, ColumnMap, HttpSource, SnapshotCache,
};
use crate::error::CrawlError;
use crate::model::{ChainSnapshot, StoreRecord};

const CHAIN: &str = "konzum";
const BASE_URL: &str = "https://www.konzum.hr";
const MAX_INDEX_PAGES: u32 = 100;

const COLUMNS: ColumnMap = ColumnMap {
    product_id: "ŠIFRA PROIZVODA",
    barcode: "BARKOD",
    name: "NAZIV PROIZVODA",
    brand: "MARKA PROIZVODA",
    category: "KATEGORIJA PROIZVODA",
    unit: "JEDINICA MJERE",
    quantity: "NETO KOLIČINA",
    price: "MALOPRODAJNA CIJENA",
    unit_price: "CIJENA ZA JEDINICU MJERE",
    best_price_30: "NAJNIŽA CIJENA U POSLJEDNJIH 30 DANA",
    special_price: "MPC ZA VRIJEME POSEBNOG OBLIKA PRODAJE",
    anchor_price: "SIDRENA CIJENA NA 2.5.2025",
};

/// Filename format: `<TYPE>,<ADDRESS>,<CITY>,<ZIPCODE>,<STORE_ID>,<seq>,<date>.csv`
/// (commas arrive percent-encoded in the link href).
fn filename_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<type>[^,]+),(?P<address>[^,]+),(?P<city>[^,]+),(?P<zipcode>\d+),(?P<store_id>\w+),").unwrap()
    })
}

pub(crate) fn parse_store_from_filename(filename: &str) -> Option<StoreRecord> {
    let caps = filename_pattern().captures(filename)?;
    let city = caps["city"].trim().to_string();
    Some(StoreRecord {
        store_id: caps["store_id"].to_string(),
        name: format!("Konzum {city}"),
        store_type: caps["type"].trim().to_lowercase(),
        address: caps["address"].trim().to_string(),
        city,
        zipcode: caps["zipcode"].to_string(),
    })
}

pub struct KonzumAdapter {
    http: HttpSource,
    pub(crate) cache: SnapshotCache,
}

impl KonzumAdapter {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self {
            http: HttpSource::new(CHAIN, Duration::from_secs(60))?,
            cache: SnapshotCache::new(),
        })
    }

    async fn fetch(&self, date: NaiveDate) -> Result<ChainSnapshot, CrawlError> {
        let mut links = Vec::new();
        for page in 1..=MAX_INDEX_PAGES {
            let url = format!("{BASE_URL}/cjenici?date={date}&page={page}");
            let html = self.http.fetch_text(&url).await?;
            let page_links = extract_links(&html, &url, ".csv");
            if page_links.is_empty() {
                break;
            }
            for link in page_links {
                if !links.contains(&link) {
                    links.push(link);
                }
            }
        }
        if links.is_empty() {
            return Err(CrawlError::parse_failure(
                CHAIN,
                format!("no price lists published for {date}"),
            ));
        }

        let mut snapshot = ChainSnapshot::default();
        let mut seen = HashSet::new();
        for link in links {
            let filename = urlencoding::decode(link.rsplit('/').next().unwrap_or(&link))
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| link.clone());
            let Some(store) = parse_store_from_filename(&filename) else {
                warn!(chain = CHAIN, filename, "unrecognized price list filename");
                continue;
            };
            let text = self.http.fetch_text(&link).await?;
            let (products, prices) = parse_price_csv(CHAIN, &store.store_id, &text, b',', &COLUMNS)?;
            snapshot.stores.push(store);
            merge_into_snapshot(&mut snapshot, &mut seen, products, prices);
        }
        Ok(snapshot)
    }
}

crate::chains::impl_chain_adapter!(KonzumAdapter, CHAIN);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_identity_from_filename() {
        let store = parse_store_from_filename(
            "SUPERMARKET,ILICA 1,ZAGREB,10000,0034,015,27.05.2025 7.30.csv",
        )
        .unwrap();
        assert_eq!(store.store_id, "0034");
        assert_eq!(store.store_type, "supermarket");
        assert_eq!(store.city, "ZAGREB");
        assert_eq!(store.zipcode, "10000");
        assert_eq!(store.address, "ILICA 1");
    }

    #[test]
    fn rejects_unrelated_filenames() {
        assert!(parse_store_from_filename("katalog-svibanj.csv").is_none());
    }
}
