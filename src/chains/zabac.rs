//! Žabac food outlet: a single index page linking one CSV per store. The
//! files no longer carry store ids, so a fixed lookup table keyed by address
//! keeps ids stable with previously loaded data.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use tracing::warn;

use crate::chains::source::{
    extract_links, merge_into_snapshot, parse_price_csv, strip_diacritics, ColumnMap, HttpSource,
    SnapshotCache,
};
use crate::error::CrawlError;
use crate::model::{ChainSnapshot, StoreRecord};

const CHAIN: &str = "zabac";
const INDEX_URL: &str = "https://zabacfoodoutlet.hr/cjenik/";

const COLUMNS: ColumnMap = ColumnMap {
    product_id: "Artikl",
    barcode: "Barcode",
    name: "Naziv artikla / usluge",
    brand: "Marka",
    category: "Kategorija",
    unit: "",
    quantity: "Gramaža",
    price: "Mpc",
    unit_price: "Mpc",
    best_price_30: "Najniža cijena u posljednjih 30 dana",
    special_price: "",
    anchor_price: "Sidrena cijena na 2.5.2025",
};

/// Known store locations; the published filenames only carry the address.
const STORE_IDS: &[(&str, &str)] = &[
    ("tratinska 80a", "PJ-2"),
    ("nemciceva 1", "PJ-4"),
    ("bozidara magovca", "PJ-5"),
    ("dolac 2", "PJ-6"),
    ("dubrava 256l", "PJ-7"),
    ("ilica 231", "PJ-9"),
    ("zagrebacka cesta 205", "PJ-10"),
    ("savska cesta 206", "PJ-11"),
];

/// Filename format: `<type><address>-<city>-<zipcode>-<date>-<time>-<seq>.csv`
/// with no divider between type and address; "Supermarket" is the only type
/// in use.
fn filename_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<type>Supermarket)(?P<address>.+)-(?P<city>[^-]+)-(?P<zipcode>\d+)-[^-]+-[^-]+-[^-]+\.csv$",
        )
        .unwrap()
    })
}

pub(crate) fn parse_store_from_filename(filename: &str) -> Option<StoreRecord> {
    let caps = filename_pattern().captures(filename)?;
    let address = caps["address"].replace('-', " ").trim().to_string();
    let lookup = strip_diacritics(&address).to_lowercase();
    let store_id = STORE_IDS
        .iter()
        .find(|(addr, _)| lookup.starts_with(addr) || addr.starts_with(&lookup))
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| lookup.replace(' ', "-"));
    let city = caps["city"].trim().to_string();
    Some(StoreRecord {
        store_id,
        name: format!("Žabac {city}"),
        store_type: caps["type"].to_lowercase(),
        address,
        city,
        zipcode: caps["zipcode"].to_string(),
    })
}

pub struct ZabacAdapter {
    http: HttpSource,
    pub(crate) cache: SnapshotCache,
}

impl ZabacAdapter {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self {
            http: HttpSource::new(CHAIN, Duration::from_secs(30))?,
            cache: SnapshotCache::new(),
        })
    }

    async fn fetch(&self, _date: NaiveDate) -> Result<ChainSnapshot, CrawlError> {
        // The index only ever carries the current day's lists.
        let html = self.http.fetch_text(INDEX_URL).await?;
        let links = extract_links(&html, INDEX_URL, ".csv");
        if links.is_empty() {
            return Err(CrawlError::parse_failure(CHAIN, "no CSV links on index"));
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

crate::chains::impl_chain_adapter!(ZabacAdapter, CHAIN);
