//! Lidl publishes one ZIP per day containing a CSV per store; the index page
//! links the ZIPs by date and store identity is encoded in each CSV filename.

use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use tracing::warn;

use crate::chains::source::{
    merge_into_snapshot, parse_price_csv, ColumnMap, HttpSource, SnapshotCache,
};
use crate::error::CrawlError;
use crate::model::{ChainSnapshot, StoreRecord};

const CHAIN: &str = "lidl";
const INDEX_URL: &str = "https://tvrtka.lidl.hr/cijene";

const COLUMNS: ColumnMap = ColumnMap {
    product_id: "ŠIFRA",
    barcode: "BARKOD",
    name: "NAZIV",
    brand: "MARKA",
    category: "KATEGORIJA_PROIZVODA",
    unit: "JEDINICA_MJERE",
    quantity: "NETO_KOLIČINA",
    price: "MALOPRODAJNA_CIJENA",
    unit_price: "CIJENA_ZA_JEDINICU_MJERE",
    best_price_30: "NAJNIZA_CIJENA_U_POSLJ._30_DANA",
    special_price: "MPC_ZA_VRIJEME_POSEBNOG_OBLIKA_PRODAJE",
    anchor_price: "Sidrena_cijena_na_02.05.2025",
};

fn zip_link_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"href="(?P<url>[^"]*Popis_cijena_po_trgovinama_na_dan_(?P<d>\d{1,2})_(?P<m>\d{1,2})_(?P<y>\d{4})\.zip)""#)
            .unwrap()
    })
}

/// CSV entry names: `Supermarket <store_id>_<address>_<zipcode>_<city>_...csv`
fn filename_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?P<type>Supermarket)\s+(?P<store_id>\d+)_+(?P<address>[\w.\s-]+?)_+(?P<zipcode>\d{5})_+(?P<city>[\w\s-]+?)_",
        )
        .unwrap()
    })
}

pub(crate) fn find_zip_url(html: &str, date: NaiveDate) -> Option<String> {
    for caps in zip_link_pattern().captures_iter(html) {
        let (d, m, y) = (
            caps["d"].parse::<u32>().ok()?,
            caps["m"].parse::<u32>().ok()?,
            caps["y"].parse::<i32>().ok()?,
        );
        if d == date.day() && m == date.month() && y == date.year() {
            return Some(caps["url"].to_string());
        }
    }
    None
}

pub(crate) fn parse_store_from_filename(filename: &str) -> Option<StoreRecord> {
    let caps = filename_pattern().captures(filename)?;
    let city = caps["city"].replace('_', " ").trim().to_string();
    Some(StoreRecord {
        store_id: caps["store_id"].to_string(),
        name: format!("Lidl {city}"),
        store_type: caps["type"].to_lowercase(),
        address: caps["address"].replace('_', " ").trim().to_string(),
        city,
        zipcode: caps["zipcode"].to_string(),
    })
}

pub struct LidlAdapter {
    http: HttpSource,
    pub(crate) cache: SnapshotCache,
}

impl LidlAdapter {
    pub fn new() -> Result<Self, CrawlError> {
        // Longer timeout for the ZIP download.
        Ok(Self {
            http: HttpSource::new(CHAIN, Duration::from_secs(180))?,
            cache: SnapshotCache::new(),
        })
    }

    async fn fetch(&self, date: NaiveDate) -> Result<ChainSnapshot, CrawlError> {
        let index = self.http.fetch_text(INDEX_URL).await?;
        let zip_url = find_zip_url(&index, date).ok_or_else(|| {
            CrawlError::parse_failure(CHAIN, format!("no price list ZIP for {date}"))
        })?;
        // Links on the index page are usually relative.
        let zip_url = match url::Url::parse(INDEX_URL).and_then(|base| base.join(&zip_url)) {
            Ok(resolved) => resolved.to_string(),
            Err(_) => zip_url,
        };
        let bytes = self.http.fetch_bytes(&zip_url).await?;

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| CrawlError::parse_failure(CHAIN, format!("bad ZIP: {e}")))?;

        let mut snapshot = ChainSnapshot::default();
        let mut seen = HashSet::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| CrawlError::parse_failure(CHAIN, format!("bad ZIP entry: {e}")))?;
            let name = entry.name().to_string();
            if !name.to_ascii_lowercase().ends_with(".csv") {
                continue;
            }
            let Some(store) = parse_store_from_filename(&name) else {
                warn!(chain = CHAIN, filename = %name, "unrecognized price list filename");
                continue;
            };
            let mut raw = Vec::new();
            entry
                .read_to_end(&mut raw)
                .map_err(|e| CrawlError::parse_failure(CHAIN, format!("{name}: {e}")))?;
            let text = String::from_utf8_lossy(&raw);
            let (products, prices) = parse_price_csv(CHAIN, &store.store_id, &text, b',', &COLUMNS)?;
            snapshot.stores.push(store);
            merge_into_snapshot(&mut snapshot, &mut seen, products, prices);
        }
        Ok(snapshot)
    }
}

crate::chains::impl_chain_adapter!(LidlAdapter, CHAIN);
