//! Eurospin publishes a daily ZIP (selected via a dropdown on the index
//! page) containing one semicolon-delimited CSV per store; store identity is
//! encoded in the hyphen-separated CSV filename.

use std::collections::HashSet;
use std::io::{Cursor, Read};
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

const CHAIN: &str = "eurospin";
const BASE_URL: &str = "https://www.eurospin.hr";
const INDEX_URL: &str = "https://www.eurospin.hr/cjenik/";

const COLUMNS: ColumnMap = ColumnMap {
    product_id: "ŠIFRA_PROIZVODA",
    barcode: "BARKOD",
    name: "NAZIV_PROIZVODA",
    brand: "MARKA_PROIZVODA",
    category: "KATEGORIJA_PROIZVODA",
    unit: "JEDINICA_MJERE",
    quantity: "NETO_KOLIČINA",
    price: "MALOPROD.CIJENA(EUR)",
    unit_price: "CIJENA_ZA_JEDINICU_MJERE",
    best_price_30: "NAJNIŽA_MPC_U_30DANA",
    special_price: "MPC_POSEB.OBLIK_PROD",
    anchor_price: "SIDRENA_CIJENA",
};

fn zip_option_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<option[^>]+value="(?P<url>[^"]+\.zip)""#).unwrap())
}

/// Filename format:
/// `<type>-<store_id>-<address_with_underscores>-<city>-<zipcode>-<date>-<time>.csv`
fn filename_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<type>[a-z]+)-(?P<store_id>\d+)-(?P<address>[^-]+)-(?P<city>[^-]+)-(?P<zipcode>\d+)-",
        )
        .unwrap()
    })
}

pub(crate) fn find_zip_urls(html: &str, date: NaiveDate) -> Vec<String> {
    let date_str = date.format("%d.%m.%Y").to_string();
    zip_option_pattern()
        .captures_iter(html)
        .map(|caps| caps["url"].to_string())
        .filter(|url| url.contains(&date_str))
        .map(|url| {
            if url.starts_with("http") {
                url
            } else {
                format!("{BASE_URL}{url}")
            }
        })
        .collect()
}

pub(crate) fn parse_store_from_filename(filename: &str) -> Option<StoreRecord> {
    let caps = filename_pattern().captures(filename)?;
    let city = caps["city"].replace('_', " ");
    Some(StoreRecord {
        store_id: caps["store_id"].to_string(),
        name: format!("Eurospin {city}"),
        store_type: caps["type"].to_string(),
        address: caps["address"].replace('_', " "),
        city,
        zipcode: caps["zipcode"].to_string(),
    })
}

pub struct EurospinAdapter {
    http: HttpSource,
    pub(crate) cache: SnapshotCache,
}

impl EurospinAdapter {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self {
            http: HttpSource::new(CHAIN, Duration::from_secs(120))?,
            cache: SnapshotCache::new(),
        })
    }

    async fn fetch(&self, date: NaiveDate) -> Result<ChainSnapshot, CrawlError> {
        let html = self.http.fetch_text(INDEX_URL).await?;
        let zip_urls = find_zip_urls(&html, date);
        if zip_urls.is_empty() {
            return Err(CrawlError::parse_failure(
                CHAIN,
                format!("no price list ZIP for {date}"),
            ));
        }

        let mut snapshot = ChainSnapshot::default();
        let mut seen = HashSet::new();
        for zip_url in zip_urls {
            let bytes = self.http.fetch_bytes(&zip_url).await?;
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
                .map_err(|e| CrawlError::parse_failure(CHAIN, format!("bad ZIP: {e}")))?;
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
                let (products, prices) =
                    parse_price_csv(CHAIN, &store.store_id, &text, b';', &COLUMNS)?;
                snapshot.stores.push(store);
                merge_into_snapshot(&mut snapshot, &mut seen, products, prices);
            }
        }
        Ok(snapshot)
    }
}

crate::chains::impl_chain_adapter!(EurospinAdapter, CHAIN);
