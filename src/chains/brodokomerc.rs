//! Brodokomerc links one semicolon-delimited CSV per store from its index
//! page; filenames are underscore-separated
//! (`Supermarket_ADDRESS_CITY_CODE_ID_DATETIME.csv`) and only files stamped
//! with the requested date are taken.

use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::warn;

use crate::chains::source::{
    extract_links, merge_into_snapshot, parse_price_csv, ColumnMap, HttpSource, SnapshotCache,
};
use crate::error::CrawlError;
use crate::model::{ChainSnapshot, StoreRecord};

const CHAIN: &str = "brodokomerc";
const INDEX_URL: &str = "http://www.brodokomerc.hr/cijene";

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

/// `Supermarket_DRAZICKIH BORACA BB_DRAZICE_22041_243_27052025_07_22_02.csv`
pub(crate) fn parse_store_from_filename(filename: &str) -> Option<StoreRecord> {
    let stem = filename.strip_suffix(".csv")?;
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 5 {
        return None;
    }
    let store_type = parts[0].to_lowercase();
    let address = parts[1].trim().to_string();
    let city = parts[2].trim().to_string();
    let store_id = parts[3].to_string();
    if store_id.is_empty() || address.is_empty() {
        return None;
    }
    Some(StoreRecord {
        name: format!("Brodokomerc {city}"),
        store_id,
        store_type,
        address,
        city,
        zipcode: String::new(),
    })
}

pub struct BrodokomercAdapter {
    http: HttpSource,
    pub(crate) cache: SnapshotCache,
}

impl BrodokomercAdapter {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self {
            http: HttpSource::new(CHAIN, Duration::from_secs(30))?,
            cache: SnapshotCache::new(),
        })
    }

    async fn fetch(&self, date: NaiveDate) -> Result<ChainSnapshot, CrawlError> {
        let html = self.http.fetch_text(INDEX_URL).await?;
        let stamp = date.format("%d%m%Y").to_string();
        let links: Vec<String> = extract_links(&html, INDEX_URL, ".csv")
            .into_iter()
            .filter(|u| u.contains(&stamp))
            .collect();
        if links.is_empty() {
            return Err(CrawlError::parse_failure(
                CHAIN,
                format!("no price lists for {date}"),
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
            let (products, prices) = parse_price_csv(CHAIN, &store.store_id, &text, b';', &COLUMNS)?;
            snapshot.stores.push(store);
            merge_into_snapshot(&mut snapshot, &mut seen, products, prices);
        }
        Ok(snapshot)
    }
}

crate::chains::impl_chain_adapter!(BrodokomercAdapter, CHAIN);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_identity_from_filename() {
        let store = parse_store_from_filename(
            "Supermarket_DRAZICKIH BORACA BB_DRAZICE_22041_243_27052025_07_22_02.csv",
        )
        .unwrap();
        assert_eq!(store.store_id, "22041");
        assert_eq!(store.city, "DRAZICE");
        assert_eq!(store.address, "DRAZICKIH BORACA BB");
        assert_eq!(store.store_type, "supermarket");
    }

    #[test]
    fn rejects_short_filenames() {
        assert!(parse_store_from_filename("cjenik.csv").is_none());
    }
}
