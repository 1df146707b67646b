//! Studenac publishes one ZIP per day containing an XML file per store. The
//! store element carries its own identity (`Oznaka`, `Oblik`, `Adresa`) and
//! the product list, so no filename parsing is needed.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::warn;

use crate::chains::source::{merge_into_snapshot, parse_decimal, HttpSource, SnapshotCache};
use crate::error::CrawlError;
use crate::model::{ChainSnapshot, PriceRecord, ProductRecord, StoreRecord};

const CHAIN: &str = "studenac";
const BASE_URL: &str = "https://www.studenac.hr";

/// The published address is `<street> <number> <CITY>`; the city is the
/// trailing run of uppercase words.
fn address_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<address>.*?)(?P<city>[A-ZČĆĐŠŽ][A-ZČĆĐŠŽ\s]+)$").unwrap()
    })
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn split_address(raw: &str) -> (String, String) {
    match address_pattern().captures(raw.trim()) {
        Some(caps) => (
            title_case(caps["address"].trim()),
            title_case(caps["city"].trim()),
        ),
        None => (title_case(raw.trim()), String::new()),
    }
}

/// Parse one store's XML price list.
///
/// Product rows without a `SifraProizvoda`, or without any usable price, are
/// skipped with a warning; a file without the store `Oznaka` is format drift
/// and fails as `ParseFailure`.
pub(crate) fn parse_store_xml(
    xml: &[u8],
) -> Result<(StoreRecord, Vec<ProductRecord>, Vec<PriceRecord>), CrawlError> {
    let text = String::from_utf8_lossy(xml);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut store_fields: HashMap<String, String> = HashMap::new();
    let mut product_fields: Option<HashMap<String, String>> = None;
    let mut rows: Vec<HashMap<String, String>> = Vec::new();
    let mut tag: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "Proizvod" {
                    product_fields = Some(HashMap::new());
                }
                tag = Some(name);
            }
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| CrawlError::parse_failure(CHAIN, e.to_string()))?
                    .trim()
                    .to_string();
                if let Some(tag) = &tag {
                    match &mut product_fields {
                        Some(fields) => {
                            fields.insert(tag.clone(), value);
                        }
                        None => {
                            store_fields.insert(tag.clone(), value);
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"Proizvod" {
                    if let Some(fields) = product_fields.take() {
                        rows.push(fields);
                    }
                }
                tag = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(CrawlError::parse_failure(CHAIN, format!("bad XML: {e}"))),
            _ => {}
        }
    }

    let store_id = store_fields
        .get("Oznaka")
        .filter(|s| !s.is_empty())
        .cloned()
        .ok_or_else(|| CrawlError::parse_failure(CHAIN, "store file without Oznaka"))?;
    let store_type = store_fields
        .get("Oblik")
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    let (address, city) =
        split_address(store_fields.get("Adresa").map(String::as_str).unwrap_or(""));
    let store = StoreRecord {
        name: format!("Studenac {store_id}"),
        store_id,
        store_type,
        address,
        city,
        zipcode: String::new(),
    };

    let mut products = Vec::new();
    let mut prices = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        let field = |key: &str| row.get(key).cloned().unwrap_or_default();
        let money = |key: &str| row.get(key).and_then(|v| parse_decimal(v));

        let product_id = field("SifraProizvoda");
        if product_id.is_empty() {
            skipped += 1;
            continue;
        }
        // Promotional rows may carry only the action price.
        let price = match money("MaloprodajnaCijena").or_else(|| money("MaloprodajnaCijenaAkcija"))
        {
            Some(p) => p,
            None => {
                skipped += 1;
                continue;
            }
        };

        products.push(ProductRecord {
            product_id: product_id.clone(),
            barcode: field("Barkod"),
            name: field("NazivProizvoda"),
            brand: field("MarkaProizvoda"),
            category: field("KategorijeProizvoda"),
            unit: field("JedinicaMjere"),
            quantity: field("NetoKolicina"),
        });
        prices.push(PriceRecord {
            store_id: store.store_id.clone(),
            product_id,
            price,
            unit_price: money("CijenaPoJedinici"),
            best_price_30: money("NajnizaCijena"),
            special_price: money("MaloprodajnaCijenaAkcija"),
            anchor_price: money("SidrenaCijena"),
        });
    }
    if skipped > 0 {
        warn!(chain = CHAIN, store_id = %store.store_id, skipped, "rows skipped in price list");
    }
    Ok((store, products, prices))
}

pub struct StudenacAdapter {
    http: HttpSource,
    pub(crate) cache: SnapshotCache,
}

impl StudenacAdapter {
    pub fn new() -> Result<Self, CrawlError> {
        // Longer timeout for the ZIP download.
        Ok(Self {
            http: HttpSource::new(CHAIN, Duration::from_secs(120))?,
            cache: SnapshotCache::new(),
        })
    }

    async fn fetch(&self, date: NaiveDate) -> Result<ChainSnapshot, CrawlError> {
        let zip_url = format!(
            "{BASE_URL}/cjenici/PROIZVODI-{}.zip",
            date.format("%Y-%m-%d")
        );
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
            if !name.to_ascii_lowercase().ends_with(".xml") {
                continue;
            }
            let mut raw = Vec::new();
            entry
                .read_to_end(&mut raw)
                .map_err(|e| CrawlError::parse_failure(CHAIN, format!("{name}: {e}")))?;
            match parse_store_xml(&raw) {
                Ok((store, products, prices)) => {
                    snapshot.stores.push(store);
                    merge_into_snapshot(&mut snapshot, &mut seen, products, prices);
                }
                Err(e) => {
                    warn!(chain = CHAIN, entry = %name, error = %e, "skipping unparsable store file");
                    continue;
                }
            }
        }
        Ok(snapshot)
    }
}

crate::chains::impl_chain_adapter!(StudenacAdapter, CHAIN);
