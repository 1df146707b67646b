//! Artifact parsing for ingestion. Columns are resolved by header name, not
//! position (position only matters for the fingerprint), so a reordered but
//! otherwise valid artifact still ingests.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use tracing::warn;

use crate::chains::source::parse_decimal;
use crate::crawl::output::{PRICES_FILE, PRODUCTS_FILE, STORES_FILE};
use crate::error::CrawlError;
use crate::model::{PriceRecord, ProductRecord, StoreRecord};

#[derive(Debug, Default)]
pub struct BatchRecords {
    pub stores: Vec<StoreRecord>,
    pub products: Vec<ProductRecord>,
    pub prices: Vec<PriceRecord>,
    /// Individually malformed price rows dropped during parsing.
    pub rejected_rows: usize,
}

fn open_reader(chain: &str, path: &Path) -> Result<csv::Reader<File>, CrawlError> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| CrawlError::parse_failure(chain, format!("{}: {e}", path.display())))
}

fn header_index(
    chain: &str,
    reader: &mut csv::Reader<File>,
    file: &str,
) -> Result<HashMap<String, usize>, CrawlError> {
    let headers = reader
        .headers()
        .map_err(|e| CrawlError::parse_failure(chain, format!("{file}: {e}")))?;
    Ok(headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_string(), i))
        .collect())
}

fn require<'a>(
    chain: &str,
    index: &'a HashMap<String, usize>,
    file: &str,
    column: &str,
) -> Result<usize, CrawlError> {
    index.get(column).copied().ok_or_else(|| {
        CrawlError::parse_failure(chain, format!("{file}: missing column {column:?}"))
    })
}

fn field(record: &csv::StringRecord, idx: usize) -> String {
    record.get(idx).unwrap_or_default().trim().to_string()
}

fn opt_field(record: &csv::StringRecord, idx: Option<&usize>) -> String {
    idx.and_then(|i| record.get(*i))
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Parse one chain's artifact set into records.
///
/// A file that cannot be read or lacks its key columns fails the whole unit;
/// individual price rows without a valid mandatory price are rejected one by
/// one and counted.
pub fn parse_batch_dir(chain: &str, dir: &Path) -> Result<BatchRecords, CrawlError> {
    let mut batch = BatchRecords::default();

    let stores_path = dir.join(STORES_FILE);
    let mut reader = open_reader(chain, &stores_path)?;
    let index = header_index(chain, &mut reader, STORES_FILE)?;
    let store_id = require(chain, &index, STORES_FILE, "store_id")?;
    for record in reader.records() {
        let record =
            record.map_err(|e| CrawlError::parse_failure(chain, format!("stores: {e}")))?;
        let id = field(&record, store_id);
        if id.is_empty() {
            batch.rejected_rows += 1;
            continue;
        }
        batch.stores.push(StoreRecord {
            store_id: id,
            name: opt_field(&record, index.get("name")),
            store_type: opt_field(&record, index.get("type")),
            address: opt_field(&record, index.get("address")),
            city: opt_field(&record, index.get("city")),
            zipcode: opt_field(&record, index.get("zipcode")),
        });
    }

    let products_path = dir.join(PRODUCTS_FILE);
    let mut reader = open_reader(chain, &products_path)?;
    let index = header_index(chain, &mut reader, PRODUCTS_FILE)?;
    let product_id = require(chain, &index, PRODUCTS_FILE, "product_id")?;
    for record in reader.records() {
        let record =
            record.map_err(|e| CrawlError::parse_failure(chain, format!("products: {e}")))?;
        let id = field(&record, product_id);
        if id.is_empty() {
            batch.rejected_rows += 1;
            continue;
        }
        batch.products.push(ProductRecord {
            product_id: id,
            barcode: opt_field(&record, index.get("barcode")),
            name: opt_field(&record, index.get("name")),
            brand: opt_field(&record, index.get("brand")),
            category: opt_field(&record, index.get("category")),
            unit: opt_field(&record, index.get("unit")),
            quantity: opt_field(&record, index.get("quantity")),
        });
    }

    let prices_path = dir.join(PRICES_FILE);
    let mut reader = open_reader(chain, &prices_path)?;
    let index = header_index(chain, &mut reader, PRICES_FILE)?;
    let store_col = require(chain, &index, PRICES_FILE, "store_id")?;
    let product_col = require(chain, &index, PRICES_FILE, "product_id")?;
    let price_col = require(chain, &index, PRICES_FILE, "price")?;
    for record in reader.records() {
        let record =
            record.map_err(|e| CrawlError::parse_failure(chain, format!("prices: {e}")))?;
        let store_id = field(&record, store_col);
        let product_id = field(&record, product_col);
        // The retail price is the one mandatory fact on a price row.
        let price = parse_decimal(record.get(price_col).unwrap_or_default());
        let (Some(price), false) = (price, store_id.is_empty() || product_id.is_empty()) else {
            batch.rejected_rows += 1;
            continue;
        };
        let money = |column: &str| {
            index
                .get(column)
                .and_then(|i| record.get(*i))
                .and_then(parse_decimal)
        };
        batch.prices.push(PriceRecord {
            store_id,
            product_id,
            price,
            unit_price: money("unit_price"),
            best_price_30: money("best_price_30"),
            special_price: money("special_price"),
            anchor_price: money("anchor_price"),
        });
    }

    if batch.rejected_rows > 0 {
        warn!(
            chain,
            rejected = batch.rejected_rows,
            "malformed rows rejected during artifact parse"
        );
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::fs;
    use std::str::FromStr;

    fn write_valid_batch(dir: &Path) {
        fs::write(
            dir.join(STORES_FILE),
            "store_id,name,type,address,city,zipcode\nS1,Konzum Zagreb,supermarket,Ilica 1,Zagreb,10000\n",
        )
        .unwrap();
        fs::write(
            dir.join(PRODUCTS_FILE),
            "product_id,barcode,name,brand,category,unit,quantity\nP1,3850123456789,Mlijeko,Dukat,mlijeko,L,1\n",
        )
        .unwrap();
        fs::write(
            dir.join(PRICES_FILE),
            "store_id,product_id,price,unit_price,best_price_30,special_price,anchor_price\nS1,P1,12.99,,,,\n",
        )
        .unwrap();
    }

    #[test]
    fn parses_a_complete_batch() {
        let tmp = tempfile::tempdir().unwrap();
        write_valid_batch(tmp.path());
        let batch = parse_batch_dir("konzum", tmp.path()).unwrap();
        assert_eq!(batch.stores.len(), 1);
        assert_eq!(batch.products.len(), 1);
        assert_eq!(batch.prices.len(), 1);
        assert_eq!(batch.rejected_rows, 0);
        let price = &batch.prices[0];
        assert_eq!(price.price, BigDecimal::from_str("12.99").unwrap());
        assert!(price.unit_price.is_none());
        assert!(price.anchor_price.is_none());
    }

    #[test]
    fn rejects_price_rows_without_mandatory_price() {
        let tmp = tempfile::tempdir().unwrap();
        write_valid_batch(tmp.path());
        fs::write(
            tmp.path().join(PRICES_FILE),
            "store_id,product_id,price,unit_price,best_price_30,special_price,anchor_price\n\
             S1,P1,12.99,,,,\n\
             S1,P2,,,,,\n\
             S1,P3,abc,,,,\n",
        )
        .unwrap();
        let batch = parse_batch_dir("konzum", tmp.path()).unwrap();
        assert_eq!(batch.prices.len(), 1);
        assert_eq!(batch.rejected_rows, 2);
    }

    #[test]
    fn column_order_does_not_matter_for_parsing() {
        let tmp = tempfile::tempdir().unwrap();
        write_valid_batch(tmp.path());
        fs::write(
            tmp.path().join(PRICES_FILE),
            "price,product_id,store_id\n12.99,P1,S1\n",
        )
        .unwrap();
        let batch = parse_batch_dir("konzum", tmp.path()).unwrap();
        assert_eq!(batch.prices.len(), 1);
        assert_eq!(batch.prices[0].store_id, "S1");
    }

    #[test]
    fn unparsable_artifact_fails_the_unit() {
        let tmp = tempfile::tempdir().unwrap();
        write_valid_batch(tmp.path());
        fs::write(tmp.path().join(PRICES_FILE), "not,a,price\nfile,,\n").unwrap();
        assert!(parse_batch_dir("konzum", tmp.path()).is_err());
    }

    #[test]
    fn missing_artifact_fails_the_unit() {
        let tmp = tempfile::tempdir().unwrap();
        write_valid_batch(tmp.path());
        fs::remove_file(tmp.path().join(PRODUCTS_FILE)).unwrap();
        assert!(parse_batch_dir("konzum", tmp.path()).is_err());
    }
}
