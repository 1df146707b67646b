use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// One retail location, normalized across chains.
///
/// `store_id` is the chain's own identifier and is only unique within that
/// chain; the database key is the chain-prefixed form (see [`store_key`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub store_id: String,
    pub name: String,
    pub store_type: String,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub zipcode: String,
}

/// One catalog entry, normalized across chains.
///
/// `product_id` is chain-scoped and never a cross-chain key. `barcode` is the
/// preferred global identity; when empty, the synthetic chain-scoped identity
/// from [`synthetic_barcode`] substitutes at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: String,
    #[serde(default)]
    pub barcode: String,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub quantity: String,
}

/// One price observation: a (store, product) pair with the mandatory retail
/// price and whatever derived price fields the source published that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub store_id: String,
    pub product_id: String,
    pub price: BigDecimal,
    pub unit_price: Option<BigDecimal>,
    pub best_price_30: Option<BigDecimal>,
    pub special_price: Option<BigDecimal>,
    pub anchor_price: Option<BigDecimal>,
}

/// Everything one adapter produced for one chain on one date.
#[derive(Debug, Clone, Default)]
pub struct ChainSnapshot {
    pub stores: Vec<StoreRecord>,
    pub products: Vec<ProductRecord>,
    pub prices: Vec<PriceRecord>,
}

/// Globally-unique store key: the chain-prefixed store identifier.
pub fn store_key(chain: &str, store_id: &str) -> String {
    format!("{chain}:{store_id}")
}

/// Chain-scoped substitute identity for products without an EAN barcode.
/// Two chains' synthetic identities never collide, so they never merge.
pub fn synthetic_barcode(chain: &str, product_id: &str) -> String {
    format!("{chain}:{product_id}")
}

/// Effective global product identity: real barcode when present, synthetic
/// chain-scoped identity otherwise.
pub fn product_identity(chain: &str, product: &ProductRecord) -> String {
    let barcode = product.barcode.trim();
    if barcode.is_empty() {
        synthetic_barcode(chain, &product.product_id)
    } else {
        barcode.to_string()
    }
}
