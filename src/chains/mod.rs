//! Per-retailer data-acquisition layer: the `ChainAdapter` capability
//! contract, one concrete adapter per chain, and the startup registry that
//! maps chain names to adapters.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::CrawlError;
use crate::model::{PriceRecord, ProductRecord, StoreRecord};

pub mod source;

pub mod brodokomerc;
pub mod eurospin;
pub mod jadranka_trgovina;
pub mod konzum;
pub mod lidl;
pub mod spar;
pub mod studenac;
pub mod trgovina_krk;
pub mod zabac;

/// Capability contract implemented once per retailer.
///
/// Each adapter is independent: no mutable state is shared between adapters,
/// and a single adapter's failure never prevents the others from running to
/// completion within the same orchestrator pass.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Lowercase chain name, the top-level partition of all data.
    fn chain(&self) -> &'static str;

    /// Store locations observed on the given date.
    async fn list_stores(&self, date: NaiveDate) -> Result<Vec<StoreRecord>, CrawlError>;

    /// Product catalog for the given date. Zero rows is legitimate (empty
    /// catalog day) and surfaces as an orchestrator warning, not an error.
    async fn list_products(&self, date: NaiveDate) -> Result<Vec<ProductRecord>, CrawlError>;

    /// Price observations, each referencing a store-scoped and
    /// product-scoped identifier pair understood only within this chain.
    async fn list_prices(&self, date: NaiveDate) -> Result<Vec<PriceRecord>, CrawlError>;
}

/// Implements the three list operations of [`ChainAdapter`] for an adapter
/// struct exposing `fetch(date)` and a `cache: SnapshotCache` field, so each
/// retailer module only writes its acquisition logic.
macro_rules! impl_chain_adapter {
    ($ty:ty, $chain:expr) => {
        #[async_trait::async_trait]
        impl $crate::chains::ChainAdapter for $ty {
            fn chain(&self) -> &'static str {
                $chain
            }

            async fn list_stores(
                &self,
                date: chrono::NaiveDate,
            ) -> Result<Vec<$crate::model::StoreRecord>, $crate::error::CrawlError> {
                let snapshot = self.cache.get_or_fetch(date, self.fetch(date)).await?;
                Ok(snapshot.stores.clone())
            }

            async fn list_products(
                &self,
                date: chrono::NaiveDate,
            ) -> Result<Vec<$crate::model::ProductRecord>, $crate::error::CrawlError> {
                let snapshot = self.cache.get_or_fetch(date, self.fetch(date)).await?;
                Ok(snapshot.products.clone())
            }

            async fn list_prices(
                &self,
                date: chrono::NaiveDate,
            ) -> Result<Vec<$crate::model::PriceRecord>, $crate::error::CrawlError> {
                let snapshot = self.cache.get_or_fetch(date, self.fetch(date)).await?;
                Ok(snapshot.prices.clone())
            }
        }
    };
}
pub(crate) use impl_chain_adapter;

/// Lookup table from chain name to adapter, built once at startup.
pub struct ChainRegistry {
    adapters: Vec<Arc<dyn ChainAdapter>>,
}

impl ChainRegistry {
    /// Registry with every supported retailer. Fails only when the shared
    /// HTTP client cannot be constructed, in which case nothing can run.
    pub fn with_all_chains() -> Result<Self, CrawlError> {
        Ok(Self {
            adapters: vec![
                Arc::new(konzum::KonzumAdapter::new()?),
                Arc::new(studenac::StudenacAdapter::new()?),
                Arc::new(spar::SparAdapter::new()?),
                Arc::new(lidl::LidlAdapter::new()?),
                Arc::new(eurospin::EurospinAdapter::new()?),
                Arc::new(trgovina_krk::TrgovinaKrkAdapter::new()?),
                Arc::new(zabac::ZabacAdapter::new()?),
                Arc::new(jadranka_trgovina::JadrankaTrgovinaAdapter::new()?),
                Arc::new(brodokomerc::BrodokomercAdapter::new()?),
            ],
        })
    }

    /// Registry over an explicit adapter set (used by tests with mocks).
    pub fn from_adapters(adapters: Vec<Arc<dyn ChainAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn get(&self, chain: &str) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.iter().find(|a| a.chain() == chain).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.chain()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ChainAdapter>> {
        self.adapters.iter()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_enumerates_all_chains() {
        let registry = ChainRegistry::with_all_chains().unwrap();
        let names = registry.names();
        assert!(names.contains(&"konzum"));
        assert!(names.contains(&"lidl"));
        assert!(names.contains(&"spar"));
        assert!(names.contains(&"studenac"));
        assert_eq!(names.len(), registry.len());
    }

    #[test]
    fn registry_lookup_by_name() {
        let registry = ChainRegistry::with_all_chains().unwrap();
        assert!(registry.get("konzum").is_some());
        assert!(registry.get("nonexistent").is_none());
    }
}
