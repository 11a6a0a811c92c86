//! Storage layer: the catalog/audit tables behind the mapping heuristic and
//! the analytics query feature. The database is the source of truth; the
//! in-process mapping cache is only a read replica on top of this trait.

pub mod db;
pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;

pub use models::{
    AiQueryLog, MasterSku, NewAiQueryLog, NewMasterSku, NewSkuMappingLog, NewSkuVariant,
    SkuMappingLog, SkuVariant,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A caller-supplied SELECT failed to execute (analytics feature).
    #[error("{0}")]
    Query(String),
}

/// Persistence seam for the SKU catalog, audit logs and raw analytics reads.
///
/// Two implementations: `postgres::PgStore` for production and
/// `memory::MemoryStore` for tests and offline runs.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Cheap connectivity probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn list_masters(&self) -> Result<Vec<MasterSku>, StoreError>;
    async fn find_master_by_id(&self, id: i64) -> Result<Option<MasterSku>, StoreError>;
    async fn find_master_by_code(&self, msku: &str) -> Result<Option<MasterSku>, StoreError>;
    async fn insert_master(&self, new: NewMasterSku) -> Result<MasterSku, StoreError>;

    async fn list_variants(&self) -> Result<Vec<SkuVariant>, StoreError>;
    /// Exact lookup on the raw (un-normalized) SKU string and marketplace.
    async fn find_variant(
        &self,
        sku: &str,
        marketplace: &str,
    ) -> Result<Option<SkuVariant>, StoreError>;
    async fn insert_variant(&self, new: NewSkuVariant) -> Result<SkuVariant, StoreError>;

    async fn append_mapping_log(&self, log: NewSkuMappingLog) -> Result<(), StoreError>;
    async fn recent_mapping_logs(&self, limit: i64) -> Result<Vec<SkuMappingLog>, StoreError>;

    async fn append_query_log(&self, log: NewAiQueryLog) -> Result<AiQueryLog, StoreError>;
    async fn recent_query_logs(&self, limit: i64) -> Result<Vec<AiQueryLog>, StoreError>;

    /// Run an already-validated SELECT and return rows as JSON objects.
    /// Execution failures come back as `StoreError::Query`.
    async fn execute_select(&self, sql: &str) -> Result<Vec<Value>, StoreError>;
}
