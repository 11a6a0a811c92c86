// In-memory catalog store. Backs the unit tests and offline demo runs; the
// analytics SELECT path is scripted per-statement since there is no SQL
// engine behind it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::store::models::{
    AiQueryLog, MasterSku, NewAiQueryLog, NewMasterSku, NewSkuMappingLog, NewSkuVariant,
    SkuMappingLog, SkuVariant,
};
use crate::store::{CatalogStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    masters: RwLock<Vec<MasterSku>>,
    variants: RwLock<Vec<SkuVariant>>,
    mapping_logs: RwLock<Vec<SkuMappingLog>>,
    query_logs: RwLock<Vec<AiQueryLog>>,
    scripted: RwLock<HashMap<String, Result<Vec<Value>, String>>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    fn alloc_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register the outcome of a given SELECT statement for `execute_select`.
    pub fn script_query(&self, sql: &str, outcome: Result<Vec<Value>, String>) {
        self.scripted
            .write()
            .expect("scripted lock poisoned")
            .insert(sql.to_string(), outcome);
    }

    pub fn mapping_log_count(&self) -> usize {
        self.mapping_logs.read().expect("log lock poisoned").len()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list_masters(&self) -> Result<Vec<MasterSku>, StoreError> {
        Ok(self.masters.read().expect("masters lock poisoned").clone())
    }

    async fn find_master_by_id(&self, id: i64) -> Result<Option<MasterSku>, StoreError> {
        Ok(self
            .masters
            .read()
            .expect("masters lock poisoned")
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn find_master_by_code(&self, msku: &str) -> Result<Option<MasterSku>, StoreError> {
        Ok(self
            .masters
            .read()
            .expect("masters lock poisoned")
            .iter()
            .find(|m| m.msku == msku)
            .cloned())
    }

    async fn insert_master(&self, new: NewMasterSku) -> Result<MasterSku, StoreError> {
        let master = MasterSku {
            id: self.alloc_id(),
            msku: new.msku,
            product_name: new.product_name,
            description: new.description,
            category: new.category,
            brand: new.brand,
            is_combo_product: new.is_combo_product,
            combo_items: new.combo_items,
            created_at: Utc::now(),
        };
        self.masters
            .write()
            .expect("masters lock poisoned")
            .push(master.clone());
        Ok(master)
    }

    async fn list_variants(&self) -> Result<Vec<SkuVariant>, StoreError> {
        Ok(self
            .variants
            .read()
            .expect("variants lock poisoned")
            .iter()
            .filter(|v| v.is_active)
            .cloned()
            .collect())
    }

    async fn find_variant(
        &self,
        sku: &str,
        marketplace: &str,
    ) -> Result<Option<SkuVariant>, StoreError> {
        Ok(self
            .variants
            .read()
            .expect("variants lock poisoned")
            .iter()
            .find(|v| v.sku == sku && v.marketplace == marketplace)
            .cloned())
    }

    async fn insert_variant(&self, new: NewSkuVariant) -> Result<SkuVariant, StoreError> {
        let variant = SkuVariant {
            id: self.alloc_id(),
            sku: new.sku,
            msku_id: new.msku_id,
            marketplace: new.marketplace,
            price: new.price,
            is_active: new.is_active,
            created_at: Utc::now(),
        };
        self.variants
            .write()
            .expect("variants lock poisoned")
            .push(variant.clone());
        Ok(variant)
    }

    async fn append_mapping_log(&self, log: NewSkuMappingLog) -> Result<(), StoreError> {
        let record = SkuMappingLog {
            id: self.alloc_id(),
            original_sku: log.original_sku,
            mapped_msku: log.mapped_msku,
            marketplace: log.marketplace,
            mapping_method: log.mapping_method,
            confidence: log.confidence,
            validated: log.validated,
            created_at: Utc::now(),
        };
        self.mapping_logs
            .write()
            .expect("log lock poisoned")
            .push(record);
        Ok(())
    }

    async fn recent_mapping_logs(&self, limit: i64) -> Result<Vec<SkuMappingLog>, StoreError> {
        let logs = self.mapping_logs.read().expect("log lock poisoned");
        Ok(logs.iter().rev().take(limit.max(0) as usize).cloned().collect())
    }

    async fn append_query_log(&self, log: NewAiQueryLog) -> Result<AiQueryLog, StoreError> {
        let record = AiQueryLog {
            id: self.alloc_id(),
            question: log.question,
            generated_sql: log.generated_sql,
            results: log.results,
            execution_ms: log.execution_ms,
            success: log.success,
            error_message: log.error_message,
            created_at: Utc::now(),
        };
        self.query_logs
            .write()
            .expect("log lock poisoned")
            .push(record.clone());
        Ok(record)
    }

    async fn recent_query_logs(&self, limit: i64) -> Result<Vec<AiQueryLog>, StoreError> {
        let logs = self.query_logs.read().expect("log lock poisoned");
        Ok(logs.iter().rev().take(limit.max(0) as usize).cloned().collect())
    }

    async fn execute_select(&self, sql: &str) -> Result<Vec<Value>, StoreError> {
        match self
            .scripted
            .read()
            .expect("scripted lock poisoned")
            .get(sql)
        {
            Some(Ok(rows)) => Ok(rows.clone()),
            Some(Err(message)) => Err(StoreError::Query(message.clone())),
            None => Err(StoreError::Query(format!(
                "no scripted result for statement: {sql}"
            ))),
        }
    }
}
