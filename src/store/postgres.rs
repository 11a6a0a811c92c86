// Postgres-backed catalog store. The schema is owned by the analytics
// application's migrations; this layer only reads and writes it, so every
// query is written against the column shapes we were given (int4 serial ids,
// naive timestamps, numeric money/confidence columns) with explicit casts.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::Row;

use crate::store::db::Db;
use crate::store::models::{
    AiQueryLog, MasterSku, NewAiQueryLog, NewMasterSku, NewSkuMappingLog, NewSkuVariant,
    SkuMappingLog, SkuVariant,
};
use crate::store::{CatalogStore, StoreError};

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}

const MASTER_COLS: &str = "id::bigint AS id, msku, product_name, description, category, brand, \
     COALESCE(is_combo_product, false) AS is_combo_product, combo_items, \
     created_at::timestamptz AS created_at";

const VARIANT_COLS: &str = "id::bigint AS id, sku, msku_id::bigint AS msku_id, marketplace, \
     price, COALESCE(is_active, true) AS is_active, created_at::timestamptz AS created_at";

fn master_from_row(row: &sqlx::postgres::PgRow) -> Result<MasterSku, sqlx::Error> {
    let combo: Option<Json<Vec<String>>> = row.try_get("combo_items")?;
    Ok(MasterSku {
        id: row.try_get("id")?,
        msku: row.try_get("msku")?,
        product_name: row.try_get("product_name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        brand: row.try_get("brand")?,
        is_combo_product: row.try_get("is_combo_product")?,
        combo_items: combo.map(|j| j.0),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn variant_from_row(row: &sqlx::postgres::PgRow) -> Result<SkuVariant, sqlx::Error> {
    Ok(SkuVariant {
        id: row.try_get("id")?,
        sku: row.try_get("sku")?,
        msku_id: row.try_get("msku_id")?,
        marketplace: row.try_get("marketplace")?,
        price: row.try_get::<BigDecimal, _>("price")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT true")
            .fetch_one(&self.db.pool)
            .await?;
        Ok(())
    }

    async fn list_masters(&self) -> Result<Vec<MasterSku>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MASTER_COLS} FROM master_skus ORDER BY id"
        ))
        .fetch_all(&self.db.pool)
        .await?;
        rows.iter()
            .map(|r| master_from_row(r).map_err(StoreError::from))
            .collect()
    }

    async fn find_master_by_id(&self, id: i64) -> Result<Option<MasterSku>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MASTER_COLS} FROM master_skus WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await?;
        row.as_ref().map(master_from_row).transpose().map_err(StoreError::from)
    }

    async fn find_master_by_code(&self, msku: &str) -> Result<Option<MasterSku>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MASTER_COLS} FROM master_skus WHERE msku = $1"
        ))
        .bind(msku)
        .fetch_optional(&self.db.pool)
        .await?;
        row.as_ref().map(master_from_row).transpose().map_err(StoreError::from)
    }

    async fn insert_master(&self, new: NewMasterSku) -> Result<MasterSku, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO master_skus \
                 (msku, product_name, description, category, brand, is_combo_product, combo_items) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {MASTER_COLS}"
        ))
        .bind(&new.msku)
        .bind(&new.product_name)
        .bind(&new.description)
        .bind(&new.category)
        .bind(&new.brand)
        .bind(new.is_combo_product)
        .bind(new.combo_items.map(Json))
        .fetch_one(&self.db.pool)
        .await?;
        master_from_row(&row).map_err(StoreError::from)
    }

    async fn list_variants(&self) -> Result<Vec<SkuVariant>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {VARIANT_COLS} FROM sku_variants WHERE COALESCE(is_active, true) ORDER BY id"
        ))
        .fetch_all(&self.db.pool)
        .await?;
        rows.iter()
            .map(|r| variant_from_row(r).map_err(StoreError::from))
            .collect()
    }

    async fn find_variant(
        &self,
        sku: &str,
        marketplace: &str,
    ) -> Result<Option<SkuVariant>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {VARIANT_COLS} FROM sku_variants WHERE sku = $1 AND marketplace = $2"
        ))
        .bind(sku)
        .bind(marketplace)
        .fetch_optional(&self.db.pool)
        .await?;
        row.as_ref().map(variant_from_row).transpose().map_err(StoreError::from)
    }

    async fn insert_variant(&self, new: NewSkuVariant) -> Result<SkuVariant, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO sku_variants (sku, msku_id, marketplace, price, is_active) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {VARIANT_COLS}"
        ))
        .bind(&new.sku)
        .bind(new.msku_id)
        .bind(&new.marketplace)
        .bind(&new.price)
        .bind(new.is_active)
        .fetch_one(&self.db.pool)
        .await?;
        variant_from_row(&row).map_err(StoreError::from)
    }

    async fn append_mapping_log(&self, log: NewSkuMappingLog) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sku_mapping_logs \
                 (original_sku, mapped_msku, marketplace, mapping_method, confidence, validated) \
             VALUES ($1, $2, $3, $4, $5::numeric, $6)",
        )
        .bind(&log.original_sku)
        .bind(&log.mapped_msku)
        .bind(&log.marketplace)
        .bind(&log.mapping_method)
        .bind(log.confidence)
        .bind(log.validated)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    async fn recent_mapping_logs(&self, limit: i64) -> Result<Vec<SkuMappingLog>, StoreError> {
        let rows = sqlx::query(
            "SELECT id::bigint AS id, original_sku, mapped_msku, marketplace, mapping_method, \
                    COALESCE(confidence, 0)::float8 AS confidence, \
                    COALESCE(validated, false) AS validated, \
                    created_at::timestamptz AS created_at \
             FROM sku_mapping_logs ORDER BY id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.db.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(SkuMappingLog {
                    id: r.try_get("id")?,
                    original_sku: r.try_get("original_sku")?,
                    mapped_msku: r.try_get("mapped_msku")?,
                    marketplace: r.try_get("marketplace")?,
                    mapping_method: r.try_get("mapping_method")?,
                    confidence: r.try_get("confidence")?,
                    validated: r.try_get("validated")?,
                    created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    async fn append_query_log(&self, log: NewAiQueryLog) -> Result<AiQueryLog, StoreError> {
        let row = sqlx::query(
            "INSERT INTO ai_queries \
                 (question, generated_sql, results, execution_time, success, error_message) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id::bigint AS id, question, generated_sql, results, \
                       COALESCE(execution_time, 0)::bigint AS execution_ms, \
                       COALESCE(success, false) AS success, error_message, \
                       created_at::timestamptz AS created_at",
        )
        .bind(&log.question)
        .bind(&log.generated_sql)
        .bind(&log.results)
        .bind(log.execution_ms)
        .bind(log.success)
        .bind(&log.error_message)
        .fetch_one(&self.db.pool)
        .await?;

        Ok(AiQueryLog {
            id: row.try_get("id")?,
            question: row.try_get("question")?,
            generated_sql: row.try_get("generated_sql")?,
            results: row.try_get("results")?,
            execution_ms: row.try_get("execution_ms")?,
            success: row.try_get("success")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    async fn recent_query_logs(&self, limit: i64) -> Result<Vec<AiQueryLog>, StoreError> {
        let rows = sqlx::query(
            "SELECT id::bigint AS id, question, generated_sql, results, \
                    COALESCE(execution_time, 0)::bigint AS execution_ms, \
                    COALESCE(success, false) AS success, error_message, \
                    created_at::timestamptz AS created_at \
             FROM ai_queries ORDER BY id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.db.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(AiQueryLog {
                    id: r.try_get("id")?,
                    question: r.try_get("question")?,
                    generated_sql: r.try_get("generated_sql")?,
                    results: r.try_get("results")?,
                    execution_ms: r.try_get("execution_ms")?,
                    success: r.try_get("success")?,
                    error_message: r.try_get("error_message")?,
                    created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    async fn execute_select(&self, sql: &str) -> Result<Vec<Value>, StoreError> {
        // Wrap the validated SELECT so Postgres does the row->JSON conversion
        // for us; avoids guessing column types on arbitrary projections.
        let wrapped = format!(
            "SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json)::jsonb AS rows FROM ({sql}) AS t"
        );
        let row = sqlx::query(&wrapped)
            .fetch_one(&self.db.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows: Value = row
            .try_get("rows")
            .map_err(|e| StoreError::Query(e.to_string()))?;
        match rows {
            Value::Array(items) => Ok(items),
            other => Ok(vec![other]),
        }
    }
}
