// Persistent record types for the SKU catalog and audit tables.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical product record spanning marketplaces. Never deleted, only
/// updated; `msku` is the unique human-facing code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterSku {
    pub id: i64,
    pub msku: String,
    pub product_name: String,
    pub description: Option<String>,
    pub category: String,
    pub brand: Option<String>,
    pub is_combo_product: bool,
    /// Component MSKU codes when this is a bundle.
    pub combo_items: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMasterSku {
    pub msku: String,
    pub product_name: String,
    pub description: Option<String>,
    pub category: String,
    pub brand: Option<String>,
    pub is_combo_product: bool,
    pub combo_items: Option<Vec<String>>,
}

/// Marketplace-specific SKU bound to exactly one master record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuVariant {
    pub id: i64,
    pub sku: String,
    pub msku_id: i64,
    pub marketplace: String,
    pub price: BigDecimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSkuVariant {
    pub sku: String,
    pub msku_id: i64,
    pub marketplace: String,
    pub price: BigDecimal,
    pub is_active: bool,
}

/// Append-only audit record of one mapping attempt. Write-once; only the
/// `validated` flag is ever flipped later (by a human reviewer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuMappingLog {
    pub id: i64,
    pub original_sku: String,
    pub mapped_msku: Option<String>,
    pub marketplace: String,
    pub mapping_method: String,
    pub confidence: f64,
    pub validated: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSkuMappingLog {
    pub original_sku: String,
    pub mapped_msku: Option<String>,
    pub marketplace: String,
    pub mapping_method: String,
    pub confidence: f64,
    pub validated: bool,
}

/// Audit record of one natural-language analytics query, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiQueryLog {
    pub id: i64,
    pub question: String,
    pub generated_sql: Option<String>,
    /// JSON-serialized result rows on success.
    pub results: Option<String>,
    pub execution_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAiQueryLog {
    pub question: String,
    pub generated_sql: Option<String>,
    pub results: Option<String>,
    pub execution_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
}
