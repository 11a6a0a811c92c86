// API request/response models (DTOs)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta::now()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: Some(Meta::now()),
        }
    }
}

/// Metadata included in all API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub uptime_seconds: u64,
}

/// Single-SKU mapping request
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSkuRequest {
    pub sku: String,
    pub marketplace: String,
    #[serde(default)]
    pub product_name: Option<String>,
}

/// Master-SKU creation request
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMasterSkuRequest {
    pub product_name: String,
    pub category: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_combo_product: bool,
    #[serde(default)]
    pub combo_items: Option<Vec<String>>,
}

/// Master-SKU creation response: the generated code.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMasterSkuResponse {
    pub msku: String,
}

/// Variant creation request; `msku` must reference an existing master code.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVariantRequest {
    pub sku: String,
    pub msku: String,
    pub marketplace: String,
    pub price: f64,
}

/// Combo (bundle) mapping request: every component SKU must resolve before
/// a combo master is created.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComboRequest {
    pub main_sku: String,
    pub component_skus: Vec<String>,
    pub marketplace: String,
}

/// Natural-language analytics query request
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

/// `?limit=` query param shared by the audit-log listings
#[derive(Debug, Serialize, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

impl LimitQuery {
    pub fn clamped(&self, default: i64, max: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, max)
    }
}
