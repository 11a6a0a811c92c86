// HTTP request handlers for API endpoints

use actix_web::{web, HttpResponse, Result};

use crate::api::models::*;
use crate::api::server::AppState;
use crate::error::DomainError;
use crate::mapping::catalog::MasterSkuDraft;
use crate::mapping::resolver::SkuQuery;

fn error_response(err: &DomainError) -> HttpResponse {
    let body = ApiResponse::<()>::error(err.to_string());
    match err {
        DomainError::NotFound { .. } => HttpResponse::NotFound().json(body),
        DomainError::Validation(_) | DomainError::QueryExecution(_) => {
            HttpResponse::BadRequest().json(body)
        }
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let db_status = match state.store.ping().await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };

    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
    });

    Ok(HttpResponse::Ok().json(response))
}

/// Resolve one marketplace SKU to a master code
pub async fn map_sku(
    payload: web::Json<MapSkuRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    tracing::info!(sku = %payload.sku, marketplace = %payload.marketplace, "mapping requested");

    match state
        .mapper
        .resolve(
            &payload.sku,
            &payload.marketplace,
            payload.product_name.as_deref(),
        )
        .await
    {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(outcome))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Resolve a batch of SKUs in request order
pub async fn map_sku_batch(
    payload: web::Json<Vec<SkuQuery>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    tracing::info!(count = payload.len(), "batch mapping requested");

    match state.mapper.resolve_batch(&payload).await {
        Ok(outcomes) => Ok(HttpResponse::Ok().json(ApiResponse::success(outcomes))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Map a bundle SKU: all components must resolve before a combo master
/// is created
pub async fn map_combo(
    payload: web::Json<ComboRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    match state
        .mapper
        .process_combo(
            &state.catalog,
            &payload.main_sku,
            &payload.component_skus,
            &payload.marketplace,
        )
        .await
    {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(outcome))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Create a master SKU with a generated code
pub async fn create_master_sku(
    payload: web::Json<CreateMasterSkuRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();
    let draft = MasterSkuDraft {
        product_name: payload.product_name,
        category: payload.category,
        brand: payload.brand,
        description: payload.description,
        is_combo_product: payload.is_combo_product,
        combo_items: payload.combo_items,
    };

    match state.catalog.create_master_sku(draft).await {
        Ok(created) => Ok(HttpResponse::Created()
            .json(ApiResponse::success(CreateMasterSkuResponse {
                msku: created.msku,
            }))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Bind a marketplace SKU to an existing master code
pub async fn create_variant(
    payload: web::Json<CreateVariantRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let price = match bigdecimal::BigDecimal::try_from(payload.price) {
        Ok(p) => p,
        Err(_) => {
            return Ok(error_response(&DomainError::validation(
                "price must be a finite number",
            )))
        }
    };

    match state
        .catalog
        .create_sku_variant(&payload.sku, &payload.msku, &payload.marketplace, price)
        .await
    {
        Ok(()) => Ok(HttpResponse::Created().json(ApiResponse::success(serde_json::json!({
            "sku": payload.sku,
            "msku": payload.msku,
        })))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Recent mapping audit records
pub async fn recent_mapping_logs(
    query: web::Query<LimitQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let limit = query.clamped(20, 200);
    match state.store.recent_mapping_logs(limit).await {
        Ok(logs) => Ok(HttpResponse::Ok().json(ApiResponse::success(logs))),
        Err(e) => Ok(error_response(&DomainError::from(e))),
    }
}

/// Natural-language analytics query
pub async fn run_query(
    payload: web::Json<QueryRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    tracing::info!(question = %payload.question, "analytics query requested");

    match state.analytics.run(&payload.question).await {
        Ok(outcome) if outcome.success => {
            Ok(HttpResponse::Ok().json(ApiResponse::success(outcome)))
        }
        Ok(outcome) => {
            // The attempt itself failed (model or SQL); the outcome carries
            // the error detail and has already been audited.
            let error = outcome.error.clone();
            Ok(HttpResponse::BadRequest().json(ApiResponse {
                success: false,
                data: Some(outcome),
                error,
                meta: Some(Meta::now()),
            }))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// One of the canned dashboard queries
pub async fn quick_query(
    kind: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    match state.analytics.run_quick(&kind).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(outcome))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Recent analytics query audit records
pub async fn recent_queries(
    query: web::Query<LimitQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let limit = query.clamped(10, 100);
    match state.store.recent_query_logs(limit).await {
        Ok(logs) => Ok(HttpResponse::Ok().json(ApiResponse::success(logs))),
        Err(e) => Ok(error_response(&DomainError::from(e))),
    }
}
