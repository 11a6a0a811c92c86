// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check (no auth required)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        // API v1 routes (all require authentication)
        .service(
            web::scope("/api/v1")
                // SKU mapping
                .route("/sku/map", web::post().to(handlers::map_sku))
                .route("/sku/map/batch", web::post().to(handlers::map_sku_batch))
                .route("/sku/map/combo", web::post().to(handlers::map_combo))
                .route("/sku/logs", web::get().to(handlers::recent_mapping_logs))
                // Catalog writes
                .route("/sku/master", web::post().to(handlers::create_master_sku))
                .route("/sku/variants", web::post().to(handlers::create_variant))
                // Natural-language analytics
                .route("/query", web::post().to(handlers::run_query))
                .route("/query/quick/{kind}", web::get().to(handlers::quick_query))
                .route("/query/recent", web::get().to(handlers::recent_queries)),
        );
}
