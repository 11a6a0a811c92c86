//! sku-intel: marketplace SKU mapping and natural-language analytics
//! backend. The mapping resolver canonicalizes marketplace SKUs, matches
//! them against the master catalog (exact cache, edit-distance fuzzy scan,
//! model-assisted lookup, manual fallback) and audits every attempt; the
//! analytics service turns free-text questions into validated SELECTs.

pub mod ai;
pub mod api;
pub mod error;
pub mod mapping;
pub mod store;
pub mod tracing;

pub mod util {
    pub mod env;
}
