// Mapping resolver: exact cache lookup -> fuzzy scan -> model-assisted
// lookup -> manual fallback, every attempt audited to sku_mapping_logs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::ai::client::LanguageModel;
use crate::error::DomainError;
use crate::mapping::cache::MappingCache;
use crate::mapping::normalize::{normalize_sku, validate_sku_format};
use crate::mapping::similarity::similarity;
use crate::store::{CatalogStore, NewSkuMappingLog, SkuVariant};

/// Fuzzy candidates below this boosted score are discarded outright.
pub const FUZZY_KEEP_THRESHOLD: f64 = 0.7;
/// Fuzzy scores above this short-circuit the pipeline.
pub const FUZZY_CONFIDENT_THRESHOLD: f64 = 0.8;
/// Fuzzy results under this still need a human look.
pub const FUZZY_VALIDATED_THRESHOLD: f64 = 0.9;
/// Minimum model confidence for an AI-assisted mapping to be accepted.
pub const AI_ACCEPT_THRESHOLD: f64 = 0.6;
/// AI-assisted results under this still need a human look.
pub const AI_VALIDATED_THRESHOLD: f64 = 0.8;
/// Bonus applied when the candidate variant's marketplace matches the query.
pub const MARKETPLACE_BONUS: f64 = 0.2;

/// How many existing master codes the model prompt samples.
const AI_CONTEXT_MASTERS: usize = 20;
const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingMethod {
    #[serde(rename = "exact_match")]
    Exact,
    #[serde(rename = "fuzzy_match")]
    Fuzzy,
    #[serde(rename = "ai_assisted")]
    AiAssisted,
    #[serde(rename = "manual")]
    Manual,
}

impl MappingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact_match",
            Self::Fuzzy => "fuzzy_match",
            Self::AiAssisted => "ai_assisted",
            Self::Manual => "manual",
        }
    }
}

/// Confidence-scored mapping result returned to API callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingOutcome {
    pub sku: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapped_msku: Option<String>,
    pub confidence: f64,
    pub method: MappingMethod,
    pub needs_validation: bool,
    pub suggestions: Vec<String>,
}

/// One item of a batch mapping request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuQuery {
    pub sku: String,
    pub marketplace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

pub struct SkuMapper {
    store: Arc<dyn CatalogStore>,
    cache: Arc<MappingCache>,
    model: Arc<dyn LanguageModel>,
}

impl SkuMapper {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        cache: Arc<MappingCache>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            store,
            cache,
            model,
        }
    }

    pub fn cache(&self) -> &MappingCache {
        &self.cache
    }

    /// Populate the cache from persisted variant/master associations.
    /// Called once at startup; later misses re-read the database anyway.
    pub async fn warm_cache(&self) -> Result<usize, DomainError> {
        let masters = self.store.list_masters().await?;
        let variants = self.store.list_variants().await?;

        let mut warmed = 0usize;
        for variant in &variants {
            if let Some(master) = masters.iter().find(|m| m.id == variant.msku_id) {
                self.cache
                    .put(&variant.sku, &variant.marketplace, &master.msku);
                warmed += 1;
            }
        }
        debug!(warmed, total = variants.len(), "mapping cache warmed");
        Ok(warmed)
    }

    /// Resolve one SKU to a master code with a confidence score.
    ///
    /// External-model failures never surface here; they degrade the pipeline
    /// to the manual fallback. Storage failures do propagate.
    pub async fn resolve(
        &self,
        sku: &str,
        marketplace: &str,
        product_name: Option<&str>,
    ) -> Result<MappingOutcome, DomainError> {
        if sku.trim().is_empty() {
            return Err(DomainError::validation("sku must not be empty"));
        }
        if marketplace.trim().is_empty() {
            return Err(DomainError::validation("marketplace must not be empty"));
        }
        if !validate_sku_format(sku, marketplace) {
            debug!(sku, marketplace, "sku does not match marketplace conventions");
        }

        let outcome = self.resolve_inner(sku, marketplace, product_name).await?;
        self.record(&outcome, marketplace).await;
        Ok(outcome)
    }

    /// Sequentially resolve a batch; each item is audited individually.
    pub async fn resolve_batch(
        &self,
        queries: &[SkuQuery],
    ) -> Result<Vec<MappingOutcome>, DomainError> {
        let mut results = Vec::with_capacity(queries.len());
        for q in queries {
            results.push(
                self.resolve(&q.sku, &q.marketplace, q.product_name.as_deref())
                    .await?,
            );
        }
        Ok(results)
    }

    async fn resolve_inner(
        &self,
        sku: &str,
        marketplace: &str,
        product_name: Option<&str>,
    ) -> Result<MappingOutcome, DomainError> {
        // 1. Exact: cache first, then the database (source of truth) so a
        //    TTL-expired or never-cached pairing still resolves exactly.
        if let Some(msku) = self.cache.get(sku, marketplace) {
            return Ok(exact(sku, msku));
        }
        if let Some(variant) = self.store.find_variant(sku, marketplace).await? {
            if let Some(master) = self.store.find_master_by_id(variant.msku_id).await? {
                self.cache.put(sku, marketplace, &master.msku);
                return Ok(exact(sku, master.msku));
            }
        }

        // 2. Fuzzy scan over every known variant.
        let fuzzy = self.fuzzy_match(sku, marketplace).await?;
        if let Some(outcome) = &fuzzy {
            if outcome.confidence > FUZZY_CONFIDENT_THRESHOLD {
                return Ok(outcome.clone());
            }
        }

        // 3. Model-assisted lookup, only when fuzzy was not confident.
        let (ai_confidence, ai_code) = self.ai_assisted(sku, marketplace, product_name).await;
        if ai_confidence > AI_ACCEPT_THRESHOLD {
            return Ok(MappingOutcome {
                sku: sku.to_string(),
                mapped_msku: ai_code,
                confidence: ai_confidence,
                method: MappingMethod::AiAssisted,
                needs_validation: ai_confidence < AI_VALIDATED_THRESHOLD,
                suggestions: Vec::new(),
            });
        }

        // 4. Manual fallback with catalog suggestions.
        Ok(MappingOutcome {
            sku: sku.to_string(),
            mapped_msku: None,
            confidence: 0.0,
            method: MappingMethod::Manual,
            needs_validation: true,
            suggestions: self.suggestions(product_name).await?,
        })
    }

    async fn fuzzy_match(
        &self,
        sku: &str,
        marketplace: &str,
    ) -> Result<Option<MappingOutcome>, DomainError> {
        let normalized = normalize_sku(sku);
        let variants = self.store.list_variants().await?;

        let mut best: Option<(&SkuVariant, f64)> = None;
        for variant in &variants {
            let score = similarity(&normalized, &normalize_sku(&variant.sku));
            // Bonus keyed off the candidate's stored marketplace.
            let boost = if variant.marketplace == marketplace {
                MARKETPLACE_BONUS
            } else {
                0.0
            };
            let boosted = (score + boost).min(1.0);
            if boosted > FUZZY_KEEP_THRESHOLD
                && best.map_or(true, |(_, prev)| boosted > prev)
            {
                best = Some((variant, boosted));
            }
        }

        let Some((variant, score)) = best else {
            return Ok(None);
        };
        let mapped_msku = self
            .store
            .find_master_by_id(variant.msku_id)
            .await?
            .map(|m| m.msku);

        Ok(Some(MappingOutcome {
            sku: sku.to_string(),
            mapped_msku,
            confidence: score,
            method: MappingMethod::Fuzzy,
            needs_validation: score < FUZZY_VALIDATED_THRESHOLD,
            suggestions: Vec::new(),
        }))
    }

    /// Ask the hosted model for a mapping. Any failure degrades to a
    /// zero-confidence answer; this path never errors.
    async fn ai_assisted(
        &self,
        sku: &str,
        marketplace: &str,
        product_name: Option<&str>,
    ) -> (f64, Option<String>) {
        let context = match self.store.list_masters().await {
            Ok(masters) => masters
                .iter()
                .take(AI_CONTEXT_MASTERS)
                .map(|m| format!("{}: {} ({})", m.msku, m.product_name, m.category))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                warn!(error = %e, "could not load master catalog for model prompt");
                return (0.0, None);
            }
        };

        let system = "You are a SKU mapping expert. Given a SKU from a marketplace, \
                      determine if it matches any existing Master SKU. Respond in JSON.";
        let user = format!(
            "SKU to map: \"{sku}\"\n\
             Marketplace: \"{marketplace}\"\n\
             Product Name: \"{}\"\n\n\
             Existing Master SKUs:\n{context}\n\n\
             Instructions:\n\
             1. Analyze the SKU pattern and product name\n\
             2. Look for exact or close matches with existing Master SKUs\n\
             3. Consider common SKU naming conventions (abbreviations, codes, etc.)\n\
             4. Provide confidence score (0.0 to 1.0)\n\n\
             Respond in JSON format:\n\
             {{\"mappedMsku\": \"MSKU-CODE or null if no match\", \"confidence\": 0.85, \
             \"reasoning\": \"Brief explanation of the mapping decision\"}}",
            product_name.unwrap_or("Not provided"),
        );

        match self.model.complete_json(system, &user).await {
            Ok(response) => parse_model_mapping(&response),
            Err(e) => {
                warn!(sku, marketplace, error = %e, "ai-assisted mapping failed");
                (0.0, None)
            }
        }
    }

    async fn suggestions(&self, product_name: Option<&str>) -> Result<Vec<String>, DomainError> {
        let Some(name) = product_name else {
            return Ok(Vec::new());
        };
        let needle = name.to_lowercase();
        let masters = self.store.list_masters().await?;
        Ok(masters
            .iter()
            .filter(|m| {
                let candidate = m.product_name.to_lowercase();
                candidate.contains(&needle) || needle.contains(&candidate)
            })
            .take(MAX_SUGGESTIONS)
            .map(|m| m.msku.clone())
            .collect())
    }

    /// Append-only audit; a failed write is logged and swallowed so mapping
    /// keeps working when the log table is unavailable.
    async fn record(&self, outcome: &MappingOutcome, marketplace: &str) {
        let log = NewSkuMappingLog {
            original_sku: outcome.sku.clone(),
            mapped_msku: outcome.mapped_msku.clone(),
            marketplace: marketplace.to_string(),
            mapping_method: outcome.method.as_str().to_string(),
            confidence: outcome.confidence,
            validated: !outcome.needs_validation,
        };
        if let Err(e) = self.store.append_mapping_log(log).await {
            warn!(error = %e, sku = %outcome.sku, "failed to append mapping log");
        }
    }
}

fn exact(sku: &str, msku: String) -> MappingOutcome {
    MappingOutcome {
        sku: sku.to_string(),
        mapped_msku: Some(msku),
        confidence: 1.0,
        method: MappingMethod::Exact,
        needs_validation: false,
        suggestions: Vec::new(),
    }
}

fn parse_model_mapping(response: &Value) -> (f64, Option<String>) {
    let code = response
        .get("mappedMsku")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(|s| s.to_string());
    let confidence = response
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    (confidence, code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedModel;
    use crate::store::memory::MemoryStore;
    use crate::store::{NewMasterSku, NewSkuVariant};
    use bigdecimal::BigDecimal;
    use serde_json::json;

    async fn seed_catalog(store: &MemoryStore) {
        let master = store
            .insert_master(NewMasterSku {
                msku: "ELE-WIDG-4821".into(),
                product_name: "Widget Pro".into(),
                description: None,
                category: "Electronics".into(),
                brand: Some("Acme".into()),
                is_combo_product: false,
                combo_items: None,
            })
            .await
            .unwrap();
        store
            .insert_variant(NewSkuVariant {
                sku: "abc123".into(),
                msku_id: master.id,
                marketplace: "amazon".into(),
                price: BigDecimal::from(19),
                is_active: true,
            })
            .await
            .unwrap();
    }

    fn mapper(store: Arc<MemoryStore>, model: ScriptedModel) -> SkuMapper {
        SkuMapper::new(store, Arc::new(MappingCache::new(None)), Arc::new(model))
    }

    #[tokio::test]
    async fn cached_pair_resolves_exact_with_full_confidence() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(&store).await;
        let mapper = mapper(store.clone(), ScriptedModel::unreachable());
        mapper.warm_cache().await.unwrap();

        let outcome = mapper.resolve("abc123", "amazon", None).await.unwrap();
        assert_eq!(outcome.confidence, 1.0);
        assert_eq!(outcome.method, MappingMethod::Exact);
        assert_eq!(outcome.mapped_msku.as_deref(), Some("ELE-WIDG-4821"));
        assert!(!outcome.needs_validation);
    }

    #[tokio::test]
    async fn cold_cache_falls_back_to_database_for_exact_hit() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(&store).await;
        let mapper = mapper(store.clone(), ScriptedModel::unreachable());

        // No warm_cache call: the exact pairing only exists in the store.
        let outcome = mapper.resolve("abc123", "amazon", None).await.unwrap();
        assert_eq!(outcome.method, MappingMethod::Exact);
        // And the hit was written through to the cache.
        assert_eq!(
            mapper.cache().get("abc123", "amazon").as_deref(),
            Some("ELE-WIDG-4821")
        );
    }

    #[tokio::test]
    async fn separator_variant_matches_fuzzily_at_full_similarity() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(&store).await;
        let mapper = mapper(store.clone(), ScriptedModel::unreachable());

        // "ABC-123" normalizes to the stored "abc123"; similarity 1.0 plus
        // the marketplace bonus stays capped at 1.0.
        let outcome = mapper.resolve("ABC-123", "amazon", None).await.unwrap();
        assert_eq!(outcome.method, MappingMethod::Fuzzy);
        assert_eq!(outcome.confidence, 1.0);
        assert_eq!(outcome.mapped_msku.as_deref(), Some("ELE-WIDG-4821"));
        assert!(!outcome.needs_validation);
    }

    #[tokio::test]
    async fn cross_marketplace_match_clears_floor_without_bonus() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(&store).await;
        let mapper = mapper(store.clone(), ScriptedModel::unreachable());

        // Same normalized string, different marketplace: no +0.2 boost, but
        // similarity alone is 1.0 which still exceeds the 0.7 floor.
        let outcome = mapper.resolve("ABC-123", "ebay", None).await.unwrap();
        assert_eq!(outcome.method, MappingMethod::Fuzzy);
        assert!(outcome.confidence >= FUZZY_KEEP_THRESHOLD);
    }

    #[tokio::test]
    async fn model_failure_never_raises() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(&store).await;
        let mapper = mapper(store.clone(), ScriptedModel::unreachable());

        let outcome = mapper.resolve("ZZZ-999", "amazon", None).await.unwrap();
        assert_eq!(outcome.method, MappingMethod::Manual);
        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.needs_validation);
    }

    #[tokio::test]
    async fn empty_catalog_yields_manual_with_no_suggestions() {
        let store = Arc::new(MemoryStore::new());
        let mapper = mapper(store.clone(), ScriptedModel::unreachable());

        let outcome = mapper.resolve("UNKNOWN-1", "amazon", None).await.unwrap();
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(outcome.method, MappingMethod::Manual);
        assert!(outcome.needs_validation);
        assert!(outcome.suggestions.is_empty());
    }

    #[tokio::test]
    async fn accepted_model_answer_is_ai_assisted() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(&store).await;
        let model = ScriptedModel::new(vec![Ok(json!({
            "mappedMsku": "ELE-WIDG-4821",
            "confidence": 0.85,
            "reasoning": "pattern matches the Widget Pro code"
        }))]);
        let mapper = mapper(store.clone(), model);

        let outcome = mapper
            .resolve("WDGT-PRO-9", "amazon", Some("Widget Pro"))
            .await
            .unwrap();
        assert_eq!(outcome.method, MappingMethod::AiAssisted);
        assert_eq!(outcome.mapped_msku.as_deref(), Some("ELE-WIDG-4821"));
        assert!(!outcome.needs_validation); // 0.85 >= 0.8
    }

    #[tokio::test]
    async fn low_confidence_model_answer_falls_through_to_manual() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(&store).await;
        let model = ScriptedModel::new(vec![Ok(json!({
            "mappedMsku": "ELE-WIDG-4821",
            "confidence": 0.4
        }))]);
        let mapper = mapper(store.clone(), model);

        let outcome = mapper
            .resolve("WDGT-???", "amazon", Some("Widget Pro"))
            .await
            .unwrap();
        assert_eq!(outcome.method, MappingMethod::Manual);
        assert_eq!(outcome.suggestions, vec!["ELE-WIDG-4821".to_string()]);
    }

    #[tokio::test]
    async fn every_resolve_is_audited() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(&store).await;
        let mapper = mapper(store.clone(), ScriptedModel::unreachable());
        mapper.warm_cache().await.unwrap();

        mapper.resolve("abc123", "amazon", None).await.unwrap();
        mapper.resolve("NOPE-1", "amazon", None).await.unwrap();
        assert_eq!(store.mapping_log_count(), 2);

        let logs = store.recent_mapping_logs(10).await.unwrap();
        assert_eq!(logs[0].mapping_method, "manual");
        assert!(!logs[0].validated);
        assert_eq!(logs[1].mapping_method, "exact_match");
        assert!(logs[1].validated);
    }

    #[tokio::test]
    async fn blank_input_is_rejected_before_any_lookup() {
        let store = Arc::new(MemoryStore::new());
        let mapper = mapper(store.clone(), ScriptedModel::unreachable());

        assert!(mapper.resolve("  ", "amazon", None).await.is_err());
        assert!(mapper.resolve("SKU-1", "", None).await.is_err());
        assert_eq!(store.mapping_log_count(), 0);
    }
}
