// Master-SKU and variant creation. Codes are derived from category, name
// and a timestamp suffix, with a uniqueness check and bounded retry so a
// collision can never silently alias two products.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use tracing::{info, warn};

use crate::error::DomainError;
use crate::mapping::cache::MappingCache;
use crate::mapping::resolver::{MappingMethod, MappingOutcome, SkuMapper};
use crate::store::{CatalogStore, MasterSku, NewMasterSku, NewSkuVariant};

const MAX_CODE_ATTEMPTS: u32 = 5;
/// Confidence assigned to a combo whose components all resolved.
const COMBO_CONFIDENCE: f64 = 0.95;

/// Input for master-SKU creation; the code itself is generated.
#[derive(Debug, Clone)]
pub struct MasterSkuDraft {
    pub product_name: String,
    pub category: String,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub is_combo_product: bool,
    pub combo_items: Option<Vec<String>>,
}

pub struct Catalog {
    store: Arc<dyn CatalogStore>,
    cache: Arc<MappingCache>,
}

impl Catalog {
    pub fn new(store: Arc<dyn CatalogStore>, cache: Arc<MappingCache>) -> Self {
        Self { store, cache }
    }

    /// Create a master SKU with a freshly generated unique code and return
    /// the persisted record.
    pub async fn create_master_sku(&self, draft: MasterSkuDraft) -> Result<MasterSku, DomainError> {
        if draft.product_name.trim().is_empty() {
            return Err(DomainError::validation("productName must not be empty"));
        }
        if draft.category.trim().is_empty() {
            return Err(DomainError::validation("category must not be empty"));
        }

        for attempt in 0..MAX_CODE_ATTEMPTS {
            let code = derive_code(&draft.product_name, &draft.category, attempt);
            if self.store.find_master_by_code(&code).await?.is_some() {
                warn!(code, attempt, "generated master code already taken; retrying");
                continue;
            }
            let created = self
                .store
                .insert_master(NewMasterSku {
                    msku: code,
                    product_name: draft.product_name.clone(),
                    description: draft.description.clone(),
                    category: draft.category.clone(),
                    brand: draft.brand.clone(),
                    is_combo_product: draft.is_combo_product,
                    combo_items: draft.combo_items.clone(),
                })
                .await?;
            info!(msku = %created.msku, "created master sku");
            return Ok(created);
        }

        Err(DomainError::validation(format!(
            "could not generate a unique master code after {MAX_CODE_ATTEMPTS} attempts"
        )))
    }

    /// Bind a marketplace SKU to an existing master code. Fails with
    /// not-found (and performs no writes) when the code is unknown; on
    /// success the pairing is written through to the mapping cache.
    pub async fn create_sku_variant(
        &self,
        sku: &str,
        msku: &str,
        marketplace: &str,
        price: BigDecimal,
    ) -> Result<(), DomainError> {
        if sku.trim().is_empty() || marketplace.trim().is_empty() {
            return Err(DomainError::validation(
                "sku and marketplace must not be empty",
            ));
        }

        let master = self
            .store
            .find_master_by_code(msku)
            .await?
            .ok_or_else(|| DomainError::not_found("master SKU", msku))?;

        self.store
            .insert_variant(NewSkuVariant {
                sku: sku.to_string(),
                msku_id: master.id,
                marketplace: marketplace.to_string(),
                price,
                is_active: true,
            })
            .await?;

        self.cache.put(sku, marketplace, &master.msku);
        Ok(())
    }
}

impl SkuMapper {
    /// Map a bundle: every component must resolve before a combo master SKU
    /// is created; otherwise the bundle goes to manual review.
    pub async fn process_combo(
        &self,
        catalog: &Catalog,
        main_sku: &str,
        component_skus: &[String],
        marketplace: &str,
    ) -> Result<MappingOutcome, DomainError> {
        let mut component_codes = Vec::with_capacity(component_skus.len());
        for sku in component_skus {
            let mapped = self.resolve(sku, marketplace, None).await?;
            match mapped.mapped_msku {
                Some(code) => component_codes.push(code),
                None => {
                    return Ok(MappingOutcome {
                        sku: main_sku.to_string(),
                        mapped_msku: None,
                        confidence: 0.0,
                        method: MappingMethod::Manual,
                        needs_validation: true,
                        suggestions: Vec::new(),
                    })
                }
            }
        }

        let combo = catalog
            .create_master_sku(MasterSkuDraft {
                product_name: format!("Combo: {main_sku}"),
                category: "Combo".to_string(),
                brand: None,
                description: None,
                is_combo_product: true,
                combo_items: Some(component_codes),
            })
            .await?;

        Ok(MappingOutcome {
            sku: main_sku.to_string(),
            mapped_msku: Some(combo.msku),
            confidence: COMBO_CONFIDENCE,
            method: MappingMethod::Manual,
            needs_validation: false,
            suggestions: Vec::new(),
        })
    }
}

/// `{CAT}-{NAME}-{last 4 digits of unix millis}`; the attempt index perturbs
/// the suffix so a retry always proposes a different candidate.
fn derive_code(product_name: &str, category: &str, attempt: u32) -> String {
    let prefix: String = category
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .flat_map(|c| c.to_uppercase())
        .collect();
    let name_code: String = product_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(4)
        .flat_map(|c| c.to_uppercase())
        .collect();
    let millis = Utc::now().timestamp_millis() + i64::from(attempt) * 7919;
    let suffix = (millis % 10_000).abs();
    format!("{prefix}-{name_code}-{suffix:04}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedModel;
    use crate::store::memory::MemoryStore;

    fn catalog(store: Arc<MemoryStore>) -> Catalog {
        Catalog::new(store, Arc::new(MappingCache::new(None)))
    }

    fn draft(name: &str, category: &str) -> MasterSkuDraft {
        MasterSkuDraft {
            product_name: name.to_string(),
            category: category.to_string(),
            brand: None,
            description: None,
            is_combo_product: false,
            combo_items: None,
        }
    }

    #[test]
    fn code_shape_is_category_name_and_four_digits() {
        let code = derive_code("Widget Pro Max", "Electronics", 0);
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ELE");
        assert_eq!(parts[1], "WIDG");
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn retry_attempts_produce_distinct_suffixes() {
        let a = derive_code("Widget", "Electronics", 0);
        let b = derive_code("Widget", "Electronics", 1);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn created_master_is_persisted_with_generated_code() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store.clone());

        let created = catalog
            .create_master_sku(draft("Widget Pro", "Electronics"))
            .await
            .unwrap();
        assert!(created.msku.starts_with("ELE-WIDG-"));
        assert_eq!(
            store
                .find_master_by_code(&created.msku)
                .await
                .unwrap()
                .unwrap()
                .product_name,
            "Widget Pro"
        );
    }

    #[tokio::test]
    async fn blank_category_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store);
        assert!(catalog
            .create_master_sku(draft("Widget", " "))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn variant_with_unknown_master_fails_without_mutation() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store.clone());

        let err = catalog
            .create_sku_variant("SKU-1", "NO-SUCH-0000", "amazon", BigDecimal::from(10))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
        assert!(store.list_variants().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn variant_creation_registers_cache_pairing() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MappingCache::new(None));
        let catalog = Catalog::new(store.clone(), cache.clone());

        let master = catalog
            .create_master_sku(draft("Widget Pro", "Electronics"))
            .await
            .unwrap();
        catalog
            .create_sku_variant("abc-123", &master.msku, "amazon", BigDecimal::from(19))
            .await
            .unwrap();

        assert_eq!(cache.get("ABC123", "amazon"), Some(master.msku.clone()));
        assert_eq!(store.list_variants().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn combo_with_unmappable_component_goes_to_manual_review() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MappingCache::new(None));
        let catalog = Catalog::new(store.clone(), cache.clone());
        let mapper = SkuMapper::new(store, cache, Arc::new(ScriptedModel::unreachable()));

        let outcome = mapper
            .process_combo(&catalog, "BUNDLE-1", &["GHOST-1".to_string()], "amazon")
            .await
            .unwrap();
        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.needs_validation);
        assert!(outcome.mapped_msku.is_none());
    }

    #[tokio::test]
    async fn combo_with_resolved_components_creates_combo_master() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MappingCache::new(None));
        let catalog = Catalog::new(store.clone(), cache.clone());
        let mapper = SkuMapper::new(
            store.clone(),
            cache,
            Arc::new(ScriptedModel::unreachable()),
        );

        let master = catalog
            .create_master_sku(draft("Widget Pro", "Electronics"))
            .await
            .unwrap();
        catalog
            .create_sku_variant("abc123", &master.msku, "amazon", BigDecimal::from(19))
            .await
            .unwrap();

        let outcome = mapper
            .process_combo(&catalog, "BUNDLE-1", &["abc123".to_string()], "amazon")
            .await
            .unwrap();
        assert_eq!(outcome.confidence, COMBO_CONFIDENCE);
        assert!(!outcome.needs_validation);

        let combo_code = outcome.mapped_msku.unwrap();
        let combo = store
            .find_master_by_code(&combo_code)
            .await
            .unwrap()
            .unwrap();
        assert!(combo.is_combo_product);
        assert_eq!(combo.combo_items, Some(vec![master.msku]));
    }
}
