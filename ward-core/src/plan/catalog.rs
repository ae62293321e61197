//! Plan catalog
//!
//! Resolves plan tiers to normalized plans. Entries are cached for the
//! configured TTL; every write through the catalog busts the affected entry,
//! so staleness is bounded by the TTL only for writes made elsewhere.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use shared::plan::PlanDefinition;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::merge::{PlanPatch, merge};
use super::{Plan, PlanTier};
use crate::config::ConfigHandle;
use crate::error::{BoxError, EngineError};

/// Backing store of raw plan rows
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn load(&self, tier: PlanTier) -> Result<Option<PlanDefinition>, BoxError>;
    async fn list(&self) -> Result<Vec<PlanDefinition>, BoxError>;
    async fn save(&self, definition: &PlanDefinition) -> Result<(), BoxError>;
}

/// In-memory plan store
#[derive(Default)]
pub struct MemoryPlanStore {
    rows: DashMap<String, PlanDefinition>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(definitions: impl IntoIterator<Item = PlanDefinition>) -> Self {
        let store = Self::new();
        for def in definitions {
            store.rows.insert(def.plan_id.clone(), def);
        }
        store
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn load(&self, tier: PlanTier) -> Result<Option<PlanDefinition>, BoxError> {
        Ok(self.rows.get(tier.as_str()).map(|row| row.clone()))
    }

    async fn list(&self) -> Result<Vec<PlanDefinition>, BoxError> {
        Ok(self.rows.iter().map(|row| row.value().clone()).collect())
    }

    async fn save(&self, definition: &PlanDefinition) -> Result<(), BoxError> {
        self.rows
            .insert(definition.plan_id.clone(), definition.clone());
        Ok(())
    }
}

struct CacheEntry {
    plan: Arc<Plan>,
    expires_at: Instant,
}

pub struct PlanCatalog {
    store: Arc<dyn PlanStore>,
    config: ConfigHandle,
    entries: RwLock<HashMap<PlanTier, CacheEntry>>,
}

impl PlanCatalog {
    pub fn new(store: Arc<dyn PlanStore>, config: ConfigHandle) -> Self {
        Self {
            store,
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, tier: PlanTier) -> Result<Arc<Plan>, EngineError> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&tier)
                && entry.expires_at > Instant::now()
            {
                return Ok(entry.plan.clone());
            }
        }

        let definition = self
            .store
            .load(tier)
            .await
            .map_err(EngineError::Storage)?
            .ok_or_else(|| EngineError::PlanNotFound(tier.as_str().to_string()))?;
        let plan = Plan::from_definition(&definition)?;
        if plan.tier != tier {
            return Err(EngineError::InvalidPlanDefinition(format!(
                "row for '{tier}' declares plan '{}'",
                definition.plan_id
            )));
        }

        let plan = Arc::new(plan);
        self.cache(plan.clone()).await;
        Ok(plan)
    }

    /// Validate, persist and publish a full plan definition
    pub async fn upsert(&self, definition: &PlanDefinition) -> Result<Arc<Plan>, EngineError> {
        let plan = Plan::from_definition(definition)?;
        self.store
            .save(&plan.to_definition())
            .await
            .map_err(EngineError::Storage)?;

        tracing::info!(plan = %plan.tier, "Plan definition saved");
        let plan = Arc::new(plan);
        self.cache(plan.clone()).await;
        Ok(plan)
    }

    /// Apply a partial update to the stored plan
    ///
    /// Reads the row from the store (not the cache) so the patch lands on the
    /// latest persisted version.
    pub async fn patch(&self, tier: PlanTier, patch: &PlanPatch) -> Result<Arc<Plan>, EngineError> {
        let current = self
            .store
            .load(tier)
            .await
            .map_err(EngineError::Storage)?
            .ok_or_else(|| EngineError::PlanNotFound(tier.as_str().to_string()))?;
        let current = Plan::from_definition(&current)?;
        let next = merge(&current, patch);
        self.upsert(&next.to_definition()).await
    }

    pub async fn list(&self) -> Result<Vec<Plan>, EngineError> {
        let rows = self.store.list().await.map_err(EngineError::Storage)?;
        let mut plans = Vec::with_capacity(rows.len());
        for row in &rows {
            match Plan::from_definition(row) {
                Ok(plan) => plans.push(plan),
                Err(e) => {
                    tracing::warn!(plan = %row.plan_id, error = %e, "Skipping invalid plan row");
                }
            }
        }
        plans.sort_by_key(|p| p.tier.rank());
        Ok(plans)
    }

    pub async fn invalidate(&self, tier: PlanTier) {
        self.entries.write().await.remove(&tier);
    }

    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }

    async fn cache(&self, plan: Arc<Plan>) {
        let ttl = self.config.snapshot().plan_cache_ttl();
        let mut entries = self.entries.write().await;
        entries.insert(
            plan.tier,
            CacheEntry {
                plan,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Limit, ProviderLimit};
    use shared::plan::BillingPeriod;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn standard_definition(scans: i64) -> PlanDefinition {
        serde_json::from_value(serde_json::json!({
            "planId": "standard",
            "price": 9.99,
            "period": "monthly",
            "limits": {
                "scans": scans,
                "documentation": 5,
                "repositories": 3,
                "chatMessages": 100,
                "threatIntelligence": { "shodan": true }
            }
        }))
        .unwrap()
    }

    /// Counts loads so cache hits are observable
    struct CountingStore {
        inner: MemoryPlanStore,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl PlanStore for CountingStore {
        async fn load(&self, tier: PlanTier) -> Result<Option<PlanDefinition>, BoxError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load(tier).await
        }
        async fn list(&self) -> Result<Vec<PlanDefinition>, BoxError> {
            self.inner.list().await
        }
        async fn save(&self, definition: &PlanDefinition) -> Result<(), BoxError> {
            self.inner.save(definition).await
        }
    }

    fn counting(defs: Vec<PlanDefinition>) -> Arc<CountingStore> {
        Arc::new(CountingStore {
            inner: MemoryPlanStore::with_plans(defs),
            loads: AtomicUsize::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_caches_until_ttl() {
        let store = counting(vec![standard_definition(10)]);
        let catalog = PlanCatalog::new(store.clone(), ConfigHandle::default());

        let plan = catalog.resolve(PlanTier::Standard).await.unwrap();
        assert_eq!(plan.limits.scans, Limit::Limited(10));
        assert_eq!(
            plan.limits.threat_intelligence["shodan"],
            ProviderLimit::Unlimited
        );
        catalog.resolve(PlanTier::Standard).await.unwrap();
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);

        // A write made behind the catalog's back shows up after the TTL
        store.inner.save(&standard_definition(20)).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let plan = catalog.resolve(PlanTier::Standard).await.unwrap();
        assert_eq!(plan.limits.scans, Limit::Limited(20));
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_plan() {
        let catalog = PlanCatalog::new(Arc::new(MemoryPlanStore::new()), ConfigHandle::default());
        let err = catalog.resolve(PlanTier::Pro).await.unwrap_err();
        assert!(matches!(err, EngineError::PlanNotFound(ref id) if id == "pro"));
    }

    #[tokio::test]
    async fn test_upsert_busts_cache() {
        let store = Arc::new(MemoryPlanStore::with_plans([standard_definition(10)]));
        let catalog = PlanCatalog::new(store, ConfigHandle::default());
        catalog.resolve(PlanTier::Standard).await.unwrap();

        catalog.upsert(&standard_definition(15)).await.unwrap();
        let plan = catalog.resolve(PlanTier::Standard).await.unwrap();
        assert_eq!(plan.limits.scans, Limit::Limited(15));
    }

    #[tokio::test]
    async fn test_patch_persists_merged_plan() {
        let store = Arc::new(MemoryPlanStore::with_plans([standard_definition(10)]));
        let catalog = PlanCatalog::new(store.clone(), ConfigHandle::default());

        let request = serde_json::from_value(serde_json::json!({
            "period": "yearly",
            "limits": { "threatIntelligence": { "shodan": null, "otx": 7 } }
        }))
        .unwrap();
        let patch = PlanPatch::from_request(&request).unwrap();
        let plan = catalog.patch(PlanTier::Standard, &patch).await.unwrap();

        assert_eq!(plan.period, BillingPeriod::Yearly);
        assert!(!plan.limits.threat_intelligence.contains_key("shodan"));
        assert_eq!(
            plan.limits.threat_intelligence["otx"],
            ProviderLimit::Limited(7)
        );

        let stored = store.load(PlanTier::Standard).await.unwrap().unwrap();
        assert_eq!(Plan::from_definition(&stored).unwrap(), *plan);
    }

    #[tokio::test]
    async fn test_list_orders_by_rank_and_skips_invalid_rows() {
        let mut free = standard_definition(1);
        free.plan_id = "free".into();
        let mut bogus = standard_definition(1);
        bogus.plan_id = "platinum".into();

        let store = Arc::new(MemoryPlanStore::with_plans([
            standard_definition(10),
            bogus,
            free,
        ]));
        let catalog = PlanCatalog::new(store, ConfigHandle::default());
        let tiers: Vec<_> = catalog
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.tier)
            .collect();
        assert_eq!(tiers, vec![PlanTier::Free, PlanTier::Standard]);
    }
}
