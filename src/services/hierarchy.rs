//! Hierarchy Resolver - determine the agent and operator for a shop
//!
//! The shop's own references win. When the shop has an agent but no operator,
//! the earliest approved referral request for that agent supplies it, and the
//! result is written back onto the shop so later resolutions skip the lookup.
//! That write-back is a cache: referral requests stay authoritative and
//! [`HierarchyResolver::invalidate`] drops a stale entry.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CommissionError, CommissionResult};
use crate::models::{ResolvedHierarchy, Shop};
use crate::store::CommissionStore;

/// Resolves agent/operator for shops through a [`CommissionStore`]
#[derive(Clone)]
pub struct HierarchyResolver {
    store: Arc<dyn CommissionStore>,
}

impl HierarchyResolver {
    pub fn new(store: Arc<dyn CommissionStore>) -> Self {
        Self { store }
    }

    /// Load the shop and resolve its hierarchy.
    pub async fn resolve_shop(&self, shop_id: Uuid) -> CommissionResult<ResolvedHierarchy> {
        let shop = self
            .store
            .load_shop(shop_id)
            .await?
            .ok_or(CommissionError::ShopNotFound { shop_id })?;
        self.resolve(&shop).await
    }

    /// Resolve the hierarchy of an already-loaded shop.
    pub async fn resolve(&self, shop: &Shop) -> CommissionResult<ResolvedHierarchy> {
        let agent_id = shop.agent_id;

        if let Some(operator_id) = shop.operator_id {
            return Ok(ResolvedHierarchy {
                agent_id,
                operator_id: Some(operator_id),
            });
        }

        let Some(agent) = agent_id else {
            return Ok(ResolvedHierarchy::default());
        };

        let operator_id = match self.store.first_approved_referral(agent).await? {
            Some(referral) => {
                self.write_back(shop.shop_id, referral.operator_id).await?;
                Some(referral.operator_id)
            }
            None => {
                debug!(
                    shop_id = %shop.shop_id,
                    agent_id = %agent,
                    "No approved referral for agent"
                );
                None
            }
        };

        Ok(ResolvedHierarchy {
            agent_id,
            operator_id,
        })
    }

    /// Forget the cached operator for a shop.
    pub async fn invalidate(&self, shop_id: Uuid) -> CommissionResult<()> {
        self.store.clear_shop_operator(shop_id).await?;
        info!(shop_id = %shop_id, "Cleared cached shop operator");
        Ok(())
    }

    async fn write_back(&self, shop_id: Uuid, operator_id: Uuid) -> CommissionResult<()> {
        // Another resolver may have filled it first; both write the same value.
        if self.store.cache_shop_operator(shop_id, operator_id).await? {
            info!(
                shop_id = %shop_id,
                operator_id = %operator_id,
                "Cached resolved operator on shop"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReferralRequest, ReferralStatus};
    use crate::store::InMemoryCommissionStore;
    use chrono::{Duration, Utc};

    fn shop(agent_id: Option<Uuid>, operator_id: Option<Uuid>) -> Shop {
        Shop {
            shop_id: Uuid::new_v4(),
            name: "Harbour Books".into(),
            category: Some("Books".into()),
            agent_id,
            operator_id,
        }
    }

    async fn setup() -> (InMemoryCommissionStore, HierarchyResolver) {
        let store = InMemoryCommissionStore::new();
        let resolver = HierarchyResolver::new(Arc::new(store.clone()));
        (store, resolver)
    }

    #[tokio::test]
    async fn test_stored_operator_wins() {
        let (store, resolver) = setup().await;
        let (agent, operator) = (Uuid::new_v4(), Uuid::new_v4());
        store
            .add_referral(ReferralRequest {
                request_id: Uuid::new_v4(),
                operator_id: Uuid::new_v4(),
                agent_id: agent,
                status: ReferralStatus::Approved,
                created_at: Utc::now(),
            })
            .await;
        let s = shop(Some(agent), Some(operator));
        store.add_shop(s.clone()).await;

        let resolved = resolver.resolve_shop(s.shop_id).await.unwrap();
        assert_eq!(resolved.agent_id, Some(agent));
        assert_eq!(resolved.operator_id, Some(operator));
    }

    #[tokio::test]
    async fn test_falls_back_to_earliest_approved_referral_and_caches() {
        let (store, resolver) = setup().await;
        let (agent, early, late) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        for (operator_id, age, status) in [
            (late, 1, ReferralStatus::Approved),
            (early, 5, ReferralStatus::Approved),
            (Uuid::new_v4(), 9, ReferralStatus::Rejected),
        ] {
            store
                .add_referral(ReferralRequest {
                    request_id: Uuid::new_v4(),
                    operator_id,
                    agent_id: agent,
                    status,
                    created_at: Utc::now() - Duration::days(age),
                })
                .await;
        }
        let s = shop(Some(agent), None);
        store.add_shop(s.clone()).await;

        let resolved = resolver.resolve_shop(s.shop_id).await.unwrap();
        assert_eq!(resolved.operator_id, Some(early));

        let cached = store.load_shop(s.shop_id).await.unwrap().unwrap();
        assert_eq!(cached.operator_id, Some(early));
    }

    #[tokio::test]
    async fn test_no_agent_means_no_operator_lookup() {
        let (store, resolver) = setup().await;
        let s = shop(None, None);
        store.add_shop(s.clone()).await;

        let resolved = resolver.resolve_shop(s.shop_id).await.unwrap();
        assert_eq!(resolved, ResolvedHierarchy::default());
    }

    #[tokio::test]
    async fn test_missing_shop() {
        let (_store, resolver) = setup().await;
        let err = resolver.resolve_shop(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CommissionError::ShopNotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalidate_forces_fresh_lookup() {
        let (store, resolver) = setup().await;
        let agent = Uuid::new_v4();
        let first = ReferralRequest {
            request_id: Uuid::new_v4(),
            operator_id: Uuid::new_v4(),
            agent_id: agent,
            status: ReferralStatus::Approved,
            created_at: Utc::now() - Duration::days(3),
        };
        let second_operator = Uuid::new_v4();
        store.add_referral(first.clone()).await;
        store
            .add_referral(ReferralRequest {
                request_id: Uuid::new_v4(),
                operator_id: second_operator,
                agent_id: agent,
                status: ReferralStatus::Approved,
                created_at: Utc::now(),
            })
            .await;
        let s = shop(Some(agent), None);
        store.add_shop(s.clone()).await;

        let resolved = resolver.resolve_shop(s.shop_id).await.unwrap();
        assert_eq!(resolved.operator_id, Some(first.operator_id));

        // Referral revoked: the cache still answers until invalidated
        store
            .set_referral_status(first.request_id, ReferralStatus::Rejected)
            .await;
        let stale = resolver.resolve_shop(s.shop_id).await.unwrap();
        assert_eq!(stale.operator_id, Some(first.operator_id));

        resolver.invalidate(s.shop_id).await.unwrap();
        let fresh = resolver.resolve_shop(s.shop_id).await.unwrap();
        assert_eq!(fresh.operator_id, Some(second_operator));
    }
}
