//! In-memory commission store
//!
//! Backs tests and embedded use. A single `RwLock` over the whole state gives
//! the same per-payment uniqueness guarantee the Postgres unique index does.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{matches_version, CommissionStore};
use crate::error::{CommissionError, CommissionResult};
use crate::models::*;

#[derive(Default)]
struct MemoryState {
    payments: HashMap<Uuid, Payment>,
    shops: HashMap<Uuid, Shop>,
    users: HashMap<Uuid, User>,
    /// Insertion order doubles as the creation-order tie-break.
    referrals: Vec<ReferralRequest>,
    commissions: HashMap<Uuid, Commission>,
}

impl MemoryState {
    fn first_approved_referral(&self, agent_id: Uuid) -> Option<&ReferralRequest> {
        self.referrals
            .iter()
            .filter(|r| r.agent_id == agent_id && r.status == ReferralStatus::Approved)
            .min_by_key(|r| r.created_at)
    }

    fn user_name(&self, user_id: Option<Uuid>) -> Option<String> {
        user_id.and_then(|id| self.users.get(&id).map(|u| u.name.clone()))
    }
}

/// In-memory store (cheap to clone, clones share state)
#[derive(Clone, Default)]
pub struct InMemoryCommissionStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryCommissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_payment(&self, payment: Payment) {
        self.state
            .write()
            .await
            .payments
            .insert(payment.payment_id, payment);
    }

    pub async fn set_payment_status(&self, payment_id: Uuid, status: PaymentStatus) {
        if let Some(p) = self.state.write().await.payments.get_mut(&payment_id) {
            p.status = status;
        }
    }

    pub async fn add_shop(&self, shop: Shop) {
        self.state.write().await.shops.insert(shop.shop_id, shop);
    }

    pub async fn set_shop_agent(&self, shop_id: Uuid, agent_id: Option<Uuid>) {
        if let Some(s) = self.state.write().await.shops.get_mut(&shop_id) {
            s.agent_id = agent_id;
        }
    }

    pub async fn add_user(&self, user: User) {
        self.state.write().await.users.insert(user.user_id, user);
    }

    pub async fn add_referral(&self, referral: ReferralRequest) {
        self.state.write().await.referrals.push(referral);
    }

    pub async fn set_referral_status(&self, request_id: Uuid, status: ReferralStatus) {
        let mut state = self.state.write().await;
        if let Some(r) = state
            .referrals
            .iter_mut()
            .find(|r| r.request_id == request_id)
        {
            r.status = status;
        }
    }

    pub async fn commission_count(&self) -> usize {
        self.state.read().await.commissions.len()
    }

    /// Overwrite a stored commission, bypassing the ledger (manual corrections).
    pub async fn put_commission(&self, commission: Commission) {
        self.state
            .write()
            .await
            .commissions
            .insert(commission.payment_id, commission);
    }
}

#[async_trait]
impl CommissionStore for InMemoryCommissionStore {
    async fn load_payment(&self, payment_id: Uuid) -> CommissionResult<Option<Payment>> {
        Ok(self.state.read().await.payments.get(&payment_id).cloned())
    }

    async fn successful_payments(&self) -> CommissionResult<Vec<Payment>> {
        let state = self.state.read().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.is_successful())
            .cloned()
            .collect();
        payments.sort_by_key(|p| (p.created_at, p.payment_id));
        Ok(payments)
    }

    async fn successful_payments_for_user(
        &self,
        user_id: Uuid,
    ) -> CommissionResult<Vec<Payment>> {
        let state = self.state.read().await;
        let supervised: Vec<Uuid> = state
            .referrals
            .iter()
            .filter(|r| r.operator_id == user_id && r.status == ReferralStatus::Approved)
            .map(|r| r.agent_id)
            .collect();
        let in_scope = |shop: &Shop| {
            shop.agent_id == Some(user_id)
                || shop.operator_id == Some(user_id)
                || shop.agent_id.is_some_and(|a| supervised.contains(&a))
        };

        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.is_successful())
            .filter(|p| state.shops.get(&p.shop_id).is_some_and(|s| in_scope(s)))
            .cloned()
            .collect();
        payments.sort_by_key(|p| (p.created_at, p.payment_id));
        Ok(payments)
    }

    async fn load_shop(&self, shop_id: Uuid) -> CommissionResult<Option<Shop>> {
        Ok(self.state.read().await.shops.get(&shop_id).cloned())
    }

    async fn cache_shop_operator(
        &self,
        shop_id: Uuid,
        operator_id: Uuid,
    ) -> CommissionResult<bool> {
        let mut state = self.state.write().await;
        let shop = state
            .shops
            .get_mut(&shop_id)
            .ok_or(CommissionError::ShopNotFound { shop_id })?;
        if shop.operator_id.is_some() {
            return Ok(false);
        }
        shop.operator_id = Some(operator_id);
        Ok(true)
    }

    async fn clear_shop_operator(&self, shop_id: Uuid) -> CommissionResult<()> {
        let mut state = self.state.write().await;
        let shop = state
            .shops
            .get_mut(&shop_id)
            .ok_or(CommissionError::ShopNotFound { shop_id })?;
        shop.operator_id = None;
        Ok(())
    }

    async fn first_approved_referral(
        &self,
        agent_id: Uuid,
    ) -> CommissionResult<Option<ReferralRequest>> {
        Ok(self
            .state
            .read()
            .await
            .first_approved_referral(agent_id)
            .cloned())
    }

    async fn find_commission(&self, payment_id: Uuid) -> CommissionResult<Option<Commission>> {
        Ok(self.state.read().await.commissions.get(&payment_id).cloned())
    }

    async fn insert_commission(&self, new: &NewCommission) -> CommissionResult<Commission> {
        let mut state = self.state.write().await;
        if state.commissions.contains_key(&new.payment_id) {
            return Err(CommissionError::DuplicateCommission {
                payment_id: new.payment_id,
            });
        }

        let now = Utc::now();
        let commission = Commission {
            commission_id: Uuid::new_v4(),
            payment_id: new.payment_id,
            shop_id: new.shop_id,
            agent_id: new.agent_id,
            operator_id: new.operator_id,
            agent_amount: new.breakdown.agent_amount,
            operator_amount: new.breakdown.operator_amount,
            company_amount: new.breakdown.company_amount,
            total_amount: new.breakdown.total_amount,
            status: CommissionStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state
            .commissions
            .insert(commission.payment_id, commission.clone());
        Ok(commission)
    }

    async fn update_commission(
        &self,
        expected: &Commission,
        patch: &CommissionPatch,
    ) -> CommissionResult<Option<Commission>> {
        let mut state = self.state.write().await;
        let stored = state.commissions.get_mut(&expected.payment_id).ok_or(
            CommissionError::CommissionNotFound {
                payment_id: expected.payment_id,
            },
        )?;
        if !matches_version(stored, expected) {
            return Ok(None);
        }

        stored.agent_id = patch.agent_id;
        stored.operator_id = patch.operator_id;
        stored.agent_amount = patch.agent_amount;
        stored.operator_amount = patch.operator_amount;
        stored.company_amount = patch.company_amount;
        stored.updated_at = Utc::now();
        Ok(Some(stored.clone()))
    }

    async fn set_commission_status(
        &self,
        payment_id: Uuid,
        status: CommissionStatus,
    ) -> CommissionResult<Commission> {
        let mut state = self.state.write().await;
        let stored = state
            .commissions
            .get_mut(&payment_id)
            .ok_or(CommissionError::CommissionNotFound { payment_id })?;
        stored.status = status;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn list_commissions(&self) -> CommissionResult<Vec<Commission>> {
        let mut commissions: Vec<Commission> = self
            .state
            .read()
            .await
            .commissions
            .values()
            .cloned()
            .collect();
        commissions.sort_by_key(|c| (c.created_at, c.payment_id));
        Ok(commissions)
    }

    async fn commission_report(&self) -> CommissionResult<Vec<CommissionReportRow>> {
        let state = self.state.read().await;
        let mut rows = Vec::with_capacity(state.commissions.len());

        for c in state.commissions.values() {
            let payment = state
                .payments
                .get(&c.payment_id)
                .ok_or(CommissionError::PaymentNotFound {
                    payment_id: c.payment_id,
                })?;
            let shop = state
                .shops
                .get(&c.shop_id)
                .ok_or(CommissionError::ShopNotFound { shop_id: c.shop_id })?;

            rows.push(CommissionReportRow {
                payment_id: c.payment_id,
                payment_date: payment.created_at,
                shop_name: shop.name.clone(),
                category: shop.category.clone(),
                payment_amount: payment.amount,
                agent_name: state.user_name(c.agent_id),
                agent_amount: c.agent_amount,
                operator_name: state.user_name(c.operator_id),
                operator_amount: c.operator_amount,
                company_amount: c.company_amount,
                status: c.status,
            });
        }

        rows.sort_by_key(|r| (r.payment_date, r.payment_id));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn referral(
        agent_id: Uuid,
        operator_id: Uuid,
        status: ReferralStatus,
        age_days: i64,
    ) -> ReferralRequest {
        ReferralRequest {
            request_id: Uuid::new_v4(),
            operator_id,
            agent_id,
            status,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    fn new_commission(payment_id: Uuid) -> NewCommission {
        NewCommission {
            payment_id,
            shop_id: Uuid::new_v4(),
            agent_id: None,
            operator_id: None,
            breakdown: CommissionBreakdown {
                agent_amount: Decimal::ZERO,
                operator_amount: Decimal::ZERO,
                company_amount: Decimal::from(50),
                total_amount: Decimal::from(50),
            },
        }
    }

    #[tokio::test]
    async fn test_first_approved_referral_is_earliest() {
        let store = InMemoryCommissionStore::new();
        let agent = Uuid::new_v4();
        let (old_op, new_op, pending_op) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        store
            .add_referral(referral(agent, pending_op, ReferralStatus::Pending, 30))
            .await;
        store
            .add_referral(referral(agent, new_op, ReferralStatus::Approved, 1))
            .await;
        store
            .add_referral(referral(agent, old_op, ReferralStatus::Approved, 10))
            .await;

        let found = store.first_approved_referral(agent).await.unwrap().unwrap();
        assert_eq!(found.operator_id, old_op);
    }

    #[tokio::test]
    async fn test_insert_commission_rejects_duplicate() {
        let store = InMemoryCommissionStore::new();
        let payment_id = Uuid::new_v4();

        store.insert_commission(&new_commission(payment_id)).await.unwrap();
        let err = store
            .insert_commission(&new_commission(payment_id))
            .await
            .unwrap_err();

        assert!(err.is_duplicate());
        assert_eq!(store.commission_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_commission_is_compare_and_set() {
        let store = InMemoryCommissionStore::new();
        let payment_id = Uuid::new_v4();
        let original = store.insert_commission(&new_commission(payment_id)).await.unwrap();

        let agent = Uuid::new_v4();
        let patch = CommissionPatch {
            agent_id: Some(agent),
            operator_id: None,
            agent_amount: Decimal::from(10),
            operator_amount: Decimal::ZERO,
            company_amount: Decimal::from(40),
        };
        let updated = store.update_commission(&original, &patch).await.unwrap();
        assert_eq!(updated.unwrap().agent_id, Some(agent));

        // Stale version no longer matches
        let stale = store.update_commission(&original, &patch).await.unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn test_cache_shop_operator_only_fills_empty() {
        let store = InMemoryCommissionStore::new();
        let shop_id = Uuid::new_v4();
        store
            .add_shop(Shop {
                shop_id,
                name: "Corner Cafe".into(),
                category: None,
                agent_id: None,
                operator_id: None,
            })
            .await;

        let first = Uuid::new_v4();
        assert!(store.cache_shop_operator(shop_id, first).await.unwrap());
        assert!(!store.cache_shop_operator(shop_id, Uuid::new_v4()).await.unwrap());
        let shop = store.load_shop(shop_id).await.unwrap().unwrap();
        assert_eq!(shop.operator_id, Some(first));

        store.clear_shop_operator(shop_id).await.unwrap();
        let shop = store.load_shop(shop_id).await.unwrap().unwrap();
        assert_eq!(shop.operator_id, None);
    }
}
