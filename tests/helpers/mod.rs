//! Shared fixtures for commission integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use commission_engine::*;
use rust_decimal::Decimal;
use uuid::Uuid;

/// In-memory world with users, shops, payments and referrals.
pub struct Fixture {
    pub store: InMemoryCommissionStore,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: InMemoryCommissionStore::new(),
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn CommissionStore> {
        Arc::new(self.store.clone())
    }

    pub fn sweep(&self) -> ReconciliationSweep {
        let store = self.dyn_store();
        ReconciliationSweep::new(
            store.clone(),
            HierarchyResolver::new(store.clone()),
            CommissionLedger::new(store),
            SweepConfig::default(),
        )
    }

    pub fn ledger(&self) -> CommissionLedger {
        CommissionLedger::new(self.dyn_store())
    }

    pub fn aggregator(&self) -> CommissionAggregator {
        CommissionAggregator::new(self.dyn_store(), ExportConfig::default())
    }

    pub async fn user(&self, name: &str, role: UserRole) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store
            .add_user(User {
                user_id,
                name: name.to_string(),
                role,
            })
            .await;
        user_id
    }

    pub async fn shop(&self, name: &str, agent: Option<Uuid>, operator: Option<Uuid>) -> Uuid {
        let shop_id = Uuid::new_v4();
        self.store
            .add_shop(Shop {
                shop_id,
                name: name.to_string(),
                category: Some("Food & Drink".to_string()),
                agent_id: agent,
                operator_id: operator,
            })
            .await;
        shop_id
    }

    pub async fn payment(&self, shop_id: Uuid, amount: Decimal) -> Uuid {
        self.payment_at(shop_id, amount, Utc::now()).await
    }

    pub async fn payment_at(&self, shop_id: Uuid, amount: Decimal, at: DateTime<Utc>) -> Uuid {
        let payment_id = Uuid::new_v4();
        self.store
            .add_payment(Payment {
                payment_id,
                shop_id,
                amount,
                status: PaymentStatus::Success,
                created_at: at,
            })
            .await;
        payment_id
    }

    /// Approved referral created `age_days` ago.
    pub async fn approve(&self, agent: Uuid, operator: Uuid, age_days: i64) -> Uuid {
        let request_id = Uuid::new_v4();
        self.store
            .add_referral(ReferralRequest {
                request_id,
                operator_id: operator,
                agent_id: agent,
                status: ReferralStatus::Approved,
                created_at: Utc::now() - Duration::days(age_days),
            })
            .await;
        request_id
    }

    pub async fn commission(&self, payment_id: Uuid) -> Commission {
        self.store
            .find_commission(payment_id)
            .await
            .unwrap()
            .expect("commission should exist")
    }
}

pub fn amount(v: i64) -> Decimal {
    Decimal::from(v)
}

pub fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}
