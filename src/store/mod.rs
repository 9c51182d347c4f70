//! Commission persistence abstraction
//!
//! Every component reads and writes through [`CommissionStore`], which keeps
//! the resolver, ledger, sweep and aggregator independent of the backend:
//! [`InMemoryCommissionStore`] for tests and embedding, and
//! `PgCommissionStore` (feature `database`) for production.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::CommissionResult;
use crate::models::*;

pub mod memory;

pub use memory::InMemoryCommissionStore;

/// Persistence trait for the commission subsystem.
///
/// Payments, shops and referral requests are read-only here except for the
/// shop's cached operator. Commissions are insert-or-patch only.
#[async_trait]
pub trait CommissionStore: Send + Sync {
    // ── Payments ──

    async fn load_payment(&self, payment_id: Uuid) -> CommissionResult<Option<Payment>>;

    /// All payments with status `success`, oldest first.
    async fn successful_payments(&self) -> CommissionResult<Vec<Payment>>;

    /// Successful payments of shops where the user is the agent, the cached
    /// operator, or the approved operator of the shop's agent.
    async fn successful_payments_for_user(&self, user_id: Uuid)
        -> CommissionResult<Vec<Payment>>;

    // ── Shops ──

    async fn load_shop(&self, shop_id: Uuid) -> CommissionResult<Option<Shop>>;

    /// Write the resolved operator onto the shop if it has none yet.
    /// Returns whether a write happened.
    async fn cache_shop_operator(&self, shop_id: Uuid, operator_id: Uuid)
        -> CommissionResult<bool>;

    /// Drop the cached operator so the next resolution consults referrals.
    async fn clear_shop_operator(&self, shop_id: Uuid) -> CommissionResult<()>;

    // ── Referral requests ──

    /// Earliest approved referral request for the agent, by creation order.
    async fn first_approved_referral(
        &self,
        agent_id: Uuid,
    ) -> CommissionResult<Option<ReferralRequest>>;

    // ── Commissions ──

    async fn find_commission(&self, payment_id: Uuid) -> CommissionResult<Option<Commission>>;

    /// Insert a pending commission. Fails with `DuplicateCommission` when one
    /// already exists for the payment.
    async fn insert_commission(&self, new: &NewCommission) -> CommissionResult<Commission>;

    /// Apply `patch` only if the stored row still matches `expected`.
    /// Returns `None` when the row changed underneath.
    async fn update_commission(
        &self,
        expected: &Commission,
        patch: &CommissionPatch,
    ) -> CommissionResult<Option<Commission>>;

    async fn set_commission_status(
        &self,
        payment_id: Uuid,
        status: CommissionStatus,
    ) -> CommissionResult<Commission>;

    async fn list_commissions(&self) -> CommissionResult<Vec<Commission>>;

    /// Commissions joined with payment, shop and party names, ordered by
    /// payment date then payment id.
    async fn commission_report(&self) -> CommissionResult<Vec<CommissionReportRow>>;
}

/// True when the stored row has not moved since `expected` was read.
pub(crate) fn matches_version(stored: &Commission, expected: &Commission) -> bool {
    stored.agent_id == expected.agent_id
        && stored.operator_id == expected.operator_id
        && stored.agent_amount == expected.agent_amount
        && stored.operator_amount == expected.operator_amount
        && stored.company_amount == expected.company_amount
        && stored.status == expected.status
}
