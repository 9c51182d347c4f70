//! Commission Ledger - exactly one commission per payment
//!
//! `upsert` inserts the commission the first time a payment is seen and
//! otherwise only backfills what is still missing:
//!
//! - agent/operator references that are unset get the resolved party
//! - agent/operator shares that are zero get the computed share
//! - the company share is the residual and follows whatever changed
//!
//! A resolved non-zero share is never overwritten, so manual corrections and
//! earlier resolutions survive any number of sweeps. Paid commissions are
//! frozen.
//!
//! Concurrency relies on the store: the unique payment reference turns a lost
//! insert race into `DuplicateCommission` (handled by re-reading and taking
//! the update path), and updates are compare-and-set against the row read.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::calculator::CommissionCalculator;
use crate::error::{CommissionError, CommissionResult};
use crate::models::*;
use crate::store::CommissionStore;

/// Read/insert/update rounds before giving up on a contended payment.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Result of a ledger upsert
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// No commission existed; one was inserted.
    Created(Commission),
    /// An existing commission had fields backfilled.
    Updated(Commission),
    /// An existing commission needed nothing.
    Unchanged(Commission),
}

impl UpsertOutcome {
    pub fn commission(&self) -> &Commission {
        match self {
            UpsertOutcome::Created(c)
            | UpsertOutcome::Updated(c)
            | UpsertOutcome::Unchanged(c) => c,
        }
    }

    pub fn into_commission(self) -> Commission {
        match self {
            UpsertOutcome::Created(c)
            | UpsertOutcome::Updated(c)
            | UpsertOutcome::Unchanged(c) => c,
        }
    }
}

/// Idempotent commission writer
#[derive(Clone)]
pub struct CommissionLedger {
    store: Arc<dyn CommissionStore>,
    max_attempts: u32,
}

impl CommissionLedger {
    pub fn new(store: Arc<dyn CommissionStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Create the commission for a payment, or backfill the existing one.
    pub async fn upsert(
        &self,
        payment_id: Uuid,
        shop_id: Uuid,
        hierarchy: ResolvedHierarchy,
        breakdown: CommissionBreakdown,
    ) -> CommissionResult<UpsertOutcome> {
        for attempt in 1..=self.max_attempts {
            match self.store.find_commission(payment_id).await? {
                None => {
                    let new = NewCommission {
                        payment_id,
                        shop_id,
                        agent_id: hierarchy.agent_id,
                        operator_id: hierarchy.operator_id,
                        breakdown,
                    };
                    match self.store.insert_commission(&new).await {
                        Ok(commission) => {
                            info!(
                                payment_id = %payment_id,
                                agent_amount = %commission.agent_amount,
                                operator_amount = %commission.operator_amount,
                                company_amount = %commission.company_amount,
                                "Created commission"
                            );
                            return Ok(UpsertOutcome::Created(commission));
                        }
                        Err(e) if e.is_duplicate() => {
                            debug!(
                                payment_id = %payment_id,
                                attempt,
                                "Lost insert race, retrying as update"
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
                Some(existing) => {
                    let Some(patch) = backfill(&existing, &hierarchy, &breakdown)? else {
                        return Ok(UpsertOutcome::Unchanged(existing));
                    };
                    match self.store.update_commission(&existing, &patch).await? {
                        Some(updated) => {
                            info!(
                                payment_id = %payment_id,
                                agent_amount = %updated.agent_amount,
                                operator_amount = %updated.operator_amount,
                                company_amount = %updated.company_amount,
                                "Backfilled commission"
                            );
                            return Ok(UpsertOutcome::Updated(updated));
                        }
                        None => {
                            debug!(
                                payment_id = %payment_id,
                                attempt,
                                "Commission changed concurrently, re-reading"
                            );
                        }
                    }
                }
            }
        }

        Err(CommissionError::ConcurrentModification {
            payment_id,
            attempts: self.max_attempts,
        })
    }

    /// Settle a commission. Paid commissions are no longer backfilled.
    pub async fn mark_paid(&self, payment_id: Uuid) -> CommissionResult<Commission> {
        let commission = self
            .store
            .set_commission_status(payment_id, CommissionStatus::Paid)
            .await?;
        info!(payment_id = %payment_id, "Marked commission paid");
        Ok(commission)
    }
}

/// Work out which fields of `existing` the freshly resolved values may fill.
///
/// Returns `None` when nothing would change.
pub fn backfill(
    existing: &Commission,
    hierarchy: &ResolvedHierarchy,
    candidate: &CommissionBreakdown,
) -> CommissionResult<Option<CommissionPatch>> {
    if existing.status == CommissionStatus::Paid {
        return Ok(None);
    }

    warn_on_drift(existing.payment_id, "agent", existing.agent_id, hierarchy.agent_id);
    warn_on_drift(
        existing.payment_id,
        "operator",
        existing.operator_id,
        hierarchy.operator_id,
    );

    let agent_id = existing.agent_id.or(hierarchy.agent_id);
    let operator_id = existing.operator_id.or(hierarchy.operator_id);

    let agent_amount = if existing.agent_amount.is_zero() && hierarchy.has_agent() {
        candidate.agent_amount
    } else {
        existing.agent_amount
    };

    // The operator share is taken from what the kept agent share leaves.
    let operator_amount = if existing.operator_amount.is_zero() && hierarchy.has_operator() {
        CommissionCalculator::operator_share(existing.total_amount - agent_amount)?
    } else {
        existing.operator_amount
    };

    let unchanged = agent_id == existing.agent_id
        && operator_id == existing.operator_id
        && agent_amount == existing.agent_amount
        && operator_amount == existing.operator_amount;
    if unchanged {
        return Ok(None);
    }

    let company_amount = existing.total_amount - agent_amount - operator_amount;
    if company_amount < Decimal::ZERO {
        return Err(CommissionError::ConservationViolated {
            payment_id: existing.payment_id,
            total: existing.total_amount,
            agent: agent_amount,
            operator: operator_amount,
        });
    }

    Ok(Some(CommissionPatch {
        agent_id,
        operator_id,
        agent_amount,
        operator_amount,
        company_amount,
    }))
}

fn warn_on_drift(payment_id: Uuid, role: &str, recorded: Option<Uuid>, resolved: Option<Uuid>) {
    if let (Some(recorded), Some(resolved)) = (recorded, resolved) {
        if recorded != resolved {
            warn!(
                payment_id = %payment_id,
                role,
                recorded = %recorded,
                resolved = %resolved,
                "Hierarchy changed since commission was recorded, keeping recorded party"
            );
        }
    }
}
