//! Reconciliation Sweep - bring the ledger in line with current hierarchy data
//!
//! Walks successful payments and runs resolve → compute → upsert for each
//! one. Payments are independent: they run with bounded parallelism, in no
//! particular order, and a failure on one is counted and logged without
//! stopping the rest. Every step is idempotent, so a second sweep over an
//! unchanged payment set only reports skips.
//!
//! The payment-verification worker, login sync and admin sweep all come
//! through here.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::hierarchy::HierarchyResolver;
use super::ledger::{CommissionLedger, UpsertOutcome};
use crate::calculator::CommissionCalculator;
use crate::config::SweepConfig;
use crate::error::{CommissionError, CommissionResult};
use crate::models::Payment;
use crate::store::CommissionStore;

/// Counts from one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Payments that had no commission yet
    pub created: usize,
    /// Existing commissions that had fields backfilled
    pub updated: usize,
    /// Existing commissions that needed nothing
    pub skipped: usize,
    /// Payments whose resolution or persistence failed
    pub errors: usize,
    pub failures: Vec<SweepFailure>,
}

/// A payment the sweep could not reconcile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub payment_id: Uuid,
    pub reason: String,
}

impl SweepReport {
    pub fn processed(&self) -> usize {
        self.created + self.updated + self.skipped + self.errors
    }

    fn record(&mut self, payment_id: Uuid, result: CommissionResult<UpsertOutcome>) {
        match result {
            Ok(UpsertOutcome::Created(_)) => self.created += 1,
            Ok(UpsertOutcome::Updated(_)) => self.updated += 1,
            Ok(UpsertOutcome::Unchanged(_)) => self.skipped += 1,
            Err(e) => {
                warn!(payment_id = %payment_id, error = %e, "Commission reconciliation failed");
                self.errors += 1;
                self.failures.push(SweepFailure {
                    payment_id,
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Idempotent batch reconciliation over successful payments
#[derive(Clone)]
pub struct ReconciliationSweep {
    store: Arc<dyn CommissionStore>,
    resolver: HierarchyResolver,
    ledger: CommissionLedger,
    config: SweepConfig,
}

impl ReconciliationSweep {
    pub fn new(
        store: Arc<dyn CommissionStore>,
        resolver: HierarchyResolver,
        ledger: CommissionLedger,
        config: SweepConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            ledger,
            config,
        }
    }

    /// Reconcile every successful payment.
    pub async fn run(&self) -> CommissionResult<SweepReport> {
        let payments = self.store.successful_payments().await?;
        info!(payments = payments.len(), "Starting commission sweep");
        let report = self.reconcile_all(payments).await;
        log_report("full", &report);
        Ok(report)
    }

    /// Reconcile the payments a user earns commission on (login sync).
    pub async fn run_for_user(&self, user_id: Uuid) -> CommissionResult<SweepReport> {
        let payments = self.store.successful_payments_for_user(user_id).await?;
        debug!(user_id = %user_id, payments = payments.len(), "Starting user commission sync");
        let report = self.reconcile_all(payments).await;
        log_report("user", &report);
        Ok(report)
    }

    /// Reconcile a single payment, which must already be successful.
    pub async fn process_payment(&self, payment_id: Uuid) -> CommissionResult<UpsertOutcome> {
        let payment = self
            .store
            .load_payment(payment_id)
            .await?
            .ok_or(CommissionError::PaymentNotFound { payment_id })?;
        if !payment.is_successful() {
            return Err(CommissionError::PaymentNotSettled {
                payment_id,
                status: payment.status,
            });
        }
        self.reconcile(&payment).await
    }

    async fn reconcile_all(&self, payments: Vec<Payment>) -> SweepReport {
        let results: Vec<(Uuid, CommissionResult<UpsertOutcome>)> = stream::iter(payments)
            .map(|payment| async move {
                let result = self.reconcile(&payment).await;
                (payment.payment_id, result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = SweepReport::default();
        for (payment_id, result) in results {
            report.record(payment_id, result);
        }
        report
    }

    async fn reconcile(&self, payment: &Payment) -> CommissionResult<UpsertOutcome> {
        let hierarchy = self.resolver.resolve_shop(payment.shop_id).await?;
        let breakdown = CommissionCalculator::compute(
            payment.amount,
            hierarchy.has_agent(),
            hierarchy.has_operator(),
        )?;
        self.ledger
            .upsert(payment.payment_id, payment.shop_id, hierarchy, breakdown)
            .await
    }
}

fn log_report(scope: &str, report: &SweepReport) {
    info!(
        scope,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        errors = report.errors,
        "Commission sweep complete"
    );
}
