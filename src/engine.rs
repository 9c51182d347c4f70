//! Commission engine facade
//!
//! Wires the store, resolver, ledger, sweep, aggregator and background worker
//! together and exposes the entry points the surrounding platform calls:
//!
//! - payment verified → [`CommissionEngine::on_payment_succeeded`]
//! - user logged in → [`CommissionEngine::on_user_login`]
//! - admin → [`CommissionEngine::run_sweep`], [`CommissionEngine::totals`],
//!   [`CommissionEngine::export_csv`]
//!
//! All three funnel into the same [`ReconciliationSweep`].
//!
//! # Usage Example
//!
//! ```ignore
//! use commission_engine::{CommissionEngine, EngineConfig, InMemoryCommissionStore};
//! use std::sync::Arc;
//!
//! async fn example(payment_id: uuid::Uuid, shop_id: uuid::Uuid) {
//!     let store = Arc::new(InMemoryCommissionStore::new());
//!     let engine = CommissionEngine::start(store, EngineConfig::default());
//!
//!     // Payment handler: returns immediately
//!     engine.on_payment_succeeded(payment_id, shop_id);
//!
//!     // Admin: repair everything
//!     let report = engine.run_sweep().await.unwrap();
//!     println!("created {} updated {}", report.created, report.updated);
//! }
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::CommissionResult;
use crate::models::Commission;
use crate::services::*;
use crate::store::CommissionStore;
use crate::worker::{spawn_commission_worker, CommissionTrigger};

/// Entry point bundling every commission component.
pub struct CommissionEngine {
    resolver: HierarchyResolver,
    ledger: CommissionLedger,
    sweep: ReconciliationSweep,
    aggregator: CommissionAggregator,
    trigger: CommissionTrigger,
    worker: JoinHandle<u64>,
}

impl CommissionEngine {
    /// Build the components and spawn the background worker.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(store: Arc<dyn CommissionStore>, config: EngineConfig) -> Self {
        let resolver = HierarchyResolver::new(store.clone());
        let ledger = CommissionLedger::new(store.clone());
        let sweep = ReconciliationSweep::new(
            store.clone(),
            resolver.clone(),
            ledger.clone(),
            config.sweep.clone(),
        );
        let aggregator = CommissionAggregator::new(store, config.export.clone());

        let (trigger, receiver) = CommissionTrigger::with_buffer_size(config.worker.buffer_size);
        let worker = spawn_commission_worker(receiver, sweep.clone());

        Self {
            resolver,
            ledger,
            sweep,
            aggregator,
            trigger,
            worker,
        }
    }

    /// Payment-verification hook. Never blocks and never fails.
    pub fn on_payment_succeeded(&self, payment_id: Uuid, shop_id: Uuid) {
        self.trigger.notify(payment_id, shop_id);
    }

    /// Login hook: best-effort sync of the user's commissions in the background.
    pub fn on_user_login(&self, user_id: Uuid) -> JoinHandle<()> {
        let sweep = self.sweep.clone();
        tokio::spawn(async move {
            match sweep.run_for_user(user_id).await {
                Ok(report) => debug!(
                    user_id = %user_id,
                    created = report.created,
                    updated = report.updated,
                    errors = report.errors,
                    "Login commission sync finished"
                ),
                Err(e) => warn!(user_id = %user_id, error = %e, "Login commission sync failed"),
            }
        })
    }

    pub async fn run_sweep(&self) -> CommissionResult<SweepReport> {
        self.sweep.run().await
    }

    pub async fn sync_user(&self, user_id: Uuid) -> CommissionResult<SweepReport> {
        self.sweep.run_for_user(user_id).await
    }

    pub async fn totals(&self) -> CommissionResult<CommissionTotals> {
        self.aggregator.totals().await
    }

    pub async fn user_earnings(&self, user_id: Uuid) -> CommissionResult<UserEarnings> {
        self.aggregator.totals_for_user(user_id).await
    }

    pub async fn export_csv(&self) -> CommissionResult<String> {
        self.aggregator.export_csv().await
    }

    pub async fn mark_paid(&self, payment_id: Uuid) -> CommissionResult<Commission> {
        self.ledger.mark_paid(payment_id).await
    }

    /// Drop a shop's cached operator.
    pub async fn invalidate_shop(&self, shop_id: Uuid) -> CommissionResult<()> {
        self.resolver.invalidate(shop_id).await
    }

    /// (sent, dropped) counts of the payment-success trigger.
    pub fn trigger_stats(&self) -> (u64, u64) {
        self.trigger.stats()
    }

    pub fn sweep(&self) -> &ReconciliationSweep {
        &self.sweep
    }

    /// Close the trigger and wait for queued jobs to drain.
    /// Returns the number of jobs the worker handled.
    pub async fn shutdown(self) -> u64 {
        let Self { trigger, worker, .. } = self;
        drop(trigger);
        match worker.await {
            Ok(handled) => handled,
            Err(e) => {
                warn!(error = ?e, "Commission worker ended abnormally");
                0
            }
        }
    }
}
