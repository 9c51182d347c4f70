//! Background commission worker.
//!
//! Drains the trigger channel and reconciles each payment through the
//! sweep's single-payment path. Each job runs in its own task so a panic is
//! contained to that job; failures are logged and never retried here, the
//! next sweep repairs them.

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::trigger::{CommissionJob, CommissionJobReceiver};
use crate::services::{ReconciliationSweep, UpsertOutcome};

/// Consumes commission jobs until every trigger is dropped.
pub struct CommissionWorker {
    receiver: CommissionJobReceiver,
    sweep: ReconciliationSweep,
}

impl CommissionWorker {
    pub fn new(receiver: CommissionJobReceiver, sweep: ReconciliationSweep) -> Self {
        Self { receiver, sweep }
    }

    /// Run until the channel closes. Returns the number of jobs handled.
    pub async fn run(mut self) -> u64 {
        info!("Commission worker started");
        let mut handled = 0u64;

        while let Some(job) = self.receiver.recv().await {
            self.handle(job).await;
            handled += 1;
        }

        info!(handled, "Commission worker stopped");
        handled
    }

    async fn handle(&self, job: CommissionJob) {
        let sweep = self.sweep.clone();
        let result =
            tokio::spawn(async move { sweep.process_payment(job.payment_id).await }).await;

        match result {
            Ok(Ok(outcome)) => {
                let kind = match outcome {
                    UpsertOutcome::Created(_) => "created",
                    UpsertOutcome::Updated(_) => "updated",
                    UpsertOutcome::Unchanged(_) => "unchanged",
                };
                debug!(
                    payment_id = %job.payment_id,
                    shop_id = %job.shop_id,
                    outcome = kind,
                    "Commission job done"
                );
            }
            Ok(Err(e)) => {
                warn!(
                    payment_id = %job.payment_id,
                    shop_id = %job.shop_id,
                    error = %e,
                    "Commission job failed (left for next sweep)"
                );
            }
            Err(e) => {
                error!(
                    payment_id = %job.payment_id,
                    error = ?e,
                    "Commission job panicked (left for next sweep)"
                );
            }
        }
    }
}

/// Spawn the worker on the current runtime.
pub fn spawn_commission_worker(
    receiver: CommissionJobReceiver,
    sweep: ReconciliationSweep,
) -> JoinHandle<u64> {
    tokio::spawn(CommissionWorker::new(receiver, sweep).run())
}
