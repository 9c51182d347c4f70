//! Payment-success trigger
//!
//! Fire-and-forget handoff from payment verification to the commission
//! worker. `notify` never blocks and never fails: when the channel is full
//! or the worker is gone the job is dropped and counted, and the next sweep
//! creates the missing commission.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Work item for the commission worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionJob {
    pub payment_id: Uuid,
    pub shop_id: Uuid,
}

/// Receiver end of the trigger channel, owned by the worker.
pub type CommissionJobReceiver = mpsc::Receiver<CommissionJob>;

/// Sender side of the payment-success handoff.
pub struct CommissionTrigger {
    sender: mpsc::Sender<CommissionJob>,
    stats: TriggerStats,
}

/// Statistics for monitoring trigger health.
#[derive(Debug, Default)]
struct TriggerStats {
    /// Jobs handed to the worker
    sent: AtomicU64,
    /// Jobs dropped on a full or closed channel
    dropped: AtomicU64,
}

impl CommissionTrigger {
    /// Create a trigger and the receiver the worker drains.
    pub fn with_buffer_size(size: usize) -> (Self, CommissionJobReceiver) {
        let (sender, receiver) = mpsc::channel(size.max(1));
        let trigger = Self {
            sender,
            stats: TriggerStats::default(),
        };
        (trigger, receiver)
    }

    /// Queue commission creation for a payment that just succeeded.
    #[inline]
    pub fn notify(&self, payment_id: Uuid, shop_id: Uuid) {
        let job = CommissionJob {
            payment_id,
            shop_id,
        };
        match self.sender.try_send(job) {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(payment_id = %payment_id, "Commission job dropped, left for next sweep");
            }
        }
    }

    /// (sent, dropped)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.stats.sent.load(Ordering::Relaxed),
            self.stats.dropped.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_and_receive() {
        let (trigger, mut receiver) = CommissionTrigger::with_buffer_size(4);
        let (payment_id, shop_id) = (Uuid::new_v4(), Uuid::new_v4());

        trigger.notify(payment_id, shop_id);

        let job = receiver.recv().await.unwrap();
        assert_eq!(job.payment_id, payment_id);
        assert_eq!(job.shop_id, shop_id);
        assert_eq!(trigger.stats(), (1, 0));
    }

    #[tokio::test]
    async fn test_notify_never_blocks() {
        let (trigger, _receiver) = CommissionTrigger::with_buffer_size(2);

        for _ in 0..10 {
            trigger.notify(Uuid::new_v4(), Uuid::new_v4());
        }

        let (sent, dropped) = trigger.stats();
        assert_eq!(sent, 2);
        assert_eq!(dropped, 8);
    }

    #[tokio::test]
    async fn test_notify_after_worker_gone() {
        let (trigger, receiver) = CommissionTrigger::with_buffer_size(2);
        drop(receiver);

        trigger.notify(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(trigger.stats(), (0, 1));
    }
}
