//! One-way handoff from payment verification to commission creation.

pub mod runner;
pub mod trigger;

pub use runner::{spawn_commission_worker, CommissionWorker};
pub use trigger::{CommissionJob, CommissionJobReceiver, CommissionTrigger};
