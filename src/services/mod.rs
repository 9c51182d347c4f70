//! Commission services
//!
//! Resolution, ledger writes, reconciliation and reporting, each working
//! against a shared [`CommissionStore`](crate::store::CommissionStore).

pub mod aggregator;
pub mod hierarchy;
pub mod ledger;
pub mod sweep;

pub use aggregator::{CommissionAggregator, CommissionTotals, UserEarnings, CSV_HEADER};
pub use hierarchy::HierarchyResolver;
pub use ledger::{CommissionLedger, UpsertOutcome};
pub use sweep::{ReconciliationSweep, SweepFailure, SweepReport};
