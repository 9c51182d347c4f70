//! Commission Engine
//!
//! Computes and records the three-way revenue split (agent, operator,
//! company) of every successful shop payment, exactly once per payment, and
//! keeps the ledger reconciled as late or corrected hierarchy data arrives.
//!
//! # Architecture
//!
//! - [`calculator`] - pure split computation
//! - [`services::HierarchyResolver`] - shop → agent/operator, with a
//!   write-back operator cache on the shop
//! - [`services::CommissionLedger`] - idempotent insert-or-backfill
//! - [`services::ReconciliationSweep`] - restartable batch repair
//! - [`services::CommissionAggregator`] - totals and CSV export
//! - [`worker`] - fire-and-forget payment-success handoff
//! - [`store`] - persistence trait and in-memory backend
//! - `database` - Postgres backend (feature `database`)

pub mod calculator;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod worker;

#[cfg(feature = "database")]
pub mod database;

// Re-export main types
pub use calculator::CommissionCalculator;
pub use config::{EngineConfig, ExportConfig, SweepConfig, WorkerConfig};
pub use engine::CommissionEngine;
pub use error::{CommissionError, CommissionResult};
pub use models::*;
pub use services::*;
pub use store::{CommissionStore, InMemoryCommissionStore};

#[cfg(feature = "database")]
pub use database::{DatabaseConfig, DatabaseManager, PgCommissionStore};
