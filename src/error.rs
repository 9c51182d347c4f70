//! Error handling for the commission engine
//!
//! A single `thiserror` enum covers calculation, hierarchy resolution,
//! ledger and storage failures. Callers that only need to log or count
//! failures (the sweep and the background worker) rely on `Display`.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::PaymentStatus;

/// Main error type for commission processing
#[derive(Error, Debug)]
pub enum CommissionError {
    #[error("Invalid payment amount: {amount}")]
    InvalidAmount { amount: String },

    #[error("Shop {shop_id} not found")]
    ShopNotFound { shop_id: Uuid },

    #[error("Payment {payment_id} not found")]
    PaymentNotFound { payment_id: Uuid },

    #[error("Payment {payment_id} is {status}, commissions are only created for successful payments")]
    PaymentNotSettled {
        payment_id: Uuid,
        status: PaymentStatus,
    },

    #[error("Commission for payment {payment_id} not found")]
    CommissionNotFound { payment_id: Uuid },

    #[error("Commission already exists for payment {payment_id}")]
    DuplicateCommission { payment_id: Uuid },

    #[error("Commission for payment {payment_id} kept changing, gave up after {attempts} attempts")]
    ConcurrentModification { payment_id: Uuid, attempts: u32 },

    #[error(
        "Commission for payment {payment_id} would not conserve its total {total}: agent {agent} + operator {operator} exceeds it"
    )]
    ConservationViolated {
        payment_id: Uuid,
        total: Decimal,
        agent: Decimal,
        operator: Decimal,
    },

    #[error("Invalid export date format: {format}")]
    InvalidDateFormat { format: String },

    #[error("Export error: {0}")]
    Export(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CommissionError {
    /// Build an `InvalidAmount` error from anything displayable.
    pub fn invalid_amount(amount: impl std::fmt::Display) -> Self {
        CommissionError::InvalidAmount {
            amount: amount.to_string(),
        }
    }

    /// True for the insert collision the ledger recovers from locally.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, CommissionError::DuplicateCommission { .. })
    }
}

/// Result type alias for commission operations
pub type CommissionResult<T> = Result<T, CommissionError>;
