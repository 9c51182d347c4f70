//! Commission split calculation
//!
//! Pure, deterministic split of a payment into agent, operator and company
//! shares:
//!
//! 1. agent = 20% of the total (when the shop has an agent)
//! 2. operator = 10% of what remains after the agent share (when resolved)
//! 3. company = whatever is left
//!
//! The company share is only ever derived by subtraction, so rounding in the
//! first two steps can never create or lose value.
//!
//! # Example
//!
//! ```
//! use commission_engine::calculator::CommissionCalculator;
//! use rust_decimal::Decimal;
//!
//! let split = CommissionCalculator::compute(Decimal::from(100), true, true).unwrap();
//! assert_eq!(split.agent_amount, Decimal::from(20));
//! assert_eq!(split.operator_amount, Decimal::from(8));
//! assert_eq!(split.company_amount, Decimal::from(72));
//! ```

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{CommissionError, CommissionResult};
use crate::models::CommissionBreakdown;

/// Agent share of the gross payment, in percent.
pub const AGENT_RATE_PERCENT: u32 = 20;

/// Operator share of the post-agent remainder, in percent.
pub const OPERATOR_RATE_PERCENT: u32 = 10;

/// Currency minor unit precision.
pub const AMOUNT_SCALE: u32 = 2;

/// Largest payment the ledger stores (`NUMERIC(12, 2)`).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Stateless commission calculator
pub struct CommissionCalculator;

impl CommissionCalculator {
    /// Split `total_amount` according to which hierarchy levels are present.
    pub fn compute(
        total_amount: Decimal,
        has_agent: bool,
        has_operator: bool,
    ) -> CommissionResult<CommissionBreakdown> {
        if total_amount <= Decimal::ZERO || total_amount > MAX_AMOUNT {
            return Err(CommissionError::invalid_amount(total_amount));
        }

        let agent_amount = if has_agent {
            Self::agent_share(total_amount)?
        } else {
            Decimal::ZERO
        };
        let remaining = total_amount - agent_amount;
        let operator_amount = if has_operator {
            Self::operator_share(remaining)?
        } else {
            Decimal::ZERO
        };

        Ok(CommissionBreakdown {
            agent_amount,
            operator_amount,
            company_amount: remaining - operator_amount,
            total_amount,
        })
    }

    /// Same as [`compute`](Self::compute) for amounts that arrive as floats.
    pub fn compute_f64(
        total_amount: f64,
        has_agent: bool,
        has_operator: bool,
    ) -> CommissionResult<CommissionBreakdown> {
        Self::compute(amount_from_f64(total_amount)?, has_agent, has_operator)
    }

    /// Agent share of a gross amount.
    pub fn agent_share(total_amount: Decimal) -> CommissionResult<Decimal> {
        percent(total_amount, AGENT_RATE_PERCENT).map(round2)
    }

    /// Operator share of the amount left after the agent share.
    pub fn operator_share(remaining: Decimal) -> CommissionResult<Decimal> {
        percent(remaining, OPERATOR_RATE_PERCENT).map(round2)
    }
}

/// Convert a float amount to a minor-unit decimal, rejecting NaN and infinities.
pub fn amount_from_f64(amount: f64) -> CommissionResult<Decimal> {
    if !amount.is_finite() {
        return Err(CommissionError::invalid_amount(amount));
    }
    Decimal::from_f64(amount)
        .map(round2)
        .ok_or_else(|| CommissionError::invalid_amount(amount))
}

/// Round half away from zero to the currency minor unit.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn percent(amount: Decimal, rate: u32) -> CommissionResult<Decimal> {
    amount
        .checked_mul(Decimal::new(i64::from(rate), 2))
        .ok_or_else(|| CommissionError::invalid_amount(amount))
}
