//! Domain models for payments, shops, referral requests and commissions
//!
//! Payments, shops, users and referral requests are owned by the surrounding
//! directory platform; this crate reads them. `Commission` is the only record
//! the engine writes, apart from the shop's cached operator reference.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CommissionError, CommissionResult};

/// Declares a lowercase string-backed status enum with `as_str`, `Display`
/// and `FromStr`, matching how statuses are stored as TEXT.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CommissionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(CommissionError::Storage(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(
    /// Payment lifecycle as reported by the payment gateway flow
    PaymentStatus {
        Pending => "pending",
        Success => "success",
        Failed => "failed",
    }
);

text_enum!(
    /// Approval state of an operator/agent referral request
    ReferralStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
);

text_enum!(
    /// Commission settlement state
    CommissionStatus {
        Pending => "pending",
        Paid => "paid",
    }
);

text_enum!(
    UserRole {
        Agent => "agent",
        Operator => "operator",
        Admin => "admin",
    }
);

/// A payment made by a shop owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub shop_id: Uuid,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Success
    }
}

/// A listed shop and its place in the agent/operator hierarchy.
///
/// `operator_id` is a non-authoritative cache of the operator resolved through
/// the shop's agent; approved referral requests remain the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    pub shop_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub agent_id: Option<Uuid>,
    pub operator_id: Option<Uuid>,
}

/// Platform user referenced as agent or operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub name: String,
    pub role: UserRole,
}

/// Request establishing that an operator supervises an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralRequest {
    pub request_id: Uuid,
    pub operator_id: Uuid,
    pub agent_id: Uuid,
    pub status: ReferralStatus,
    pub created_at: DateTime<Utc>,
}

/// Three-way split of a payment amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub agent_amount: Decimal,
    pub operator_amount: Decimal,
    pub company_amount: Decimal,
    pub total_amount: Decimal,
}

impl CommissionBreakdown {
    /// True when the three shares add up to the total exactly.
    pub fn is_conserved(&self) -> bool {
        self.agent_amount + self.operator_amount + self.company_amount == self.total_amount
    }
}

/// Agent and operator that apply to a shop at resolution time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedHierarchy {
    pub agent_id: Option<Uuid>,
    pub operator_id: Option<Uuid>,
}

impl ResolvedHierarchy {
    pub fn has_agent(&self) -> bool {
        self.agent_id.is_some()
    }

    pub fn has_operator(&self) -> bool {
        self.operator_id.is_some()
    }
}

/// Ledger entry: exactly one per successful payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub commission_id: Uuid,
    pub payment_id: Uuid,
    pub shop_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub operator_id: Option<Uuid>,
    pub agent_amount: Decimal,
    pub operator_amount: Decimal,
    pub company_amount: Decimal,
    pub total_amount: Decimal,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Commission {
    pub fn breakdown(&self) -> CommissionBreakdown {
        CommissionBreakdown {
            agent_amount: self.agent_amount,
            operator_amount: self.operator_amount,
            company_amount: self.company_amount,
            total_amount: self.total_amount,
        }
    }

    /// Both hierarchy levels are present with a non-zero share.
    pub fn is_fully_resolved(&self) -> bool {
        self.agent_id.is_some()
            && self.operator_id.is_some()
            && !self.agent_amount.is_zero()
            && !self.operator_amount.is_zero()
    }

    /// Check the per-record ledger invariants.
    pub fn check_invariants(&self) -> CommissionResult<()> {
        let negative = self.agent_amount < Decimal::ZERO
            || self.operator_amount < Decimal::ZERO
            || self.company_amount < Decimal::ZERO;
        if negative || !self.breakdown().is_conserved() {
            return Err(CommissionError::ConservationViolated {
                payment_id: self.payment_id,
                total: self.total_amount,
                agent: self.agent_amount,
                operator: self.operator_amount,
            });
        }
        if (!self.agent_amount.is_zero() && self.agent_id.is_none())
            || (!self.operator_amount.is_zero() && self.operator_id.is_none())
        {
            return Err(CommissionError::Storage(format!(
                "commission {} carries a share without a matching party",
                self.commission_id
            )));
        }
        Ok(())
    }
}

/// Fields for inserting a new commission
#[derive(Debug, Clone)]
pub struct NewCommission {
    pub payment_id: Uuid,
    pub shop_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub operator_id: Option<Uuid>,
    pub breakdown: CommissionBreakdown,
}

/// Backfilled fields written over an existing commission.
///
/// Applied with compare-and-set semantics: the store only writes the patch
/// when the row still matches the version the ledger read.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionPatch {
    pub agent_id: Option<Uuid>,
    pub operator_id: Option<Uuid>,
    pub agent_amount: Decimal,
    pub operator_amount: Decimal,
    pub company_amount: Decimal,
}

/// Denormalized row backing the CSV export
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionReportRow {
    pub payment_id: Uuid,
    pub payment_date: DateTime<Utc>,
    pub shop_name: String,
    pub category: Option<String>,
    pub payment_amount: Decimal,
    pub agent_name: Option<String>,
    pub agent_amount: Decimal,
    pub operator_name: Option<String>,
    pub operator_amount: Decimal,
    pub company_amount: Decimal,
    pub status: CommissionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commission(agent: Decimal, operator: Decimal, company: Decimal) -> Commission {
        Commission {
            commission_id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            shop_id: Uuid::new_v4(),
            agent_id: Some(Uuid::new_v4()),
            operator_id: None,
            agent_amount: agent,
            operator_amount: operator,
            company_amount: company,
            total_amount: Decimal::from(100),
            status: CommissionStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_round_trip_text() {
        assert_eq!("success".parse::<PaymentStatus>().unwrap(), PaymentStatus::Success);
        assert_eq!(CommissionStatus::Paid.to_string(), "paid");
        assert_eq!(
            "approved".parse::<ReferralStatus>().unwrap(),
            ReferralStatus::Approved
        );
        assert!("SUCCESS".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn test_invariants_hold_for_partial_commission() {
        let c = commission(Decimal::from(20), Decimal::ZERO, Decimal::from(80));
        assert!(c.check_invariants().is_ok());
        assert!(!c.is_fully_resolved());
    }

    #[test]
    fn test_invariants_reject_operator_share_without_operator() {
        let c = commission(Decimal::from(20), Decimal::from(8), Decimal::from(72));
        assert!(c.check_invariants().is_err());
    }

    #[test]
    fn test_invariants_reject_leaky_split() {
        let c = commission(Decimal::from(20), Decimal::ZERO, Decimal::new(7999, 2));
        assert!(matches!(
            c.check_invariants(),
            Err(CommissionError::ConservationViolated { .. })
        ));
    }
}
