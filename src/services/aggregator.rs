//! Commission Aggregator - read-only totals and CSV export over the ledger

use std::fmt::Write as _;
use std::io;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::ExportConfig;
use crate::error::{CommissionError, CommissionResult};
use crate::models::{CommissionReportRow, CommissionStatus};
use crate::store::CommissionStore;

/// Exact export header, in column order.
pub const CSV_HEADER: [&str; 10] = [
    "Date",
    "Shop",
    "Category",
    "Payment Amount",
    "Agent",
    "Agent Commission",
    "Operator",
    "Operator Commission",
    "Company Revenue",
    "Status",
];

const NOT_AVAILABLE: &str = "N/A";

/// Ledger-wide sums
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommissionTotals {
    pub agent_total: Decimal,
    pub operator_total: Decimal,
    pub company_total: Decimal,
    pub grand_total: Decimal,
    pub pending_count: usize,
    pub paid_count: usize,
    pub commission_count: usize,
}

/// What one user has earned across the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserEarnings {
    pub user_id: Uuid,
    pub as_agent: Decimal,
    pub as_operator: Decimal,
    pub pending: Decimal,
    pub paid: Decimal,
    pub commission_count: usize,
}

/// Read-only reporting over the commission ledger
#[derive(Clone)]
pub struct CommissionAggregator {
    store: Arc<dyn CommissionStore>,
    config: ExportConfig,
}

impl CommissionAggregator {
    pub fn new(store: Arc<dyn CommissionStore>, config: ExportConfig) -> Self {
        Self { store, config }
    }

    pub async fn totals(&self) -> CommissionResult<CommissionTotals> {
        let commissions = self.store.list_commissions().await?;
        let mut totals = CommissionTotals::default();

        for c in &commissions {
            totals.agent_total += c.agent_amount;
            totals.operator_total += c.operator_amount;
            totals.company_total += c.company_amount;
            totals.grand_total += c.total_amount;
            match c.status {
                CommissionStatus::Pending => totals.pending_count += 1,
                CommissionStatus::Paid => totals.paid_count += 1,
            }
        }
        totals.commission_count = commissions.len();
        Ok(totals)
    }

    /// Earnings of a user as agent and as operator.
    pub async fn totals_for_user(&self, user_id: Uuid) -> CommissionResult<UserEarnings> {
        let commissions = self.store.list_commissions().await?;
        let mut earnings = UserEarnings {
            user_id,
            as_agent: Decimal::ZERO,
            as_operator: Decimal::ZERO,
            pending: Decimal::ZERO,
            paid: Decimal::ZERO,
            commission_count: 0,
        };

        for c in &commissions {
            let mut share = Decimal::ZERO;
            if c.agent_id == Some(user_id) {
                earnings.as_agent += c.agent_amount;
                share += c.agent_amount;
            }
            if c.operator_id == Some(user_id) {
                earnings.as_operator += c.operator_amount;
                share += c.operator_amount;
            }
            if c.agent_id != Some(user_id) && c.operator_id != Some(user_id) {
                continue;
            }
            earnings.commission_count += 1;
            match c.status {
                CommissionStatus::Pending => earnings.pending += share,
                CommissionStatus::Paid => earnings.paid += share,
            }
        }
        Ok(earnings)
    }

    /// Render the whole ledger as CSV.
    pub async fn export_csv(&self) -> CommissionResult<String> {
        let mut buf = Vec::new();
        self.export_to(&mut buf).await?;
        String::from_utf8(buf).map_err(|e| CommissionError::Storage(e.to_string()))
    }

    /// Stream the CSV export into `writer`. Returns the number of data rows.
    pub async fn export_to<W: io::Write>(&self, writer: W) -> CommissionResult<usize> {
        self.config.validate()?;
        let rows = self.store.commission_report().await?;
        let mut csv = csv::Writer::from_writer(writer);

        csv.write_record(CSV_HEADER)?;
        for row in &rows {
            csv.write_record(self.render_row(row)?)?;
        }
        csv.flush()?;

        info!(rows = rows.len(), "Exported commission report");
        Ok(rows.len())
    }

    fn render_row(&self, row: &CommissionReportRow) -> CommissionResult<[String; 10]> {
        let mut date = String::new();
        write!(date, "{}", row.payment_date.format(&self.config.date_format)).map_err(|_| {
            CommissionError::InvalidDateFormat {
                format: self.config.date_format.clone(),
            }
        })?;

        Ok([
            date,
            row.shop_name.clone(),
            row.category.clone().unwrap_or_default(),
            money(row.payment_amount),
            party(&row.agent_name),
            money(row.agent_amount),
            party(&row.operator_name),
            money(row.operator_amount),
            money(row.company_amount),
            row.status.to_string(),
        ])
    }
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

fn party(name: &Option<String>) -> String {
    name.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_always_two_places() {
        assert_eq!(money(Decimal::from(72)), "72.00");
        assert_eq!(money(Decimal::new(805, 1)), "80.50");
    }

    #[test]
    fn test_missing_party_renders_na() {
        assert_eq!(party(&None), "N/A");
        assert_eq!(party(&Some("Ana".into())), "Ana");
    }

    #[test]
    fn test_header_layout() {
        assert_eq!(
            CSV_HEADER.join(","),
            "Date,Shop,Category,Payment Amount,Agent,Agent Commission,Operator,Operator Commission,Company Revenue,Status"
        );
    }
}
