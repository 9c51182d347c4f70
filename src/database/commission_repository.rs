//! Commission Repository - Postgres implementation of `CommissionStore`
//!
//! The `commissions_one_per_payment` unique constraint is the concurrency
//! guard for inserts; a violation surfaces as `DuplicateCommission`. Updates
//! carry the previously read values in their WHERE clause so a concurrent
//! writer makes the update miss instead of being overwritten.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CommissionError, CommissionResult};
use crate::models::*;
use crate::store::CommissionStore;

/// Postgres-backed commission store
#[derive(Clone, Debug)]
pub struct PgCommissionStore {
    pool: PgPool,
}

impl PgCommissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn shop_exists(&self, shop_id: Uuid) -> CommissionResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM shops WHERE shop_id = $1)")
                .bind(shop_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

// ============================================================================
// Private FromRow types, converted to domain types via TryFrom
// ============================================================================

#[derive(sqlx::FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    shop_id: Uuid,
    amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = CommissionError;

    fn try_from(r: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            payment_id: r.payment_id,
            shop_id: r.shop_id,
            amount: r.amount,
            status: r.status.parse()?,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ShopRow {
    shop_id: Uuid,
    name: String,
    category: Option<String>,
    agent_id: Option<Uuid>,
    operator_id: Option<Uuid>,
}

impl From<ShopRow> for Shop {
    fn from(r: ShopRow) -> Self {
        Self {
            shop_id: r.shop_id,
            name: r.name,
            category: r.category,
            agent_id: r.agent_id,
            operator_id: r.operator_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReferralRow {
    request_id: Uuid,
    operator_id: Uuid,
    agent_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReferralRow> for ReferralRequest {
    type Error = CommissionError;

    fn try_from(r: ReferralRow) -> Result<Self, Self::Error> {
        Ok(Self {
            request_id: r.request_id,
            operator_id: r.operator_id,
            agent_id: r.agent_id,
            status: r.status.parse()?,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommissionRow {
    commission_id: Uuid,
    payment_id: Uuid,
    shop_id: Uuid,
    agent_id: Option<Uuid>,
    operator_id: Option<Uuid>,
    agent_amount: Decimal,
    operator_amount: Decimal,
    company_amount: Decimal,
    total_amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CommissionRow> for Commission {
    type Error = CommissionError;

    fn try_from(r: CommissionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            commission_id: r.commission_id,
            payment_id: r.payment_id,
            shop_id: r.shop_id,
            agent_id: r.agent_id,
            operator_id: r.operator_id,
            agent_amount: r.agent_amount,
            operator_amount: r.operator_amount,
            company_amount: r.company_amount,
            total_amount: r.total_amount,
            status: r.status.parse()?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    payment_id: Uuid,
    payment_date: DateTime<Utc>,
    shop_name: String,
    category: Option<String>,
    payment_amount: Decimal,
    agent_name: Option<String>,
    agent_amount: Decimal,
    operator_name: Option<String>,
    operator_amount: Decimal,
    company_amount: Decimal,
    status: String,
}

impl TryFrom<ReportRow> for CommissionReportRow {
    type Error = CommissionError;

    fn try_from(r: ReportRow) -> Result<Self, Self::Error> {
        Ok(Self {
            payment_id: r.payment_id,
            payment_date: r.payment_date,
            shop_name: r.shop_name,
            category: r.category,
            payment_amount: r.payment_amount,
            agent_name: r.agent_name,
            agent_amount: r.agent_amount,
            operator_name: r.operator_name,
            operator_amount: r.operator_amount,
            company_amount: r.company_amount,
            status: r.status.parse()?,
        })
    }
}

const COMMISSION_COLUMNS: &str = r#"
    commission_id, payment_id, shop_id, agent_id, operator_id,
    agent_amount, operator_amount, company_amount, total_amount,
    status, created_at, updated_at
"#;

fn convert_all<R, T>(rows: Vec<R>) -> CommissionResult<Vec<T>>
where
    T: TryFrom<R, Error = CommissionError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl CommissionStore for PgCommissionStore {
    async fn load_payment(&self, payment_id: Uuid) -> CommissionResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, shop_id, amount, status, created_at
            FROM payments
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Payment::try_from).transpose()
    }

    async fn successful_payments(&self) -> CommissionResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, shop_id, amount, status, created_at
            FROM payments
            WHERE status = 'success'
            ORDER BY created_at, payment_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn successful_payments_for_user(
        &self,
        user_id: Uuid,
    ) -> CommissionResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT p.payment_id, p.shop_id, p.amount, p.status, p.created_at
            FROM payments p
            JOIN shops s ON s.shop_id = p.shop_id
            WHERE p.status = 'success'
              AND (
                s.agent_id = $1
                OR s.operator_id = $1
                OR s.agent_id IN (
                    SELECT agent_id FROM referral_requests
                    WHERE operator_id = $1 AND status = 'approved'
                )
              )
            ORDER BY p.created_at, p.payment_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn load_shop(&self, shop_id: Uuid) -> CommissionResult<Option<Shop>> {
        let row = sqlx::query_as::<_, ShopRow>(
            r#"
            SELECT shop_id, name, category, agent_id, operator_id
            FROM shops
            WHERE shop_id = $1
            "#,
        )
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Shop::from))
    }

    async fn cache_shop_operator(
        &self,
        shop_id: Uuid,
        operator_id: Uuid,
    ) -> CommissionResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shops
            SET operator_id = $2
            WHERE shop_id = $1 AND operator_id IS NULL
            "#,
        )
        .bind(shop_id)
        .bind(operator_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.shop_exists(shop_id).await? {
            return Err(CommissionError::ShopNotFound { shop_id });
        }
        Ok(false)
    }

    async fn clear_shop_operator(&self, shop_id: Uuid) -> CommissionResult<()> {
        let result = sqlx::query("UPDATE shops SET operator_id = NULL WHERE shop_id = $1")
            .bind(shop_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CommissionError::ShopNotFound { shop_id });
        }
        Ok(())
    }

    async fn first_approved_referral(
        &self,
        agent_id: Uuid,
    ) -> CommissionResult<Option<ReferralRequest>> {
        let row = sqlx::query_as::<_, ReferralRow>(
            r#"
            SELECT request_id, operator_id, agent_id, status, created_at
            FROM referral_requests
            WHERE agent_id = $1 AND status = 'approved'
            ORDER BY created_at ASC, created_seq ASC
            LIMIT 1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReferralRequest::try_from).transpose()
    }

    async fn find_commission(&self, payment_id: Uuid) -> CommissionResult<Option<Commission>> {
        let sql = format!(
            "SELECT {} FROM commissions WHERE payment_id = $1",
            COMMISSION_COLUMNS
        );
        let row = sqlx::query_as::<_, CommissionRow>(&sql)
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Commission::try_from).transpose()
    }

    async fn insert_commission(&self, new: &NewCommission) -> CommissionResult<Commission> {
        let sql = format!(
            r#"
            INSERT INTO commissions
                (commission_id, payment_id, shop_id, agent_id, operator_id,
                 agent_amount, operator_amount, company_amount, total_amount, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending')
            RETURNING {}
            "#,
            COMMISSION_COLUMNS
        );

        let result = sqlx::query_as::<_, CommissionRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.payment_id)
            .bind(new.shop_id)
            .bind(new.agent_id)
            .bind(new.operator_id)
            .bind(new.breakdown.agent_amount)
            .bind(new.breakdown.operator_amount)
            .bind(new.breakdown.company_amount)
            .bind(new.breakdown.total_amount)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => Commission::try_from(row),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!(payment_id = %new.payment_id, "Commission insert hit unique constraint");
                Err(CommissionError::DuplicateCommission {
                    payment_id: new.payment_id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_commission(
        &self,
        expected: &Commission,
        patch: &CommissionPatch,
    ) -> CommissionResult<Option<Commission>> {
        let sql = format!(
            r#"
            UPDATE commissions
            SET agent_id = $2,
                operator_id = $3,
                agent_amount = $4,
                operator_amount = $5,
                company_amount = $6,
                updated_at = NOW()
            WHERE payment_id = $1
              AND agent_id IS NOT DISTINCT FROM $7
              AND operator_id IS NOT DISTINCT FROM $8
              AND agent_amount = $9
              AND operator_amount = $10
              AND company_amount = $11
              AND status = $12
            RETURNING {}
            "#,
            COMMISSION_COLUMNS
        );

        let row = sqlx::query_as::<_, CommissionRow>(&sql)
            .bind(expected.payment_id)
            .bind(patch.agent_id)
            .bind(patch.operator_id)
            .bind(patch.agent_amount)
            .bind(patch.operator_amount)
            .bind(patch.company_amount)
            .bind(expected.agent_id)
            .bind(expected.operator_id)
            .bind(expected.agent_amount)
            .bind(expected.operator_amount)
            .bind(expected.company_amount)
            .bind(expected.status.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Commission::try_from).transpose()
    }

    async fn set_commission_status(
        &self,
        payment_id: Uuid,
        status: CommissionStatus,
    ) -> CommissionResult<Commission> {
        let sql = format!(
            r#"
            UPDATE commissions
            SET status = $2, updated_at = NOW()
            WHERE payment_id = $1
            RETURNING {}
            "#,
            COMMISSION_COLUMNS
        );

        let row = sqlx::query_as::<_, CommissionRow>(&sql)
            .bind(payment_id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CommissionError::CommissionNotFound { payment_id })?;

        Commission::try_from(row)
    }

    async fn list_commissions(&self) -> CommissionResult<Vec<Commission>> {
        let sql = format!(
            "SELECT {} FROM commissions ORDER BY created_at, payment_id",
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query_as::<_, CommissionRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        convert_all(rows)
    }

    async fn commission_report(&self) -> CommissionResult<Vec<CommissionReportRow>> {
        let rows = sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT c.payment_id,
                   p.created_at AS payment_date,
                   s.name AS shop_name,
                   s.category,
                   p.amount AS payment_amount,
                   a.name AS agent_name,
                   c.agent_amount,
                   o.name AS operator_name,
                   c.operator_amount,
                   c.company_amount,
                   c.status
            FROM commissions c
            JOIN payments p ON p.payment_id = c.payment_id
            JOIN shops s ON s.shop_id = c.shop_id
            LEFT JOIN users a ON a.user_id = c.agent_id
            LEFT JOIN users o ON o.user_id = c.operator_id
            ORDER BY p.created_at, c.payment_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }
}
