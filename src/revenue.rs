use std::collections::HashMap;

use anyhow::Result;
use axum::extract::{Extension, Query};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};

use crate::error::AppResult;

/// District key used when a listing carries no district at all.
pub const UNKNOWN_DISTRICT: &str = "UNKNOWN";

/// Ledger rows are keyed by uppercased district names.
pub fn normalize_district(district: Option<&str>) -> String {
    district
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_uppercase)
        .unwrap_or_else(|| UNKNOWN_DISTRICT.to_string())
}

/// key: revenue-ledger -> one logical row per (day, district)
#[derive(Debug, Clone, Serialize)]
pub struct RevenueLedgerRow {
    pub ledger_date: NaiveDate,
    pub district: String,
    pub per_plan_revenue: HashMap<String, i64>,
    pub per_plan_count: HashMap<String, i64>,
    pub total_revenue: i64,
    pub total_agent_commission: i64,
    pub net_revenue: i64,
}

#[derive(Debug, FromRow)]
struct TotalsRow {
    ledger_date: NaiveDate,
    district: String,
    total_revenue: i64,
    total_agent_commission: i64,
    net_revenue: i64,
}

#[derive(Clone)]
pub struct RevenueLedgerStore {
    pool: PgPool,
}

impl RevenueLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies one paid sale to the ledger. The row is created lazily on first
    /// write; all mutations are increments so concurrent sales from different
    /// listings converge regardless of ordering. Revenue and commission land in
    /// one statement, which keeps `net = total - commission` true at every
    /// point a reader can observe.
    pub async fn record_sale(
        &self,
        date: NaiveDate,
        district: &str,
        plan_code: &str,
        amount: i64,
        commission: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO revenue_ledger (
                ledger_date, district, total_revenue, total_agent_commission, net_revenue
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (ledger_date, district)
            DO UPDATE SET
                total_revenue = revenue_ledger.total_revenue + EXCLUDED.total_revenue,
                total_agent_commission = revenue_ledger.total_agent_commission + EXCLUDED.total_agent_commission,
                net_revenue = revenue_ledger.net_revenue + EXCLUDED.net_revenue,
                updated_at = NOW()
            "#,
        )
        .bind(date)
        .bind(district)
        .bind(amount)
        .bind(commission)
        .bind(amount - commission)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO revenue_ledger_plans (
                ledger_date, district, plan_code, revenue, sales_count
            ) VALUES ($1, $2, $3, $4, 1)
            ON CONFLICT (ledger_date, district, plan_code)
            DO UPDATE SET
                revenue = revenue_ledger_plans.revenue + EXCLUDED.revenue,
                sales_count = revenue_ledger_plans.sales_count + 1,
                updated_at = NOW()
            "#,
        )
        .bind(date)
        .bind(district)
        .bind(plan_code)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reverses one recorded sale by decrementing the exact amounts recorded.
    /// An absent row means there is nothing to reverse; that is a silent skip
    /// and the return value reports it to the caller.
    pub async fn reverse_sale(
        &self,
        date: NaiveDate,
        district: &str,
        plan_code: &str,
        amount: i64,
        commission: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE revenue_ledger
            SET total_revenue = total_revenue - $3,
                total_agent_commission = total_agent_commission - $4,
                net_revenue = net_revenue - $5,
                updated_at = NOW()
            WHERE ledger_date = $1 AND district = $2
            "#,
        )
        .bind(date)
        .bind(district)
        .bind(amount)
        .bind(commission)
        .bind(amount - commission)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE revenue_ledger_plans
            SET revenue = revenue - $4,
                sales_count = sales_count - 1,
                updated_at = NOW()
            WHERE ledger_date = $1 AND district = $2 AND plan_code = $3
            "#,
        )
        .bind(date)
        .bind(district)
        .bind(plan_code)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    pub async fn fetch(
        &self,
        date: NaiveDate,
        district: &str,
    ) -> Result<Option<RevenueLedgerRow>> {
        let totals = sqlx::query_as::<_, TotalsRow>(
            "SELECT ledger_date, district, total_revenue, total_agent_commission, net_revenue
             FROM revenue_ledger WHERE ledger_date = $1 AND district = $2",
        )
        .bind(date)
        .bind(district)
        .fetch_optional(&self.pool)
        .await?;

        let Some(totals) = totals else {
            return Ok(None);
        };

        Ok(Some(self.assemble(totals).await?))
    }

    /// Date-range report for the revenue UI; district filter optional.
    pub async fn report(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        district: Option<&str>,
    ) -> Result<Vec<RevenueLedgerRow>> {
        let totals = match district {
            Some(district) => {
                sqlx::query_as::<_, TotalsRow>(
                    "SELECT ledger_date, district, total_revenue, total_agent_commission, net_revenue
                     FROM revenue_ledger
                     WHERE ledger_date BETWEEN $1 AND $2 AND district = $3
                     ORDER BY ledger_date ASC, district ASC",
                )
                .bind(from)
                .bind(to)
                .bind(district)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, TotalsRow>(
                    "SELECT ledger_date, district, total_revenue, total_agent_commission, net_revenue
                     FROM revenue_ledger
                     WHERE ledger_date BETWEEN $1 AND $2
                     ORDER BY ledger_date ASC, district ASC",
                )
                .bind(from)
                .bind(to)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut rows = Vec::with_capacity(totals.len());
        for total in totals {
            rows.push(self.assemble(total).await?);
        }
        Ok(rows)
    }

    async fn assemble(&self, totals: TotalsRow) -> Result<RevenueLedgerRow> {
        let plan_rows = sqlx::query(
            "SELECT plan_code, revenue, sales_count FROM revenue_ledger_plans
             WHERE ledger_date = $1 AND district = $2",
        )
        .bind(totals.ledger_date)
        .bind(&totals.district)
        .fetch_all(&self.pool)
        .await?;

        let mut per_plan_revenue = HashMap::new();
        let mut per_plan_count = HashMap::new();
        for row in plan_rows {
            let code: String = row.get("plan_code");
            per_plan_revenue.insert(code.clone(), row.get::<i64, _>("revenue"));
            per_plan_count.insert(code, row.get::<i64, _>("sales_count"));
        }

        Ok(RevenueLedgerRow {
            ledger_date: totals.ledger_date,
            district: totals.district,
            per_plan_revenue,
            per_plan_count,
            total_revenue: totals.total_revenue,
            total_agent_commission: totals.total_agent_commission,
            net_revenue: totals.net_revenue,
        })
    }

    /// Recomputes what the ledger row should contain from the canonical PAID
    /// listings of that day and district. Every listing has a public copy, so
    /// the public store is the one summed. The SQL district key must match
    /// [`normalize_district`], trimming and mapping empty to UNKNOWN, or the
    /// audit sees phantom drift.
    pub async fn recompute(
        &self,
        date: NaiveDate,
        district: &str,
    ) -> Result<RevenueLedgerRow> {
        let rows = sqlx::query(
            r#"
            SELECT plan_type, COUNT(*) AS sales_count,
                   COALESCE(SUM(plan_amount), 0)::BIGINT AS revenue,
                   COALESCE(SUM(agent_commission), 0)::BIGINT AS commission
            FROM public_shops
            WHERE payment_status = 'PAID'
              AND last_payment_date::date = $1
              AND UPPER(COALESCE(NULLIF(TRIM(district), ''), 'UNKNOWN')) = $2
            GROUP BY plan_type
            "#,
        )
        .bind(date)
        .bind(district)
        .fetch_all(&self.pool)
        .await?;

        let mut per_plan_revenue = HashMap::new();
        let mut per_plan_count = HashMap::new();
        let mut total_revenue = 0;
        let mut total_agent_commission = 0;
        for row in rows {
            let code: String = row.get("plan_type");
            let revenue: i64 = row.get("revenue");
            let count: i64 = row.get("sales_count");
            let commission: i64 = row.get("commission");
            per_plan_revenue.insert(code.clone(), revenue);
            per_plan_count.insert(code, count);
            total_revenue += revenue;
            total_agent_commission += commission;
        }

        Ok(RevenueLedgerRow {
            ledger_date: date,
            district: district.to_string(),
            per_plan_revenue,
            per_plan_count,
            total_revenue,
            total_agent_commission,
            net_revenue: total_revenue - total_agent_commission,
        })
    }

    /// Rewrites a ledger row to the recomputed truth. Only the audit repair
    /// path uses absolute writes; everything else increments.
    pub async fn overwrite(&self, row: &RevenueLedgerRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO revenue_ledger (
                ledger_date, district, total_revenue, total_agent_commission, net_revenue
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (ledger_date, district)
            DO UPDATE SET
                total_revenue = EXCLUDED.total_revenue,
                total_agent_commission = EXCLUDED.total_agent_commission,
                net_revenue = EXCLUDED.net_revenue,
                updated_at = NOW()
            "#,
        )
        .bind(row.ledger_date)
        .bind(&row.district)
        .bind(row.total_revenue)
        .bind(row.total_agent_commission)
        .bind(row.net_revenue)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "DELETE FROM revenue_ledger_plans WHERE ledger_date = $1 AND district = $2",
        )
        .bind(row.ledger_date)
        .bind(&row.district)
        .execute(&self.pool)
        .await?;

        for (plan_code, revenue) in &row.per_plan_revenue {
            let count = row.per_plan_count.get(plan_code).copied().unwrap_or(0);
            sqlx::query(
                r#"
                INSERT INTO revenue_ledger_plans (
                    ledger_date, district, plan_code, revenue, sales_count
                ) VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (ledger_date, district, plan_code)
                DO UPDATE SET
                    revenue = EXCLUDED.revenue,
                    sales_count = EXCLUDED.sales_count,
                    updated_at = NOW()
                "#,
            )
            .bind(row.ledger_date)
            .bind(&row.district)
            .bind(plan_code)
            .bind(revenue)
            .bind(count)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// District keys touched on a given day, from ledger rows and canonical
    /// listings alike, so the audit also sees rows a partial failure missed.
    pub async fn districts_for(&self, date: NaiveDate) -> Result<Vec<String>> {
        let districts: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT district FROM revenue_ledger WHERE ledger_date = $1
            UNION
            SELECT UPPER(COALESCE(NULLIF(TRIM(district), ''), 'UNKNOWN')) FROM public_shops
            WHERE payment_status = 'PAID' AND last_payment_date::date = $1
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(districts)
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default)]
    pub district: Option<String>,
}

pub async fn revenue_report(
    Extension(pool): Extension<PgPool>,
    Query(query): Query<ReportQuery>,
) -> AppResult<Json<Vec<RevenueLedgerRow>>> {
    let store = RevenueLedgerStore::new(pool);
    let district = query.district.as_deref().map(normalize_district_str);
    let rows = store
        .report(query.from, query.to, district.as_deref())
        .await?;
    Ok(Json(rows))
}

fn normalize_district_str(district: &str) -> String {
    normalize_district(Some(district))
}
