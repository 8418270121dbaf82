use anyhow::Result;
use axum::extract::{Extension, Path};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// key: agent-ledger -> per-agent running balances
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AgentLedger {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub mobile: Option<String>,
    pub total_shops: i32,
    pub total_earnings: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of an earnings reversal. `clamped` is set when the stored balance
/// was smaller than the commission being reversed and the ledger floored at 0.
#[derive(Debug, Clone, Copy)]
pub struct EarningsReversal {
    pub prior_earnings: i64,
    pub new_earnings: i64,
    pub clamped: bool,
}

#[derive(Clone)]
pub struct AgentLedgerStore {
    pool: PgPool,
}

impl AgentLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<AgentLedger>> {
        let record = sqlx::query_as::<_, AgentLedger>("SELECT * FROM agents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Credits commission as a commutative increment. Returns false when the
    /// agent row does not exist (the caller logs and moves on).
    pub async fn credit_commission(&self, id: Uuid, commission: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE agents SET total_earnings = total_earnings + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(commission)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Reverses a commission and decrements the shop count, both floored at
    /// zero. The pre-image is captured in the same statement so clamping can
    /// be reported without a second round trip.
    pub async fn reverse_commission(
        &self,
        id: Uuid,
        commission: i64,
    ) -> Result<Option<EarningsReversal>> {
        let row = sqlx::query(
            r#"
            WITH prior AS (
                SELECT id, total_earnings FROM agents WHERE id = $1
            )
            UPDATE agents
            SET total_earnings = GREATEST(agents.total_earnings - $2, 0),
                total_shops = GREATEST(agents.total_shops - 1, 0),
                updated_at = NOW()
            FROM prior
            WHERE agents.id = prior.id
            RETURNING agents.total_earnings AS new_earnings, prior.total_earnings AS prior_earnings
            "#,
        )
        .bind(id)
        .bind(commission)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let prior_earnings: i64 = row.get("prior_earnings");
            let new_earnings: i64 = row.get("new_earnings");
            EarningsReversal {
                prior_earnings,
                new_earnings,
                clamped: prior_earnings < commission,
            }
        }))
    }

    /// Drops the shop count by one, floored at zero. Used when an unpaid
    /// listing goes away and there are no earnings to reverse.
    pub async fn decrement_shop_count(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE agents SET total_shops = GREATEST(total_shops - 1, 0), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Recomputes what an agent's earnings should be from their PAID listings.
    /// Used by the audit path as the recompute-from-source check.
    pub async fn recompute_earnings(&self, id: Uuid) -> Result<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(agent_commission)::BIGINT FROM agent_shops WHERE agent_id = $1 AND payment_status = 'PAID'",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(0))
    }
}

pub async fn get_agent_ledger(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AgentLedger>> {
    let store = AgentLedgerStore::new(pool);
    let ledger = store.find(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(ledger))
}
