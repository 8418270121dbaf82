use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::time::{self, Duration as TokioDuration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agents::AgentLedgerStore;
use crate::config;
use crate::revenue::{RevenueLedgerRow, RevenueLedgerStore};

/// key: revenue-audit -> recompute ledgers from canonical listings
///
/// The ledgers are derived views. Partial reconciliation failures leave them
/// behind the listings; this job periodically recomputes the truth from the
/// PAID listings, logs any drift, and optionally rewrites drifted rows.
pub fn spawn(pool: PgPool) {
    let interval = TokioDuration::from_secs(*config::REVENUE_AUDIT_INTERVAL_SECS);
    let lookback_days = *config::REVENUE_AUDIT_LOOKBACK_DAYS;
    let repair = *config::REVENUE_AUDIT_REPAIR;

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            match process_tick(&pool, Utc::now(), lookback_days, repair).await {
                Ok(summary) => {
                    if summary.rows_drifted > 0 || summary.agents_drifted > 0 {
                        warn!(
                            rows_drifted = summary.rows_drifted,
                            rows_repaired = summary.rows_repaired,
                            agents_drifted = summary.agents_drifted,
                            "revenue audit found ledger drift",
                        );
                    } else {
                        debug!(days_checked = summary.days_checked, "revenue audit clean");
                    }
                }
                Err(err) => warn!(?err, "revenue audit tick failed"),
            }
        }
    });
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct AuditSummary {
    pub days_checked: i64,
    pub rows_drifted: usize,
    pub rows_repaired: usize,
    pub agents_drifted: usize,
    pub agents_repaired: usize,
}

/// One audit pass over the lookback window plus all agent balances.
pub async fn process_tick(
    pool: &PgPool,
    now: DateTime<Utc>,
    lookback_days: i64,
    repair: bool,
) -> Result<AuditSummary> {
    let revenue = RevenueLedgerStore::new(pool.clone());
    let mut summary = AuditSummary::default();

    let today = now.date_naive();
    for offset in 0..=lookback_days {
        let date = today - Duration::days(offset);
        summary.days_checked += 1;
        for district in revenue.districts_for(date).await? {
            if let Some(drift) = audit_row(&revenue, date, &district).await? {
                summary.rows_drifted += 1;
                warn!(
                    %date,
                    %district,
                    stored_revenue = drift.stored_revenue,
                    expected_revenue = drift.expected.total_revenue,
                    stored_commission = drift.stored_commission,
                    expected_commission = drift.expected.total_agent_commission,
                    "revenue ledger row drifted from canonical listings",
                );
                if repair {
                    revenue.overwrite(&drift.expected).await?;
                    summary.rows_repaired += 1;
                    info!(%date, %district, "revenue ledger row repaired");
                }
            }
        }
    }

    let agents = AgentLedgerStore::new(pool.clone());
    for (agent_id, stored) in agent_balances(pool).await? {
        let expected = agents.recompute_earnings(agent_id).await?;
        if expected != stored {
            summary.agents_drifted += 1;
            warn!(
                %agent_id,
                stored,
                expected,
                "agent earnings drifted from canonical listings",
            );
            if repair {
                sqlx::query(
                    "UPDATE agents SET total_earnings = $2, updated_at = NOW() WHERE id = $1",
                )
                .bind(agent_id)
                .bind(expected)
                .execute(pool)
                .await?;
                summary.agents_repaired += 1;
            }
        }
    }

    Ok(summary)
}

struct RowDrift {
    stored_revenue: i64,
    stored_commission: i64,
    expected: RevenueLedgerRow,
}

/// Returns the expected row when stored and recomputed aggregates disagree.
async fn audit_row(
    revenue: &RevenueLedgerStore,
    date: NaiveDate,
    district: &str,
) -> Result<Option<RowDrift>> {
    let expected = revenue.recompute(date, district).await?;
    let stored = revenue.fetch(date, district).await?;

    let (stored_revenue, stored_commission, stored_net, stored_plans, stored_counts) =
        match &stored {
            Some(row) => (
                row.total_revenue,
                row.total_agent_commission,
                row.net_revenue,
                row.per_plan_revenue.clone(),
                row.per_plan_count.clone(),
            ),
            None => (0, 0, 0, Default::default(), Default::default()),
        };

    let clean = stored_revenue == expected.total_revenue
        && stored_commission == expected.total_agent_commission
        && stored_net == expected.net_revenue
        && stored_plans == expected.per_plan_revenue
        && stored_counts == expected.per_plan_count;

    if clean {
        return Ok(None);
    }

    Ok(Some(RowDrift {
        stored_revenue,
        stored_commission,
        expected,
    }))
}

async fn agent_balances(pool: &PgPool) -> Result<Vec<(Uuid, i64)>> {
    let rows: Vec<(Uuid, i64)> =
        sqlx::query_as("SELECT id, total_earnings FROM agents ORDER BY created_at ASC")
            .fetch_all(pool)
            .await?;
    Ok(rows)
}
