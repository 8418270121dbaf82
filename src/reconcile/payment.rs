use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::agents::AgentLedgerStore;
use crate::listings::{ListingDirectory, ListingRecord, ListingSource, MODE_CASH, MODE_NONE};
use crate::plans::{self, Plan};
use crate::revenue::{normalize_district, RevenueLedgerStore};

use super::models::{
    expiry_for, receipt_number, MarkPaidRequest, PaymentOutcome, ReconcileError,
};

/// key: payment-reconciler -> PENDING->PAID transition across listing copies and ledgers
///
/// The write order is fixed: listing of record, then agent ledger, then revenue
/// ledger. The listing's own PAID status is the fact of record; ledger writes
/// that fail afterwards are logged and reported as warnings, never an abort,
/// because the ledgers can be rebuilt from the listings.
#[derive(Clone)]
pub struct PaymentReconciler {
    pool: PgPool,
    directory: ListingDirectory,
    agents: AgentLedgerStore,
    revenue: RevenueLedgerStore,
}

impl PaymentReconciler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            directory: ListingDirectory::new(pool.clone()),
            agents: AgentLedgerStore::new(pool.clone()),
            revenue: RevenueLedgerStore::new(pool.clone()),
            pool,
        }
    }

    pub async fn mark_paid(
        &self,
        request: MarkPaidRequest,
    ) -> Result<PaymentOutcome, ReconcileError> {
        let (listing, source) = self
            .directory
            .resolve(request.listing_id)
            .await?
            .ok_or(ReconcileError::NotFound)?;

        let plan_code = request
            .plan_type
            .as_deref()
            .unwrap_or(plans::DEFAULT_PLAN)
            .to_string();
        let plan =
            plans::find(&plan_code).ok_or_else(|| ReconcileError::InvalidPlan(plan_code))?;
        let final_amount = request.amount.unwrap_or(plan.amount);

        let now = Utc::now();
        let payment_mode = match request.payment_mode.clone() {
            Some(mode) => mode,
            None if listing.payment_mode == MODE_NONE => MODE_CASH.to_string(),
            None => listing.payment_mode.clone(),
        };
        let transition_receipt = request
            .receipt_no
            .clone()
            .or_else(|| listing.receipt_no.is_none().then(|| receipt_number(now)));
        let commission_if_pending = plan.commission(final_amount);

        // The agent-scoped copy is the gate whenever the denormalized pair
        // exists, so the same logical listing cannot be claimed once through
        // each of its two ids.
        let mut copies = self.directory.copies(&listing, source).await?;
        copies.sort_by_key(|(copy_source, _)| match copy_source {
            ListingSource::AgentScoped => 0,
            ListingSource::Public => 1,
        });
        let mut copies = copies.into_iter();
        let (record_source, record_id) = copies
            .next()
            .ok_or_else(|| anyhow!("resolved listing vanished mid-operation"))?;

        // Idempotence gate and payment facts land in one conditional update:
        // either the row flips to PAID with every paid field set, or nothing
        // about it changes. A retry after a failure here still sees PENDING.
        let was_pending = self
            .apply_paid_fields(
                record_source,
                record_id,
                &listing,
                plan,
                final_amount,
                &payment_mode,
                transition_receipt.as_deref(),
                commission_if_pending,
                now,
                true,
            )
            .await?
            > 0;
        let commission = if was_pending { commission_if_pending } else { 0 };

        let mut warnings = Vec::new();

        if was_pending {
            for (copy_source, copy_id) in copies {
                if let Err(err) = self
                    .apply_paid_fields(
                        copy_source,
                        copy_id,
                        &listing,
                        plan,
                        final_amount,
                        &payment_mode,
                        transition_receipt.as_deref(),
                        commission_if_pending,
                        now,
                        false,
                    )
                    .await
                {
                    warn!(
                        ?err,
                        listing_id = %listing.id,
                        store = copy_source.table(),
                        "partial reconciliation: secondary listing copy not updated",
                    );
                    warnings.push(format!(
                        "secondary copy in {} not updated",
                        copy_source.table()
                    ));
                }
            }
        } else {
            // Already PAID: refresh display fields only; ledgers stay untouched.
            self.apply_display_fields(
                record_source,
                record_id,
                &payment_mode,
                request.receipt_no.as_deref(),
            )
            .await?;
            for (copy_source, copy_id) in copies {
                if let Err(err) = self
                    .apply_display_fields(
                        copy_source,
                        copy_id,
                        &payment_mode,
                        request.receipt_no.as_deref(),
                    )
                    .await
                {
                    warn!(
                        ?err,
                        listing_id = %listing.id,
                        store = copy_source.table(),
                        "partial reconciliation: secondary listing copy not updated",
                    );
                    warnings.push(format!(
                        "secondary copy in {} not updated",
                        copy_source.table()
                    ));
                }
            }
        }

        if was_pending && commission > 0 {
            match listing.agent_id {
                Some(agent_id) => match self.agents.credit_commission(agent_id, commission).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(
                            listing_id = %listing.id,
                            %agent_id,
                            "agent ledger missing; commission not credited",
                        );
                        warnings.push("agent ledger missing".to_string());
                    }
                    Err(err) => {
                        warn!(
                            ?err,
                            listing_id = %listing.id,
                            %agent_id,
                            "partial reconciliation: agent ledger write failed",
                        );
                        warnings.push("agent ledger write failed".to_string());
                    }
                },
                None => {
                    warn!(
                        listing_id = %listing.id,
                        "listing has no agent association; commission not credited",
                    );
                    warnings.push("no agent association".to_string());
                }
            }
        }

        if was_pending {
            let district = normalize_district(
                request
                    .district
                    .as_deref()
                    .or(listing.district.as_deref()),
            );
            if let Err(err) = self
                .revenue
                .record_sale(now.date_naive(), &district, plan.code, final_amount, commission)
                .await
            {
                warn!(
                    ?err,
                    listing_id = %listing.id,
                    %district,
                    "partial reconciliation: revenue ledger write failed",
                );
                warnings.push("revenue ledger write failed".to_string());
            }
        }

        let updated = self
            .directory
            .fetch(record_source, record_id)
            .await?
            .ok_or_else(|| anyhow!("listing disappeared after update"))?;

        Ok(PaymentOutcome {
            listing: updated,
            commission,
            warnings,
        })
    }

    /// Writes the full paid field set. With `only_if_pending`, the statement
    /// doubles as the compare-and-swap idempotence gate: rows_affected is 1
    /// exactly when this call performed the PENDING -> PAID transition, and a
    /// failure leaves the row PENDING and fully retryable.
    #[allow(clippy::too_many_arguments)]
    async fn apply_paid_fields(
        &self,
        source: ListingSource,
        id: Uuid,
        listing: &ListingRecord,
        plan: &Plan,
        final_amount: i64,
        payment_mode: &str,
        receipt_no: Option<&str>,
        commission: i64,
        now: chrono::DateTime<Utc>,
        only_if_pending: bool,
    ) -> Result<u64> {
        // Plan-gated optional fields propagate only when the plan entitles
        // them; a COALESCE keeps previously stored data on downgrade.
        let whatsapp = plan
            .has_whatsapp
            .then(|| listing.whatsapp_number.clone())
            .flatten();
        let offers = plan.has_offers.then(|| listing.offers.clone()).flatten();

        let guard = if only_if_pending {
            " AND payment_status = 'PENDING'"
        } else {
            ""
        };
        let result = sqlx::query(&format!(
            r#"
            UPDATE {} SET
                payment_status = 'PAID',
                plan_type = $2,
                plan_amount = $3,
                payment_mode = $4,
                receipt_no = COALESCE($5, receipt_no),
                agent_commission = $6,
                last_payment_date = $7,
                payment_expiry_date = $8,
                priority_rank = $9,
                placement_slot = $10,
                whatsapp_number = COALESCE($11, whatsapp_number),
                offers = COALESCE($12, offers),
                updated_at = NOW()
            WHERE id = $1{}
            "#,
            source.table(),
            guard
        ))
        .bind(id)
        .bind(plan.code)
        .bind(final_amount)
        .bind(payment_mode)
        .bind(receipt_no)
        .bind(commission)
        .bind(now)
        .bind(expiry_for(now))
        .bind(plan.priority_rank)
        .bind(plan.placement_slot.as_str())
        .bind(whatsapp)
        .bind(offers)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Re-submission path for an already-PAID listing: mode and an explicitly
    /// provided receipt update; nothing commission- or ledger-relevant moves.
    async fn apply_display_fields(
        &self,
        source: ListingSource,
        id: Uuid,
        payment_mode: &str,
        receipt_no: Option<&str>,
    ) -> Result<()> {
        sqlx::query(&format!(
            "UPDATE {} SET payment_mode = $2, receipt_no = COALESCE($3, receipt_no), updated_at = NOW()
             WHERE id = $1",
            source.table()
        ))
        .bind(id)
        .bind(payment_mode)
        .bind(receipt_no)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
