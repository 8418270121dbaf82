use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::AgentLedgerStore;
use crate::config;
use crate::listings::ListingDirectory;
use crate::plans;
use crate::revenue::{normalize_district, RevenueLedgerStore};

use super::models::{DeletionOutcome, ReconcileError};

/// key: deletion-reconciler -> inverse of the payment transition
///
/// Ledger reversal runs before the listing delete so a failed reversal leaves
/// the listing in place and the operation retryable. The delete itself is last
/// and final.
#[derive(Clone)]
pub struct DeletionReconciler {
    directory: ListingDirectory,
    agents: AgentLedgerStore,
    revenue: RevenueLedgerStore,
}

impl DeletionReconciler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            directory: ListingDirectory::new(pool.clone()),
            agents: AgentLedgerStore::new(pool.clone()),
            revenue: RevenueLedgerStore::new(pool),
        }
    }

    pub async fn delete(&self, listing_id: Uuid) -> Result<DeletionOutcome, ReconcileError> {
        let (listing, source) = self
            .directory
            .resolve(listing_id)
            .await?
            .ok_or(ReconcileError::NotFound)?;

        let was_paid = listing.is_paid();
        let plan = plans::find(&listing.plan_type);
        let commission = if listing.agent_commission > 0 {
            listing.agent_commission
        } else {
            plan.map(|plan| plan.commission(listing.plan_amount))
                .unwrap_or(0)
        };
        let district = normalize_district(listing.district.as_deref());

        let mut warnings = Vec::new();
        let mut commission_reversed = 0;
        let mut revenue_reversed = 0;
        let mut agent_name = None;
        let mut agent_code = None;

        let agent_id = self.resolve_agent_association(&listing.agent_id, &listing.created_by);
        let agent = match agent_id {
            Some(id) => self.agents.find(id).await?,
            None => None,
        };

        if was_paid {
            match &agent {
                Some(agent) => {
                    let reversal = self
                        .agents
                        .reverse_commission(agent.id, commission)
                        .await?;
                    if let Some(reversal) = reversal {
                        commission_reversed = reversal.prior_earnings - reversal.new_earnings;
                        if reversal.clamped {
                            warn!(
                                listing_id = %listing.id,
                                agent_id = %agent.id,
                                commission,
                                prior_earnings = reversal.prior_earnings,
                                "agent earnings clamped at zero during reversal",
                            );
                            warnings.push("agent earnings clamped at zero".to_string());
                        }
                    }
                    agent_name = Some(agent.name.clone());
                    agent_code = Some(agent.code.clone());
                }
                None => {
                    warn!(
                        listing_id = %listing.id,
                        "no resolvable agent for paid listing; commission not reversed",
                    );
                    warnings.push("agent not found; commission not reversed".to_string());
                }
            }

            match listing.last_payment_date {
                Some(paid_at) => {
                    let reversed = self
                        .revenue
                        .reverse_sale(
                            paid_at.date_naive(),
                            &district,
                            &listing.plan_type,
                            listing.plan_amount,
                            commission,
                        )
                        .await?;
                    if reversed {
                        revenue_reversed = listing.plan_amount;
                    }
                    // Absent row: nothing to reverse, skip silently.
                }
                None => {
                    warn!(
                        listing_id = %listing.id,
                        "paid listing has no payment date; revenue not reversed",
                    );
                    warnings.push("payment date unknown; revenue not reversed".to_string());
                }
            }
        } else if let Some(agent) = &agent {
            // Unpaid listing still counted toward the agent's shops at
            // creation time; keep the count symmetric.
            self.agents.decrement_shop_count(agent.id).await?;
        }

        let removed = self.directory.delete_everywhere(&listing, source).await?;
        info!(
            listing_id = %listing.id,
            removed,
            commission_reversed,
            revenue_reversed,
            "listing deleted",
        );

        Ok(DeletionOutcome {
            commission_reversed,
            revenue_reversed,
            agent_name,
            agent_code,
            warnings,
        })
    }

    /// Primary association is the agent id. Crediting/reversing through the
    /// `created_by` reference is a policy decision, off by default, because the
    /// creator may not be an agent at all.
    fn resolve_agent_association(
        &self,
        agent_id: &Option<Uuid>,
        created_by: &Option<Uuid>,
    ) -> Option<Uuid> {
        if agent_id.is_some() {
            return *agent_id;
        }
        if *config::COMMISSION_CREATOR_FALLBACK {
            if created_by.is_some() {
                info!("falling back to created_by reference for commission reversal");
            }
            return *created_by;
        }
        None
    }
}
