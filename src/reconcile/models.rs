use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::listings::ListingRecord;

/// A paid plan stays active for one year from the payment date.
pub const PLAN_VALIDITY_DAYS: i64 = 365;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("listing not found")]
    NotFound,
    #[error("unknown plan: {0}")]
    InvalidPlan(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::NotFound => AppError::NotFound,
            ReconcileError::InvalidPlan(code) => AppError::InvalidPlan(code),
            ReconcileError::Storage(err) => AppError::Message(err.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarkPaidRequest {
    pub listing_id: Uuid,
    pub plan_type: Option<String>,
    pub amount: Option<i64>,
    pub payment_mode: Option<String>,
    pub receipt_no: Option<String>,
    pub district: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub listing: ListingRecord,
    pub commission: i64,
    /// Ledger writes that failed after the listing itself was updated. The
    /// payment still counts; these are flagged for out-of-band reconciliation.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionOutcome {
    pub commission_reversed: i64,
    pub revenue_reversed: i64,
    pub agent_name: Option<String>,
    pub agent_code: Option<String>,
    pub warnings: Vec<String>,
}

/// Receipt numbers follow the `REC<unix-millis>` pattern.
pub fn receipt_number(now: DateTime<Utc>) -> String {
    format!("REC{}", now.timestamp_millis())
}

pub fn expiry_for(paid_at: DateTime<Utc>) -> DateTime<Utc> {
    paid_at + Duration::days(PLAN_VALIDITY_DAYS)
}

#[cfg(test)]
mod tests {
    use super::{expiry_for, receipt_number};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn receipt_number_embeds_unix_millis() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(receipt_number(at), format!("REC{}", at.timestamp_millis()));
    }

    #[test]
    fn expiry_is_one_year_out() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(expiry_for(at) - at, Duration::days(365));
    }
}
