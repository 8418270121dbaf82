use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::listings::{ListingRecord, MODE_CASH, MODE_NONE, MODE_UPI};
use crate::notify::{LogNotifier, ReceiptContext, ReceiptNotifier};

use super::deletion::DeletionReconciler;
use super::models::MarkPaidRequest;
use super::payment::PaymentReconciler;

/// key: reconcile-api -> admin/agent action endpoints

#[derive(Debug, Deserialize)]
pub struct MarkPaidBody {
    #[serde(default)]
    pub plan_type: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub payment_mode: Option<String>,
    #[serde(default)]
    pub receipt_no: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MarkPaidResponse {
    pub success: bool,
    pub message: String,
    pub listing: ListingRecord,
    pub commission: i64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Deductions {
    pub commission_deducted: i64,
    pub revenue_deducted: i64,
    pub agent_name: Option<String>,
    pub agent_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    pub deductions: Deductions,
    pub warnings: Vec<String>,
}

pub async fn mark_paid(
    Extension(pool): Extension<PgPool>,
    Path(listing_id): Path<Uuid>,
    Json(body): Json<MarkPaidBody>,
) -> AppResult<Json<MarkPaidResponse>> {
    let payment_mode = body
        .payment_mode
        .map(|mode| normalize_mode(&mode))
        .transpose()?;

    let reconciler = PaymentReconciler::new(pool);
    let outcome = reconciler
        .mark_paid(MarkPaidRequest {
            listing_id,
            plan_type: body.plan_type,
            amount: body.amount,
            payment_mode,
            receipt_no: body.receipt_no,
            district: body.district,
        })
        .await?;

    if let Some(receipt) = ReceiptContext::from_listing(&outcome.listing) {
        if let Err(err) = LogNotifier.dispatch(receipt).await {
            warn!(?err, %listing_id, "receipt notification dispatch failed");
        }
    }

    Ok(Json(MarkPaidResponse {
        success: true,
        message: "payment recorded".to_string(),
        listing: outcome.listing,
        commission: outcome.commission,
        warnings: outcome.warnings,
    }))
}

pub async fn delete_listing(
    Extension(pool): Extension<PgPool>,
    Path(listing_id): Path<Uuid>,
) -> AppResult<Json<DeleteResponse>> {
    let reconciler = DeletionReconciler::new(pool);
    let outcome = reconciler.delete(listing_id).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: "listing deleted".to_string(),
        deductions: Deductions {
            commission_deducted: outcome.commission_reversed,
            revenue_deducted: outcome.revenue_reversed,
            agent_name: outcome.agent_name,
            agent_code: outcome.agent_code,
        },
        warnings: outcome.warnings,
    }))
}

fn normalize_mode(mode: &str) -> Result<String, AppError> {
    let normalized = mode.trim().to_uppercase();
    match normalized.as_str() {
        MODE_CASH | MODE_UPI | MODE_NONE => Ok(normalized),
        other => Err(AppError::BadRequest(format!(
            "unsupported payment mode: {other}"
        ))),
    }
}
