use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::listings::ListingRecord;

/// Everything a receipt notification needs. All fields are guaranteed
/// populated on a listing that just went through a successful mark-paid.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptContext {
    pub shop_name: String,
    pub owner_name: String,
    pub amount: i64,
    pub receipt_no: String,
    pub payment_date: DateTime<Utc>,
    pub payment_mode: String,
    pub mobile: String,
}

impl ReceiptContext {
    pub fn from_listing(listing: &ListingRecord) -> Option<Self> {
        Some(Self {
            shop_name: listing.shop_name.clone(),
            owner_name: listing.owner_name.clone(),
            amount: listing.plan_amount,
            receipt_no: listing.receipt_no.clone()?,
            payment_date: listing.last_payment_date?,
            payment_mode: listing.payment_mode.clone(),
            mobile: listing.mobile.clone(),
        })
    }
}

/// key: receipt-notifier -> delivery boundary (SMS/email/WhatsApp live outside)
#[async_trait]
pub trait ReceiptNotifier: Send + Sync {
    async fn dispatch(&self, receipt: ReceiptContext) -> Result<()>;
}

/// Tracing-only implementation used until a delivery channel is wired in.
pub struct LogNotifier;

#[async_trait]
impl ReceiptNotifier for LogNotifier {
    async fn dispatch(&self, receipt: ReceiptContext) -> Result<()> {
        info!(
            shop = %receipt.shop_name,
            receipt = %receipt.receipt_no,
            amount = receipt.amount,
            mode = %receipt.payment_mode,
            "payment receipt ready for delivery",
        );
        Ok(())
    }
}
