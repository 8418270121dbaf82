pub mod api;
pub mod audit;
pub mod deletion;
pub mod models;
pub mod payment;

pub use api::{delete_listing, mark_paid as mark_paid_endpoint, DeleteResponse, MarkPaidResponse};
pub use audit::{process_tick as run_revenue_audit_tick, spawn as spawn_revenue_audit, AuditSummary};
pub use deletion::DeletionReconciler;
pub use models::{
    receipt_number, DeletionOutcome, MarkPaidRequest, PaymentOutcome, ReconcileError,
    PLAN_VALIDITY_DAYS,
};
pub use payment::PaymentReconciler;
