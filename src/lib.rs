pub mod agents;
pub mod config;
pub mod error;
pub mod listings;
pub mod notify;
pub mod plans;
pub mod reconcile;
pub mod revenue;
pub mod routes;

pub use reconcile::{DeletionReconciler, MarkPaidRequest, PaymentReconciler};
pub use routes::api_routes;
