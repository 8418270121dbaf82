use axum::{
    routing::{get, post},
    Router,
};

use crate::{agents, listings, plans, reconcile, revenue};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/plans", get(plans::list_plans))
        .route(
            "/api/listings",
            post(listings::create_listing),
        )
        .route(
            "/api/listings/:id",
            get(listings::get_listing).delete(reconcile::delete_listing),
        )
        .route(
            "/api/listings/:id/mark-paid",
            post(reconcile::mark_paid_endpoint),
        )
        .route("/api/agents/:id/ledger", get(agents::get_agent_ledger))
        .route("/api/revenue", get(revenue::revenue_report))
}
