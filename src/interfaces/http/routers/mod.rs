pub mod callback;
pub mod default_routers;
pub mod payments;
pub mod verification;

use crate::application::payments::PaymentService;
use crate::application::verification::VerificationService;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
    pub verification: Arc<VerificationService>,
}

/// All routes, without middleware.
pub fn routes(state: AppState) -> Router {
    let payments = Router::new()
        .route("/callback", post(callback::handle_callback))
        .route("/initiate", post(payments::initiate))
        .route("/{appointment_id}/status", get(payments::status))
        .route("/manual", post(verification::claim))
        .route("/manual/queue", get(verification::queue))
        .route(
            "/manual/{appointment_id}/decision",
            post(verification::decide),
        );

    Router::new()
        .route("/api/v1/health-check", get(default_routers::health_check))
        .nest("/api/v1/payments", payments)
        .fallback(default_routers::not_found)
        .with_state(state)
}
