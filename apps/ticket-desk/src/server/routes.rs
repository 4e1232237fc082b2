//! Router configuration for the ticket desk.

use super::health::health_check;
use super::relay::send_qr_email;
use super::state::AppState;
use super::tickets;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the complete Axum router.
///
/// - `GET /health`
/// - `GET /api/tickets`, `POST /api/tickets/import`, `POST /api/tickets/refresh`
/// - `POST /api/tickets/:row/{send,retry,resend}`
/// - `POST /api/tickets/send-pending` and `.../send-pending/cancel`
/// - `POST /api/send-qr-email`
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Board
        .route("/tickets", get(tickets::list_tickets))
        .route("/tickets/import", post(tickets::import_tickets))
        .route("/tickets/refresh", post(tickets::refresh_tickets))
        // Batches
        .route("/tickets/send-pending", post(tickets::send_pending))
        .route("/tickets/send-pending/cancel", post(tickets::cancel_pending))
        // Single rows
        .route("/tickets/:row/send", post(tickets::send_ticket))
        .route("/tickets/:row/retry", post(tickets::retry_ticket))
        .route("/tickets/:row/resend", post(tickets::resend_ticket))
        // Relay
        .route("/send-qr-email", post(send_qr_email));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
