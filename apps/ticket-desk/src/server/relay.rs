//! Single-ticket relay endpoint.
//!
//! Accepts an already rendered ticket and forwards it through the configured
//! Delivery Channel. Speaks the same JSON contract the HTTP relay channel posts,
//! so one ticket desk can act as the mail relay for another.

use super::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use gatepass_core::delivery::DeliveryRequest;
use gatepass_core::payload::ImageArtifact;
use gatepass_mailer::{RelayRequest, RelayResponse};
use tracing::{info, warn};

fn failure(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<RelayResponse>) {
    (
        status,
        Json(RelayResponse {
            success: false,
            error: Some(error.into()),
            ..RelayResponse::default()
        }),
    )
}

/// `POST /api/send-qr-email`
///
/// - 400 `{ success: false, error: "Missing required parameters" }` when a field is blank
/// - 200 `{ success: true, message, emailId }` when the channel accepts the ticket
/// - 500 `{ success: false, error }` otherwise
pub async fn send_qr_email(
    State(state): State<AppState>,
    body: Option<Json<RelayRequest>>,
) -> (StatusCode, Json<RelayResponse>) {
    let Some(Json(request)) = body else {
        return failure(StatusCode::BAD_REQUEST, "Missing required parameters");
    };
    if [&request.email, &request.name, &request.qr_code]
        .iter()
        .any(|field| field.trim().is_empty())
    {
        return failure(StatusCode::BAD_REQUEST, "Missing required parameters");
    }

    let image = match ImageArtifact::from_data_url(&request.qr_code) {
        Ok(image) => image,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let delivery = DeliveryRequest {
        recipient_email: request.email.trim().to_string(),
        display_name: request.name.trim().to_string(),
        image,
    };

    match state.channel.send(delivery).await {
        Ok(delivery_id) => {
            info!(recipient = %request.email, %delivery_id, "Relayed ticket email");
            (
                StatusCode::OK,
                Json(RelayResponse {
                    success: true,
                    message: Some("Email sent successfully".to_string()),
                    email_id: Some(delivery_id.as_str().to_string()),
                    error: None,
                }),
            )
        },
        Err(e) => {
            warn!(recipient = %request.email, error = %e, "Relay delivery failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.message)
        },
    }
}
