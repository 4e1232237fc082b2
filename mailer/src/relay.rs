//! HTTP relay Delivery Channel.
//!
//! Posts the ticket to a mail relay endpoint that speaks the
//! `POST /api/send-qr-email` contract:
//!
//! - request: `{ "email", "name", "qrCode" }` where `qrCode` is a PNG data URL
//! - success: 2xx `{ "success": true, "emailId": "..." }`
//! - failure: 4xx/5xx `{ "success": false, "error": "..." }`

use crate::MailerError;
use futures::future::BoxFuture;
use gatepass_core::delivery::{DeliveryChannel, DeliveryError, DeliveryId, DeliveryRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body of the relay endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    /// Recipient address
    pub email: String,
    /// Display name
    pub name: String,
    /// `data:image/png;base64,...`
    pub qr_code: String,
}

/// Response body of the relay endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    /// Whether the relay accepted the message
    #[serde(default)]
    pub success: bool,
    /// Informational message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Id of the accepted message
    #[serde(default, alias = "messageId", skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Delivers tickets through an HTTP mail relay.
#[derive(Clone, Debug)]
pub struct RelayChannel {
    client: reqwest::Client,
    endpoint: String,
}

impl RelayChannel {
    /// Create a channel posting to `endpoint` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`MailerError::Configuration`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, MailerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MailerError::Configuration(format!("HTTP client error: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// The relay endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryId, DeliveryError> {
        let body = RelayRequest {
            email: request.recipient_email,
            name: request.display_name,
            qr_code: request.image.data_url(),
        };

        tracing::debug!(endpoint = %self.endpoint, recipient = %body.email, "Posting ticket to relay");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::server(format!("Relay request failed: {e}")))?;

        let status = response.status();
        let parsed: RelayResponse = response.json().await.unwrap_or_default();

        if status.is_success() && parsed.success {
            let id = parsed
                .email_id
                .unwrap_or_else(|| format!("relay-{}", uuid::Uuid::new_v4()));
            return Ok(DeliveryId::new(id));
        }

        let reason = parsed
            .error
            .or(parsed.message)
            .unwrap_or_else(|| format!("Relay responded with {status}"));

        if status.is_client_error() {
            Err(DeliveryError::client(reason))
        } else {
            Err(DeliveryError::server(reason))
        }
    }
}

impl DeliveryChannel for RelayChannel {
    fn send(&self, request: DeliveryRequest) -> BoxFuture<'_, Result<DeliveryId, DeliveryError>> {
        Box::pin(self.deliver(request))
    }
}
