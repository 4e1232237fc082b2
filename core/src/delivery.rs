//! Delivery Channel contract.
//!
//! A channel takes a rendered ticket and a recipient and reports whether the
//! message was accepted. Implementations live in `gatepass-mailer`; the pipeline
//! only sees this trait.

use crate::payload::ImageArtifact;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier a channel returns for an accepted message
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(String);

impl DeliveryId {
    /// Wrap a channel-specific message id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// HTTP-style class of a delivery failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The request itself was rejected (bad address, refused content)
    Client,
    /// The channel or the network failed
    Server,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client error"),
            Self::Server => f.write_str("server error"),
        }
    }
}

/// A rejected or failed delivery, as reported by the channel
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{class}: {message}")]
pub struct DeliveryError {
    /// Whether the request or the channel is at fault
    pub class: FailureClass,
    /// Human-readable reason, surfaced verbatim to operators
    pub message: String,
}

impl DeliveryError {
    /// The recipient or content was refused
    #[must_use]
    pub fn client(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Client,
            message: message.into(),
        }
    }

    /// The channel or transport failed
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Server,
            message: message.into(),
        }
    }
}

/// One ticket to deliver
#[derive(Clone, Debug)]
pub struct DeliveryRequest {
    /// Recipient address
    pub recipient_email: String,
    /// Name used in the greeting
    pub display_name: String,
    /// Rendered ticket
    pub image: ImageArtifact,
}

/// Sends a rendered ticket to a recipient.
///
/// # Example
///
/// ```ignore
/// let id = channel.send(DeliveryRequest {
///     recipient_email: "asha@example.com".into(),
///     display_name: "Asha".into(),
///     image,
/// }).await?;
/// ```
pub trait DeliveryChannel: Send + Sync {
    /// Deliver one ticket.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] when the channel rejects the message or cannot be reached.
    fn send(&self, request: DeliveryRequest) -> BoxFuture<'_, Result<DeliveryId, DeliveryError>>;
}
