//! Console Delivery Channel for development.

use crate::template::{EventDetails, TicketNumber};
use futures::future::BoxFuture;
use gatepass_core::delivery::{DeliveryChannel, DeliveryError, DeliveryId, DeliveryRequest};
use tracing::info;

/// Logs tickets instead of sending them.
///
/// Every delivery succeeds with a synthetic id.
#[derive(Clone, Debug, Default)]
pub struct ConsoleChannel {
    event: EventDetails,
}

impl ConsoleChannel {
    /// Create a console channel printing tickets for `event`
    #[must_use]
    pub const fn new(event: EventDetails) -> Self {
        Self { event }
    }
}

impl DeliveryChannel for ConsoleChannel {
    fn send(&self, request: DeliveryRequest) -> BoxFuture<'_, Result<DeliveryId, DeliveryError>> {
        let ticket = TicketNumber::generate(&self.event.ticket_prefix);
        let id = DeliveryId::new(format!("console-{}", uuid::Uuid::new_v4()));

        info!(
            to = %request.recipient_email,
            name = %request.display_name,
            ticket = ticket.as_str(),
            width = request.image.width,
            png_bytes = request.image.png.len(),
            delivery_id = %id,
            "Ticket email (development mode, not sent)"
        );

        Box::pin(async move { Ok(id) })
    }
}
