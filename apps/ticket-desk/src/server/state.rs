//! Application state for the ticket desk HTTP server.

use crate::pipeline::{CancelHandle, TicketPipeline};
use gatepass_core::delivery::DeliveryChannel;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Ticket pipeline driving the board
    pub pipeline: Arc<TicketPipeline>,

    /// Delivery Channel used directly by the relay endpoint
    pub channel: Arc<dyn DeliveryChannel>,

    /// Cancels the running batch, if any
    pub batch: Arc<Mutex<Option<CancelHandle>>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(pipeline: Arc<TicketPipeline>, channel: Arc<dyn DeliveryChannel>) -> Self {
        Self {
            pipeline,
            channel,
            batch: Arc::new(Mutex::new(None)),
        }
    }
}
