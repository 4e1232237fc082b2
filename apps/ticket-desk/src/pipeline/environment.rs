//! Injected dependencies of the ticket pipeline.

use crate::qr::QrEncoder;
use gatepass_core::delivery::DeliveryChannel;
use gatepass_core::environment::{Clock, SystemClock};
use gatepass_core::registry::RegistrationGateway;
use gatepass_runtime::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

/// Environment dependencies for the ticket reducer
#[derive(Clone)]
pub struct TicketEnvironment {
    /// Where tickets are sent
    pub channel: Arc<dyn DeliveryChannel>,
    /// Registration store; `None` when running on imports only
    pub gateway: Option<Arc<dyn RegistrationGateway>>,
    /// Ticket image renderer
    pub encoder: QrEncoder,
    /// Upper bound on one channel round trip
    pub delivery_timeout: Duration,
    /// Backoff for recording the "ticket generated" flag
    pub ledger_policy: RetryPolicy,
    /// Clock for row timestamps
    pub clock: Arc<dyn Clock>,
}

impl TicketEnvironment {
    /// Environment with default encoder, a 30 s delivery timeout, default
    /// ledger retries, and the system clock
    #[must_use]
    pub fn new(
        channel: Arc<dyn DeliveryChannel>,
        gateway: Option<Arc<dyn RegistrationGateway>>,
    ) -> Self {
        Self {
            channel,
            gateway,
            encoder: QrEncoder::default(),
            delivery_timeout: Duration::from_secs(30),
            ledger_policy: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the encoder
    #[must_use]
    pub const fn with_encoder(mut self, encoder: QrEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Replace the delivery timeout
    #[must_use]
    pub const fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Replace the ledger retry policy
    #[must_use]
    pub fn with_ledger_policy(mut self, policy: RetryPolicy) -> Self {
        self.ledger_policy = policy;
        self
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl std::fmt::Debug for TicketEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketEnvironment")
            .field("has_gateway", &self.gateway.is_some())
            .field("encoder", &self.encoder)
            .field("delivery_timeout", &self.delivery_timeout)
            .field("ledger_policy", &self.ledger_policy)
            .finish_non_exhaustive()
    }
}
