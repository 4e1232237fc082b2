//! # Gatepass Mailer
//!
//! Delivery Channel implementations for Gatepass tickets:
//!
//! - [`SmtpChannel`]: renders the HTML ticket email and sends it over SMTP
//! - [`RelayChannel`]: posts the ticket to an HTTP mail relay
//! - [`ConsoleChannel`]: logs the ticket (development)
//!
//! All three implement [`gatepass_core::delivery::DeliveryChannel`].

use thiserror::Error;

pub mod console;
pub mod relay;
pub mod smtp;
pub mod template;

pub use console::ConsoleChannel;
pub use relay::{RelayChannel, RelayRequest, RelayResponse};
pub use smtp::{SmtpChannel, SmtpSettings};
pub use template::{EventDetails, TicketEmail, TicketNumber};

/// Errors constructing or probing a channel
#[derive(Error, Debug)]
pub enum MailerError {
    /// Settings are invalid
    #[error("Mailer configuration error: {0}")]
    Configuration(String),

    /// The server could not be reached
    #[error("Mail server unreachable: {0}")]
    Unreachable(String),
}
