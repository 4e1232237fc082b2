//! Registration store contract.
//!
//! The store is the durable source of attendee rows and the only place the
//! "ticket generated" flag is persisted.

use crate::attendee::{AttendeeRecord, RegistrationCategory, RegistrationId};
use futures::future::BoxFuture;
use thiserror::Error;

/// Errors from the registration store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No row with this id in the category's table
    #[error("no {category} registration with id {id}")]
    NotFound {
        /// Requested id
        id: RegistrationId,
        /// Requested category
        category: RegistrationCategory,
    },

    /// The store could not be reached or the query failed
    #[error("registration store unavailable: {0}")]
    Unavailable(String),

    /// A row could not be mapped to an attendee record
    #[error("malformed registration row: {0}")]
    Malformed(String),
}

/// Reads registrations and records issued tickets.
pub trait RegistrationGateway: Send + Sync {
    /// All registrations across categories, each tagged with its category.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the store cannot be read.
    fn fetch_registrations(&self) -> BoxFuture<'_, Result<Vec<AttendeeRecord>, GatewayError>>;

    /// Set the durable "ticket generated" flag.
    ///
    /// Idempotent: flagging an already-flagged row succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`] when no row matches, or
    /// [`GatewayError::Unavailable`] on store failure.
    fn mark_ticket_generated(
        &self,
        id: RegistrationId,
        category: RegistrationCategory,
    ) -> BoxFuture<'_, Result<(), GatewayError>>;
}
