//! Actions of the ticket pipeline.

use crate::tracker::{FailureDetail, RowId};
use gatepass_core::attendee::AttendeeRecord;
use gatepass_core::delivery::DeliveryId;
use std::fmt;

/// Correlates the events of one send request with its caller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl AttemptId {
    /// Wrap a raw attempt number
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which operator action started a send
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendMode {
    /// First delivery (also accepted on a failed row)
    Send,
    /// Re-attempt after a failure
    Retry,
    /// Deliberate re-delivery of a sent ticket
    Resend,
}

impl SendMode {
    /// Lowercase operation name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Retry => "retry",
            Self::Resend => "resend",
        }
    }
}

impl fmt::Display for SendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a send request was refused without contacting the channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// No such row on the board
    UnknownRow,
    /// A delivery for the row is already in flight
    AlreadySending,
    /// The record has no email address
    MissingRecipient,
    /// The mode does not apply to the row's status
    InvalidTransition {
        /// Current status name
        from: &'static str,
    },
}

/// Actions for the ticket pipeline
#[derive(Clone, Debug)]
pub enum TicketAction {
    // Commands
    /// Replace the board with these records
    Load {
        /// Records in display order
        records: Vec<AttendeeRecord>,
    },

    /// Deliver the ticket of one row
    Send {
        /// Target row
        row: RowId,
        /// Operator action
        mode: SendMode,
        /// Correlation id
        attempt: AttemptId,
    },

    // Events
    /// The request was refused; the row is unchanged
    SendRejected {
        /// Target row
        row: RowId,
        /// Correlation id
        attempt: AttemptId,
        /// Reason
        reason: Rejection,
    },

    /// The channel accepted the ticket
    Delivered {
        /// Target row
        row: RowId,
        /// Correlation id
        attempt: AttemptId,
        /// Channel message id
        delivery_id: DeliveryId,
    },

    /// Encoding or delivery failed
    DeliveryFailed {
        /// Target row
        row: RowId,
        /// Correlation id
        attempt: AttemptId,
        /// Reason
        detail: FailureDetail,
    },

    /// The store now flags the registration as ticketed
    TicketRecorded {
        /// Target row
        row: RowId,
        /// Correlation id
        attempt: AttemptId,
        /// Channel message id
        delivery_id: DeliveryId,
    },

    /// Nothing to record (no registration id, already flagged, or no store)
    RecordingSkipped {
        /// Target row
        row: RowId,
        /// Correlation id
        attempt: AttemptId,
        /// Channel message id
        delivery_id: DeliveryId,
    },

    /// The ticket was delivered but the store could not record it
    RecordingFailed {
        /// Target row
        row: RowId,
        /// Correlation id
        attempt: AttemptId,
        /// Channel message id
        delivery_id: DeliveryId,
        /// Store error
        error: String,
    },
}

impl TicketAction {
    /// A first-delivery command
    #[must_use]
    pub const fn send(row: RowId, attempt: AttemptId) -> Self {
        Self::Send {
            row,
            mode: SendMode::Send,
            attempt,
        }
    }

    /// Correlation id carried by send commands and their events
    #[must_use]
    pub const fn attempt(&self) -> Option<AttemptId> {
        match self {
            Self::Load { .. } => None,
            Self::Send { attempt, .. }
            | Self::SendRejected { attempt, .. }
            | Self::Delivered { attempt, .. }
            | Self::DeliveryFailed { attempt, .. }
            | Self::TicketRecorded { attempt, .. }
            | Self::RecordingSkipped { attempt, .. }
            | Self::RecordingFailed { attempt, .. } => Some(*attempt),
        }
    }

    /// Whether this is the last event a send request produces
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SendRejected { .. }
                | Self::DeliveryFailed { .. }
                | Self::TicketRecorded { .. }
                | Self::RecordingSkipped { .. }
                | Self::RecordingFailed { .. }
        )
    }

    /// Whether this is the terminal event of `attempt`
    #[must_use]
    pub fn concludes(&self, attempt: AttemptId) -> bool {
        self.is_terminal() && self.attempt() == Some(attempt)
    }
}
