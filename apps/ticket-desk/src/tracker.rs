//! Per-Row Status Tracker.
//!
//! [`TicketBoard`] owns the delivery state of every loaded attendee row. It is
//! the state of the ticket reducer, so it is only mutated under the store's
//! write lock and each status change is applied whole.
//!
//! Allowed transitions:
//!
//! ```text
//! Pending ──► Sending ──► Sent
//!                │  ▲       │
//!                ▼  │       │ (explicit resend)
//!              Failed ◄─────┘ via Sending
//! ```

use chrono::{DateTime, Utc};
use gatepass_core::attendee::AttendeeRecord;
use gatepass_core::delivery::{DeliveryError, DeliveryId, FailureClass};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Session-local key of a tracked row.
///
/// Assigned in load order and never reused, so completions that arrive for
/// rows from an earlier load are recognised as stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(u64);

impl RowId {
    /// Wrap a raw row number
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw row number
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a row is `Failed`. The message is never empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Human-readable reason, verbatim from the channel when it gave one
    pub message: String,
    /// Client or server fault, when known
    pub class: Option<FailureClass>,
}

impl FailureDetail {
    /// Build a detail; a blank message is replaced so the row always explains itself
    #[must_use]
    pub fn new(message: impl Into<String>, class: Option<FailureClass>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "unknown delivery error".to_string()
        } else {
            message
        };
        Self { message, class }
    }
}

impl From<DeliveryError> for FailureDetail {
    fn from(err: DeliveryError) -> Self {
        Self::new(err.message, Some(err.class))
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            Some(class) => write!(f, "{class}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Delivery lifecycle of one row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Not attempted yet
    Pending,
    /// A delivery is in flight
    Sending,
    /// The channel accepted the ticket
    Sent,
    /// The last attempt failed
    Failed(FailureDetail),
}

impl DeliveryStatus {
    /// Lowercase status name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed(_) => "failed",
        }
    }

    /// Whether a delivery is in flight
    #[must_use]
    pub const fn is_sending(&self) -> bool {
        matches!(self, Self::Sending)
    }

    /// Whether `self → next` is an allowed transition
    #[must_use]
    pub const fn can_become(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending | Self::Failed(_) | Self::Sent, Self::Sending)
                | (Self::Sending, Self::Sent | Self::Failed(_))
        )
    }
}

/// A rejected status change
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// No such row
    #[error("unknown row {0}")]
    UnknownRow(RowId),

    /// The transition is not allowed from the current status
    #[error("row {row} cannot move from {from} to {to}")]
    Invalid {
        /// Row
        row: RowId,
        /// Current status
        from: &'static str,
        /// Requested status
        to: &'static str,
    },
}

/// One tracked attendee row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRow {
    /// The attendee
    pub record: AttendeeRecord,
    /// Current delivery status
    pub status: DeliveryStatus,
    /// Set when the ticket was delivered but the store could not record it
    pub persistence_warning: Option<String>,
    /// Number of deliveries started for this row
    pub attempts: u32,
    /// Id of the last accepted delivery
    pub last_delivery: Option<DeliveryId>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

/// Number of rows in each status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Rows not attempted yet
    pub pending: usize,
    /// Rows with a delivery in flight
    pub sending: usize,
    /// Rows delivered
    pub sent: usize,
    /// Rows whose last attempt failed
    pub failed: usize,
}

/// Keyed store of row delivery state, iterated in load order
#[derive(Clone, Debug, Default)]
pub struct TicketBoard {
    rows: BTreeMap<RowId, TicketRow>,
    next_id: u64,
}

impl TicketBoard {
    /// An empty board
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the board's rows with `records`, in order.
    ///
    /// Records already flagged as ticketed start `Sent`; all others start
    /// `Pending`. Row ids continue from the previous load.
    pub fn load(&mut self, records: Vec<AttendeeRecord>, now: DateTime<Utc>) -> Vec<RowId> {
        self.rows.clear();

        records
            .into_iter()
            .map(|record| {
                self.next_id += 1;
                let id = RowId(self.next_id);
                let status = if record.ticket_generated {
                    DeliveryStatus::Sent
                } else {
                    DeliveryStatus::Pending
                };
                self.rows.insert(
                    id,
                    TicketRow {
                        record,
                        status,
                        persistence_warning: None,
                        attempts: 0,
                        last_delivery: None,
                        updated_at: now,
                    },
                );
                id
            })
            .collect()
    }

    /// Look up a row
    #[must_use]
    pub fn get(&self, row: RowId) -> Option<&TicketRow> {
        self.rows.get(&row)
    }

    /// Change a row's status.
    ///
    /// Entering `Sending` clears the previous failure and persistence warning
    /// and counts an attempt.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] for an unknown row or a disallowed transition.
    pub fn set(
        &mut self,
        row: RowId,
        status: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let entry = self.rows.get_mut(&row).ok_or(TransitionError::UnknownRow(row))?;

        if !entry.status.can_become(&status) {
            return Err(TransitionError::Invalid {
                row,
                from: entry.status.name(),
                to: status.name(),
            });
        }

        if status == DeliveryStatus::Sending {
            entry.persistence_warning = None;
            entry.attempts += 1;
        }
        entry.status = status;
        entry.updated_at = now;
        Ok(())
    }

    /// Remember the id of an accepted delivery
    pub fn record_delivery(&mut self, row: RowId, id: DeliveryId) {
        if let Some(entry) = self.rows.get_mut(&row) {
            entry.last_delivery = Some(id);
        }
    }

    /// Note that the store now holds the "ticket generated" flag for the row
    pub fn mark_ticketed(&mut self, row: RowId) {
        if let Some(entry) = self.rows.get_mut(&row) {
            entry.record.ticket_generated = true;
        }
    }

    /// Attach a persistence warning without touching the status
    pub fn warn(&mut self, row: RowId, warning: impl Into<String>) {
        if let Some(entry) = self.rows.get_mut(&row) {
            entry.persistence_warning = Some(warning.into());
        }
    }

    /// All rows in load order
    pub fn rows(&self) -> impl Iterator<Item = (RowId, &TicketRow)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    /// Ids of rows matching `predicate`, in load order
    pub fn select<P>(&self, predicate: P) -> Vec<RowId>
    where
        P: Fn(&TicketRow) -> bool,
    {
        self.rows
            .iter()
            .filter(|(_, row)| predicate(row))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Row counts per status
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        self.rows
            .values()
            .fold(StatusCounts::default(), |mut counts, row| {
                match row.status {
                    DeliveryStatus::Pending => counts.pending += 1,
                    DeliveryStatus::Sending => counts.sending += 1,
                    DeliveryStatus::Sent => counts.sent += 1,
                    DeliveryStatus::Failed(_) => counts.failed += 1,
                }
                counts
            })
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the board has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use gatepass_testing::helpers::{imported, paid_student};
    use gatepass_testing::test_clock;
    use gatepass_core::environment::Clock;

    fn now() -> DateTime<Utc> {
        test_clock().now()
    }

    fn board_with(count: usize) -> (TicketBoard, Vec<RowId>) {
        let mut board = TicketBoard::new();
        let records = (0..count)
            .map(|i| imported(&format!("Guest {i}"), &format!("guest{i}@example.com")))
            .collect();
        let ids = board.load(records, now());
        (board, ids)
    }

    fn failed(message: &str) -> DeliveryStatus {
        DeliveryStatus::Failed(FailureDetail::new(message, Some(FailureClass::Server)))
    }

    #[test]
    fn load_assigns_ordered_ids_and_pending_status() {
        let (board, ids) = board_with(3);
        assert_eq!(ids, [RowId::new(1), RowId::new(2), RowId::new(3)]);
        assert!(board.rows().all(|(_, row)| row.status == DeliveryStatus::Pending));
    }

    #[test]
    fn flagged_records_load_as_sent() {
        let mut board = TicketBoard::new();
        let ids = board.load(
            vec![paid_student(1, "Asha", "asha@example.com").with_ticket_generated(true)],
            now(),
        );
        assert_eq!(board.get(ids[0]).unwrap().status, DeliveryStatus::Sent);
    }

    #[test]
    fn reload_never_reuses_ids() {
        let (mut board, first) = board_with(2);
        let second = board.load(vec![imported("Late", "late@example.com")], now());

        assert_eq!(second, [RowId::new(3)]);
        assert!(board.get(first[0]).is_none());
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn happy_path_transitions() {
        let (mut board, ids) = board_with(1);
        board.set(ids[0], DeliveryStatus::Sending, now()).unwrap();
        board.set(ids[0], DeliveryStatus::Sent, now()).unwrap();
        board.set(ids[0], DeliveryStatus::Sending, now()).unwrap();
        board.set(ids[0], failed("relay down"), now()).unwrap();
        board.set(ids[0], DeliveryStatus::Sending, now()).unwrap();

        assert_eq!(board.get(ids[0]).unwrap().attempts, 3);
    }

    #[test]
    fn pending_cannot_jump_to_terminal_states() {
        let (mut board, ids) = board_with(1);

        let err = board.set(ids[0], DeliveryStatus::Sent, now()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Invalid {
                row: ids[0],
                from: "pending",
                to: "sent"
            }
        );
        assert!(board.set(ids[0], failed("x"), now()).is_err());
    }

    #[test]
    fn sending_only_resolves_to_sent_or_failed() {
        let (mut board, ids) = board_with(1);
        board.set(ids[0], DeliveryStatus::Sending, now()).unwrap();

        assert!(board.set(ids[0], DeliveryStatus::Sending, now()).is_err());
        assert!(board.set(ids[0], DeliveryStatus::Pending, now()).is_err());
        assert_eq!(board.get(ids[0]).unwrap().status, DeliveryStatus::Sending);
    }

    #[test]
    fn entering_sending_clears_error_and_warning() {
        let (mut board, ids) = board_with(1);
        board.set(ids[0], DeliveryStatus::Sending, now()).unwrap();
        board.set(ids[0], DeliveryStatus::Sent, now()).unwrap();
        board.warn(ids[0], "store unavailable");

        board.set(ids[0], DeliveryStatus::Sending, now()).unwrap();

        let row = board.get(ids[0]).unwrap();
        assert_eq!(row.persistence_warning, None);
        assert_eq!(row.status, DeliveryStatus::Sending);
    }

    #[test]
    fn unknown_row_is_reported() {
        let mut board = TicketBoard::new();
        let err = board
            .set(RowId::new(9), DeliveryStatus::Sending, now())
            .unwrap_err();
        assert_eq!(err, TransitionError::UnknownRow(RowId::new(9)));
    }

    #[test]
    fn blank_failure_message_is_replaced() {
        let detail = FailureDetail::new("  ", None);
        assert!(!detail.message.is_empty());
    }

    #[test]
    fn counts_and_select_follow_status() {
        let (mut board, ids) = board_with(3);
        board.set(ids[1], DeliveryStatus::Sending, now()).unwrap();
        board.set(ids[1], failed("bounced"), now()).unwrap();

        let counts = board.counts();
        assert_eq!((counts.pending, counts.failed), (2, 1));
        assert_eq!(
            board.select(|row| row.status == DeliveryStatus::Pending),
            [ids[0], ids[2]]
        );
    }

    #[test]
    fn failed_status_serializes_with_detail() {
        let json = serde_json::to_value(failed("relay down")).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["message"], "relay down");
        assert_eq!(json["class"], "server");
    }
}
