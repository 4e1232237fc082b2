//! Ticket Pipeline Orchestrator.
//!
//! [`TicketPipeline`] is the imperative shell around the ticket reducer. Each
//! operation sends one command into the store and waits for the terminal
//! event of that command, so callers get a definite outcome per row.

use super::actions::{AttemptId, Rejection, SendMode, TicketAction};
use super::environment::TicketEnvironment;
use super::reducer::TicketReducer;
use crate::import::{ImportError, ImportReport, parse_csv};
use crate::tracker::{DeliveryStatus, FailureDetail, RowId, StatusCounts, TicketBoard, TicketRow};
use gatepass_core::attendee::AttendeeRecord;
use gatepass_core::delivery::DeliveryId;
use gatepass_core::registry::{GatewayError, RegistrationGateway};
use gatepass_runtime::{Store, StoreError};
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

/// Store running the ticket reducer
pub type TicketStore = Store<TicketBoard, TicketAction, TicketEnvironment, TicketReducer>;

/// Extra time allowed on top of the delivery timeout and ledger backoff
const WAIT_SLACK: Duration = Duration::from_secs(30);

/// Outcome events buffered per waiter before it lags
const OUTCOME_BROADCAST_CAPACITY: usize = 1024;

/// Errors from a single-row operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// No such row
    #[error("unknown row {0}")]
    UnknownRow(RowId),

    /// The row's record has no email address
    #[error("row {0} has no recipient email address")]
    MissingRecipient(RowId),

    /// The operation does not apply to the row's current status
    #[error("cannot {mode} row {row} while it is {from}")]
    InvalidTransition {
        /// Row
        row: RowId,
        /// Requested operation
        mode: SendMode,
        /// Current status name
        from: &'static str,
    },

    /// The store refused the command or the outcome never arrived
    #[error("pipeline store error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of a single-row send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The channel accepted the ticket
    Sent {
        /// Channel message id
        delivery_id: DeliveryId,
        /// Set when the store could not record the ticket
        persistence_error: Option<String>,
    },
    /// The channel rejected the ticket or the attempt timed out
    Failed(FailureDetail),
    /// Another delivery for the row is already in flight; nothing was sent
    InFlight,
}

/// Aggregate result of [`TicketPipeline::send_all_pending`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Rows handed to the Delivery Channel
    pub attempted: usize,
    /// Rows the channel accepted
    pub succeeded: usize,
    /// Rows that failed
    pub failed: usize,
    /// Selected rows not sent (no recipient, or changed since selection)
    pub skipped: usize,
    /// Selected rows not reached because the batch was cancelled
    pub cancelled: usize,
    /// Sent rows whose "ticket generated" flag could not be recorded
    pub persistence_errors: usize,
}

/// Lets a caller abandon a running batch.
///
/// The batch checks the signal before each row and while waiting between
/// rows; a delivery already in flight is allowed to finish.
#[derive(Clone, Debug)]
pub struct CancelSignal(watch::Receiver<bool>);

/// Trips a [`CancelSignal`]
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelSignal {
    /// A connected handle and signal
    #[must_use]
    pub fn new() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle(tx), Self(rx))
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Sleep for `duration`; returns `true` if cancelled first
    async fn sleep(&mut self, duration: Duration) -> bool {
        let receiver = &mut self.0;
        tokio::select! {
            biased;
            Ok(_) = receiver.wait_for(|cancelled| *cancelled) => true,
            () = tokio::time::sleep(duration) => false,
        }
    }
}

impl CancelHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Row selection predicates for batch sends
pub mod eligibility {
    use crate::tracker::TicketRow;

    /// Every row
    #[must_use]
    pub const fn any(_row: &TicketRow) -> bool {
        true
    }

    /// Rows whose payment is confirmed
    #[must_use]
    pub const fn paid_only(row: &TicketRow) -> bool {
        row.record.payment.is_paid()
    }
}

/// Drives the ticket store: single-row sends, batches, and loading rows.
pub struct TicketPipeline {
    store: TicketStore,
    gateway: Option<Arc<dyn RegistrationGateway>>,
    attempts: AtomicU64,
    inter_send_delay: Duration,
    wait_timeout: Duration,
}

impl TicketPipeline {
    /// Pipeline over an empty board with a one-second pause between batch sends
    #[must_use]
    pub fn new(env: TicketEnvironment) -> Self {
        let wait_timeout = env.delivery_timeout + env.ledger_policy.total_backoff() + WAIT_SLACK;
        let gateway = env.gateway.clone();
        Self {
            store: Store::with_broadcast_capacity(
                TicketBoard::new(),
                TicketReducer::new(),
                env,
                OUTCOME_BROADCAST_CAPACITY,
            ),
            gateway,
            attempts: AtomicU64::new(0),
            inter_send_delay: Duration::from_secs(1),
            wait_timeout,
        }
    }

    /// Replace the pause between batch sends
    #[must_use]
    pub const fn with_inter_send_delay(mut self, delay: Duration) -> Self {
        self.inter_send_delay = delay;
        self
    }

    /// Whether a registration store is configured
    #[must_use]
    pub const fn has_gateway(&self) -> bool {
        self.gateway.is_some()
    }

    /// Deliver a pending or failed row
    ///
    /// # Errors
    ///
    /// See [`PipelineError`].
    pub async fn send_one(&self, row: RowId) -> Result<SendOutcome, PipelineError> {
        self.dispatch(row, SendMode::Send).await
    }

    /// Re-attempt a failed row
    ///
    /// # Errors
    ///
    /// See [`PipelineError`].
    pub async fn retry(&self, row: RowId) -> Result<SendOutcome, PipelineError> {
        self.dispatch(row, SendMode::Retry).await
    }

    /// Deliver a sent row again
    ///
    /// # Errors
    ///
    /// See [`PipelineError`].
    pub async fn resend(&self, row: RowId) -> Result<SendOutcome, PipelineError> {
        self.dispatch(row, SendMode::Resend).await
    }

    async fn dispatch(&self, row: RowId, mode: SendMode) -> Result<SendOutcome, PipelineError> {
        let attempt = AttemptId::new(self.attempts.fetch_add(1, Ordering::Relaxed) + 1);

        let terminal = self
            .store
            .send_and_wait_for(
                TicketAction::Send { row, mode, attempt },
                |action| action.concludes(attempt),
                self.wait_timeout,
            )
            .await?;

        match terminal {
            TicketAction::SendRejected { reason, .. } => match reason {
                Rejection::AlreadySending => Ok(SendOutcome::InFlight),
                Rejection::UnknownRow => Err(PipelineError::UnknownRow(row)),
                Rejection::MissingRecipient => Err(PipelineError::MissingRecipient(row)),
                Rejection::InvalidTransition { from } => {
                    Err(PipelineError::InvalidTransition { row, mode, from })
                },
            },
            TicketAction::DeliveryFailed { detail, .. } => Ok(SendOutcome::Failed(detail)),
            TicketAction::TicketRecorded { delivery_id, .. }
            | TicketAction::RecordingSkipped { delivery_id, .. } => Ok(SendOutcome::Sent {
                delivery_id,
                persistence_error: None,
            }),
            TicketAction::RecordingFailed {
                delivery_id, error, ..
            } => Ok(SendOutcome::Sent {
                delivery_id,
                persistence_error: Some(error),
            }),
            TicketAction::Load { .. }
            | TicketAction::Send { .. }
            | TicketAction::Delivered { .. } => Err(PipelineError::Store(StoreError::ChannelClosed)),
        }
    }

    /// Send every pending row accepted by `eligible`, one at a time, in row order.
    ///
    /// One row's failure never stops the batch. Cancellation is checked before
    /// each row and during the pause between rows.
    pub async fn send_all_pending<P>(
        &self,
        eligible: P,
        mut cancel: Option<CancelSignal>,
    ) -> BatchReport
    where
        P: Fn(&TicketRow) -> bool,
    {
        let selected = self
            .store
            .state(|board| board.select(|row| row.status == DeliveryStatus::Pending && eligible(row)))
            .await;

        info!(rows = selected.len(), "Starting batch send");

        let mut report = BatchReport::default();
        let mut called_channel = false;

        for (index, row) in selected.iter().copied().enumerate() {
            let remaining = selected.len() - index;

            if let Some(signal) = cancel.as_mut() {
                let cancelled = if called_channel && !self.inter_send_delay.is_zero() {
                    signal.sleep(self.inter_send_delay).await
                } else {
                    signal.is_cancelled()
                };
                if cancelled {
                    info!(remaining, "Batch cancelled");
                    report.cancelled = remaining;
                    break;
                }
            } else if called_channel && !self.inter_send_delay.is_zero() {
                tokio::time::sleep(self.inter_send_delay).await;
            }

            called_channel = false;
            match self.send_one(row).await {
                Ok(SendOutcome::Sent {
                    persistence_error, ..
                }) => {
                    called_channel = true;
                    report.attempted += 1;
                    report.succeeded += 1;
                    if persistence_error.is_some() {
                        report.persistence_errors += 1;
                    }
                },
                Ok(SendOutcome::Failed(_)) => {
                    called_channel = true;
                    report.attempted += 1;
                    report.failed += 1;
                },
                Ok(SendOutcome::InFlight)
                | Err(
                    PipelineError::MissingRecipient(_)
                    | PipelineError::UnknownRow(_)
                    | PipelineError::InvalidTransition { .. },
                ) => {
                    report.skipped += 1;
                },
                Err(PipelineError::Store(StoreError::ShutdownInProgress)) => {
                    warn!(remaining, "Store shutting down, abandoning batch");
                    report.cancelled = remaining;
                    break;
                },
                Err(PipelineError::Store(error)) => {
                    // The terminal event was missed; count the row by what the board says.
                    called_channel = true;
                    report.attempted += 1;
                    match self.row(row).await {
                        Some(entry) if entry.status == DeliveryStatus::Sent => {
                            report.succeeded += 1;
                            if entry.persistence_warning.is_some() {
                                report.persistence_errors += 1;
                            }
                        },
                        entry => {
                            let settled = entry.map_or("missing", |entry| entry.status.name());
                            warn!(%row, %error, settled, "No outcome for row");
                            report.failed += 1;
                        },
                    }
                },
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "Batch finished"
        );
        report
    }

    /// Replace the board with `records`
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if the store is shutting down.
    pub async fn load_records(
        &self,
        records: Vec<AttendeeRecord>,
    ) -> Result<Vec<RowId>, PipelineError> {
        self.store.send(TicketAction::Load { records }).await?;
        Ok(self.store.state(|board| board.rows().map(|(id, _)| id).collect()).await)
    }

    /// Parse a CSV import and load its rows
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Import`] for an unreadable file and
    /// [`LoadError::Pipeline`] if the store refuses the rows.
    pub async fn import_csv<R: Read>(&self, reader: R) -> Result<ImportReport, LoadError> {
        let report = parse_csv(reader)?;
        self.load_records(report.records.clone()).await?;
        info!(rows = report.records.len(), skipped = report.skipped, "Imported CSV");
        Ok(report)
    }

    /// Load every registration from the store
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::NoGateway`] without a registration store, and
    /// [`LoadError::Gateway`] if it cannot be read.
    pub async fn refresh_from_store(&self) -> Result<Vec<RowId>, LoadError> {
        let gateway = self.gateway.as_ref().ok_or(LoadError::NoGateway)?;
        let records = gateway.fetch_registrations().await?;
        Ok(self.load_records(records).await?)
    }

    /// Every row, in row order
    pub async fn snapshot(&self) -> Vec<(RowId, TicketRow)> {
        self.store
            .state(|board| board.rows().map(|(id, row)| (id, row.clone())).collect())
            .await
    }

    /// One row
    pub async fn row(&self, row: RowId) -> Option<TicketRow> {
        self.store.state(|board| board.get(row).cloned()).await
    }

    /// Row counts per status
    pub async fn counts(&self) -> StatusCounts {
        self.store.state(TicketBoard::counts).await
    }

    /// Stop accepting commands and wait for in-flight deliveries
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if deliveries are still running.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }
}

impl std::fmt::Debug for TicketPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketPipeline")
            .field("has_gateway", &self.gateway.is_some())
            .field("inter_send_delay", &self.inter_send_delay)
            .field("wait_timeout", &self.wait_timeout)
            .finish_non_exhaustive()
    }
}

/// Errors loading rows into the pipeline
#[derive(Error, Debug)]
pub enum LoadError {
    /// The CSV file could not be parsed
    #[error(transparent)]
    Import(#[from] ImportError),

    /// The registration store could not be read
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// No registration store is configured
    #[error("no registration store configured")]
    NoGateway,

    /// The store refused the rows
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
