//! Ticket reducer: all send decisions, as a pure function over the board.
//!
//! The reducer validates each send request against the row's status, moves the
//! row to `Sending`, and returns an effect that renders the ticket and calls the
//! Delivery Channel. Completion events come back through the store and settle
//! the row; a delivered ticket then gets its "ticket generated" flag recorded.

use super::actions::{AttemptId, Rejection, SendMode, TicketAction};
use super::environment::TicketEnvironment;
use crate::tracker::{DeliveryStatus, FailureDetail, RowId, TicketBoard};
use gatepass_core::attendee::AttendeeRecord;
use gatepass_core::delivery::{DeliveryId, DeliveryRequest, FailureClass};
use gatepass_core::registry::GatewayError;
use gatepass_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use gatepass_runtime::retry::retry_with_predicate;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

type Effects = SmallVec<[Effect<TicketAction>; 4]>;

/// Reducer for the ticket board
#[derive(Clone, Copy, Debug, Default)]
pub struct TicketReducer;

impl TicketReducer {
    /// Creates a new `TicketReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(row: RowId, attempt: AttemptId, reason: Rejection) -> Effects {
        debug!(%row, %attempt, ?reason, "Send rejected");
        metrics::counter!("tickets.delivery.rejected").increment(1);
        smallvec![Effect::emit(TicketAction::SendRejected {
            row,
            attempt,
            reason
        })]
    }

    fn start_send(
        state: &mut TicketBoard,
        row: RowId,
        mode: SendMode,
        attempt: AttemptId,
        env: &TicketEnvironment,
    ) -> Effects {
        let Some(entry) = state.get(row) else {
            return Self::reject(row, attempt, Rejection::UnknownRow);
        };

        if entry.status.is_sending() {
            return Self::reject(row, attempt, Rejection::AlreadySending);
        }

        if entry.record.recipient().is_none() {
            return Self::reject(row, attempt, Rejection::MissingRecipient);
        }

        let allowed = matches!(
            (mode, &entry.status),
            (SendMode::Send, DeliveryStatus::Pending | DeliveryStatus::Failed(_))
                | (SendMode::Retry, DeliveryStatus::Failed(_))
                | (SendMode::Resend, DeliveryStatus::Sent)
        );
        if !allowed {
            let from = entry.status.name();
            return Self::reject(row, attempt, Rejection::InvalidTransition { from });
        }

        let record = entry.record.clone();
        if let Err(error) = state.set(row, DeliveryStatus::Sending, env.clock.now()) {
            warn!(%row, %error, "Could not start send");
            let from = state.get(row).map_or("unknown", |r| r.status.name());
            return Self::reject(row, attempt, Rejection::InvalidTransition { from });
        }

        info!(%row, %attempt, %mode, recipient = record.recipient(), "Sending ticket");
        smallvec![Self::deliver(row, attempt, record, env)]
    }

    /// Render the ticket and hand it to the channel, bounded by the delivery timeout
    fn deliver(
        row: RowId,
        attempt: AttemptId,
        record: AttendeeRecord,
        env: &TicketEnvironment,
    ) -> Effect<TicketAction> {
        let channel = Arc::clone(&env.channel);
        let encoder = env.encoder;
        let timeout = env.delivery_timeout;

        Effect::future(async move {
            let started = Instant::now();

            let outcome: Result<DeliveryId, FailureDetail> = async {
                let image = encoder
                    .encode(&record)
                    .map_err(|e| FailureDetail::new(e.to_string(), None))?;
                let request = DeliveryRequest {
                    recipient_email: record.email.clone().unwrap_or_default(),
                    display_name: record.name.clone(),
                    image,
                };

                match tokio::time::timeout(timeout, channel.send(request)).await {
                    Ok(result) => result.map_err(FailureDetail::from),
                    Err(_) => Err(FailureDetail::new(
                        format!("delivery timed out after {} ms", timeout.as_millis()),
                        Some(FailureClass::Server),
                    )),
                }
            }
            .await;

            metrics::histogram!("tickets.delivery.duration_seconds")
                .record(started.elapsed().as_secs_f64());

            Some(match outcome {
                Ok(delivery_id) => {
                    metrics::counter!("tickets.delivery.sent").increment(1);
                    TicketAction::Delivered {
                        row,
                        attempt,
                        delivery_id,
                    }
                },
                Err(detail) => {
                    metrics::counter!("tickets.delivery.failed").increment(1);
                    TicketAction::DeliveryFailed {
                        row,
                        attempt,
                        detail,
                    }
                },
            })
        })
    }

    /// Settle a delivered row and decide whether the store needs the flag
    fn delivered(
        state: &mut TicketBoard,
        row: RowId,
        attempt: AttemptId,
        delivery_id: DeliveryId,
        env: &TicketEnvironment,
    ) -> Effects {
        if let Err(error) = state.set(row, DeliveryStatus::Sent, env.clock.now()) {
            warn!(%row, %attempt, %error, %delivery_id, "Delivery completed for a row that is no longer sending");
            return smallvec![Effect::emit(TicketAction::RecordingSkipped {
                row,
                attempt,
                delivery_id
            })];
        }
        state.record_delivery(row, delivery_id.clone());
        info!(%row, %attempt, %delivery_id, "Ticket delivered");

        let target = state
            .get(row)
            .filter(|entry| !entry.record.ticket_generated)
            .and_then(|entry| entry.record.id.map(|id| (id, entry.record.category())));

        match (target, &env.gateway) {
            (Some((id, category)), Some(gateway)) => {
                let gateway = Arc::clone(gateway);
                let policy = env.ledger_policy.clone();

                smallvec![Effect::future(async move {
                    let result = retry_with_predicate(
                        &policy,
                        || gateway.mark_ticket_generated(id, category),
                        |e| matches!(e, GatewayError::Unavailable(_)),
                    )
                    .await;

                    Some(match result {
                        Ok(()) => TicketAction::TicketRecorded {
                            row,
                            attempt,
                            delivery_id,
                        },
                        Err(error) => {
                            metrics::counter!("tickets.ledger.failed").increment(1);
                            TicketAction::RecordingFailed {
                                row,
                                attempt,
                                delivery_id,
                                error: error.to_string(),
                            }
                        },
                    })
                })]
            },
            _ => {
                debug!(%row, "No registration flag to record");
                smallvec![Effect::emit(TicketAction::RecordingSkipped {
                    row,
                    attempt,
                    delivery_id
                })]
            },
        }
    }
}

impl Reducer for TicketReducer {
    type State = TicketBoard;
    type Action = TicketAction;
    type Environment = TicketEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            TicketAction::Load { records } => {
                let rows = state.load(records, env.clock.now());
                info!(rows = rows.len(), "Loaded attendee rows");
                SmallVec::new()
            },

            TicketAction::Send { row, mode, attempt } => {
                Self::start_send(state, row, mode, attempt, env)
            },

            // ========== Events ==========
            TicketAction::Delivered {
                row,
                attempt,
                delivery_id,
            } => Self::delivered(state, row, attempt, delivery_id, env),

            TicketAction::DeliveryFailed {
                row,
                attempt,
                detail,
            } => {
                warn!(%row, %attempt, error = %detail, "Ticket delivery failed");
                if let Err(error) = state.set(row, DeliveryStatus::Failed(detail), env.clock.now())
                {
                    warn!(%row, %error, "Failure arrived for a row that is no longer sending");
                }
                SmallVec::new()
            },

            TicketAction::TicketRecorded { row, attempt, .. } => {
                debug!(%row, %attempt, "Ticket flag recorded");
                state.mark_ticketed(row);
                SmallVec::new()
            },

            TicketAction::RecordingFailed {
                row,
                attempt,
                error,
                ..
            } => {
                warn!(%row, %attempt, %error, "Ticket delivered but flag not recorded");
                state.warn(row, error);
                SmallVec::new()
            },

            TicketAction::RecordingSkipped { .. } | TicketAction::SendRejected { .. } => {
                SmallVec::new()
            },
        }
    }
}
