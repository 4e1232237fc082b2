//! Ticket board endpoints.

use super::error::ApiError;
use super::state::AppState;
use crate::pipeline::{BatchReport, CancelSignal, SendOutcome, TicketPipeline, eligibility};
use crate::tracker::{FailureDetail, RowId, StatusCounts, TicketRow};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use gatepass_core::delivery::DeliveryId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// One row as listed by the API
#[derive(Debug, Serialize)]
pub struct RowView {
    /// Row id used by the send endpoints
    pub row: RowId,
    /// Row state
    #[serde(flatten)]
    pub ticket: TicketRow,
}

/// Response of `GET /api/tickets`
#[derive(Debug, Serialize)]
pub struct BoardResponse {
    /// Rows in load order
    pub rows: Vec<RowView>,
    /// Rows per status
    pub counts: StatusCounts,
}

/// Response of the import and refresh endpoints
#[derive(Debug, Serialize)]
pub struct LoadResponse {
    /// Rows now on the board
    pub loaded: usize,
    /// CSV rows excluded for a blank name or email
    pub skipped: usize,
}

/// Result of one send, retry, or resend
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendResponse {
    /// The channel accepted the ticket
    Sent {
        /// Channel message id
        delivery_id: DeliveryId,
        /// Set when the store could not record the ticket
        #[serde(skip_serializing_if = "Option::is_none")]
        persistence_error: Option<String>,
    },
    /// The attempt failed
    Failed {
        /// Reason
        error: FailureDetail,
    },
    /// A delivery for the row is already in flight
    InFlight,
}

impl From<SendOutcome> for SendResponse {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::Sent {
                delivery_id,
                persistence_error,
            } => Self::Sent {
                delivery_id,
                persistence_error,
            },
            SendOutcome::Failed(error) => Self::Failed { error },
            SendOutcome::InFlight => Self::InFlight,
        }
    }
}

/// Body of `POST /api/tickets/send-pending`
#[derive(Debug, Default, Deserialize)]
pub struct SendPendingRequest {
    /// Only send rows whose payment is confirmed
    #[serde(default)]
    pub paid_only: bool,
}

/// `GET /api/tickets`
pub async fn list_tickets(State(state): State<AppState>) -> Json<BoardResponse> {
    let rows = state
        .pipeline
        .snapshot()
        .await
        .into_iter()
        .map(|(row, ticket)| RowView { row, ticket })
        .collect();
    let counts = state.pipeline.counts().await;
    Json(BoardResponse { rows, counts })
}

/// `POST /api/tickets/import` with a CSV body
///
/// # Errors
///
/// 422 when a required column is missing, 400 for malformed CSV.
pub async fn import_tickets(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<LoadResponse>, ApiError> {
    let report = state.pipeline.import_csv(body.as_bytes()).await?;
    Ok(Json(LoadResponse {
        loaded: report.records.len(),
        skipped: report.skipped,
    }))
}

/// `POST /api/tickets/refresh`: reload the board from the registration store
///
/// # Errors
///
/// 409 without a registration store, 500 if it cannot be read.
pub async fn refresh_tickets(
    State(state): State<AppState>,
) -> Result<Json<LoadResponse>, ApiError> {
    let rows = state.pipeline.refresh_from_store().await?;
    Ok(Json(LoadResponse {
        loaded: rows.len(),
        skipped: 0,
    }))
}

/// `POST /api/tickets/:row/send`
///
/// # Errors
///
/// 404 unknown row, 422 no email address, 409 row already sent.
pub async fn send_ticket(
    State(state): State<AppState>,
    Path(row): Path<u64>,
) -> Result<Json<SendResponse>, ApiError> {
    let outcome = state.pipeline.send_one(RowId::new(row)).await?;
    Ok(Json(outcome.into()))
}

/// `POST /api/tickets/:row/retry`
///
/// # Errors
///
/// 404 unknown row, 422 no email address, 409 row not failed.
pub async fn retry_ticket(
    State(state): State<AppState>,
    Path(row): Path<u64>,
) -> Result<Json<SendResponse>, ApiError> {
    let outcome = state.pipeline.retry(RowId::new(row)).await?;
    Ok(Json(outcome.into()))
}

/// `POST /api/tickets/:row/resend`
///
/// # Errors
///
/// 404 unknown row, 422 no email address, 409 row not sent.
pub async fn resend_ticket(
    State(state): State<AppState>,
    Path(row): Path<u64>,
) -> Result<Json<SendResponse>, ApiError> {
    let outcome = state.pipeline.resend(RowId::new(row)).await?;
    Ok(Json(outcome.into()))
}

impl SendPendingRequest {
    /// Parse a request body; an empty body sends every pending row
    ///
    /// # Errors
    ///
    /// 400 when the body is present but is not a valid request.
    pub fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("Invalid send-pending request: {e}")))
    }
}

/// `POST /api/tickets/send-pending`: run one batch to completion
///
/// The body is read as JSON whatever its content type, so a filter is never
/// silently dropped.
///
/// # Errors
///
/// 400 for a malformed body, 409 when a batch is already running.
pub async fn send_pending(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BatchReport>, ApiError> {
    let request = SendPendingRequest::from_body(&body)?;

    let signal = {
        let mut batch = state.batch.lock().await;
        if batch.is_some() {
            return Err(ApiError::conflict("A batch is already running"));
        }
        let (handle, signal) = CancelSignal::new();
        *batch = Some(handle);
        signal
    };

    // Detached so a client disconnect neither aborts the batch nor leaks the slot.
    let task_state = state.clone();
    let report = tokio::spawn(async move {
        let report = run_batch(&task_state.pipeline, request.paid_only, signal).await;
        task_state.batch.lock().await.take();
        report
    })
    .await
    .map_err(|e| ApiError::internal(format!("Batch task failed: {e}")))?;

    Ok(Json(report))
}

async fn run_batch(
    pipeline: &Arc<TicketPipeline>,
    paid_only: bool,
    signal: CancelSignal,
) -> BatchReport {
    if paid_only {
        pipeline
            .send_all_pending(eligibility::paid_only, Some(signal))
            .await
    } else {
        pipeline.send_all_pending(eligibility::any, Some(signal)).await
    }
}

/// `POST /api/tickets/send-pending/cancel`
///
/// # Errors
///
/// 404 when no batch is running.
pub async fn cancel_pending(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let batch = state.batch.lock().await;
    let handle = batch
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Batch", "current"))?;
    handle.cancel();
    info!("Batch cancellation requested");
    Ok(StatusCode::ACCEPTED)
}
