//! End-to-end tests of the ticket pipeline against scripted doubles.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use futures::future::BoxFuture;
use gatepass_core::attendee::{AttendeeRecord, RegistrationCategory, RegistrationId};
use gatepass_core::delivery::{DeliveryChannel, DeliveryError, FailureClass};
use gatepass_core::registry::{GatewayError, RegistrationGateway};
use gatepass_runtime::retry::RetryPolicy;
use gatepass_testing::helpers::{imported, paid_alumni, paid_student};
use gatepass_testing::{InMemoryGateway, ScriptedChannel, ScriptedOutcome, test_clock};
use std::sync::Arc;
use std::time::Duration;
use ticket_desk::pipeline::{
    BatchReport, CancelSignal, LoadError, PipelineError, SendMode, SendOutcome,
    TicketEnvironment, TicketPipeline, eligibility,
};
use ticket_desk::qr::QrEncoder;
use ticket_desk::tracker::{DeliveryStatus, RowId};

fn pipeline_with(
    channel: &Arc<ScriptedChannel>,
    gateway: Option<&Arc<InMemoryGateway>>,
) -> TicketPipeline {
    let channel: Arc<dyn DeliveryChannel> = channel.clone();
    let gateway: Option<Arc<dyn RegistrationGateway>> = match gateway {
        Some(gateway) => Some(gateway.clone()),
        None => None,
    };
    let env = TicketEnvironment::new(channel, gateway)
        .with_encoder(QrEncoder::new(120, 1))
        .with_delivery_timeout(Duration::from_millis(500))
        .with_ledger_policy(RetryPolicy::no_retry())
        .with_clock(Arc::new(test_clock()));
    TicketPipeline::new(env).with_inter_send_delay(Duration::ZERO)
}

async fn statuses(pipeline: &TicketPipeline) -> Vec<&'static str> {
    pipeline
        .snapshot()
        .await
        .iter()
        .map(|(_, row)| row.status.name())
        .collect()
}

#[tokio::test]
async fn batch_skips_rows_without_recipient() {
    let channel = Arc::new(ScriptedChannel::new());
    let pipeline = pipeline_with(&channel, None);
    pipeline
        .load_records(vec![
            imported("Asha", "asha@example.com"),
            imported("Bilal", "bilal@example.com"),
            AttendeeRecord::student("Chitra", ""),
        ])
        .await
        .unwrap();

    let report = pipeline.send_all_pending(eligibility::any, None).await;

    assert_eq!(
        report,
        BatchReport {
            attempted: 2,
            succeeded: 2,
            failed: 0,
            skipped: 1,
            cancelled: 0,
            persistence_errors: 0,
        }
    );
    assert_eq!(channel.call_count(), 2);
    assert_eq!(statuses(&pipeline).await, ["sent", "sent", "pending"]);
}

#[tokio::test]
async fn failed_row_recovers_on_retry() {
    let channel = Arc::new(ScriptedChannel::new());
    channel.fail_for("bilal@example.com", DeliveryError::server("relay unavailable"));
    let pipeline = pipeline_with(&channel, None);
    let rows = pipeline
        .load_records(vec![
            imported("Asha", "asha@example.com"),
            imported("Bilal", "bilal@example.com"),
            imported("Chitra", "chitra@example.com"),
        ])
        .await
        .unwrap();

    let report = pipeline.send_all_pending(eligibility::any, None).await;
    assert_eq!((report.succeeded, report.failed), (2, 1));
    assert_eq!(statuses(&pipeline).await, ["sent", "failed", "sent"]);

    let failed = pipeline.row(rows[1]).await.unwrap();
    match failed.status {
        DeliveryStatus::Failed(detail) => {
            assert_eq!(detail.message, "relay unavailable");
            assert_eq!(detail.class, Some(FailureClass::Server));
        },
        other => panic!("expected failed, got {other:?}"),
    }

    channel.recover("bilal@example.com");
    let outcome = pipeline.retry(rows[1]).await.unwrap();

    assert!(matches!(outcome, SendOutcome::Sent { .. }));
    assert_eq!(statuses(&pipeline).await, ["sent", "sent", "sent"]);
    assert_eq!(channel.calls_to("bilal@example.com"), 2);
}

#[tokio::test]
async fn resend_makes_exactly_one_more_call() {
    let channel = Arc::new(ScriptedChannel::new());
    let pipeline = pipeline_with(&channel, None);
    let rows = pipeline
        .load_records(vec![imported("Asha", "asha@example.com")])
        .await
        .unwrap();

    pipeline.send_one(rows[0]).await.unwrap();
    assert_eq!(channel.call_count(), 1);

    let outcome = pipeline.resend(rows[0]).await.unwrap();

    assert!(matches!(outcome, SendOutcome::Sent { .. }));
    assert_eq!(channel.call_count(), 2);
    let row = pipeline.row(rows[0]).await.unwrap();
    assert_eq!(row.status, DeliveryStatus::Sent);
    assert_eq!(row.attempts, 2);
}

#[tokio::test]
async fn ledger_failure_keeps_row_sent() {
    let channel = Arc::new(ScriptedChannel::new());
    let gateway = Arc::new(InMemoryGateway::with_records(vec![paid_student(
        7,
        "Asha",
        "asha@example.com",
    )]));
    gateway.fail_writes(GatewayError::Unavailable("connection reset".to_string()));
    let pipeline = pipeline_with(&channel, Some(&gateway));
    let rows = pipeline.refresh_from_store().await.unwrap();

    let outcome = pipeline.send_one(rows[0]).await.unwrap();

    match outcome {
        SendOutcome::Sent {
            persistence_error: Some(error),
            ..
        } => assert!(error.contains("connection reset"), "{error}"),
        other => panic!("expected sent with persistence error, got {other:?}"),
    }
    let row = pipeline.row(rows[0]).await.unwrap();
    assert_eq!(row.status, DeliveryStatus::Sent);
    assert!(row.persistence_warning.is_some());
    assert!(gateway.marks().is_empty());
}

#[tokio::test]
async fn batch_counts_persistence_errors_separately() {
    let channel = Arc::new(ScriptedChannel::new());
    let gateway = Arc::new(InMemoryGateway::with_records(vec![
        paid_student(1, "Asha", "asha@example.com"),
        paid_alumni(1, "Bilal", "bilal@example.com"),
    ]));
    gateway.fail_next_writes(1, GatewayError::Unavailable("timeout".to_string()));
    let pipeline = pipeline_with(&channel, Some(&gateway));
    pipeline.refresh_from_store().await.unwrap();

    let report = pipeline.send_all_pending(eligibility::paid_only, None).await;

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.persistence_errors, 1);
    assert_eq!(
        gateway.marks(),
        vec![(RegistrationId::new(1), RegistrationCategory::Alumni)]
    );
}

#[tokio::test]
async fn successful_send_flags_registration() {
    let channel = Arc::new(ScriptedChannel::new());
    let gateway = Arc::new(InMemoryGateway::with_records(vec![paid_alumni(
        3,
        "Asha",
        "asha@example.com",
    )]));
    let pipeline = pipeline_with(&channel, Some(&gateway));
    let rows = pipeline.refresh_from_store().await.unwrap();

    let outcome = pipeline.send_one(rows[0]).await.unwrap();

    assert!(matches!(
        outcome,
        SendOutcome::Sent {
            persistence_error: None,
            ..
        }
    ));
    assert_eq!(
        gateway.marks(),
        vec![(RegistrationId::new(3), RegistrationCategory::Alumni)]
    );
    assert!(gateway.records()[0].ticket_generated);
}

#[tokio::test]
async fn refresh_starts_flagged_rows_as_sent() {
    let channel = Arc::new(ScriptedChannel::new());
    let gateway = Arc::new(InMemoryGateway::with_records(vec![
        paid_student(1, "Asha", "asha@example.com").with_ticket_generated(true),
        paid_student(2, "Bilal", "bilal@example.com"),
    ]));
    let pipeline = pipeline_with(&channel, Some(&gateway));
    pipeline.refresh_from_store().await.unwrap();

    assert_eq!(statuses(&pipeline).await, ["sent", "pending"]);

    let report = pipeline.send_all_pending(eligibility::any, None).await;
    assert_eq!(report.attempted, 1);
    assert_eq!(channel.recipients(), ["bilal@example.com"]);
}

#[tokio::test]
async fn refresh_without_store_fails() {
    let channel = Arc::new(ScriptedChannel::new());
    let pipeline = pipeline_with(&channel, None);

    assert!(matches!(
        pipeline.refresh_from_store().await,
        Err(LoadError::NoGateway)
    ));
}

#[tokio::test]
async fn refresh_surfaces_read_failure() {
    let channel = Arc::new(ScriptedChannel::new());
    let gateway = Arc::new(InMemoryGateway::default());
    gateway.fail_reads(GatewayError::Unavailable("down".to_string()));
    let pipeline = pipeline_with(&channel, Some(&gateway));

    assert!(matches!(
        pipeline.refresh_from_store().await,
        Err(LoadError::Gateway(GatewayError::Unavailable(_)))
    ));
}

#[tokio::test]
async fn concurrent_sends_deliver_once() {
    let channel = Arc::new(ScriptedChannel::new().with_latency(Duration::from_millis(100)));
    let pipeline = pipeline_with(&channel, None);
    let rows = pipeline
        .load_records(vec![imported("Asha", "asha@example.com")])
        .await
        .unwrap();

    let (first, second) = tokio::join!(pipeline.send_one(rows[0]), pipeline.send_one(rows[0]));

    let mut outcomes = [first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|outcome| matches!(outcome, SendOutcome::InFlight));
    assert!(matches!(outcomes[0], SendOutcome::Sent { .. }));
    assert_eq!(outcomes[1], SendOutcome::InFlight);
    assert_eq!(channel.call_count(), 1);
}

#[tokio::test]
async fn batch_preserves_selection_order() {
    let channel = Arc::new(ScriptedChannel::new());
    let pipeline = pipeline_with(&channel, None);
    let emails = ["d@example.com", "a@example.com", "c@example.com", "b@example.com"];
    pipeline
        .load_records(emails.iter().map(|e| imported("Guest", e)).collect())
        .await
        .unwrap();

    pipeline.send_all_pending(eligibility::any, None).await;

    assert_eq!(channel.recipients(), emails);
}

#[tokio::test]
async fn one_failure_does_not_stop_the_batch() {
    let channel = Arc::new(ScriptedChannel::new());
    channel.push_outcome(ScriptedOutcome::Reject(DeliveryError::client(
        "mailbox unavailable",
    )));
    let pipeline = pipeline_with(&channel, None);
    pipeline
        .load_records(vec![
            imported("Asha", "asha@example.com"),
            imported("Bilal", "bilal@example.com"),
        ])
        .await
        .unwrap();

    let report = pipeline.send_all_pending(eligibility::any, None).await;

    assert_eq!((report.attempted, report.succeeded, report.failed), (2, 1, 1));
    assert_eq!(statuses(&pipeline).await, ["failed", "sent"]);
}

#[tokio::test]
async fn hanging_channel_times_out_as_failure() {
    let channel = Arc::new(ScriptedChannel::new());
    channel.hang_for("asha@example.com");
    let pipeline = pipeline_with(&channel, None);
    let rows = pipeline
        .load_records(vec![imported("Asha", "asha@example.com")])
        .await
        .unwrap();

    let outcome = pipeline.send_one(rows[0]).await.unwrap();

    match outcome {
        SendOutcome::Failed(detail) => {
            assert_eq!(detail.class, Some(FailureClass::Server));
            assert!(detail.message.contains("timed out"), "{}", detail.message);
        },
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(statuses(&pipeline).await, ["failed"]);
}

#[tokio::test]
async fn cancelled_batch_stops_before_next_row() {
    let channel = Arc::new(ScriptedChannel::new());
    let pipeline = pipeline_with(&channel, None);
    pipeline
        .load_records(vec![
            imported("Asha", "asha@example.com"),
            imported("Bilal", "bilal@example.com"),
        ])
        .await
        .unwrap();
    let (handle, signal) = CancelSignal::new();
    handle.cancel();

    let report = pipeline.send_all_pending(eligibility::any, Some(signal)).await;

    assert_eq!(report.attempted, 0);
    assert_eq!(report.cancelled, 2);
    assert_eq!(channel.call_count(), 0);
    assert_eq!(statuses(&pipeline).await, ["pending", "pending"]);
}

#[tokio::test]
async fn cancel_during_delay_leaves_remaining_rows_pending() {
    let channel = Arc::new(ScriptedChannel::new());
    let pipeline =
        Arc::new(pipeline_with(&channel, None).with_inter_send_delay(Duration::from_secs(30)));
    pipeline
        .load_records(vec![
            imported("Asha", "asha@example.com"),
            imported("Bilal", "bilal@example.com"),
            imported("Chitra", "chitra@example.com"),
        ])
        .await
        .unwrap();
    let (handle, signal) = CancelSignal::new();

    let batch = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        async move { pipeline.send_all_pending(eligibility::any, Some(signal)).await }
    });
    while channel.call_count() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    handle.cancel();
    let report = tokio::time::timeout(Duration::from_secs(5), batch)
        .await
        .expect("batch did not stop")
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.cancelled, 2);
    assert_eq!(statuses(&pipeline).await, ["sent", "pending", "pending"]);
}

#[tokio::test]
async fn operations_reject_wrong_status() {
    let channel = Arc::new(ScriptedChannel::new());
    let pipeline = pipeline_with(&channel, None);
    let rows = pipeline
        .load_records(vec![imported("Asha", "asha@example.com")])
        .await
        .unwrap();

    assert_eq!(
        pipeline.retry(rows[0]).await,
        Err(PipelineError::InvalidTransition {
            row: rows[0],
            mode: SendMode::Retry,
            from: "pending",
        })
    );
    assert_eq!(
        pipeline.resend(rows[0]).await,
        Err(PipelineError::InvalidTransition {
            row: rows[0],
            mode: SendMode::Resend,
            from: "pending",
        })
    );

    pipeline.send_one(rows[0]).await.unwrap();
    assert!(matches!(
        pipeline.send_one(rows[0]).await,
        Err(PipelineError::InvalidTransition { from: "sent", .. })
    ));
    assert_eq!(
        pipeline.send_one(RowId::new(99)).await,
        Err(PipelineError::UnknownRow(RowId::new(99)))
    );
    assert_eq!(channel.call_count(), 1);
}

#[tokio::test]
async fn missing_recipient_never_reaches_channel() {
    let channel = Arc::new(ScriptedChannel::new());
    let pipeline = pipeline_with(&channel, None);
    let rows = pipeline
        .load_records(vec![AttendeeRecord::student("Asha", "")])
        .await
        .unwrap();

    assert_eq!(
        pipeline.send_one(rows[0]).await,
        Err(PipelineError::MissingRecipient(rows[0]))
    );
    assert_eq!(channel.call_count(), 0);
    assert_eq!(statuses(&pipeline).await, ["pending"]);
}

#[tokio::test]
async fn csv_import_loads_board() {
    let channel = Arc::new(ScriptedChannel::new());
    let pipeline = pipeline_with(&channel, None);
    let csv = "Student Name,Email,JIS ID\nAsha,asha@example.com,JIS/1\nBilal,,JIS/2\n";

    let report = pipeline.import_csv(csv.as_bytes()).await.unwrap();

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(pipeline.counts().await.pending, 1);
}

#[tokio::test]
async fn shutdown_rejects_new_sends() {
    let channel = Arc::new(ScriptedChannel::new());
    let pipeline = pipeline_with(&channel, None);
    let rows = pipeline
        .load_records(vec![imported("Asha", "asha@example.com")])
        .await
        .unwrap();

    pipeline.shutdown(Duration::from_secs(1)).await.unwrap();

    assert!(matches!(
        pipeline.send_one(rows[0]).await,
        Err(PipelineError::Store(_))
    ));
    assert_eq!(channel.call_count(), 0);
}

#[tokio::test]
async fn shutdown_settles_delivery_in_flight() {
    let channel = Arc::new(ScriptedChannel::new().with_latency(Duration::from_millis(100)));
    let gateway = Arc::new(InMemoryGateway::with_records(vec![paid_student(
        5,
        "Asha",
        "asha@example.com",
    )]));
    let pipeline = Arc::new(pipeline_with(&channel, Some(&gateway)));
    let rows = pipeline.refresh_from_store().await.unwrap();

    let sending = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.send_one(rows[0]).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    pipeline.shutdown(Duration::from_secs(2)).await.unwrap();

    assert_eq!(channel.call_count(), 1);
    assert_eq!(statuses(&pipeline).await, ["sent"]);
    assert_eq!(
        gateway.marks(),
        vec![(RegistrationId::new(5), RegistrationCategory::Student)]
    );
    assert!(matches!(
        sending.await.unwrap(),
        Ok(SendOutcome::Sent { .. })
    ));
}

/// Registration store whose flag write never returns
struct StalledLedger(InMemoryGateway);

impl RegistrationGateway for StalledLedger {
    fn fetch_registrations(&self) -> BoxFuture<'_, Result<Vec<AttendeeRecord>, GatewayError>> {
        self.0.fetch_registrations()
    }

    fn mark_ticket_generated(
        &self,
        _id: RegistrationId,
        _category: RegistrationCategory,
    ) -> BoxFuture<'_, Result<(), GatewayError>> {
        Box::pin(std::future::pending::<Result<(), GatewayError>>())
    }
}

#[tokio::test(start_paused = true)]
async fn batch_counts_unanswered_row_by_its_settled_status() {
    let channel = Arc::new(ScriptedChannel::new());
    let gateway: Arc<dyn RegistrationGateway> = Arc::new(StalledLedger(
        InMemoryGateway::with_records(vec![paid_student(9, "Asha", "asha@example.com")]),
    ));
    let env = TicketEnvironment::new(channel.clone(), Some(gateway))
        .with_encoder(QrEncoder::new(120, 1))
        .with_delivery_timeout(Duration::from_millis(500))
        .with_ledger_policy(RetryPolicy::no_retry())
        .with_clock(Arc::new(test_clock()));
    let pipeline = TicketPipeline::new(env).with_inter_send_delay(Duration::ZERO);
    pipeline.refresh_from_store().await.unwrap();

    let report = pipeline.send_all_pending(eligibility::any, None).await;

    assert_eq!(channel.call_count(), 1);
    assert_eq!(statuses(&pipeline).await, ["sent"]);
    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
}
