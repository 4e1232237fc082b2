//! `RelayChannel` against a local relay endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use gatepass_core::delivery::{DeliveryChannel, DeliveryRequest, FailureClass};
use gatepass_core::payload::ImageArtifact;
use gatepass_mailer::{RelayChannel, RelayRequest};
use serde_json::{Value, json};
use std::time::Duration;

/// Accepts anyone except `reject@example.com` (400) and `down@example.com` (500).
async fn relay(Json(body): Json<RelayRequest>) -> (StatusCode, Json<Value>) {
    assert!(body.qr_code.starts_with("data:image/png;base64,"));
    match body.email.as_str() {
        "reject@example.com" => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "Missing required parameters" })),
        ),
        "down@example.com" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": "Failed to send email: connection refused" })),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Ticket email sent successfully", "emailId": "<abc@relay>" })),
        ),
    }
}

async fn start_relay() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/api/send-qr-email", post(relay));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("relay server failed");
    });
    format!("http://{addr}/api/send-qr-email")
}

fn request(to: &str) -> DeliveryRequest {
    DeliveryRequest {
        recipient_email: to.to_string(),
        display_name: "Asha".to_string(),
        image: ImageArtifact {
            png: vec![0x89, b'P', b'N', b'G'],
            width: 1,
            height: 1,
        },
    }
}

#[tokio::test]
async fn accepted_message_returns_relay_id() {
    let channel = RelayChannel::new(start_relay().await, Duration::from_secs(5)).unwrap();
    let id = channel.send(request("asha@example.com")).await.unwrap();
    assert_eq!(id.as_str(), "<abc@relay>");
}

#[tokio::test]
async fn client_rejection_is_surfaced_verbatim() {
    let channel = RelayChannel::new(start_relay().await, Duration::from_secs(5)).unwrap();
    let err = channel.send(request("reject@example.com")).await.unwrap_err();
    assert_eq!(err.class, FailureClass::Client);
    assert_eq!(err.message, "Missing required parameters");
}

#[tokio::test]
async fn relay_failure_is_a_server_error() {
    let channel = RelayChannel::new(start_relay().await, Duration::from_secs(5)).unwrap();
    let err = channel.send(request("down@example.com")).await.unwrap_err();
    assert_eq!(err.class, FailureClass::Server);
    assert!(err.message.contains("connection refused"));
}

#[tokio::test]
async fn unreachable_relay_is_a_server_error() {
    let channel =
        RelayChannel::new("http://127.0.0.1:9/api/send-qr-email", Duration::from_secs(2)).unwrap();
    let err = channel.send(request("asha@example.com")).await.unwrap_err();
    assert_eq!(err.class, FailureClass::Server);
}
