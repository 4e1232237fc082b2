//! # Ticket Desk
//!
//! Generates QR tickets for event registrations and delivers them by email,
//! tracking the delivery status of every attendee row.
//!
//! - [`qr`]: QR Payload Encoder
//! - [`tracker`]: Per-Row Status Tracker
//! - [`import`]: Bulk Import Parser
//! - [`pipeline`]: Ticket Pipeline Orchestrator
//! - [`server`]: HTTP surface
//! - [`config`]: configuration from environment variables

pub mod config;
pub mod import;
pub mod pipeline;
pub mod qr;
pub mod server;
pub mod tracker;

pub use pipeline::{BatchReport, PipelineError, SendOutcome, TicketPipeline};
pub use tracker::{DeliveryStatus, RowId, TicketBoard, TicketRow};
