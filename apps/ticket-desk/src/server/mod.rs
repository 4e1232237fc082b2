//! HTTP server for the ticket desk.
//!
//! - Application state shared by handlers
//! - Health check
//! - Ticket board and batch endpoints
//! - The single-ticket relay endpoint

pub mod error;
pub mod health;
pub mod relay;
pub mod routes;
pub mod state;
pub mod tickets;

pub use error::ApiError;
pub use health::health_check;
pub use routes::build_router;
pub use state::AppState;
