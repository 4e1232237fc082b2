//! Ticket delivery pipeline.
//!
//! - [`actions`]: commands and events
//! - [`reducer`]: row state machine and delivery effects
//! - [`environment`]: channel, registration store, encoder, clock
//! - [`orchestrator`]: single-row operations and batch sends

pub mod actions;
pub mod environment;
pub mod orchestrator;
pub mod reducer;

pub use actions::{AttemptId, Rejection, SendMode, TicketAction};
pub use environment::TicketEnvironment;
pub use orchestrator::{
    BatchReport, CancelHandle, CancelSignal, LoadError, PipelineError, SendOutcome,
    TicketPipeline, TicketStore, eligibility,
};
pub use reducer::TicketReducer;
