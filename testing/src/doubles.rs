//! Test doubles for the Delivery Channel and the registration store.

use futures::future::BoxFuture;
use gatepass_core::attendee::{AttendeeRecord, RegistrationCategory, RegistrationId};
use gatepass_core::delivery::{DeliveryChannel, DeliveryError, DeliveryId, DeliveryRequest};
use gatepass_core::registry::{GatewayError, RegistrationGateway};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a scripted delivery does
#[derive(Clone, Debug)]
pub enum ScriptedOutcome {
    /// Accept the message
    Accept,
    /// Reject with the given error
    Reject(DeliveryError),
    /// Never answer
    Hang,
}

/// A Delivery Channel whose answers are set by the test.
///
/// Resolution order for each call: queued outcomes first, then a per-recipient
/// rule, otherwise accept. Every call is recorded,
/// including ones that fail or hang.
#[derive(Debug)]
pub struct ScriptedChannel {
    queue: Mutex<VecDeque<ScriptedOutcome>>,
    per_recipient: Mutex<HashMap<String, ScriptedOutcome>>,
    calls: Mutex<Vec<DeliveryRequest>>,
    latency: Duration,
    sequence: AtomicU64,
}

impl Default for ScriptedChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedChannel {
    /// A channel that accepts everything immediately
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            per_recipient: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            sequence: AtomicU64::new(0),
        }
    }

    /// Delay every answer by `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer the next call with `outcome`, ahead of any rule
    pub fn push_outcome(&self, outcome: ScriptedOutcome) {
        lock(&self.queue).push_back(outcome);
    }

    /// Reject every message to `recipient`
    pub fn fail_for(&self, recipient: &str, error: DeliveryError) {
        lock(&self.per_recipient).insert(recipient.to_string(), ScriptedOutcome::Reject(error));
    }

    /// Never answer messages to `recipient`
    pub fn hang_for(&self, recipient: &str) {
        lock(&self.per_recipient).insert(recipient.to_string(), ScriptedOutcome::Hang);
    }

    /// Drop the rule for `recipient`, falling back to the default
    pub fn recover(&self, recipient: &str) {
        lock(&self.per_recipient).remove(recipient);
    }

    /// Every request received so far
    #[must_use]
    pub fn calls(&self) -> Vec<DeliveryRequest> {
        lock(&self.calls).clone()
    }

    /// Number of requests received
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Number of requests addressed to `recipient`
    #[must_use]
    pub fn calls_to(&self, recipient: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.recipient_email == recipient)
            .count()
    }

    /// Recipients in call order
    #[must_use]
    pub fn recipients(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .map(|call| call.recipient_email.clone())
            .collect()
    }

    fn outcome_for(&self, recipient: &str) -> ScriptedOutcome {
        if let Some(next) = lock(&self.queue).pop_front() {
            return next;
        }
        lock(&self.per_recipient)
            .get(recipient)
            .cloned()
            .unwrap_or(ScriptedOutcome::Accept)
    }
}

impl DeliveryChannel for ScriptedChannel {
    fn send(&self, request: DeliveryRequest) -> BoxFuture<'_, Result<DeliveryId, DeliveryError>> {
        let outcome = self.outcome_for(&request.recipient_email);
        lock(&self.calls).push(request);
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let latency = self.latency;

        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            match outcome {
                ScriptedOutcome::Accept => Ok(DeliveryId::new(format!("scripted-{seq}"))),
                ScriptedOutcome::Reject(error) => Err(error),
                ScriptedOutcome::Hang => std::future::pending().await,
            }
        })
    }
}

/// An in-memory registration store.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    records: Mutex<Vec<AttendeeRecord>>,
    marks: Mutex<Vec<(RegistrationId, RegistrationCategory)>>,
    write_failure: Mutex<Option<(GatewayError, Option<usize>)>>,
    read_failure: Mutex<Option<GatewayError>>,
}

impl InMemoryGateway {
    /// A store holding `records`
    #[must_use]
    pub fn with_records(records: Vec<AttendeeRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Fail every `mark_ticket_generated` call with `error`
    pub fn fail_writes(&self, error: GatewayError) {
        *lock(&self.write_failure) = Some((error, None));
    }

    /// Fail the next `times` writes with `error`, then succeed
    pub fn fail_next_writes(&self, times: usize, error: GatewayError) {
        *lock(&self.write_failure) = Some((error, Some(times)));
    }

    /// Fail `fetch_registrations` with `error`
    pub fn fail_reads(&self, error: GatewayError) {
        *lock(&self.read_failure) = Some(error);
    }

    /// Successful flag writes, in call order (repeats included)
    #[must_use]
    pub fn marks(&self) -> Vec<(RegistrationId, RegistrationCategory)> {
        lock(&self.marks).clone()
    }

    /// Current stored records
    #[must_use]
    pub fn records(&self) -> Vec<AttendeeRecord> {
        lock(&self.records).clone()
    }

    fn take_write_failure(&self) -> Option<GatewayError> {
        let mut failure = lock(&self.write_failure);
        match failure.as_mut() {
            None => None,
            Some((error, None)) => Some(error.clone()),
            Some((error, Some(remaining))) => {
                let error = error.clone();
                *remaining -= 1;
                if *remaining == 0 {
                    *failure = None;
                }
                Some(error)
            },
        }
    }
}

impl RegistrationGateway for InMemoryGateway {
    fn fetch_registrations(&self) -> BoxFuture<'_, Result<Vec<AttendeeRecord>, GatewayError>> {
        let result = match lock(&self.read_failure).clone() {
            Some(error) => Err(error),
            None => Ok(self.records()),
        };
        Box::pin(async move { result })
    }

    fn mark_ticket_generated(
        &self,
        id: RegistrationId,
        category: RegistrationCategory,
    ) -> BoxFuture<'_, Result<(), GatewayError>> {
        let result = if let Some(error) = self.take_write_failure() {
            Err(error)
        } else {
            let mut records = lock(&self.records);
            match records
                .iter_mut()
                .find(|r| r.id == Some(id) && r.category() == category)
            {
                Some(record) => {
                    record.ticket_generated = true;
                    lock(&self.marks).push((id, category));
                    Ok(())
                },
                None => Err(GatewayError::NotFound { id, category }),
            }
        };
        Box::pin(async move { result })
    }
}
