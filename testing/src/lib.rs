//! # Gatepass Testing
//!
//! Testing utilities and helpers for Gatepass.
//!
//! This crate provides:
//! - [`ReducerTest`], which reduces one action and resolves the actions its effects feed back
//! - A fixed clock for deterministic timestamps
//! - Scripted Delivery Channel and in-memory registration store doubles
//! - proptest strategies for attendee records
//!
//! ## Example
//!
//! ```ignore
//! use gatepass_testing::{ScriptedChannel, InMemoryGateway};
//!
//! let channel = Arc::new(ScriptedChannel::new());
//! channel.fail_for("bob@example.com", DeliveryError::server("relay down"));
//!
//! let pipeline = TicketPipeline::new(env_with(channel.clone(), gateway));
//! pipeline.send_all_pending(eligibility::any, None).await;
//!
//! assert_eq!(channel.call_count(), 3);
//! ```

use chrono::{DateTime, Utc};
use gatepass_core::environment::Clock;

pub mod doubles;
pub mod reducer_test;

pub use doubles::{InMemoryGateway, ScriptedChannel, ScriptedOutcome};
pub use reducer_test::{ReducerTest, Reduction, assertions};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use gatepass_testing::mocks::FixedClock;
    /// use gatepass_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

/// Attendee fixtures
pub mod helpers {
    use gatepass_core::attendee::{AttendeeRecord, PaymentStatus, RegistrationId};

    /// A paid student with a store id
    #[must_use]
    pub fn paid_student(id: i64, name: &str, email: &str) -> AttendeeRecord {
        AttendeeRecord::student(name, email)
            .with_id(RegistrationId::new(id))
            .with_payment(PaymentStatus::Paid)
    }

    /// A paid alumnus with a store id
    #[must_use]
    pub fn paid_alumni(id: i64, name: &str, email: &str) -> AttendeeRecord {
        AttendeeRecord::alumni(name, email)
            .with_id(RegistrationId::new(id))
            .with_payment(PaymentStatus::Paid)
    }

    /// A student as it arrives from a CSV import: no store id, paid, with email
    #[must_use]
    pub fn imported(name: &str, email: &str) -> AttendeeRecord {
        AttendeeRecord::student(name, email).with_payment(PaymentStatus::Paid)
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use gatepass_core::attendee::{AttendeeRecord, PaymentStatus, RegistrationId};
    use proptest::prelude::*;

    /// Display names: letters and spaces, never blank
    pub fn name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z .'-]{0,30}"
    }

    /// Plausible email addresses
    pub fn email() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9.]{0,15}", "[a-z]{2,10}", "(com|org|in|edu)")
            .prop_map(|(user, domain, tld)| format!("{user}@{domain}.{tld}"))
    }

    /// Records that always carry a name and email; id and institution id vary
    pub fn attendee() -> impl Strategy<Value = AttendeeRecord> {
        (
            proptest::option::of(1_i64..1_000_000),
            name(),
            email(),
            proptest::option::of("JIS/[0-9]{4}/[0-9]{4}"),
            any::<bool>(),
        )
            .prop_map(|(id, name, email, institution_id, alumni)| {
                let base = if alumni {
                    AttendeeRecord::alumni(name, email)
                } else {
                    AttendeeRecord::student(name, email)
                };
                let base = base.with_payment(PaymentStatus::Paid);
                let base = match id {
                    Some(id) => base.with_id(RegistrationId::new(id)),
                    None => base,
                };
                match institution_id {
                    Some(jis) => base.with_institution_id(jis),
                    None => base,
                }
            })
    }
}

pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
