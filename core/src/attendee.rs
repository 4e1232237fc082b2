//! Attendee records as loaded from a CSV import or the registration store.
//!
//! Two registration categories share a common core of identity fields and add
//! category-specific facts on top. The category is kept as a tagged variant so
//! the pipeline treats every attendee uniformly while persistence can still route
//! the "ticket generated" flag to the right table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Durable identifier of a registration row in the relational store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(i64);

impl RegistrationId {
    /// Wrap a raw database identifier
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw database identifier
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which registration table an attendee belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationCategory {
    /// Currently enrolled student
    Student,
    /// Former student
    Alumni,
}

impl RegistrationCategory {
    /// Stable lowercase name, used in logs and the HTTP surface
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Alumni => "alumni",
        }
    }
}

impl fmt::Display for RegistrationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state recorded against a registration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Payment confirmed
    Paid,
    /// No payment recorded yet
    Unpaid,
    /// Any other value found in the store, kept verbatim
    Other(String),
}

impl PaymentStatus {
    /// Parse the free-text column used by the registration tables.
    ///
    /// Matching is case-insensitive; blank means unpaid.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("paid") {
            Self::Paid
        } else if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("unpaid")
            || trimmed.eq_ignore_ascii_case("pending")
        {
            Self::Unpaid
        } else {
            Self::Other(trimmed.to_string())
        }
    }

    /// Whether the payment is confirmed
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }
}

/// Category-specific registration facts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum Registration {
    /// Student registration
    Student {
        /// Self-reported gender, if collected
        gender: Option<String>,
    },
    /// Alumni registration
    Alumni {
        /// Graduation year
        passout_year: Option<String>,
        /// Current employer
        current_organization: Option<String>,
    },
}

impl Registration {
    /// The discriminator for this registration
    #[must_use]
    pub const fn category(&self) -> RegistrationCategory {
        match self {
            Self::Student { .. } => RegistrationCategory::Student,
            Self::Alumni { .. } => RegistrationCategory::Alumni,
        }
    }
}

/// One registrant's identity and registration facts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeRecord {
    /// Store identifier; `None` for rows that only exist in an import
    pub id: Option<RegistrationId>,
    /// Display name
    pub name: String,
    /// Recipient address; blank input is normalised to `None`
    pub email: Option<String>,
    /// Institutional identifier
    pub institution_id: Option<String>,
    /// Contact number
    pub mobile: Option<String>,
    /// Department or programme
    pub department: Option<String>,
    /// Payment state
    pub payment: PaymentStatus,
    /// Durable "ticket generated" flag
    pub ticket_generated: bool,
    /// Category-specific facts
    pub registration: Registration,
}

impl AttendeeRecord {
    /// A student record with the given name and email, unpaid, no store id.
    ///
    /// Further fields are set with the `with_*` builders.
    #[must_use]
    pub fn student(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: non_blank(email.into()),
            institution_id: None,
            mobile: None,
            department: None,
            payment: PaymentStatus::Unpaid,
            ticket_generated: false,
            registration: Registration::Student { gender: None },
        }
    }

    /// An alumni record with the given name and email
    #[must_use]
    pub fn alumni(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            registration: Registration::Alumni {
                passout_year: None,
                current_organization: None,
            },
            ..Self::student(name, email)
        }
    }

    /// Set the store identifier
    #[must_use]
    pub const fn with_id(mut self, id: RegistrationId) -> Self {
        self.id = Some(id);
        self
    }

    /// Replace the email; blank clears it
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email.and_then(non_blank);
        self
    }

    /// Set the institutional identifier; blank clears it
    #[must_use]
    pub fn with_institution_id(mut self, id: impl Into<String>) -> Self {
        self.institution_id = non_blank(id.into());
        self
    }

    /// Set the payment state
    #[must_use]
    pub fn with_payment(mut self, payment: PaymentStatus) -> Self {
        self.payment = payment;
        self
    }

    /// Set the durable ticket flag
    #[must_use]
    pub const fn with_ticket_generated(mut self, generated: bool) -> Self {
        self.ticket_generated = generated;
        self
    }

    /// The registration category
    #[must_use]
    pub const fn category(&self) -> RegistrationCategory {
        self.registration.category()
    }

    /// The recipient address, if the record has one
    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

/// Trim and drop empty strings
pub(crate) fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_email_is_normalised_to_none() {
        let record = AttendeeRecord::student("Asha", "   ");
        assert_eq!(record.recipient(), None);
    }

    #[test]
    fn email_is_trimmed() {
        let record = AttendeeRecord::student("Asha", " asha@example.com ");
        assert_eq!(record.recipient(), Some("asha@example.com"));
    }

    #[test]
    fn alumni_builder_keeps_identity_fields() {
        let record = AttendeeRecord::alumni("Ravi", "ravi@example.com")
            .with_id(RegistrationId::new(9));
        assert_eq!(record.category(), RegistrationCategory::Alumni);
        assert_eq!(record.id, Some(RegistrationId::new(9)));
        assert_eq!(record.name, "Ravi");
    }

    #[test]
    fn payment_status_parsing() {
        assert_eq!(PaymentStatus::parse("PAID"), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::parse(" paid "), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::parse(""), PaymentStatus::Unpaid);
        assert_eq!(PaymentStatus::parse("Pending"), PaymentStatus::Unpaid);
        assert_eq!(
            PaymentStatus::parse("Refunded"),
            PaymentStatus::Other("Refunded".to_string())
        );
        assert!(!PaymentStatus::parse("Refunded").is_paid());
    }
}
