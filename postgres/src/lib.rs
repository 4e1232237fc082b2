//! `PostgreSQL` registration store for Gatepass.
//!
//! Reads student and alumni registrations and persists the "ticket generated"
//! flag once a ticket has been delivered.
//!
//! # Example
//!
//! ```ignore
//! use gatepass_postgres::PostgresGateway;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = PostgresGateway::connect("postgres://localhost/gatepass", 5).await?;
//!     gateway.migrate().await?;
//!     Ok(())
//! }
//! ```

use futures::future::BoxFuture;
use gatepass_core::attendee::{
    AttendeeRecord, PaymentStatus, Registration, RegistrationCategory, RegistrationId,
};
use gatepass_core::registry::{GatewayError, RegistrationGateway};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

/// Stored value of `ticket_generated` once a ticket went out
const TICKET_GENERATED: &str = "Yes";

const FETCH_REGISTRATIONS: &str = r"
    SELECT 'student' AS category, id, student_name AS name, email, jis_id, mobile,
           department, gender, NULL::text AS passout_year,
           NULL::text AS current_organization, payment_status, ticket_generated
      FROM registrations
    UNION ALL
    SELECT 'alumni' AS category, id, alumni_name AS name, email, jis_id, mobile,
           department, NULL::text AS gender, passout_year,
           current_organization, payment_status, ticket_generated
      FROM alumni_registrations
    ORDER BY category DESC, id
";

/// Registration table for a category
const fn table_for(category: RegistrationCategory) -> &'static str {
    match category {
        RegistrationCategory::Student => "registrations",
        RegistrationCategory::Alumni => "alumni_registrations",
    }
}

fn unavailable(error: &sqlx::Error) -> GatewayError {
    GatewayError::Unavailable(error.to_string())
}

/// `PostgreSQL`-backed [`RegistrationGateway`].
#[derive(Clone, Debug)]
pub struct PostgresGateway {
    pool: PgPool,
}

impl PostgresGateway {
    /// Wrap an existing pool
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Create the registration tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] if migration fails.
    pub async fn migrate(&self) -> Result<(), GatewayError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Migration failed: {e}")))
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Cheap liveness probe
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] if the database does not answer.
    pub async fn ping(&self) -> Result<(), GatewayError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| unavailable(&e))
    }

    async fn fetch_all(&self) -> Result<Vec<AttendeeRecord>, GatewayError> {
        let rows = sqlx::query(FETCH_REGISTRATIONS)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable(&e))?;

        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(count = records.len(), "Loaded registrations");
        Ok(records)
    }

    async fn mark(
        &self,
        id: RegistrationId,
        category: RegistrationCategory,
    ) -> Result<(), GatewayError> {
        let query = format!(
            "UPDATE {} SET ticket_generated = $1 WHERE id = $2",
            table_for(category)
        );

        let result = sqlx::query(&query)
            .bind(TICKET_GENERATED)
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                metrics::counter!("registrations.mark.failed").increment(1);
                unavailable(&e)
            })?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound { id, category });
        }

        tracing::info!(%id, %category, "Ticket flag persisted");
        metrics::counter!("registrations.mark.succeeded").increment(1);
        Ok(())
    }
}

impl RegistrationGateway for PostgresGateway {
    fn fetch_registrations(&self) -> BoxFuture<'_, Result<Vec<AttendeeRecord>, GatewayError>> {
        Box::pin(self.fetch_all())
    }

    fn mark_ticket_generated(
        &self,
        id: RegistrationId,
        category: RegistrationCategory,
    ) -> BoxFuture<'_, Result<(), GatewayError>> {
        Box::pin(self.mark(id, category))
    }
}

fn record_from_row(row: &PgRow) -> Result<AttendeeRecord, GatewayError> {
    let text = |column: &str| -> Result<Option<String>, GatewayError> {
        row.try_get::<Option<String>, _>(column)
            .map_err(|e| GatewayError::Malformed(format!("{column}: {e}")))
    };

    let category: String = row
        .try_get("category")
        .map_err(|e| GatewayError::Malformed(format!("category: {e}")))?;
    let id: i64 = row
        .try_get("id")
        .map_err(|e| GatewayError::Malformed(format!("id: {e}")))?;

    let registration = match category.as_str() {
        "student" => Registration::Student {
            gender: text("gender")?,
        },
        "alumni" => Registration::Alumni {
            passout_year: text("passout_year")?,
            current_organization: text("current_organization")?,
        },
        other => return Err(GatewayError::Malformed(format!("unknown category {other}"))),
    };

    let base = AttendeeRecord::student(text("name")?.unwrap_or_default(), String::new())
        .with_id(RegistrationId::new(id))
        .with_email(text("email")?)
        .with_payment(PaymentStatus::parse(&text("payment_status")?.unwrap_or_default()))
        .with_ticket_generated(
            text("ticket_generated")?
                .is_some_and(|flag| flag.trim().eq_ignore_ascii_case(TICKET_GENERATED)),
        );

    Ok(AttendeeRecord {
        institution_id: text("jis_id")?.filter(|v| !v.trim().is_empty()),
        mobile: text("mobile")?,
        department: text("department")?,
        registration,
        ..base
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_their_tables() {
        assert_eq!(table_for(RegistrationCategory::Student), "registrations");
        assert_eq!(table_for(RegistrationCategory::Alumni), "alumni_registrations");
    }
}
