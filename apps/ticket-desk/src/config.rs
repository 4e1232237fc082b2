//! Configuration management for the ticket desk.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Parsing goes through a key lookup so it can be exercised without touching
//! the process environment.

use gatepass_mailer::{EventDetails, SmtpSettings};
use gatepass_runtime::retry::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
    },

    /// A variable required by the selected delivery mode is not set
    #[error("{key} must be set when {reason}")]
    Missing {
        /// Variable name
        key: &'static str,
        /// Why it is required
        reason: &'static str,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Registration store configuration
    pub postgres: PostgresConfig,
    /// Delivery Channel selection
    pub delivery: DeliveryConfig,
    /// Send pipeline tuning
    pub pipeline: PipelineConfig,
    /// Event details printed on tickets
    pub event: EventDetails,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Start the Prometheus exporter
    pub metrics_enabled: bool,
    /// Metrics listener host
    pub metrics_host: String,
    /// Metrics listener port
    pub metrics_port: u16,
    /// How long to wait for in-flight sends on shutdown
    pub shutdown_timeout: Duration,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    /// Connection URL; without one the desk runs on CSV imports only
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Apply embedded migrations at startup
    pub run_migrations: bool,
}

/// Which Delivery Channel to build
#[derive(Debug, Clone)]
pub enum DeliveryMode {
    /// Log tickets instead of sending them
    Console,
    /// Post tickets to an HTTP mail relay
    Relay {
        /// Relay endpoint URL
        endpoint: String,
    },
    /// Send ticket emails over SMTP
    Smtp(SmtpSettings),
}

impl DeliveryMode {
    /// Lowercase mode name as accepted by `DELIVERY_MODE`
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Relay { .. } => "relay",
            Self::Smtp(_) => "smtp",
        }
    }
}

/// Delivery Channel configuration
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Selected channel
    pub mode: DeliveryMode,
    /// Per-request network timeout of the channel
    pub request_timeout: Duration,
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Pause between consecutive sends of a batch
    pub send_delay: Duration,
    /// Upper bound on one Delivery Channel round trip
    pub delivery_timeout: Duration,
    /// Target image width in pixels
    pub qr_width: u32,
    /// Quiet zone in modules
    pub qr_margin: u32,
    /// Backoff for recording the "ticket generated" flag
    pub ledger_retry: RetryPolicy,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first when present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed or the selected
    /// delivery mode lacks a required variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed or the selected
    /// delivery mode lacks a required variable.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let server = ServerConfig {
            host: vars.string("HOST", "0.0.0.0"),
            port: vars.parsed("PORT", 3000)?,
            metrics_enabled: vars.flag("METRICS_ENABLED", false)?,
            metrics_host: vars.string("METRICS_HOST", "0.0.0.0"),
            metrics_port: vars.parsed("METRICS_PORT", 9090)?,
            shutdown_timeout: Duration::from_secs(vars.parsed("SHUTDOWN_TIMEOUT", 30)?),
        };

        let postgres = PostgresConfig {
            url: vars.get("DATABASE_URL"),
            max_connections: vars.parsed("DATABASE_MAX_CONNECTIONS", 5)?,
            run_migrations: vars.flag("DATABASE_RUN_MIGRATIONS", false)?,
        };

        let request_timeout = Duration::from_secs(vars.parsed("DELIVERY_TIMEOUT", 20)?);
        let delivery = DeliveryConfig {
            mode: delivery_mode(&vars, request_timeout)?,
            request_timeout,
        };

        let pipeline = PipelineConfig {
            send_delay: Duration::from_millis(vars.parsed("SEND_DELAY_MS", 1000)?),
            delivery_timeout: Duration::from_secs(vars.parsed("PIPELINE_DELIVERY_TIMEOUT", 30)?),
            qr_width: vars.parsed("QR_WIDTH", 300)?,
            qr_margin: vars.parsed("QR_MARGIN", 2)?,
            ledger_retry: RetryPolicy::builder()
                .max_retries(vars.parsed("LEDGER_MAX_RETRIES", 3)?)
                .initial_delay(Duration::from_millis(
                    vars.parsed("LEDGER_INITIAL_BACKOFF_MS", 200)?,
                ))
                .max_delay(Duration::from_secs(5))
                .build(),
        };

        let defaults = EventDetails::default();
        let event = EventDetails {
            name: vars.string("EVENT_NAME", &defaults.name),
            dates: vars.string("EVENT_DATES", &defaults.dates),
            venue: vars.string("EVENT_VENUE", &defaults.venue),
            hours: vars.string("EVENT_HOURS", &defaults.hours),
            organizer: vars.string("EVENT_ORGANIZER", &defaults.organizer),
            ticket_prefix: vars.string("TICKET_PREFIX", &defaults.ticket_prefix),
        };

        Ok(Self {
            server,
            postgres,
            delivery,
            pipeline,
            event,
        })
    }
}

fn delivery_mode(vars: &Vars<'_>, timeout: Duration) -> Result<DeliveryMode, ConfigError> {
    let mode = vars.string("DELIVERY_MODE", "console");

    match mode.to_ascii_lowercase().as_str() {
        "console" => Ok(DeliveryMode::Console),
        "relay" => Ok(DeliveryMode::Relay {
            endpoint: vars.required("RELAY_URL", "DELIVERY_MODE=relay")?,
        }),
        "smtp" => {
            let username = vars.required("SMTP_USERNAME", "DELIVERY_MODE=smtp")?;
            Ok(DeliveryMode::Smtp(SmtpSettings {
                host: vars.string("SMTP_HOST", "smtp.gmail.com"),
                port: vars.parsed("SMTP_PORT", 587)?,
                password: vars.required("SMTP_PASSWORD", "DELIVERY_MODE=smtp")?,
                from_email: vars.get("SMTP_FROM_EMAIL").unwrap_or_else(|| username.clone()),
                from_name: vars.string("SMTP_FROM_NAME", "Ticket Desk"),
                username,
                timeout,
            }))
        },
        _ => Err(ConfigError::Invalid {
            key: "DELIVERY_MODE",
            value: mode,
        }),
    }
}

/// Typed access over a key lookup
struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &'static str, reason: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing { key, reason })
    }

    fn parsed<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid { key, value }),
            },
        }
    }
}
