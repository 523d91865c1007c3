//! Optional tracing setup for applications embedding the client.
//!
//! The client only emits `tracing` events. Applications that already
//! install a subscriber can ignore this module; small tools can call
//! [`initialise`] with their [`Config`] to get stderr logging in the
//! configured format.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use epo_config::{Config, LogFormat};

static TELEMETRY: OnceCell<TelemetryHandle> = OnceCell::new();

/// Describes the subscriber in effect after [`initialise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
    installed: bool,
}

impl TelemetryHandle {
    /// Format the installed subscriber writes.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }

    /// Whether this crate installed the global subscriber.
    ///
    /// `false` when the host application had already installed its own.
    #[must_use]
    pub const fn installed(&self) -> bool {
        self.installed
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter expression does not parse.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Filter expression as configured.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Installing the tracing subscriber failed.
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[source] SetGlobalDefaultError),
}

/// Installs a stderr subscriber the first time it is called.
///
/// Later calls return the first call's handle. When another subscriber is
/// already the global default the host's choice is kept and the handle
/// reports `installed() == false`.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter expression.
///
/// # Examples
///
/// ```rust
/// use epo_client::telemetry;
/// use epo_config::Config;
///
/// # fn main() -> Result<(), epo_client::telemetry::TelemetryError> {
/// let config = Config::default();
/// let first = telemetry::initialise(&config)?;
/// let second = telemetry::initialise(&config)?;
/// assert_eq!(first, second);
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY.get_or_try_init(|| install(config)).copied()
}

fn install(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let filter = parse_filter(config.log_filter())?;
    let format = config.log_format();

    if tracing::dispatcher::has_been_set() {
        return Ok(TelemetryHandle {
            format,
            installed: false,
        });
    }

    tracing::subscriber::set_global_default(build_subscriber(filter, format))
        .map_err(TelemetryError::Subscriber)?;
    Ok(TelemetryHandle {
        format,
        installed: true,
    })
}

fn parse_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(expression).map_err(|error| TelemetryError::Filter {
        filter: expression.to_owned(),
        message: error.to_string(),
    })
}

fn build_subscriber(filter: EnvFilter, format: LogFormat) -> Box<dyn Subscriber + Send + Sync> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    }
}
