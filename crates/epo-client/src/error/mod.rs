//! Domain errors raised by the ePO client.
//!
//! Every failure is reported synchronously from the call that detected it.
//! [`EpoError::kind`] gives callers a stable category alongside the
//! human-readable message.

use std::time::Duration;

use strum::Display;
use thiserror::Error;

use crate::fabric::FabricError;

/// Errors arising from ePO client operations.
#[derive(Debug, Error)]
pub enum EpoError {
    /// The requested output format is not one of the supported values.
    #[error("invalid output format: {value}")]
    InvalidFormat {
        /// Text that failed to parse.
        value: String,
    },

    /// An explicit ePO unique identifier matched no registered service.
    #[error("no ePO DXL service is registered with the DXL fabric for '{epo_unique_id}'")]
    ServiceNotFound {
        /// Identifier that was looked up.
        epo_unique_id: String,
    },

    /// Discovery found no ePO services at all.
    #[error("no ePO DXL services are registered with the DXL fabric")]
    NoServiceRegistered,

    /// Discovery found more than one ePO service and no identifier was given.
    #[error(
        "multiple ePO DXL services are registered with the DXL fabric ({}); \
         a specific ePO unique identifier must be specified",
        .ids.join(", ")
    )]
    MultipleServices {
        /// Discovered identifiers in ascending order.
        ids: Vec<String>,
    },

    /// The service generation cannot produce the requested output format.
    #[error("output format '{format}' is not supported for service type '{service_type}'")]
    UnsupportedFormat {
        /// Requested output format.
        format: String,
        /// Service type that rejected it.
        service_type: String,
    },

    /// The remote side answered with an error response.
    #[error("error: {message} ({code})")]
    Dispatch {
        /// Error message reported by the remote side.
        message: String,
        /// Error code reported by the remote side.
        code: i64,
    },

    /// The fabric failed to deliver the request or its response.
    #[error("fabric request to '{topic}' failed: {source}")]
    Transport {
        /// Topic the request was sent to.
        topic: String,
        /// Underlying fabric error.
        #[source]
        source: FabricError,
    },

    /// A request payload could not be serialized to JSON.
    #[error("failed to serialise request payload: {0}")]
    SerializePayload(#[source] serde_json::Error),

    /// The service registry returned a payload that could not be decoded.
    #[error("failed to decode service registry response: {message}")]
    DecodeRegistry {
        /// Human-readable description of the decode failure.
        message: String,
        /// Optional underlying JSON error.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// A response timeout below the permitted minimum was requested.
    #[error(
        "response timeout must be at least {}s (requested {}s)",
        .minimum.as_secs(),
        .requested.as_secs()
    )]
    TimeoutTooShort {
        /// Requested timeout.
        requested: Duration,
        /// Minimum permitted timeout.
        minimum: Duration,
    },
}

/// Stable category of an [`EpoError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown output format.
    InvalidFormat,
    /// Explicit identifier not registered.
    ServiceNotFound,
    /// Nothing registered.
    NoServiceRegistered,
    /// More than one candidate service.
    MultipleServices,
    /// Format not supported by the service generation.
    UnsupportedFormat,
    /// Remote error response.
    Dispatch,
    /// Fabric delivery failure.
    Transport,
    /// Payload encoding or decoding failure.
    Codec,
    /// Rejected configuration value.
    Configuration,
}

impl EpoError {
    /// Returns the stable category for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            Self::ServiceNotFound { .. } => ErrorKind::ServiceNotFound,
            Self::NoServiceRegistered => ErrorKind::NoServiceRegistered,
            Self::MultipleServices { .. } => ErrorKind::MultipleServices,
            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Self::Dispatch { .. } => ErrorKind::Dispatch,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::SerializePayload(_) | Self::DecodeRegistry { .. } => ErrorKind::Codec,
            Self::TimeoutTooShort { .. } => ErrorKind::Configuration,
        }
    }
}
