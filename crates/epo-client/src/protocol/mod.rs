//! Wire types shared by discovery, addressing, and dispatch.
//!
//! Requests and responses travel as JSON. The registry query pseudo-service
//! takes a [`RegistryQuery`] and answers with a [`RegistryResponse`]. The
//! remote service generation wraps each command in a
//! [`RemoteCommandEnvelope`]; the commands generation takes the bare
//! [`Params`] map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::EpoError;

/// Command parameters, sent as a JSON object.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Output format ePO uses when answering a remote command.
///
/// # Example
///
/// ```
/// use epo_client::OutputFormat;
///
/// let format = OutputFormat::from_name("XML").expect("known format");
/// assert_eq!(format, OutputFormat::Xml);
/// assert_eq!(format.as_ref(), "xml");
/// assert!(OutputFormat::from_name("yaml").is_err());
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    /// JSON document.
    #[default]
    Json,
    /// XML document.
    Xml,
    /// Verbose text.
    Verbose,
    /// Terse text.
    Terse,
}

impl OutputFormat {
    /// Parses a format name, accepting any ASCII case.
    ///
    /// # Errors
    ///
    /// Returns [`EpoError::InvalidFormat`] for names outside the four
    /// supported formats.
    pub fn from_name(name: &str) -> Result<Self, EpoError> {
        name.parse().map_err(|_| EpoError::InvalidFormat {
            value: name.to_owned(),
        })
    }
}

/// Service generation a server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProtocolVariant {
    /// Standalone remote service: one topic per server, enveloped payload.
    LegacyRemote,
    /// Built-in commands service: one topic per command, bare parameters.
    Commands,
}

impl ProtocolVariant {
    /// Returns whether this generation can answer in `format`.
    #[must_use]
    pub const fn supports(self, format: OutputFormat) -> bool {
        match self {
            Self::LegacyRemote => true,
            Self::Commands => matches!(format, OutputFormat::Json),
        }
    }

    /// Returns the other generation.
    #[must_use]
    pub const fn alternate(self) -> Self {
        match self {
            Self::LegacyRemote => Self::Commands,
            Self::Commands => Self::LegacyRemote,
        }
    }
}

/// Payload the remote service generation expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCommandEnvelope {
    command: String,
    output: OutputFormat,
    params: Params,
}

impl RemoteCommandEnvelope {
    /// Wraps a command invocation.
    #[must_use]
    pub fn new(command: impl Into<String>, output: OutputFormat, params: Params) -> Self {
        Self {
            command: command.into(),
            output,
            params,
        }
    }

    /// Returns the command name.
    #[must_use]
    pub const fn command(&self) -> &str {
        self.command.as_str()
    }

    /// Returns the requested output format.
    #[must_use]
    pub const fn output(&self) -> OutputFormat {
        self.output
    }

    /// Returns the command parameters.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }
}

/// Decoded result of a remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// The payload parsed as JSON.
    Json(serde_json::Value),
    /// The payload was not JSON and is passed through as text.
    ///
    /// Invalid UTF-8 sequences are replaced with U+FFFD.
    Text(String),
}

impl CommandOutput {
    /// Decodes a response payload, preferring JSON and falling back to text.
    ///
    /// The text fallback is lossy: bytes that are not valid UTF-8 become
    /// U+FFFD rather than failing the call.
    #[must_use]
    pub fn decode(payload: &[u8]) -> Self {
        serde_json::from_slice(payload).map_or_else(
            |_| Self::Text(String::from_utf8_lossy(payload).into_owned()),
            Self::Json,
        )
    }

    /// Returns the JSON value, if the payload was JSON.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// Returns the text, if the payload was passed through as text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Json(_) => None,
        }
    }

    /// Joins a JSON array of strings into newline-separated text.
    ///
    /// Any other output is returned unchanged.
    #[must_use]
    pub fn into_joined_lines(self) -> Self {
        match self {
            Self::Json(serde_json::Value::Array(items)) => {
                let joined = items
                    .iter()
                    .map(serde_json::Value::as_str)
                    .collect::<Option<Vec<_>>>()
                    .map(|lines| lines.join("\n"));
                match joined {
                    Some(text) => Self::Text(text),
                    None => Self::Json(serde_json::Value::Array(items)),
                }
            }
            other => other,
        }
    }
}

impl std::fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Request payload for the registry query pseudo-service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryQuery {
    #[serde(rename = "serviceType")]
    service_type: String,
}

impl RegistryQuery {
    /// Queries for services of `service_type`.
    #[must_use]
    pub fn new(service_type: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
        }
    }

    /// Returns the queried service type.
    #[must_use]
    pub const fn service_type(&self) -> &str {
        self.service_type.as_str()
    }
}

/// Response payload of the registry query pseudo-service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryResponse {
    #[serde(default)]
    services: BTreeMap<String, RegistryEntry>,
}

impl RegistryResponse {
    /// Creates a response from entries keyed by registry service identifier.
    #[must_use]
    pub const fn new(services: BTreeMap<String, RegistryEntry>) -> Self {
        Self { services }
    }

    /// Iterates over the registered entries.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.services.values()
    }
}

/// One service advertised in the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(rename = "serviceType", default)]
    service_type: String,
    #[serde(rename = "requestChannels", default)]
    request_channels: Vec<String>,
    #[serde(rename = "metaData", default)]
    metadata: BTreeMap<String, String>,
}

impl RegistryEntry {
    /// Creates a registry entry.
    #[must_use]
    pub const fn new(
        service_type: String,
        request_channels: Vec<String>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            service_type,
            request_channels,
            metadata,
        }
    }

    /// Returns the advertised service type.
    #[must_use]
    pub const fn service_type(&self) -> &str {
        self.service_type.as_str()
    }

    /// Returns the advertised request channels in registry order.
    #[must_use]
    pub fn request_channels(&self) -> &[String] {
        &self.request_channels
    }

    /// Returns the advertised metadata.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}
