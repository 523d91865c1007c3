//! Request topic and payload construction for both service generations.
//!
//! The topic names and service types are fixed by the ePO services, but they
//! are held on a [`ServiceTopology`] value bound to each client rather than
//! read from process-wide state.

use serde_json::Value;

use crate::error::EpoError;
use crate::fabric::{REGISTRY_QUERY_TOPIC, Request};
use crate::protocol::{OutputFormat, Params, ProtocolVariant, RemoteCommandEnvelope};

const REMOTE_SERVICE_TYPE: &str = "/mcafee/service/epo/remote";
const COMMANDS_SERVICE_TYPE: &str = "/mcafee/service/epo/commands";
const COMMANDS_REQUEST_PREFIX: &str = "/mcafee/service/epo/command/";
const COMMANDS_ID_METADATA_FIELD: &str = "epoGuid";
const COMMANDS_TOPIC_INFIX: &str = "/remote/";

/// Service types, topic prefixes, and registry topic used by a client.
///
/// # Example
///
/// ```
/// use epo_client::{OutputFormat, Params, ProtocolVariant, ServiceTopology};
///
/// let topology = ServiceTopology::default();
/// let target = topology
///     .build_request(
///         "epo1",
///         ProtocolVariant::Commands,
///         "system.find",
///         &Params::new(),
///         OutputFormat::Json,
///     )
///     .expect("json is supported");
/// assert_eq!(target.topic(), "/mcafee/service/epo/command/epo1/remote/system/find");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTopology {
    remote_service_type: String,
    remote_request_prefix: String,
    commands_service_type: String,
    commands_request_prefix: String,
    commands_id_field: String,
    registry_topic: String,
}

impl Default for ServiceTopology {
    fn default() -> Self {
        Self {
            remote_service_type: REMOTE_SERVICE_TYPE.to_owned(),
            remote_request_prefix: format!("{REMOTE_SERVICE_TYPE}/"),
            commands_service_type: COMMANDS_SERVICE_TYPE.to_owned(),
            commands_request_prefix: COMMANDS_REQUEST_PREFIX.to_owned(),
            commands_id_field: COMMANDS_ID_METADATA_FIELD.to_owned(),
            registry_topic: REGISTRY_QUERY_TOPIC.to_owned(),
        }
    }
}

impl ServiceTopology {
    /// Returns the registry service type for `variant`.
    #[must_use]
    pub const fn service_type(&self, variant: ProtocolVariant) -> &str {
        match variant {
            ProtocolVariant::LegacyRemote => self.remote_service_type.as_str(),
            ProtocolVariant::Commands => self.commands_service_type.as_str(),
        }
    }

    /// Prefix shared by every remote service request channel.
    #[must_use]
    pub const fn remote_request_prefix(&self) -> &str {
        self.remote_request_prefix.as_str()
    }

    /// Prefix shared by every commands service request topic.
    #[must_use]
    pub const fn commands_request_prefix(&self) -> &str {
        self.commands_request_prefix.as_str()
    }

    /// Metadata field carrying the server identifier of a commands service.
    #[must_use]
    pub const fn commands_id_field(&self) -> &str {
        self.commands_id_field.as_str()
    }

    /// Topic of the registry query pseudo-service.
    #[must_use]
    pub const fn registry_topic(&self) -> &str {
        self.registry_topic.as_str()
    }

    /// Request topic of the remote service for `server_id`.
    #[must_use]
    pub fn remote_topic(&self, server_id: &str) -> String {
        format!("{}{server_id}", self.remote_request_prefix)
    }

    /// Request topic of `command_name` on the commands service of `server_id`.
    ///
    /// Each `.` in the command name becomes a topic level separator.
    #[must_use]
    pub fn command_topic(&self, server_id: &str, command_name: &str) -> String {
        format!(
            "{}{server_id}{COMMANDS_TOPIC_INFIX}{}",
            self.commands_request_prefix,
            command_name.replace('.', "/")
        )
    }

    /// Builds the topic and payload for one command invocation.
    ///
    /// # Errors
    ///
    /// Returns [`EpoError::UnsupportedFormat`] when `variant` cannot answer
    /// in `output_format`. No I/O happens here.
    pub fn build_request(
        &self,
        server_id: &str,
        variant: ProtocolVariant,
        command_name: &str,
        params: &Params,
        output_format: OutputFormat,
    ) -> Result<CommandTarget, EpoError> {
        if !variant.supports(output_format) {
            return Err(EpoError::UnsupportedFormat {
                format: output_format.to_string(),
                service_type: self.service_type(variant).to_owned(),
            });
        }

        let (topic, payload) = match variant {
            ProtocolVariant::Commands => (
                self.command_topic(server_id, command_name),
                Value::Object(params.clone()),
            ),
            ProtocolVariant::LegacyRemote => {
                let envelope =
                    RemoteCommandEnvelope::new(command_name, output_format, params.clone());
                (
                    self.remote_topic(server_id),
                    serde_json::to_value(envelope).map_err(EpoError::SerializePayload)?,
                )
            }
        };

        Ok(CommandTarget {
            variant,
            topic,
            payload,
        })
    }
}

/// Destination and payload of one command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTarget {
    variant: ProtocolVariant,
    topic: String,
    payload: Value,
}

impl CommandTarget {
    /// Service generation the target addresses.
    #[must_use]
    pub const fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Request topic.
    #[must_use]
    pub const fn topic(&self) -> &str {
        self.topic.as_str()
    }

    /// JSON payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Encodes the target as a fabric request.
    ///
    /// # Errors
    ///
    /// Returns [`EpoError::SerializePayload`] if the payload cannot be encoded.
    pub fn to_request(&self) -> Result<Request, EpoError> {
        Request::json(self.topic.as_str(), &self.payload).map_err(EpoError::SerializePayload)
    }
}
