//! The ePO remote command client.
//!
//! [`EpoClient`] binds one ePO server for its lifetime. Construction resolves
//! the server through [`Discovery`]; each call then builds the request for the
//! service generation the client currently believes the server speaks and
//! dispatches it through the caller's [`Fabric`].
//!
//! The believed generation is a hint. When the fabric reports that nothing
//! listens on the primary topic the call is retried once against the other
//! generation, and whichever answered becomes the new hint so later calls go
//! straight to it.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use epo_config::{Config, DEFAULT_RESPONSE_TIMEOUT_SECS, MIN_RESPONSE_TIMEOUT_SECS};
use tracing::{debug, warn};

use crate::addressing::{CommandTarget, ServiceTopology};
use crate::discovery::Discovery;
use crate::error::EpoError;
use crate::exchange;
use crate::fabric::{Fabric, Response};
use crate::protocol::{CommandOutput, OutputFormat, Params, ProtocolVariant};

/// Command that lists the remote commands a server supports.
pub const HELP_COMMAND: &str = "core.help";

/// Default time to wait for a response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS);

/// Shortest permitted response timeout.
pub const MIN_RESPONSE_TIMEOUT: Duration = Duration::from_secs(MIN_RESPONSE_TIMEOUT_SECS);

/// Client for invoking remote commands on one ePO server.
///
/// # Example
///
/// ```rust,no_run
/// use epo_client::{EpoClient, OutputFormat};
/// # fn example(fabric: impl epo_client::Fabric) -> Result<(), epo_client::EpoError> {
/// let client = EpoClient::new(fabric, Some("epo1"))?;
/// println!("{}", client.help(OutputFormat::Verbose)?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EpoClient<F> {
    fabric: F,
    topology: ServiceTopology,
    epo_unique_id: String,
    variant_hint: VariantHint,
    response_timeout: Duration,
}

impl<F: Fabric> EpoClient<F> {
    /// Creates a client for `epo_unique_id`, or for the only registered
    /// server when no identifier is given.
    ///
    /// # Errors
    ///
    /// Returns [`EpoError::ServiceNotFound`], [`EpoError::NoServiceRegistered`],
    /// or [`EpoError::MultipleServices`] when discovery is not conclusive, or
    /// any error raised while querying the registry.
    pub fn new(fabric: F, epo_unique_id: Option<&str>) -> Result<Self, EpoError> {
        Self::with_timeout(fabric, epo_unique_id, DEFAULT_RESPONSE_TIMEOUT)
    }

    /// Creates a client that waits up to `response_timeout` per request.
    ///
    /// # Errors
    ///
    /// Returns [`EpoError::TimeoutTooShort`] when `response_timeout` is below
    /// [`MIN_RESPONSE_TIMEOUT`], otherwise as [`EpoClient::new`].
    pub fn with_timeout(
        fabric: F,
        epo_unique_id: Option<&str>,
        response_timeout: Duration,
    ) -> Result<Self, EpoError> {
        Self::with_topology(
            fabric,
            ServiceTopology::default(),
            epo_unique_id,
            response_timeout,
        )
    }

    /// Creates a client from shared configuration.
    ///
    /// # Errors
    ///
    /// As [`EpoClient::with_timeout`].
    pub fn from_config(fabric: F, config: &Config) -> Result<Self, EpoError> {
        Self::with_timeout(fabric, config.unique_id(), config.response_timeout())
    }

    /// Creates a client addressing services through `topology`.
    ///
    /// # Errors
    ///
    /// As [`EpoClient::with_timeout`].
    pub fn with_topology(
        fabric: F,
        topology: ServiceTopology,
        epo_unique_id: Option<&str>,
        response_timeout: Duration,
    ) -> Result<Self, EpoError> {
        let timeout = checked_timeout(response_timeout)?;
        let (resolved_id, variant) = Discovery::for_topology(&topology)
            .resolve(&fabric, epo_unique_id, timeout)?
            .into_parts();

        Ok(Self {
            fabric,
            topology,
            epo_unique_id: resolved_id,
            variant_hint: VariantHint::new(variant),
            response_timeout: timeout,
        })
    }

    /// Returns the unique identifiers of every ePO server on the fabric.
    ///
    /// Uses [`DEFAULT_RESPONSE_TIMEOUT`] when `response_timeout` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`EpoError::TimeoutTooShort`] for a timeout below the minimum,
    /// or any error raised while querying the registry.
    pub fn lookup_identifiers(
        fabric: &F,
        response_timeout: Option<Duration>,
    ) -> Result<BTreeSet<String>, EpoError> {
        let timeout = checked_timeout(response_timeout.unwrap_or(DEFAULT_RESPONSE_TIMEOUT))?;
        Discovery::for_topology(&ServiceTopology::default())
            .lookup(fabric, timeout)
            .map(|discovered| discovered.identifiers())
    }

    /// Invokes `command_name` on the bound server.
    ///
    /// Missing parameters default to an empty map.
    ///
    /// # Errors
    ///
    /// Returns [`EpoError::UnsupportedFormat`] before any I/O when the server
    /// is believed to speak the commands generation and `output_format` is
    /// not JSON, [`EpoError::Dispatch`] when the server answers with an
    /// error, or [`EpoError::Transport`] when the fabric fails.
    pub fn run_command(
        &self,
        command_name: &str,
        params: Option<Params>,
        output_format: OutputFormat,
    ) -> Result<CommandOutput, EpoError> {
        let params_map = params.unwrap_or_default();
        let primary = self.variant_hint.load();

        let target = self.target(primary, command_name, &params_map, output_format)?;
        let mut served_by = primary;
        let mut response = self.send(&target)?;

        let alternate = primary.alternate();
        if response.is_service_unavailable() && alternate.supports(output_format) {
            warn!(
                epo_unique_id = %self.epo_unique_id,
                unavailable = %primary,
                fallback = %alternate,
                "no listener for request topic, retrying with the other service generation"
            );
            let fallback = self.target(alternate, command_name, &params_map, output_format)?;
            response = self.send(&fallback)?;
            served_by = alternate;
        }

        let payload = exchange::into_payload(response)?;
        self.variant_hint.store(served_by);

        let output = CommandOutput::decode(&payload);
        debug!(command = command_name, response = %output, "received response");
        Ok(output)
    }

    /// Parses `output_format` and invokes `command_name`.
    ///
    /// # Errors
    ///
    /// Returns [`EpoError::InvalidFormat`] before any I/O for an unknown
    /// format name, otherwise as [`EpoClient::run_command`].
    pub fn run_command_with_format_name(
        &self,
        command_name: &str,
        params: Option<Params>,
        output_format: &str,
    ) -> Result<CommandOutput, EpoError> {
        let format = OutputFormat::from_name(output_format)?;
        self.run_command(command_name, params, format)
    }

    /// Lists the remote commands the bound server supports.
    ///
    /// Verbose help is fetched as JSON and joined into newline-separated
    /// text, since the commands generation cannot answer verbosely.
    ///
    /// # Errors
    ///
    /// As [`EpoClient::run_command`].
    pub fn help(&self, output_format: OutputFormat) -> Result<CommandOutput, EpoError> {
        if output_format == OutputFormat::Verbose {
            return self
                .run_command(HELP_COMMAND, None, OutputFormat::Json)
                .map(CommandOutput::into_joined_lines);
        }
        self.run_command(HELP_COMMAND, None, output_format)
    }

    fn target(
        &self,
        variant: ProtocolVariant,
        command_name: &str,
        params: &Params,
        output_format: OutputFormat,
    ) -> Result<CommandTarget, EpoError> {
        self.topology.build_request(
            &self.epo_unique_id,
            variant,
            command_name,
            params,
            output_format,
        )
    }

    fn send(&self, target: &CommandTarget) -> Result<Response, EpoError> {
        let request = target.to_request()?;
        exchange::send(&self.fabric, &request, self.response_timeout)
    }
}

impl<F> EpoClient<F> {
    /// Returns the unique identifier of the bound ePO server.
    #[must_use]
    pub fn epo_unique_id(&self) -> &str {
        self.epo_unique_id.as_str()
    }

    /// Returns the per-request response timeout.
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Changes the per-request response timeout.
    ///
    /// # Errors
    ///
    /// Returns [`EpoError::TimeoutTooShort`] when `response_timeout` is below
    /// [`MIN_RESPONSE_TIMEOUT`]; the previous timeout is kept.
    pub fn set_response_timeout(&mut self, response_timeout: Duration) -> Result<(), EpoError> {
        self.response_timeout = checked_timeout(response_timeout)?;
        Ok(())
    }

    /// Returns the fabric handle the client sends through.
    #[must_use]
    pub const fn fabric(&self) -> &F {
        &self.fabric
    }

    #[cfg(test)]
    pub(crate) fn believed_variant(&self) -> ProtocolVariant {
        self.variant_hint.load()
    }
}

fn checked_timeout(response_timeout: Duration) -> Result<Duration, EpoError> {
    if response_timeout < MIN_RESPONSE_TIMEOUT {
        return Err(EpoError::TimeoutTooShort {
            requested: response_timeout,
            minimum: MIN_RESPONSE_TIMEOUT,
        });
    }
    Ok(response_timeout)
}

/// Last service generation known to have answered.
///
/// Concurrent callers may race on the store; the loser costs one extra round
/// trip on its next call, never a wrong answer.
#[derive(Debug)]
struct VariantHint(AtomicU8);

const LEGACY_REMOTE_TAG: u8 = 0;
const COMMANDS_TAG: u8 = 1;

impl VariantHint {
    const fn new(variant: ProtocolVariant) -> Self {
        Self(AtomicU8::new(Self::tag(variant)))
    }

    fn load(&self) -> ProtocolVariant {
        match self.0.load(Ordering::Relaxed) {
            COMMANDS_TAG => ProtocolVariant::Commands,
            _ => ProtocolVariant::LegacyRemote,
        }
    }

    fn store(&self, variant: ProtocolVariant) {
        self.0.store(Self::tag(variant), Ordering::Relaxed);
    }

    const fn tag(variant: ProtocolVariant) -> u8 {
        match variant {
            ProtocolVariant::LegacyRemote => LEGACY_REMOTE_TAG,
            ProtocolVariant::Commands => COMMANDS_TAG,
        }
    }
}
