//! Client for invoking ePO remote commands over a DXL-style messaging fabric.
//!
//! The `epo-client` crate hides the fabric details a caller would otherwise
//! handle by hand: finding the ePO server's unique identifier in the service
//! registry, building the request topic and payload for whichever service
//! generation the server speaks, and decoding the response.
//!
//! # Architecture
//!
//! Two generations of ePO service coexist on a fabric. The standalone
//! *remote* service listens on one topic per server and expects an envelope
//! naming the command, output format, and parameters. The built-in *commands*
//! service listens on one topic per command and takes the bare parameter map.
//! [`EpoClient`] discovers which one a server speaks ([`discovery`]), builds
//! the matching request ([`addressing`]), and dispatches it through a
//! [`Fabric`] implementation, falling back once to the other generation when
//! the fabric reports that nothing listens on the first topic.
//!
//! The fabric itself (broker connection, correlation, delivery) is supplied
//! by the caller through the [`Fabric`] trait.
//!
//! # Example
//!
//! ```rust,no_run
//! use epo_client::{EpoClient, OutputFormat, Params};
//! # fn example(fabric: impl epo_client::Fabric) -> Result<(), epo_client::EpoError> {
//! let client = EpoClient::new(fabric, None)?;
//!
//! let mut params = Params::new();
//! params.insert("searchText".into(), "mySystem".into());
//! let systems = client.run_command("system.find", Some(params), OutputFormat::Json)?;
//! # let _ = systems;
//! # Ok(())
//! # }
//! ```

pub mod addressing;
pub mod client;
pub mod discovery;
pub mod error;
mod exchange;
pub mod fabric;
pub mod protocol;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use self::addressing::{CommandTarget, ServiceTopology};
pub use self::client::EpoClient;
pub use self::discovery::{
    ChannelPrefixResolver, Discovery, MetadataFieldResolver, ResolvedService, ServiceResolver,
};
pub use self::error::{EpoError, ErrorKind};
pub use self::fabric::{Fabric, FabricError, Request, Response};
pub use self::protocol::{
    CommandOutput, OutputFormat, Params, ProtocolVariant, RegistryEntry, RegistryQuery,
    RegistryResponse,
};
