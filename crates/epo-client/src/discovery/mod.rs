//! Service discovery against the fabric's service registry.
//!
//! Each service generation advertises its server identifier differently: the
//! remote service encodes it in the suffix of its request channel, the
//! commands service publishes it as a metadata field. A [`ServiceResolver`]
//! captures one of those conventions; [`Discovery`] queries the registry once
//! per resolver and classifies identifiers by the resolver that found them.
//! Resolvers are consulted in priority order, so an identifier advertised by
//! both generations is attributed to the first.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info};

use crate::addressing::ServiceTopology;
use crate::error::EpoError;
use crate::exchange;
use crate::fabric::{Fabric, Request};
use crate::protocol::{ProtocolVariant, RegistryEntry, RegistryQuery, RegistryResponse};

/// Extracts server identifiers from registry entries of one service type.
pub trait ServiceResolver: Send + Sync {
    /// Service generation the identifiers belong to.
    fn variant(&self) -> ProtocolVariant;

    /// Registry service type to query.
    fn service_type(&self) -> &str;

    /// Identifiers advertised by `entry`.
    fn identifiers(&self, entry: &RegistryEntry) -> Vec<String>;
}

/// Finds identifiers as the suffix of request channels sharing a prefix.
#[derive(Debug, Clone)]
pub struct ChannelPrefixResolver {
    variant: ProtocolVariant,
    service_type: String,
    prefix: String,
}

impl ChannelPrefixResolver {
    /// Creates a resolver for channels of the form `<prefix><identifier>`.
    #[must_use]
    pub fn new(
        variant: ProtocolVariant,
        service_type: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            variant,
            service_type: service_type.into(),
            prefix: prefix.into(),
        }
    }
}

impl ServiceResolver for ChannelPrefixResolver {
    fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    fn service_type(&self) -> &str {
        self.service_type.as_str()
    }

    fn identifiers(&self, entry: &RegistryEntry) -> Vec<String> {
        entry
            .request_channels()
            .iter()
            .filter_map(|channel| channel.strip_prefix(self.prefix.as_str()))
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

/// Finds identifiers in a named metadata field.
#[derive(Debug, Clone)]
pub struct MetadataFieldResolver {
    variant: ProtocolVariant,
    service_type: String,
    field: String,
}

impl MetadataFieldResolver {
    /// Creates a resolver reading `field` from each entry's metadata.
    #[must_use]
    pub fn new(
        variant: ProtocolVariant,
        service_type: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            variant,
            service_type: service_type.into(),
            field: field.into(),
        }
    }
}

impl ServiceResolver for MetadataFieldResolver {
    fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    fn service_type(&self) -> &str {
        self.service_type.as_str()
    }

    fn identifiers(&self, entry: &RegistryEntry) -> Vec<String> {
        entry
            .metadata()
            .get(self.field.as_str())
            .filter(|id| !id.is_empty())
            .cloned()
            .into_iter()
            .collect()
    }
}

/// An identifier bound to the service generation it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    epo_unique_id: String,
    variant: ProtocolVariant,
}

impl ResolvedService {
    /// Returns the ePO unique identifier.
    #[must_use]
    pub const fn epo_unique_id(&self) -> &str {
        self.epo_unique_id.as_str()
    }

    /// Returns the service generation.
    #[must_use]
    pub const fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Splits into identifier and service generation.
    #[must_use]
    pub fn into_parts(self) -> (String, ProtocolVariant) {
        (self.epo_unique_id, self.variant)
    }
}

/// Identifiers found per resolver, in resolver priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredServices {
    groups: Vec<(ProtocolVariant, BTreeSet<String>)>,
}

impl DiscoveredServices {
    /// Returns the union of all identifiers, sorted ascending.
    #[must_use]
    pub fn identifiers(&self) -> BTreeSet<String> {
        self.groups
            .iter()
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// Returns the generation `id` was found under, honouring priority.
    #[must_use]
    pub fn classify(&self, id: &str) -> Option<ProtocolVariant> {
        self.groups
            .iter()
            .find(|(_, ids)| ids.contains(id))
            .map(|(variant, _)| *variant)
    }
}

/// Registry-backed discovery composed from [`ServiceResolver`] strategies.
pub struct Discovery {
    registry_topic: String,
    resolvers: Vec<Box<dyn ServiceResolver>>,
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let service_types: Vec<&str> = self
            .resolvers
            .iter()
            .map(|resolver| resolver.service_type())
            .collect();
        f.debug_struct("Discovery")
            .field("registry_topic", &self.registry_topic)
            .field("service_types", &service_types)
            .finish()
    }
}

impl Discovery {
    /// Creates discovery over `resolvers`, highest priority first.
    #[must_use]
    pub fn new(registry_topic: impl Into<String>, resolvers: Vec<Box<dyn ServiceResolver>>) -> Self {
        Self {
            registry_topic: registry_topic.into(),
            resolvers,
        }
    }

    /// Creates the standard discovery for both ePO service generations.
    ///
    /// The remote generation takes priority over the commands generation.
    #[must_use]
    pub fn for_topology(topology: &ServiceTopology) -> Self {
        let remote = ChannelPrefixResolver::new(
            ProtocolVariant::LegacyRemote,
            topology.service_type(ProtocolVariant::LegacyRemote),
            topology.remote_request_prefix(),
        );
        let commands = MetadataFieldResolver::new(
            ProtocolVariant::Commands,
            topology.service_type(ProtocolVariant::Commands),
            topology.commands_id_field(),
        );
        Self::new(
            topology.registry_topic(),
            vec![Box::new(remote), Box::new(commands)],
        )
    }

    /// Queries the registry once per resolver.
    ///
    /// # Errors
    ///
    /// Returns [`EpoError::Transport`] or [`EpoError::Dispatch`] when a
    /// registry query fails, or [`EpoError::DecodeRegistry`] when its
    /// response cannot be decoded.
    pub fn lookup<F: Fabric + ?Sized>(
        &self,
        fabric: &F,
        timeout: Duration,
    ) -> Result<DiscoveredServices, EpoError> {
        let mut groups = Vec::with_capacity(self.resolvers.len());
        for resolver in &self.resolvers {
            let response = self.query(fabric, resolver.service_type(), timeout)?;
            let ids: BTreeSet<String> = response
                .entries()
                .flat_map(|entry| resolver.identifiers(entry))
                .collect();
            debug!(
                service_type = resolver.service_type(),
                count = ids.len(),
                "registry lookup complete"
            );
            groups.push((resolver.variant(), ids));
        }
        Ok(DiscoveredServices { groups })
    }

    /// Resolves the server to address and the generation it speaks.
    ///
    /// With an explicit identifier the registry confirms it is online. Without
    /// one, exactly one identifier must be registered.
    ///
    /// # Errors
    ///
    /// Returns [`EpoError::ServiceNotFound`] when the explicit identifier is
    /// not registered, [`EpoError::NoServiceRegistered`] or
    /// [`EpoError::MultipleServices`] when implicit discovery is not
    /// conclusive, or any error from [`Discovery::lookup`].
    pub fn resolve<F: Fabric + ?Sized>(
        &self,
        fabric: &F,
        explicit_id: Option<&str>,
        timeout: Duration,
    ) -> Result<ResolvedService, EpoError> {
        let discovered = self.lookup(fabric, timeout)?;

        let epo_unique_id = match explicit_id {
            Some(id) => id.to_owned(),
            None => {
                debug!("attempting to find ePO service identifier");
                let mut registered = discovered.identifiers().into_iter();
                match (registered.next(), registered.next()) {
                    (None, _) => return Err(EpoError::NoServiceRegistered),
                    (Some(only), None) => only,
                    (Some(first), Some(second)) => {
                        let ids = [first, second].into_iter().chain(registered).collect();
                        return Err(EpoError::MultipleServices { ids });
                    }
                }
            }
        };

        let variant =
            discovered
                .classify(&epo_unique_id)
                .ok_or_else(|| EpoError::ServiceNotFound {
                    epo_unique_id: epo_unique_id.clone(),
                })?;

        info!(epo_unique_id = %epo_unique_id, %variant, "resolved ePO service");
        Ok(ResolvedService {
            epo_unique_id,
            variant,
        })
    }

    fn query<F: Fabric + ?Sized>(
        &self,
        fabric: &F,
        service_type: &str,
        timeout: Duration,
    ) -> Result<RegistryResponse, EpoError> {
        let request = Request::json(self.registry_topic.as_str(), &RegistryQuery::new(service_type))
            .map_err(EpoError::SerializePayload)?;
        let payload = exchange::into_payload(exchange::send(fabric, &request, timeout)?)?;
        serde_json::from_slice(&payload).map_err(|error| EpoError::DecodeRegistry {
            message: format!("service type '{service_type}': {error}"),
            source: Some(error),
        })
    }
}
