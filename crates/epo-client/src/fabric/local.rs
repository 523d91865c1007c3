//! In-process fabric used by tests and embedding applications.
//!
//! [`LocalFabric`] keeps a service registry, answers the registry query
//! pseudo-service, and routes each request synchronously to the handler
//! subscribed to its topic. Requests to topics nobody listens on receive the
//! same service-unavailable error a real broker reports. Every request is
//! recorded so tests can count round trips.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::{
    Fabric, FabricError, REGISTRY_QUERY_TOPIC, Request, Response, SERVICE_UNAVAILABLE_ERROR_CODE,
};
use crate::protocol::{RegistryEntry, RegistryQuery, RegistryResponse};

/// Error code returned when a registry query payload cannot be decoded.
const MALFORMED_QUERY_ERROR_CODE: i64 = 1;

/// Handles requests delivered to a subscribed topic.
pub trait RequestHandler: Send + Sync {
    /// Produces the response for `request`.
    fn on_request(&self, request: &Request) -> Response;
}

impl<F> RequestHandler for F
where
    F: Fn(&Request) -> Response + Send + Sync,
{
    fn on_request(&self, request: &Request) -> Response {
        self(request)
    }
}

/// A service to publish in the [`LocalFabric`] registry.
pub struct ServiceRegistration {
    service_type: String,
    metadata: BTreeMap<String, String>,
    routes: Vec<(String, Arc<dyn RequestHandler>)>,
}

impl ServiceRegistration {
    /// Creates an empty registration for `service_type`.
    #[must_use]
    pub fn new(service_type: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            metadata: BTreeMap::new(),
            routes: Vec::new(),
        }
    }

    /// Adds a metadata entry advertised with the service.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Adds a request channel served by `handler`.
    ///
    /// A trailing `#` matches every topic that shares the preceding prefix.
    #[must_use]
    pub fn with_topic(
        mut self,
        topic: impl Into<String>,
        handler: impl RequestHandler + 'static,
    ) -> Self {
        self.routes.push((topic.into(), Arc::new(handler)));
        self
    }
}

#[derive(Default)]
struct State {
    next_service_id: u64,
    services: BTreeMap<String, ServiceRegistration>,
    subscriptions: Vec<(String, Arc<dyn RequestHandler>)>,
    requests: Vec<Request>,
    disconnected: bool,
}

/// In-memory fabric with a built-in service registry.
pub struct LocalFabric {
    registry_topic: String,
    state: Mutex<State>,
}

impl std::fmt::Debug for LocalFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        let service_ids: Vec<&str> = state.services.keys().map(String::as_str).collect();
        f.debug_struct("LocalFabric")
            .field("registry_topic", &self.registry_topic)
            .field("services", &service_ids)
            .field("subscriptions", &state.subscriptions.len())
            .field("requests", &state.requests.len())
            .field("connected", &!state.disconnected)
            .finish()
    }
}

impl Default for LocalFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalFabric {
    /// Creates an empty, connected fabric.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry_topic: REGISTRY_QUERY_TOPIC.to_owned(),
            state: Mutex::new(State::default()),
        }
    }

    /// Publishes a service and returns its registry identifier.
    pub fn register(&self, registration: ServiceRegistration) -> String {
        let mut state = self.lock();
        state.next_service_id += 1;
        let service_id = format!("local-service-{}", state.next_service_id);
        debug!(
            service_id = %service_id,
            service_type = %registration.service_type,
            "registered local service"
        );
        state.services.insert(service_id.clone(), registration);
        service_id
    }

    /// Removes a previously registered service.
    ///
    /// Returns `false` when no service with that identifier exists.
    pub fn unregister(&self, service_id: &str) -> bool {
        self.lock().services.remove(service_id).is_some()
    }

    /// Subscribes `handler` to `topic` without advertising it in the registry.
    pub fn subscribe(&self, topic: impl Into<String>, handler: impl RequestHandler + 'static) {
        self.lock()
            .subscriptions
            .push((topic.into(), Arc::new(handler)));
    }

    /// Simulates losing (or regaining) the broker connection.
    pub fn set_connected(&self, connected: bool) {
        self.lock().disconnected = !connected;
    }

    /// Returns every request received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    /// Returns how many requests were sent to exactly `topic`.
    #[must_use]
    pub fn request_count(&self, topic: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.topic() == topic)
            .count()
    }

    /// Forgets all recorded requests.
    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query_registry(&self, request: &Request) -> Response {
        let query: RegistryQuery = match serde_json::from_slice(request.payload()) {
            Ok(query) => query,
            Err(error) => {
                return Response::error(
                    format!("malformed registry query: {error}"),
                    MALFORMED_QUERY_ERROR_CODE,
                );
            }
        };

        let state = self.lock();
        let services = state
            .services
            .iter()
            .filter(|(_, service)| service.service_type == query.service_type())
            .map(|(service_id, service)| {
                let entry = RegistryEntry::new(
                    service.service_type.clone(),
                    service.routes.iter().map(|(topic, _)| topic.clone()).collect(),
                    service.metadata.clone(),
                );
                (service_id.clone(), entry)
            })
            .collect();
        drop(state);

        match Response::json(&RegistryResponse::new(services)) {
            Ok(response) => response,
            Err(error) => Response::error(error.to_string(), MALFORMED_QUERY_ERROR_CODE),
        }
    }

    fn find_handler(&self, topic: &str) -> Option<Arc<dyn RequestHandler>> {
        let state = self.lock();
        let registered = state
            .services
            .values()
            .flat_map(|service| service.routes.iter());
        let handler = registered
            .chain(state.subscriptions.iter())
            .find(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, handler)| Arc::clone(handler));
        drop(state);
        handler
    }
}

impl Fabric for LocalFabric {
    fn sync_request(
        &self,
        request: &Request,
        _timeout: Duration,
    ) -> Result<Response, FabricError> {
        {
            let mut state = self.lock();
            if state.disconnected {
                return Err(FabricError::NotConnected);
            }
            state.requests.push(request.clone());
        }

        if request.topic() == self.registry_topic {
            return Ok(self.query_registry(request));
        }

        // The handler runs without the state lock so it may call back into
        // the fabric.
        Ok(match self.find_handler(request.topic()) {
            Some(handler) => handler.on_request(request),
            None => Response::error(
                "unable to locate service for request",
                SERVICE_UNAVAILABLE_ERROR_CODE,
            ),
        })
    }
}

fn topic_matches(filter: &str, topic: &str) -> bool {
    match filter.strip_suffix('#') {
        Some(prefix) => topic.starts_with(prefix),
        None => filter == topic,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn echo(request: &Request) -> Response {
        Response::success(request.payload().to_vec())
    }

    #[rstest]
    #[case("/a/b", "/a/b", true)]
    #[case("/a/b", "/a/b/c", false)]
    #[case("/a/#", "/a/b/c", true)]
    #[case("/a/#", "/b/c", false)]
    fn wildcard_filters_match_by_prefix(
        #[case] filter: &str,
        #[case] topic: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(topic_matches(filter, topic), expected);
    }

    #[test]
    fn routes_to_registered_topic() {
        let fabric = LocalFabric::new();
        fabric.register(ServiceRegistration::new("/svc").with_topic("/svc/echo", echo));

        let request = Request::new("/svc/echo", b"ping".to_vec());
        let response = fabric
            .sync_request(&request, Duration::from_secs(1))
            .expect("request succeeds");

        assert_eq!(response, Response::success(b"ping".to_vec()));
        assert_eq!(fabric.request_count("/svc/echo"), 1);
    }

    #[test]
    fn unknown_topic_reports_service_unavailable() {
        let fabric = LocalFabric::new();
        let request = Request::new("/nobody/home", Vec::new());
        let response = fabric
            .sync_request(&request, Duration::from_secs(1))
            .expect("request succeeds");
        assert!(response.is_service_unavailable(), "got {response:?}");
    }

    #[test]
    fn unregistered_service_stops_answering() {
        let fabric = LocalFabric::new();
        let service_id =
            fabric.register(ServiceRegistration::new("/svc").with_topic("/svc/echo", echo));
        assert!(fabric.unregister(&service_id));
        assert!(!fabric.unregister(&service_id));

        let request = Request::new("/svc/echo", Vec::new());
        let response = fabric
            .sync_request(&request, Duration::from_secs(1))
            .expect("request succeeds");
        assert!(response.is_service_unavailable());
    }

    #[test]
    fn registry_query_filters_by_service_type() {
        let fabric = LocalFabric::new();
        fabric.register(
            ServiceRegistration::new("/svc/one")
                .with_metadata("owner", "tests")
                .with_topic("/svc/one/a", echo),
        );
        fabric.register(ServiceRegistration::new("/svc/two").with_topic("/svc/two/b", echo));

        let request = Request::json(REGISTRY_QUERY_TOPIC, &RegistryQuery::new("/svc/one"))
            .expect("encode query");
        let response = fabric
            .sync_request(&request, Duration::from_secs(1))
            .expect("request succeeds");
        let Response::Success { payload } = response else {
            panic!("expected success, got {response:?}");
        };
        let decoded: RegistryResponse = serde_json::from_slice(&payload).expect("decode");

        let entries: Vec<&RegistryEntry> = decoded.entries().collect();
        assert_eq!(entries.len(), 1);
        let entry = entries.first().expect("one entry");
        assert_eq!(entry.request_channels(), ["/svc/one/a".to_owned()]);
        assert_eq!(entry.metadata().get("owner").map(String::as_str), Some("tests"));
    }

    #[test]
    fn debug_lists_services_without_handlers() {
        let fabric = LocalFabric::new();
        let service_id =
            fabric.register(ServiceRegistration::new("/svc").with_topic("/svc/a", echo));

        let rendered = format!("{fabric:?}");

        assert!(rendered.starts_with("LocalFabric"), "got {rendered}");
        assert!(rendered.contains(&service_id), "got {rendered}");
        assert!(rendered.contains("connected: true"), "got {rendered}");
    }

    #[test]
    fn disconnected_fabric_fails_requests() {
        let fabric = LocalFabric::new();
        fabric.set_connected(false);
        let request = Request::new("/svc", Vec::new());
        let error = fabric
            .sync_request(&request, Duration::from_secs(1))
            .expect_err("disconnected fabric must fail");
        assert!(matches!(error, FabricError::NotConnected));
        assert!(fabric.requests().is_empty());
    }
}
