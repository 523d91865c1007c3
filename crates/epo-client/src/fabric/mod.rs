//! Boundary between the client and the messaging fabric.
//!
//! The fabric owns broker connections, topic routing, and request/response
//! correlation. The client only needs one capability from it: send a request
//! to a topic and block until the correlated response arrives or the timeout
//! elapses. [`Fabric`] captures exactly that, so production code can wrap a
//! real DXL connection while tests substitute a double.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[cfg(any(test, feature = "test-support"))]
pub mod local;

/// Topic of the fabric's service registry query pseudo-service.
pub const REGISTRY_QUERY_TOPIC: &str = "/mcafee/service/dxl/svcregistry/query";

/// Error code the fabric reports when no service listens on a request topic.
pub const SERVICE_UNAVAILABLE_ERROR_CODE: i64 = 0x8000_0001;

/// Synchronous request/response capability of a messaging fabric.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use epo_client::{Fabric, FabricError, Request, Response};
///
/// struct EchoFabric;
///
/// impl Fabric for EchoFabric {
///     fn sync_request(
///         &self,
///         request: &Request,
///         _timeout: Duration,
///     ) -> Result<Response, FabricError> {
///         Ok(Response::success(request.payload().to_vec()))
///     }
/// }
/// ```
pub trait Fabric {
    /// Sends `request` and waits up to `timeout` for the correlated response.
    ///
    /// # Errors
    ///
    /// Returns a [`FabricError`] when the request cannot be delivered or no
    /// response arrives in time. Error responses produced by a remote
    /// service are returned as [`Response::Error`], not as `Err`.
    fn sync_request(&self, request: &Request, timeout: Duration)
    -> Result<Response, FabricError>;
}

impl<T: Fabric + ?Sized> Fabric for &T {
    fn sync_request(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, FabricError> {
        (**self).sync_request(request, timeout)
    }
}

impl<T: Fabric + ?Sized> Fabric for Arc<T> {
    fn sync_request(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, FabricError> {
        (**self).sync_request(request, timeout)
    }
}

impl<T: Fabric + ?Sized> Fabric for Box<T> {
    fn sync_request(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, FabricError> {
        (**self).sync_request(request, timeout)
    }
}

/// A request addressed to a fabric topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    topic: String,
    payload: Vec<u8>,
}

impl Request {
    /// Creates a request with a raw payload.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Creates a request whose payload is the JSON encoding of `payload`.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `payload` cannot be encoded.
    pub fn json<T: Serialize + ?Sized>(
        topic: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(topic, serde_json::to_vec(payload)?))
    }

    /// Returns the destination topic.
    #[must_use]
    pub const fn topic(&self) -> &str {
        self.topic.as_str()
    }

    /// Returns the raw payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// A correlated response delivered by the fabric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The service handled the request.
    Success {
        /// Raw response payload.
        payload: Vec<u8>,
    },
    /// The service or the fabric rejected the request.
    Error {
        /// Error message.
        message: String,
        /// Error code.
        code: i64,
    },
}

impl Response {
    /// Creates a successful response.
    #[must_use]
    pub const fn success(payload: Vec<u8>) -> Self {
        Self::Success { payload }
    }

    /// Creates a successful response carrying the JSON encoding of `payload`.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `payload` cannot be encoded.
    pub fn json<T: Serialize + ?Sized>(payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::success(serde_json::to_vec(payload)?))
    }

    /// Creates an error response.
    #[must_use]
    pub fn error(message: impl Into<String>, code: i64) -> Self {
        Self::Error {
            message: message.into(),
            code,
        }
    }

    /// Returns `true` when no listener was found for the request topic.
    #[must_use]
    pub const fn is_service_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Error {
                code: SERVICE_UNAVAILABLE_ERROR_CODE,
                ..
            }
        )
    }
}

/// Failures reported by the fabric itself.
#[derive(Debug, Error)]
pub enum FabricError {
    /// No response arrived before the timeout elapsed.
    #[error("no response within {}ms", .timeout.as_millis())]
    Timeout {
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The fabric client is not connected to a broker.
    #[error("fabric client is not connected")]
    NotConnected,

    /// Any other delivery failure.
    #[error("{message}")]
    Other {
        /// Description of the failure.
        message: String,
    },
}
