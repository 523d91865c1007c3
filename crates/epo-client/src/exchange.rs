//! Synchronous request helper shared by discovery and dispatch.

use std::time::Duration;

use tracing::{Level, debug, enabled};

use crate::error::EpoError;
use crate::fabric::{Fabric, Request, Response};

/// Sends `request` and maps fabric failures to [`EpoError::Transport`].
///
/// Error responses are returned as-is so callers can inspect the code.
pub(crate) fn send<F: Fabric + ?Sized>(
    fabric: &F,
    request: &Request,
    timeout: Duration,
) -> Result<Response, EpoError> {
    if enabled!(Level::DEBUG) {
        debug!(
            topic = request.topic(),
            payload = %pretty_payload(request.payload()),
            "sending request"
        );
    }

    fabric
        .sync_request(request, timeout)
        .map_err(|source| EpoError::Transport {
            topic: request.topic().to_owned(),
            source,
        })
}

/// Extracts the payload of a successful response.
///
/// # Errors
///
/// Returns [`EpoError::Dispatch`] for error responses.
pub(crate) fn into_payload(response: Response) -> Result<Vec<u8>, EpoError> {
    match response {
        Response::Success { payload } => Ok(payload),
        Response::Error { message, code } => Err(EpoError::Dispatch { message, code }),
    }
}

fn pretty_payload(payload: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| String::from_utf8_lossy(payload).into_owned())
}
