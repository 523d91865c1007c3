/// Default number of seconds to wait for a response from the fabric.
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 30;

/// Smallest response timeout, in seconds, a caller may configure.
pub const MIN_RESPONSE_TIMEOUT_SECS: u64 = 30;

/// Default log filter expression used by embedding applications.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default response timeout in seconds.
pub fn default_response_timeout_secs() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT_SECS
}
