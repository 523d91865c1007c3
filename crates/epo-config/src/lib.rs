//! Shared configuration for the ePO remote command client.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an optional
//! TOML file (`--config-path` or `EPO_CONFIG_PATH`), then `EPO_*` environment
//! variables, then command-line flags. Embedding applications typically call
//! [`Config::load_from_iter`] with their own arguments and hand the result to
//! `epo_client::EpoClient::from_config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_RESPONSE_TIMEOUT_SECS, MIN_RESPONSE_TIMEOUT_SECS,
    default_log_filter_string, default_log_format, default_response_timeout_secs,
};
pub use logging::LogFormat;

/// Client configuration resolved from defaults, files, environment, and CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "EPO")]
pub struct Config {
    /// Unique identifier of the ePO server to address. When absent the
    /// client discovers the single registered server.
    pub unique_id: Option<String>,
    /// Seconds to wait for each synchronous fabric request.
    #[ortho_config(default = DEFAULT_RESPONSE_TIMEOUT_SECS)]
    pub response_timeout_secs: u64,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for the tracing subscriber.
    #[ortho_config(default = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unique_id: None,
            response_timeout_secs: default_response_timeout_secs(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Configured ePO unique identifier, if any.
    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    /// Configured response timeout.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Configured log filter expression.
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Configured log format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
