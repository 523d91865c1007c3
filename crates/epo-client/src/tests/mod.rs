//! Shared doubles and behavioural tests for the ePO client.

mod behaviour;

use std::time::Duration;

use mockall::mock;
use serde_json::{Value, json};

use crate::fabric::local::{LocalFabric, ServiceRegistration};
use crate::fabric::{Fabric, FabricError, Request, Response};
use crate::protocol::{OutputFormat, Params, RemoteCommandEnvelope};

mock! {
    pub Fabric {}
    impl Fabric for Fabric {
        fn sync_request(&self, request: &Request, timeout: Duration) -> Result<Response, FabricError>;
    }
}

/// Identifier the simulated ePO server registers under.
pub(crate) const LOCAL_TEST_SERVER: &str = "local_test0";

pub(crate) const HELP_LINES: [&str; 2] = [
    "core.help [command] [prefix=<>] - Displays a list of all commands and help \r\nstrings.",
    "system.find [searchText] [searchNameOnly] - Finds systems in the System Tree",
];

/// How the simulated ePO server presents itself on the fabric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum ServerMode {
    /// Built-in commands service: one wildcard topic, identifier in metadata.
    #[default]
    Commands,
    /// Standalone remote service: one topic named after the identifier.
    Legacy,
    /// Advertises the commands service but only answers on the remote topic.
    Misadvertised,
}

pub(crate) fn find_results() -> Value {
    json!([
        {
            "EPOComputerProperties.ComputerName": "linux-host-1",
            "EPOComputerProperties.OSType": "Linux",
            "EPOLeafNode.AgentGUID": "2F6A5E48-5B8B-11E6-2C4E-000C29F6E8C9"
        },
        {
            "EPOComputerProperties.ComputerName": "linux-host-2",
            "EPOComputerProperties.OSType": "Linux",
            "EPOLeafNode.AgentGUID": "3C1B7A90-5B8B-11E6-0A4E-000C29F6E8D0"
        }
    ])
}

/// Publishes a simulated ePO server on `fabric` and returns its registry id.
pub(crate) fn serve_epo(fabric: &LocalFabric, server_id: &str, mode: ServerMode) -> String {
    let remote_topic = format!("/mcafee/service/epo/remote/{server_id}");
    match mode {
        ServerMode::Commands => {
            fabric.register(
                ServiceRegistration::new("/mcafee/service/epo/commands")
                    .with_metadata("epoGuid", server_id)
                    .with_topic(
                        format!("/mcafee/service/epo/command/{server_id}/remote/#"),
                        answer_commands_request,
                    ),
            )
        }
        ServerMode::Legacy => fabric.register(
            ServiceRegistration::new("/mcafee/service/epo/remote")
                .with_topic(remote_topic, answer_remote_request),
        ),
        ServerMode::Misadvertised => {
            fabric.subscribe(remote_topic, answer_remote_request);
            fabric.register(
                ServiceRegistration::new("/mcafee/service/epo/commands")
                    .with_metadata("epoGuid", server_id),
            )
        }
    }
}

fn answer_commands_request(request: &Request) -> Response {
    let command = request
        .topic()
        .rsplit_once("/remote/")
        .map(|(_, path)| path.replace('/', "."))
        .unwrap_or_default();
    let params: Params = serde_json::from_slice(request.payload()).unwrap_or_default();
    answer(&command, &params, OutputFormat::Json)
}

fn answer_remote_request(request: &Request) -> Response {
    let envelope: RemoteCommandEnvelope =
        serde_json::from_slice(request.payload()).expect("remote envelope should decode");
    answer(envelope.command(), envelope.params(), envelope.output())
}

fn answer(command: &str, params: &Params, output: OutputFormat) -> Response {
    match command {
        "core.help" if output == OutputFormat::Json => {
            Response::json(&HELP_LINES).expect("help lines should encode")
        }
        "core.help" => Response::success(HELP_LINES.join("\n").into_bytes()),
        "system.find" => {
            let results = if params.get("searchText") == Some(&json!("Linux")) {
                find_results()
            } else {
                json!([])
            };
            Response::json(&results).expect("results should encode")
        }
        other => Response::success(format!("Error 1 : \nNo such command: {other}").into_bytes()),
    }
}
