//! Behaviour-driven tests for discovery and command dispatch.

use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::json;

use super::{HELP_LINES, ServerMode, serve_epo};
use crate::client::EpoClient;
use crate::error::EpoError;
use crate::fabric::local::LocalFabric;
use crate::protocol::{CommandOutput, OutputFormat, Params};

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    fabric: Arc<LocalFabric>,
    client: Option<Result<EpoClient<Arc<LocalFabric>>, EpoError>>,
    output: Option<Result<CommandOutput, EpoError>>,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn unquote(text: &str) -> &str {
    text.trim_matches('"')
}

fn connect(world: &mut TestWorld, unique_id: Option<&str>) {
    let client = EpoClient::new(Arc::clone(&world.fabric), unique_id);
    world.fabric.clear_requests();
    world.client = Some(client);
}

fn connected_client(world: &TestWorld) -> &EpoClient<Arc<LocalFabric>> {
    match world.client.as_ref().expect("client should have been created") {
        Ok(client) => client,
        Err(error) => panic!("client failed to connect: {error}"),
    }
}

fn connect_error(world: &TestWorld) -> &EpoError {
    match world.client.as_ref().expect("client should have been created") {
        Ok(client) => panic!("expected failure, bound to {}", client.epo_unique_id()),
        Err(error) => error,
    }
}

fn successful_output(world: &TestWorld) -> &CommandOutput {
    match world.output.as_ref().expect("a command should have run") {
        Ok(output) => output,
        Err(error) => panic!("command failed: {error}"),
    }
}

fn parse_count(text: &str) -> usize {
    unquote(text).parse().expect("count should be numeric")
}

// ---------------------------------------------------------------------------
// Given
// ---------------------------------------------------------------------------

#[given("an empty fabric")]
fn given_empty_fabric(world: &mut TestWorld) {
    world.fabric = Arc::new(LocalFabric::new());
}

#[given("an ePO server {id} speaking the commands service")]
fn given_commands_server(world: &mut TestWorld, id: String) {
    serve_epo(&world.fabric, unquote(&id), ServerMode::Commands);
}

#[given("an ePO server {id} speaking the remote service")]
fn given_remote_server(world: &mut TestWorld, id: String) {
    serve_epo(&world.fabric, unquote(&id), ServerMode::Legacy);
}

#[given("an ePO server {id} advertising commands but answering on the remote topic")]
fn given_misadvertised_server(world: &mut TestWorld, id: String) {
    serve_epo(&world.fabric, unquote(&id), ServerMode::Misadvertised);
}

// ---------------------------------------------------------------------------
// When
// ---------------------------------------------------------------------------

#[when("a client connects without an identifier")]
fn when_connect_implicitly(world: &mut TestWorld) {
    connect(world, None);
}

#[when("a client connects to {id}")]
fn when_connect_explicitly(world: &mut TestWorld, id: String) {
    connect(world, Some(unquote(&id)));
}

#[when("the client searches systems for {text}")]
fn when_search_systems(world: &mut TestWorld, text: String) {
    let mut params = Params::new();
    params.insert("searchText".to_owned(), json!(unquote(&text)));
    let output = connected_client(world).run_command(
        "system.find",
        Some(params),
        OutputFormat::Json,
    );
    world.output = Some(output);
}

#[when("the client requests verbose help")]
fn when_verbose_help(world: &mut TestWorld) {
    let output = connected_client(world).help(OutputFormat::Verbose);
    world.output = Some(output);
}

#[when("the client requests help as {format}")]
fn when_help_as(world: &mut TestWorld, format: String) {
    let output =
        connected_client(world).run_command_with_format_name("core.help", None, unquote(&format));
    world.output = Some(output);
}

// ---------------------------------------------------------------------------
// Then
// ---------------------------------------------------------------------------

#[then("the client is bound to {id}")]
fn then_bound_to(world: &mut TestWorld, id: String) {
    assert_eq!(connected_client(world).epo_unique_id(), unquote(&id));
}

#[then("connecting fails with {message}")]
fn then_connect_fails_with(world: &mut TestWorld, message: String) {
    assert_eq!(connect_error(world).to_string(), unquote(&message));
}

#[then("connecting fails listing {ids}")]
fn then_connect_fails_listing(world: &mut TestWorld, ids: String) {
    let error = connect_error(world);
    assert!(
        matches!(error, EpoError::MultipleServices { .. }),
        "got {error}"
    );
    assert!(
        error.to_string().contains(unquote(&ids)),
        "expected '{}' in '{error}'",
        unquote(&ids)
    );
}

#[then("the command returns {count} systems")]
fn then_system_count(world: &mut TestWorld, count: String) {
    let systems = successful_output(world)
        .as_json()
        .and_then(serde_json::Value::as_array)
        .expect("system list should be a JSON array");
    assert_eq!(systems.len(), parse_count(&count));
}

#[then("the output is the help text joined by newlines")]
fn then_help_joined(world: &mut TestWorld) {
    assert_eq!(
        successful_output(world).as_text(),
        Some(HELP_LINES.join("\n").as_str())
    );
}

#[then("the command fails as {kind}")]
fn then_command_fails_as(world: &mut TestWorld, kind: String) {
    match world.output.as_ref().expect("a command should have run") {
        Ok(output) => panic!("expected failure, got {output}"),
        Err(error) => assert_eq!(error.kind().to_string(), unquote(&kind)),
    }
}

#[then("no command request reached the fabric")]
fn then_no_requests(world: &mut TestWorld) {
    assert!(world.fabric.requests().is_empty());
}

#[then("the commands topic was tried {count} time")]
fn then_commands_topic_count(world: &mut TestWorld, count: String) {
    let topic = "/mcafee/service/epo/command/local_test0/remote/core/help";
    assert_eq!(world.fabric.request_count(topic), parse_count(&count));
}

#[then("the remote topic was used {count} times")]
fn then_remote_topic_count(world: &mut TestWorld, count: String) {
    let topic = "/mcafee/service/epo/remote/local_test0";
    assert_eq!(world.fabric.request_count(topic), parse_count(&count));
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/epo_client.feature",
    name = "A lone commands service is discovered"
)]
fn lone_commands_service_is_discovered(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/epo_client.feature",
    name = "An empty fabric has no ePO service"
)]
fn empty_fabric_has_no_service(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/epo_client.feature",
    name = "Several registered servers need an explicit identifier"
)]
fn several_servers_need_identifier(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/epo_client.feature",
    name = "An explicit identifier selects one of several servers"
)]
fn explicit_identifier_selects_server(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/epo_client.feature",
    name = "Searching systems through the remote service"
)]
fn search_through_remote_service(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/epo_client.feature",
    name = "Searching systems through the commands service"
)]
fn search_through_commands_service(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/epo_client.feature",
    name = "Verbose help from the commands service"
)]
fn verbose_help_from_commands_service(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/epo_client.feature",
    name = "XML output from the commands service is refused"
)]
fn xml_output_is_refused(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/epo_client.feature",
    name = "Unknown output format names are refused"
)]
fn unknown_format_is_refused(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/epo_client.feature",
    name = "A misadvertised server is reached through the remote topic"
)]
fn misadvertised_server_falls_back(world: TestWorld) {
    let _ = world;
}
