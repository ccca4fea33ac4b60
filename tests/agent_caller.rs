use httpmock::MockServer;
use serde_json::json;

use kg_coordinator::gateway::{AgentCaller, AgentRequest, HttpAgentCaller};
use kg_coordinator::ids::Iri;

/// Exercises the real `HttpAgentCaller` against the wire contract in §6:
/// request carries `derived_agent_input` in order, response is parsed from
/// `derived_agent_output`.
#[test]
fn http_agent_caller_round_trips_the_wire_contract() {
    let server = MockServer::start();
    let inputs = vec![Iri::from("http://b"), Iri::from("http://a")];

    let mock = server.mock(|when, then| {
        when.method(httpmock::Method::POST)
            .path("/agent")
            .json_body(json!({ "derived_agent_input": ["http://b", "http://a"] }));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "derived_agent_output": ["http://x-new"] }));
    });

    let caller = HttpAgentCaller::default();
    let request = AgentRequest::new(&inputs);
    let response = caller.call(&server.url("/agent"), &request).expect("agent call should succeed");

    assert_eq!(response.derived_agent_output, vec!["http://x-new".to_string()]);
    mock.assert();
}

#[test]
fn http_agent_caller_surfaces_server_errors() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/agent");
        then.status(500);
    });

    let caller = HttpAgentCaller::default();
    let request = AgentRequest::new(&[]);
    assert!(caller.call(&server.url("/agent"), &request).is_err());
}
