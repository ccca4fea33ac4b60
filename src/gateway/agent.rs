use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::ids::Iri;

/// Wire request to a derivation agent (§6): `{"derived_agent_input": [...]}`,
/// preserving the triple store's input ordering.
#[derive(Debug, Serialize)]
pub struct AgentRequest {
    pub derived_agent_input: Vec<String>,
}

impl AgentRequest {
    pub fn new(inputs: &[Iri]) -> Self {
        Self {
            derived_agent_input: inputs.iter().map(|i| i.0.clone()).collect(),
        }
    }
}

/// Wire response from a derivation agent: `{"derived_agent_output": [...]}`.
#[derive(Debug, Deserialize)]
pub struct AgentResponse {
    pub derived_agent_output: Vec<String>,
}

/// The HTTP Agent Caller collaborator (§6): performs a synchronous HTTP call
/// with a JSON body and returns the decoded body, or fails. §9 notes the
/// source used GET-with-body, which some stacks disallow; this crate issues
/// POST instead — the wire JSON shape is the normative contract, not the verb.
pub trait AgentCaller: Send + Sync {
    fn call(&self, url: &str, body: &AgentRequest) -> Result<AgentResponse, AgentError>;
}

pub struct HttpAgentCaller {
    client: reqwest::blocking::Client,
}

impl Default for HttpAgentCaller {
    fn default() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl AgentCaller for HttpAgentCaller {
    fn call(&self, url: &str, body: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|err| AgentError(anyhow::Error::from(err)))?;

        let response = response
            .error_for_status()
            .map_err(|err| AgentError(anyhow::Error::from(err)))?;

        let text = response
            .text()
            .map_err(|err| AgentError(anyhow::Error::from(err)))?;

        parse_agent_response(&text)
    }
}

fn parse_agent_response(text: &str) -> Result<AgentResponse, AgentError> {
    serde_json::from_str::<AgentResponse>(text)
        .map_err(|err| AgentError(anyhow::anyhow!("malformed agent response: {err}: {text}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_response() {
        let text = r#"{"derived_agent_output": ["http://x-new"]}"#;
        let parsed = parse_agent_response(text).unwrap();
        assert_eq!(parsed.derived_agent_output, vec!["http://x-new".to_string()]);
    }

    #[test]
    fn rejects_missing_key() {
        let text = r#"{"output": []}"#;
        assert!(parse_agent_response(text).is_err());
    }

    #[test]
    fn request_preserves_input_order() {
        let inputs = vec![Iri::from("http://b"), Iri::from("http://a")];
        let req = AgentRequest::new(&inputs);
        assert_eq!(req.derived_agent_input, vec!["http://b", "http://a"]);
    }
}
