//! Derived-Quantity Engine (§4.5): the recursive up-to-date protocol over
//! the `isDerivedFrom` graph.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{AgentError, CircularDependencyError, CoordinatorError, ReconnectionError};
use crate::gateway::agent::{AgentCaller, AgentRequest};
use crate::ids::Iri;

use super::metadata::DerivedMetadata;

pub struct DerivedEngine {
    metadata: DerivedMetadata,
    agent: Arc<dyn AgentCaller>,
}

impl DerivedEngine {
    pub fn new(metadata: DerivedMetadata, agent: Arc<dyn AgentCaller>) -> Self {
        Self { metadata, agent }
    }

    pub fn metadata(&self) -> &DerivedMetadata {
        &self.metadata
    }

    /// §4.5 update(node-id).
    pub fn update(&self, node_id: &Iri) -> Result<(), CoordinatorError> {
        let mut visited = HashSet::new();
        self.update_recursive(node_id, &mut visited)
    }

    fn update_recursive(&self, node_id: &Iri, visited: &mut HashSet<Iri>) -> Result<(), CoordinatorError> {
        let inputs = self.metadata.get_inputs(node_id)?;

        for input in &inputs {
            if visited.contains(input) {
                return Err(CircularDependencyError(input.0.clone()).into());
            }
            visited.insert(node_id.clone());
            self.update_recursive(input, visited)?;
        }

        if inputs.is_empty() {
            return Ok(());
        }

        let node_ts = self.metadata.get_timestamp(node_id)?;
        let mut out_of_date = false;
        for input in &inputs {
            if self.metadata.get_timestamp(input)? > node_ts {
                out_of_date = true;
            }
        }

        if !out_of_date {
            return Ok(());
        }

        self.invoke_and_reconcile(node_id, &inputs)?;
        self.metadata.update_timestamp(node_id, None)?;
        Ok(())
    }

    fn invoke_and_reconcile(&self, node_id: &Iri, inputs: &[Iri]) -> Result<(), CoordinatorError> {
        let agent_url = self
            .metadata
            .get_agent_url(node_id)?
            .ok_or_else(|| AgentError(anyhow::anyhow!("no agent registered for derived node `{node_id}`")))?;

        let request = AgentRequest::new(inputs);
        let response = self.agent.call(&agent_url, &request)?;
        let new_outputs: Vec<Iri> = response.derived_agent_output.into_iter().map(Iri::from).collect();

        if !self.metadata.is_derived_with_time_series(node_id)? {
            self.reconcile_outputs(node_id, &new_outputs)?;
        }

        Ok(())
    }

    /// §4.5 step 4, skipped for time-series-derived nodes: delete `node_id`'s
    /// current outputs and reconnect any downstream `isDerivedFrom` edges to
    /// new entities of the same rdf:type.
    fn reconcile_outputs(&self, node_id: &Iri, new_outputs: &[Iri]) -> Result<(), CoordinatorError> {
        let old_outputs = self.metadata.get_derived_entities(node_id)?;
        if old_outputs.is_empty() {
            return Ok(());
        }

        let references = self.metadata.get_is_derived_from_entities(&old_outputs)?;

        self.metadata.delete_instances(&old_outputs)?;

        let needs_reconnection: Vec<_> = references.iter().filter(|r| !r.downstream.is_empty()).collect();
        if needs_reconnection.is_empty() {
            return Ok(());
        }

        let mut new_output_types: Vec<(Iri, Option<Iri>)> = Vec::with_capacity(new_outputs.len());
        for entity in new_outputs {
            let rdf_type = self.metadata.get_instance_class(entity)?;
            new_output_types.push((entity.clone(), rdf_type));
        }

        for reference in needs_reconnection {
            let first_downstream = reference
                .downstream
                .first()
                .expect("filtered on non-empty downstream above")
                .0
                .clone();

            let rdf_type = reference.rdf_type.clone().ok_or_else(|| ReconnectionError::NoMatch {
                downstream: first_downstream.clone(),
                rdf_type: "<untyped>".to_string(),
            })?;

            let matches: Vec<&Iri> = new_output_types
                .iter()
                .filter(|(_, t)| t.as_ref() == Some(&rdf_type))
                .map(|(entity, _)| entity)
                .collect();

            let matched = match matches.len() {
                0 => {
                    return Err(ReconnectionError::NoMatch {
                        downstream: first_downstream,
                        rdf_type: rdf_type.0.clone(),
                    }
                    .into())
                }
                1 => matches[0].clone(),
                count => {
                    return Err(ReconnectionError::AmbiguousMatch {
                        downstream: first_downstream,
                        rdf_type: rdf_type.0.clone(),
                        count,
                    }
                    .into())
                }
            };

            for downstream in &reference.downstream {
                self.metadata.reconnect_input(&matched, downstream)?;
            }
        }

        Ok(())
    }

    /// §4.5 validate(node-id): identical traversal and cycle detection,
    /// asserting every visited derived node and input has a readable
    /// timestamp. Pure read; never mutates.
    pub fn validate(&self, node_id: &Iri) -> Result<bool, CoordinatorError> {
        let mut visited = HashSet::new();
        self.validate_recursive(node_id, &mut visited)
    }

    fn validate_recursive(&self, node_id: &Iri, visited: &mut HashSet<Iri>) -> Result<bool, CoordinatorError> {
        let inputs = self.metadata.get_inputs(node_id)?;

        for input in &inputs {
            if visited.contains(input) {
                return Ok(false);
            }
            visited.insert(node_id.clone());
            if !self.validate_recursive(input, visited)? {
                return Ok(false);
            }
        }

        if inputs.is_empty() {
            return Ok(true);
        }

        if self.metadata.get_timestamp(node_id).is_err() {
            return Ok(false);
        }
        for input in &inputs {
            if self.metadata.get_timestamp(input).is_err() {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::Value as JsonValue;

    use crate::error::{MetadataReadError, MetadataWriteError};
    use crate::gateway::agent::AgentResponse;
    use crate::gateway::sparql::SparqlGateway;

    use super::*;

    /// A tiny in-memory triple store, just enough to drive the engine
    /// through its traversal and reconciliation logic without a network
    /// round-trip. Queries are matched by substring, not parsed as SPARQL.
    struct FakeGateway {
        inputs: Mutex<std::collections::HashMap<String, Vec<String>>>,
        timestamps: Mutex<std::collections::HashMap<String, i64>>,
        agent_urls: std::collections::HashMap<String, String>,
    }

    impl SparqlGateway for FakeGateway {
        fn execute_query(&self, query: &str) -> Result<JsonValue, MetadataReadError> {
            if query.contains("isDerivedFrom") && query.contains("?input") {
                let node = extract_subject(query);
                let inputs = self.inputs.lock().unwrap().get(&node).cloned().unwrap_or_default();
                let rows: Vec<JsonValue> = inputs
                    .iter()
                    .map(|i| serde_json::json!({"input": {"type": "uri", "value": i}}))
                    .collect();
                return Ok(JsonValue::Array(rows));
            }
            if query.contains("numericPosition") {
                let node = extract_subject(query);
                let ts = self.timestamps.lock().unwrap().get(&node).copied();
                return Ok(match ts {
                    Some(t) => serde_json::json!([{"t": {"type": "literal", "value": t.to_string()}}]),
                    None => JsonValue::Array(vec![]),
                });
            }
            if query.contains("hasHttpUrl") {
                let node = extract_subject(query);
                let url = self.agent_urls.get(&node).cloned();
                return Ok(match url {
                    Some(u) => serde_json::json!([{"url": {"type": "literal", "value": u}}]),
                    None => JsonValue::Array(vec![]),
                });
            }
            if query.contains("hasTimeSeries") {
                return Ok(serde_json::json!({"ASK": false}));
            }
            if query.contains("belongsTo") {
                return Ok(JsonValue::Array(vec![]));
            }
            Ok(JsonValue::Array(vec![]))
        }

        fn execute_update(&self, update: &str) -> Result<(), MetadataWriteError> {
            if update.contains("numericPosition") {
                let node = extract_subject(update);
                self.timestamps.lock().unwrap().insert(node, 999);
            }
            Ok(())
        }
    }

    fn extract_subject(query: &str) -> String {
        let search_from = query.find("WHERE").map(|idx| idx + 5).unwrap_or(0);
        let rest = &query[search_from..];
        let start = rest.find('<').unwrap_or(0) + 1;
        let end = rest[start..].find('>').unwrap_or(0) + start;
        rest[start..end].to_string()
    }

    struct FakeAgent;

    impl AgentCaller for FakeAgent {
        fn call(&self, _url: &str, _body: &AgentRequest) -> Result<AgentResponse, AgentError> {
            Ok(AgentResponse {
                derived_agent_output: vec!["http://x-new".to_string()],
            })
        }
    }

    fn engine_with(
        inputs: Vec<(&str, Vec<&str>)>,
        timestamps: Vec<(&str, i64)>,
        agent_urls: Vec<(&str, &str)>,
    ) -> DerivedEngine {
        let inputs = inputs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.into_iter().map(String::from).collect()))
            .collect();
        let timestamps = timestamps.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let agent_urls = agent_urls.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();

        let gateway: Arc<dyn SparqlGateway> = Arc::new(FakeGateway {
            inputs: Mutex::new(inputs),
            timestamps: Mutex::new(timestamps),
            agent_urls,
        });
        let metadata = DerivedMetadata::new(gateway);
        DerivedEngine::new(metadata, Arc::new(FakeAgent))
    }

    #[test]
    fn update_detects_cycle() {
        let engine = engine_with(
            vec![("http://a", vec!["http://b"]), ("http://b", vec!["http://a"])],
            vec![("http://a", 1), ("http://b", 1)],
            vec![],
        );
        let err = engine.update(&Iri::from("http://a")).unwrap_err();
        assert!(matches!(err, CoordinatorError::CircularDependency(_)));
    }

    #[test]
    fn update_skips_agent_call_when_fresh() {
        let engine = engine_with(
            vec![("http://x", vec!["http://y"])],
            vec![("http://x", 200), ("http://y", 100)],
            vec![("http://x", "http://agent")],
        );
        assert!(engine.update(&Iri::from("http://x")).is_ok());
    }

    #[test]
    fn leaf_node_is_a_no_op() {
        let engine = engine_with(vec![], vec![], vec![]);
        assert!(engine.update(&Iri::from("http://leaf")).is_ok());
    }

    #[test]
    fn validate_returns_false_on_cycle() {
        let engine = engine_with(
            vec![("http://a", vec!["http://b"]), ("http://b", vec!["http://a"])],
            vec![("http://a", 1), ("http://b", 1)],
            vec![],
        );
        assert_eq!(engine.validate(&Iri::from("http://a")).unwrap(), false);
    }

    #[test]
    fn validate_returns_true_for_well_formed_leaf() {
        let engine = engine_with(vec![], vec![], vec![]);
        assert_eq!(engine.validate(&Iri::from("http://leaf")).unwrap(), true);
    }
}
