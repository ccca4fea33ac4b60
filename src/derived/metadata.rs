//! Derived-Quantity Metadata Module (§4.4): encodes derived nodes in the
//! triple store and reads back graph shape.

use std::sync::Arc;

use crate::clock::now_unix_seconds;
use crate::error::{MetadataReadError, MetadataWriteError};
use crate::gateway::sparql::{ask_result, binding_str, select_rows, SparqlGateway};
use crate::ids::{fresh_time_position_iri, Iri};
use crate::vocab;

use super::types::OutputReferences;

pub struct DerivedMetadata {
    gateway: Arc<dyn SparqlGateway>,
}

impl DerivedMetadata {
    pub fn new(gateway: Arc<dyn SparqlGateway>) -> Self {
        Self { gateway }
    }

    /// §4.4 init-derived. Guarded by an ASK: fails if `node_id` already
    /// carries the Derived type.
    pub fn init_derived(
        &self,
        node_id: &Iri,
        agent_id: &Iri,
        agent_url: &str,
        input_ids: &[Iri],
        time: Option<i64>,
    ) -> Result<(), MetadataWriteError> {
        if self.is_initialised(node_id).map_err(|err| MetadataWriteError(err.0))? {
            return Err(MetadataWriteError(anyhow::anyhow!(
                "derived node `{node_id}` is already initialised"
            )));
        }

        let time_position = fresh_time_position_iri(vocab::ONTODERIVED);
        let t = time.unwrap_or_else(now_unix_seconds);

        let mut lines = vec![
            format!("  <{node}> a <{ns}{class}> .", node = node_id, ns = vocab::ONTODERIVED, class = vocab::CLASS_DERIVED),
            format!(
                "  <{node}> <{ns}{pred}> <{agent}> .",
                node = node_id,
                ns = vocab::ONTODERIVED,
                pred = vocab::PRED_IS_DERIVED_USING,
                agent = agent_id,
            ),
            format!("  <{agent}> a <{ns}{class}> .", agent = agent_id, ns = vocab::ONTOAGENT, class = vocab::CLASS_SERVICE),
            format!(
                "  <{agent}> <{ns}{pred}> \"{url}\" .",
                agent = agent_id,
                ns = vocab::ONTOAGENT,
                pred = vocab::PRED_HAS_HTTP_URL,
                url = agent_url,
            ),
            format!(
                "  <{node}> <{ns}{pred}> <{pos}> .",
                node = node_id,
                ns = vocab::ONTODERIVED,
                pred = vocab::PRED_HAS_TIME,
                pos = time_position,
            ),
            format!(
                "  <{pos}> <{ns}{pred}> {t} .",
                pos = time_position,
                ns = vocab::TIME,
                pred = vocab::PRED_NUMERIC_POSITION,
                t = t,
            ),
        ];
        for input in input_ids {
            lines.push(format!(
                "  <{node}> <{ns}{pred}> <{input}> .",
                node = node_id,
                ns = vocab::ONTODERIVED,
                pred = vocab::PRED_IS_DERIVED_FROM,
                input = input,
            ));
        }

        let update = format!("INSERT DATA {{\n{}\n}}", lines.join("\n"));
        self.gateway.execute_update(&update)
    }

    fn is_initialised(&self, node_id: &Iri) -> Result<bool, MetadataReadError> {
        let query = format!(
            "ASK {{ <{node}> a <{ns}{class}> }}",
            node = node_id,
            ns = vocab::ONTODERIVED,
            class = vocab::CLASS_DERIVED,
        );
        ask_result(&self.gateway.execute_query(&query)?)
    }

    /// §4.4 get-agent-url.
    pub fn get_agent_url(&self, node_id: &Iri) -> Result<Option<String>, MetadataReadError> {
        let query = format!(
            "SELECT ?url WHERE {{ <{node}> <{ns1}{p1}> ?agent . ?agent <{ns2}{p2}> ?url }}",
            node = node_id,
            ns1 = vocab::ONTODERIVED,
            p1 = vocab::PRED_IS_DERIVED_USING,
            ns2 = vocab::ONTOAGENT,
            p2 = vocab::PRED_HAS_HTTP_URL,
        );
        let rows = select_rows(&self.gateway.execute_query(&query)?)?;
        Ok(rows.first().and_then(|row| binding_str(row, "url")).map(String::from))
    }

    /// §4.4 get-inputs.
    pub fn get_inputs(&self, node_id: &Iri) -> Result<Vec<Iri>, MetadataReadError> {
        let query = format!(
            "SELECT ?input WHERE {{ <{node}> <{ns}{pred}> ?input }}",
            node = node_id,
            ns = vocab::ONTODERIVED,
            pred = vocab::PRED_IS_DERIVED_FROM,
        );
        let rows = select_rows(&self.gateway.execute_query(&query)?)?;
        Ok(rows.iter().filter_map(|row| binding_str(row, "input")).map(Iri::from).collect())
    }

    /// §4.4 get-timestamp: reads any instance's `numericPosition`. Errors if
    /// the instance has none.
    pub fn get_timestamp(&self, instance_id: &Iri) -> Result<i64, MetadataReadError> {
        let query = format!(
            "SELECT ?t WHERE {{ <{instance}> <{ns1}{p1}> ?pos . ?pos <{ns2}{p2}> ?t }}",
            instance = instance_id,
            ns1 = vocab::ONTODERIVED,
            p1 = vocab::PRED_HAS_TIME,
            ns2 = vocab::TIME,
            p2 = vocab::PRED_NUMERIC_POSITION,
        );
        let rows = select_rows(&self.gateway.execute_query(&query)?)?;
        rows.first()
            .and_then(|row| binding_str(row, "t"))
            .and_then(|text| text.parse::<i64>().ok())
            .ok_or_else(|| MetadataReadError(anyhow::anyhow!("instance `{instance_id}` has no readable timestamp")))
    }

    /// §4.4 update-timestamp: atomically replaces `numericPosition` via a
    /// sub-select on the instance's time-position node.
    pub fn update_timestamp(&self, instance_id: &Iri, t: Option<i64>) -> Result<(), MetadataWriteError> {
        let t = t.unwrap_or_else(now_unix_seconds);
        let update = format!(
            "DELETE {{ ?pos <{ns}{pred}> ?old }} INSERT {{ ?pos <{ns}{pred}> {t} }} WHERE {{ <{instance}> <{ns2}{p2}> ?pos . ?pos <{ns}{pred}> ?old }}",
            instance = instance_id,
            ns2 = vocab::ONTODERIVED,
            p2 = vocab::PRED_HAS_TIME,
            ns = vocab::TIME,
            pred = vocab::PRED_NUMERIC_POSITION,
            t = t,
        );
        self.gateway.execute_update(&update)
    }

    /// §4.4 get-derived-entities: the `?x belongsTo node-id` relation,
    /// identifying a derived node's current outputs.
    pub fn get_derived_entities(&self, node_id: &Iri) -> Result<Vec<Iri>, MetadataReadError> {
        let query = format!(
            "SELECT ?x WHERE {{ ?x <{ns}{pred}> <{node}> }}",
            ns = vocab::ONTODERIVED,
            pred = vocab::PRED_BELONGS_TO,
            node = node_id,
        );
        let rows = select_rows(&self.gateway.execute_query(&query)?)?;
        Ok(rows.iter().filter_map(|row| binding_str(row, "x")).map(Iri::from).collect())
    }

    /// §4.4 get-is-derived-from-entities: for each entity, the derived nodes
    /// that reference it as an input, plus the entity's rdf:type.
    pub fn get_is_derived_from_entities(
        &self,
        entity_ids: &[Iri],
    ) -> Result<Vec<OutputReferences>, MetadataReadError> {
        let mut result = Vec::with_capacity(entity_ids.len());
        for entity in entity_ids {
            let downstream_query = format!(
                "SELECT ?d WHERE {{ ?d <{ns}{pred}> <{entity}> }}",
                ns = vocab::ONTODERIVED,
                pred = vocab::PRED_IS_DERIVED_FROM,
                entity = entity,
            );
            let downstream_rows = select_rows(&self.gateway.execute_query(&downstream_query)?)?;
            let downstream: Vec<Iri> =
                downstream_rows.iter().filter_map(|row| binding_str(row, "d")).map(Iri::from).collect();

            let rdf_type = self.get_instance_class(entity)?;

            result.push(OutputReferences {
                entity: entity.clone(),
                rdf_type,
                downstream,
            });
        }
        Ok(result)
    }

    /// §4.4 get-instance-class: `rdf:type` of the given entity, if any.
    pub fn get_instance_class(&self, id: &Iri) -> Result<Option<Iri>, MetadataReadError> {
        let query = format!("SELECT ?t WHERE {{ <{id}> a ?t }}", id = id);
        let rows = select_rows(&self.gateway.execute_query(&query)?)?;
        Ok(rows.first().and_then(|row| binding_str(row, "t")).map(Iri::from))
    }

    /// §4.4 is-derived-with-time-series: true when the node's outputs append
    /// to an existing time-series instead of being replaced wholesale.
    pub fn is_derived_with_time_series(&self, node_id: &Iri) -> Result<bool, MetadataReadError> {
        let query = format!(
            "ASK {{ <{node}> <{ns}{pred}> ?series }}",
            node = node_id,
            ns = vocab::ONTOTIMESERIES,
            pred = vocab::PRED_HAS_TIME_SERIES,
        );
        ask_result(&self.gateway.execute_query(&query)?)
    }

    /// §4.4 reconnect-input: adds a new `isDerivedFrom` edge from
    /// `downstream_derived` to `new_entity`, used during output
    /// reconciliation.
    pub fn reconnect_input(&self, new_entity: &Iri, downstream_derived: &Iri) -> Result<(), MetadataWriteError> {
        let update = format!(
            "INSERT DATA {{ <{downstream}> <{ns}{pred}> <{entity}> }}",
            downstream = downstream_derived,
            ns = vocab::ONTODERIVED,
            pred = vocab::PRED_IS_DERIVED_FROM,
            entity = new_entity,
        );
        self.gateway.execute_update(&update)
    }

    /// §4.4 delete-instances: removes every triple mentioning any of `ids`
    /// on either side.
    pub fn delete_instances(&self, ids: &[Iri]) -> Result<(), MetadataWriteError> {
        if ids.is_empty() {
            return Ok(());
        }
        let clauses: Vec<String> = ids
            .iter()
            .map(|id| format!("DELETE WHERE {{ <{id}> ?p ?o }} ; DELETE WHERE {{ ?s ?p <{id}> }}", id = id))
            .collect();
        self.gateway.execute_update(&clauses.join(" ; "))
    }
}

