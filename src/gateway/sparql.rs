use serde_json::Value as JsonValue;

use crate::error::{MetadataReadError, MetadataWriteError};

/// The Triple-Store Gateway collaborator (§6): query/update transport to a
/// named SPARQL endpoint. An external collaborator — this crate never
/// implements a SPARQL engine, only the client side of the wire protocol.
pub trait SparqlGateway: Send + Sync {
    /// Runs a SELECT and returns its binding rows as a JSON array, or runs an
    /// ASK and returns a single-row `{"ASK": bool}` object.
    fn execute_query(&self, query: &str) -> Result<JsonValue, MetadataReadError>;

    /// Runs an INSERT/DELETE update. Atomic per call: either every triple in
    /// the request lands, or none do.
    fn execute_update(&self, update: &str) -> Result<(), MetadataWriteError>;
}

/// Convenience extracted from an ASK result shaped `{"ASK": bool}`.
pub fn ask_result(value: &JsonValue) -> Result<bool, MetadataReadError> {
    value
        .get("ASK")
        .and_then(JsonValue::as_bool)
        .ok_or_else(|| {
            MetadataReadError(anyhow::anyhow!(
                "malformed ASK response, expected {{\"ASK\": bool}}, got {value}"
            ))
        })
}

/// Convenience extracted from a SELECT result's binding rows, assumed to be
/// a top-level JSON array of objects.
pub fn select_rows(value: &JsonValue) -> Result<&[JsonValue], MetadataReadError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| {
            MetadataReadError(anyhow::anyhow!(
                "malformed SELECT response, expected a JSON array, got {value}"
            ))
        })
}

/// Reads a single string-valued binding column out of a result row, e.g.
/// `row["seriesId"]["value"]` in the usual SPARQL-JSON-results shape.
pub fn binding_str<'a>(row: &'a JsonValue, var: &str) -> Option<&'a str> {
    row.get(var)?.get("value")?.as_str()
}

/// Normalizes a standard SPARQL 1.1 Query Results JSON body into the shape
/// `execute_query` promises its callers: ASK responses (`{"boolean": bool}`)
/// become `{"ASK": bool}`, SELECT responses (`{"results": {"bindings": [...]}}`)
/// become the bare bindings array.
fn normalize_sparql_json(body: JsonValue) -> Result<JsonValue, MetadataReadError> {
    if let Some(boolean) = body.get("boolean").and_then(JsonValue::as_bool) {
        return Ok(serde_json::json!({ "ASK": boolean }));
    }
    body.get("results")
        .and_then(|results| results.get("bindings"))
        .cloned()
        .ok_or_else(|| {
            MetadataReadError(anyhow::anyhow!(
                "unrecognised SPARQL JSON results shape, expected `boolean` or `results.bindings`, got {body}"
            ))
        })
}

/// An HTTP-backed `SparqlGateway`, issuing the query/update strings as the
/// body of a POST to the configured query/update endpoints. The wire format
/// between this crate and the endpoint (SPARQL Protocol over HTTP) is not
/// re-specified here; this is a thin transport, not an engine.
pub struct HttpSparqlGateway {
    client: reqwest::blocking::Client,
    query_endpoint: String,
    update_endpoint: String,
}

impl HttpSparqlGateway {
    pub fn new(query_endpoint: impl Into<String>, update_endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            query_endpoint: query_endpoint.into(),
            update_endpoint: update_endpoint.into(),
        }
    }
}

impl SparqlGateway for HttpSparqlGateway {
    fn execute_query(&self, query: &str) -> Result<JsonValue, MetadataReadError> {
        let response = self
            .client
            .post(&self.query_endpoint)
            .header("Accept", "application/sparql-results+json")
            .form(&[("query", query)])
            .send()
            .map_err(|err| MetadataReadError(anyhow::Error::from(err)))?;

        let response = response
            .error_for_status()
            .map_err(|err| MetadataReadError(anyhow::Error::from(err)))?;

        let body = response
            .json::<JsonValue>()
            .map_err(|err| MetadataReadError(anyhow::Error::from(err)))?;

        normalize_sparql_json(body)
    }

    fn execute_update(&self, update: &str) -> Result<(), MetadataWriteError> {
        let response = self
            .client
            .post(&self.update_endpoint)
            .form(&[("update", update)])
            .send()
            .map_err(|err| MetadataWriteError(anyhow::Error::from(err)))?;

        response
            .error_for_status()
            .map_err(|err| MetadataWriteError(anyhow::Error::from(err)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_result_parses_true() {
        let v = serde_json::json!({"ASK": true});
        assert!(ask_result(&v).unwrap());
    }

    #[test]
    fn ask_result_rejects_malformed() {
        let v = serde_json::json!({"nope": true});
        assert!(ask_result(&v).is_err());
    }

    #[test]
    fn binding_str_reads_sparql_json_shape() {
        let row = serde_json::json!({"seriesId": {"type": "uri", "value": "http://ts1"}});
        assert_eq!(binding_str(&row, "seriesId"), Some("http://ts1"));
    }

    #[test]
    fn normalize_sparql_json_unwraps_ask_response() {
        let body = serde_json::json!({"head": {}, "boolean": true});
        assert_eq!(normalize_sparql_json(body).unwrap(), serde_json::json!({"ASK": true}));
    }

    #[test]
    fn normalize_sparql_json_unwraps_select_response() {
        let body = serde_json::json!({
            "head": {"vars": ["seriesId"]},
            "results": {"bindings": [{"seriesId": {"type": "uri", "value": "http://ts1"}}]},
        });
        let normalized = normalize_sparql_json(body).unwrap();
        assert_eq!(select_rows(&normalized).unwrap().len(), 1);
    }

    #[test]
    fn normalize_sparql_json_rejects_unrecognised_shape() {
        let body = serde_json::json!({"nope": true});
        assert!(normalize_sparql_json(body).is_err());
    }
}
