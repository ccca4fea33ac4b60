//! Time-Series Metadata Module (§4.1): encodes time-series facts in the
//! triple store. Every public operation here is either one SPARQL update or
//! a pure read — no operation issues a two-step metadata write (§4.1).

use std::sync::Arc;

use crate::error::{MetadataReadError, MetadataWriteError};
use crate::gateway::sparql::{ask_result, binding_str, select_rows, SparqlGateway};
use crate::ids::Iri;
use crate::vocab;

pub struct TimeSeriesMetadata {
    gateway: Arc<dyn SparqlGateway>,
}

impl TimeSeriesMetadata {
    pub fn new(gateway: Arc<dyn SparqlGateway>) -> Self {
        Self { gateway }
    }

    /// §4.1 init. Atomically inserts the series' type, RDB association,
    /// per-data-id associations, and (if given) its time unit.
    pub fn init(
        &self,
        series_id: &Iri,
        data_ids: &[Iri],
        db_url: &str,
        time_unit: Option<&Iri>,
    ) -> Result<(), MetadataWriteError> {
        self.gateway.execute_update(&init_update(series_id, data_ids, db_url, time_unit))
    }

    /// §4.1 bulk-init: the same triples as `init`, for every series, issued
    /// as a single SPARQL update.
    pub fn bulk_init(
        &self,
        series: &[(Iri, Vec<Iri>, String, Option<Iri>)],
    ) -> Result<(), MetadataWriteError> {
        let insert_clauses: Vec<String> = series
            .iter()
            .map(|(series_id, data_ids, db_url, time_unit)| {
                insert_clause(series_id, data_ids, db_url, time_unit.as_ref())
            })
            .collect();

        let update = format!("INSERT DATA {{\n{}\n}}", insert_clauses.join("\n"));
        self.gateway.execute_update(&update)
    }

    /// §4.1 exists.
    pub fn exists(&self, series_id: &Iri) -> Result<bool, MetadataReadError> {
        let query = format!(
            "ASK {{ <{series}> a <{ns}{class}> }}",
            series = series_id,
            ns = vocab::ONTOTIMESERIES,
            class = vocab::CLASS_TIME_SERIES,
        );
        ask_result(&self.gateway.execute_query(&query)?)
    }

    /// §4.1 remove: deletes every triple in which `series_id` appears as
    /// subject or object. Idempotent if the series is already absent.
    pub fn remove(&self, series_id: &Iri) -> Result<(), MetadataWriteError> {
        let update = format!(
            "DELETE WHERE {{ <{series}> ?p ?o }} ; DELETE WHERE {{ ?s ?p <{series}> }}",
            series = series_id
        );
        self.gateway.execute_update(&update)
    }

    /// §4.1 remove-association: deletes the single
    /// `data_id hasTimeSeries ?x` triple.
    pub fn remove_association(&self, data_id: &Iri) -> Result<(), MetadataWriteError> {
        let update = format!(
            "DELETE WHERE {{ <{data_id}> <{ns}{pred}> ?x }}",
            data_id = data_id,
            ns = vocab::ONTOTIMESERIES,
            pred = vocab::PRED_HAS_TIME_SERIES,
        );
        self.gateway.execute_update(&update)
    }

    /// §4.1 insert-association: the inverse of `remove_association`, used
    /// by the coordinator for compensation.
    pub fn insert_association(&self, data_id: &Iri, series_id: &Iri) -> Result<(), MetadataWriteError> {
        let update = format!(
            "INSERT DATA {{ <{data_id}> <{ns}{pred}> <{series}> }}",
            data_id = data_id,
            ns = vocab::ONTOTIMESERIES,
            pred = vocab::PRED_HAS_TIME_SERIES,
            series = series_id,
        );
        self.gateway.execute_update(&update)
    }

    /// §4.1 associated-data: empty when the series is absent.
    pub fn associated_data(&self, series_id: &Iri) -> Result<Vec<Iri>, MetadataReadError> {
        let query = format!(
            "SELECT ?dataId WHERE {{ ?dataId <{ns}{pred}> <{series}> }}",
            ns = vocab::ONTOTIMESERIES,
            pred = vocab::PRED_HAS_TIME_SERIES,
            series = series_id,
        );
        let result = self.gateway.execute_query(&query)?;
        let rows = select_rows(&result)?;
        Ok(rows
            .iter()
            .filter_map(|row| binding_str(row, "dataId"))
            .map(Iri::from)
            .collect())
    }

    /// §4.1 get-series-of.
    pub fn get_series_of(&self, data_id: &Iri) -> Result<Option<Iri>, MetadataReadError> {
        let query = format!(
            "SELECT ?series WHERE {{ <{data_id}> <{ns}{pred}> ?series }}",
            data_id = data_id,
            ns = vocab::ONTOTIMESERIES,
            pred = vocab::PRED_HAS_TIME_SERIES,
        );
        let result = self.gateway.execute_query(&query)?;
        let rows = select_rows(&result)?;
        Ok(rows.first().and_then(|row| binding_str(row, "series")).map(Iri::from))
    }

    /// §4.1 get-db-url.
    pub fn get_db_url(&self, series_id: &Iri) -> Result<Option<String>, MetadataReadError> {
        let query = format!(
            "SELECT ?url WHERE {{ <{series}> <{ns}{pred}> ?url }}",
            series = series_id,
            ns = vocab::ONTOTIMESERIES,
            pred = vocab::PRED_HAS_RDB,
        );
        let result = self.gateway.execute_query(&query)?;
        let rows = select_rows(&result)?;
        Ok(rows.first().and_then(|row| binding_str(row, "url")).map(String::from))
    }

    /// §4.1 get-time-unit.
    pub fn get_time_unit(&self, series_id: &Iri) -> Result<Option<Iri>, MetadataReadError> {
        let query = format!(
            "SELECT ?unit WHERE {{ <{series}> <{ns}{pred}> ?unit }}",
            series = series_id,
            ns = vocab::ONTOTIMESERIES,
            pred = vocab::PRED_HAS_TIME_UNIT,
        );
        let result = self.gateway.execute_query(&query)?;
        let rows = select_rows(&result)?;
        Ok(rows.first().and_then(|row| binding_str(row, "unit")).map(Iri::from))
    }

    /// §4.1 count: number of registered time-series.
    pub fn count(&self) -> Result<usize, MetadataReadError> {
        let query = format!(
            "SELECT ?series WHERE {{ ?series a <{ns}{class}> }}",
            ns = vocab::ONTOTIMESERIES,
            class = vocab::CLASS_TIME_SERIES,
        );
        let result = self.gateway.execute_query(&query)?;
        Ok(select_rows(&result)?.len())
    }

    /// §4.1 list-all.
    pub fn list_all(&self) -> Result<Vec<Iri>, MetadataReadError> {
        let query = format!(
            "SELECT ?series WHERE {{ ?series a <{ns}{class}> }}",
            ns = vocab::ONTOTIMESERIES,
            class = vocab::CLASS_TIME_SERIES,
        );
        let result = self.gateway.execute_query(&query)?;
        let rows = select_rows(&result)?;
        Ok(rows.iter().filter_map(|row| binding_str(row, "series")).map(Iri::from).collect())
    }
}

fn insert_clause(series_id: &Iri, data_ids: &[Iri], db_url: &str, time_unit: Option<&Iri>) -> String {
    let mut lines = vec![
        format!(
            "  <{series}> a <{ns}{class}> .",
            series = series_id,
            ns = vocab::ONTOTIMESERIES,
            class = vocab::CLASS_TIME_SERIES,
        ),
        format!(
            "  <{series}> <{ns}{pred}> \"{url}\" .",
            series = series_id,
            ns = vocab::ONTOTIMESERIES,
            pred = vocab::PRED_HAS_RDB,
            url = db_url,
        ),
    ];
    for data_id in data_ids {
        lines.push(format!(
            "  <{data_id}> <{ns}{pred}> <{series}> .",
            data_id = data_id,
            ns = vocab::ONTOTIMESERIES,
            pred = vocab::PRED_HAS_TIME_SERIES,
            series = series_id,
        ));
    }
    if let Some(time_unit) = time_unit {
        lines.push(format!(
            "  <{series}> <{ns}{pred}> <{unit}> .",
            series = series_id,
            ns = vocab::ONTOTIMESERIES,
            pred = vocab::PRED_HAS_TIME_UNIT,
            unit = time_unit,
        ));
    }
    lines.join("\n")
}

fn init_update(series_id: &Iri, data_ids: &[Iri], db_url: &str, time_unit: Option<&Iri>) -> String {
    format!("INSERT DATA {{\n{}\n}}", insert_clause(series_id, data_ids, db_url, time_unit))
}
