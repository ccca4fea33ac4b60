use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::ids::Iri;

/// The declared type of one data-table column, chosen by the caller at
/// `init_table` time (§3 Data Table, §4.2). Closed per SPEC_FULL.md Open
/// Question 1: extending the set is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataClass {
    Double,
    Integer,
    Boolean,
    String,
    Timestamp,
}

impl DataClass {
    /// Postgres column type backing this class.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Double => "DOUBLE PRECISION",
            Self::Integer => "BIGINT",
            Self::Boolean => "BOOLEAN",
            Self::String => "TEXT",
            Self::Timestamp => "TIMESTAMPTZ",
        }
    }

    /// Renders a JSON value as the text literal bound for this column,
    /// cast in the surrounding SQL via `$n::<sql_type>` (see
    /// `storage::quoted_cast`). Keeping every bind parameter textual lets
    /// the storage module build statements over a column list whose width
    /// is only known at runtime.
    pub fn to_sql_text(self, value: &JsonValue) -> anyhow::Result<String> {
        match (self, value) {
            (Self::Double, JsonValue::Number(n)) => Ok(n.as_f64().unwrap_or_default().to_string()),
            (Self::Integer, JsonValue::Number(n)) => {
                Ok(n.as_i64().ok_or_else(|| anyhow::anyhow!("not an integer: {n}"))?.to_string())
            }
            (Self::Boolean, JsonValue::Bool(b)) => Ok(b.to_string()),
            (Self::String, JsonValue::String(s)) => Ok(s.clone()),
            (Self::Timestamp, JsonValue::String(s)) => Ok(s.clone()),
            _ => Err(anyhow::anyhow!(
                "value {value} does not match declared class {self:?}"
            )),
        }
    }

    /// Parses a value read back as text (every SELECT casts to `::text`)
    /// into the JSON representation callers see.
    pub fn from_sql_text(self, text: Option<&str>) -> JsonValue {
        let text = match text {
            Some(text) => text,
            None => return JsonValue::Null,
        };
        match self {
            Self::Double => text
                .parse::<f64>()
                .map(|f| serde_json::Number::from_f64(f).map(JsonValue::Number).unwrap_or(JsonValue::Null))
                .unwrap_or(JsonValue::Null),
            Self::Integer => text
                .parse::<i64>()
                .map(|i| JsonValue::Number(i.into()))
                .unwrap_or(JsonValue::Null),
            Self::Boolean => text
                .parse::<bool>()
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            Self::String | Self::Timestamp => JsonValue::String(text.to_string()),
        }
    }
}

/// A value bound to the generic `time` column of a data table. The storage
/// module is parameterised once over `V: TimeValue` at construction and is
/// monomorphic thereafter (§9 "Deep class hierarchies").
pub trait TimeValue: Clone + std::fmt::Debug + Send + Sync + PartialOrd + 'static {
    /// Postgres column type backing the `time` column.
    const SQL_TYPE: &'static str;

    fn to_sql_text(&self) -> String;
    fn from_sql_text(text: &str) -> Self;
}

impl TimeValue for i64 {
    const SQL_TYPE: &'static str = "BIGINT";

    fn to_sql_text(&self) -> String {
        self.to_string()
    }

    fn from_sql_text(text: &str) -> Self {
        text.parse().expect("BIGINT column returned non-integer text")
    }
}

impl TimeValue for chrono::NaiveDateTime {
    const SQL_TYPE: &'static str = "TIMESTAMP";

    fn to_sql_text(&self) -> String {
        self.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }

    fn from_sql_text(text: &str) -> Self {
        chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
            .expect("TIMESTAMP column returned unparseable text")
    }
}

/// One row out of `get_within_bounds` / `latest_row` / `oldest_row`: the
/// time plus one value per requested data-identifier, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRow<V: TimeValue> {
    pub time: V,
    pub values: Vec<JsonValue>,
}

/// One batch of samples to append via `add_data`: parallel `times` and
/// `values[i]` (one column per `data_ids[i]`, same length as `times`).
#[derive(Debug, Clone)]
pub struct SeriesBatch<V: TimeValue> {
    pub data_ids: Vec<Iri>,
    pub times: Vec<V>,
    pub values: Vec<Vec<JsonValue>>,
}

/// One row of the central lookup table (§3, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRow {
    pub data_id: Iri,
    pub series_id: Iri,
    pub table_name: String,
    pub column_name: String,
}

/// In-memory snapshot of a time-series' metadata, used by the coordinator
/// to compensate a failed delete (§4.3 "Delete-time-series").
#[derive(Debug, Clone)]
pub struct TimeSeriesSnapshot {
    pub series_id: Iri,
    pub data_ids: Vec<Iri>,
    pub db_url: String,
    pub time_unit: Option<Iri>,
}
