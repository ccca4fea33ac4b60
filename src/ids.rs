use derive_more::{Display, FromStr};
use serde::{Deserialize, Serialize};

/// An opaque URI identifying an entity in either store. Primary key for
/// every time-series, data-identifier, derived node, agent and input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, FromStr, Serialize, Deserialize)]
pub struct Iri(pub String);

impl Iri {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Iri {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Iri {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Mints a fresh, SQL-safe opaque table name, per §4.2's "Naming discipline":
/// generated names are never derived from user-supplied URIs.
pub fn fresh_table_name() -> String {
    format!("ts_{}", uuid::Uuid::new_v4().simple())
}

/// Mints a fresh, SQL-safe opaque column name.
pub fn fresh_column_name() -> String {
    format!("col_{}", uuid::Uuid::new_v4().simple())
}

/// Mints a fresh time-position node IRI. §9 "Fresh identifier minting"
/// recommends a UUID generator over the source's count-and-ASK-probe scheme.
pub fn fresh_time_position_iri(namespace: &str) -> Iri {
    Iri(format!("{namespace}TimePosition_{}", uuid::Uuid::new_v4()))
}
