//! RDF vocabulary namespaces and predicates used by the metadata modules.
//!
//! Kept as plain string constants rather than a generated ontology module:
//! the coordinator never validates arbitrary RDF against a schema, it only
//! emits and parses a small, fixed set of triples.

pub const ONTOTIMESERIES: &str = "https://www.theworldavatar.com/kg/ontotimeseries/";
pub const ONTODERIVED: &str = "https://www.theworldavatar.com/kg/ontoderivation/";
pub const ONTOAGENT: &str = "https://www.theworldavatar.com/kg/ontoagent/";
pub const TIME: &str = "http://www.w3.org/2006/time#";

pub const CLASS_TIME_SERIES: &str = "TimeSeries";
pub const CLASS_SERVICE: &str = "Service";
pub const CLASS_DERIVED: &str = "Derived";

pub const PRED_HAS_TIME_SERIES: &str = "hasTimeSeries";
pub const PRED_HAS_RDB: &str = "hasRDB";
pub const PRED_HAS_TIME_UNIT: &str = "hasTimeUnit";
pub const PRED_IS_DERIVED_FROM: &str = "isDerivedFrom";
pub const PRED_IS_DERIVED_USING: &str = "isDerivedUsing";
pub const PRED_HAS_HTTP_URL: &str = "hasHttpUrl";
pub const PRED_HAS_TIME: &str = "hasTime";
pub const PRED_NUMERIC_POSITION: &str = "numericPosition";
pub const PRED_BELONGS_TO: &str = "belongsTo";
