//! Knowledge-graph-anchored data coordinator: a Time-Series Coordinator and
//! a Derived-Quantity Engine sharing a common discipline — cross-store
//! two-phase mutation with compensating rollback between a SPARQL triple
//! store and a relational database.

pub mod clock;
pub mod config;
pub mod db;
pub mod derived;
pub mod error;
pub mod gateway;
pub mod ids;
pub mod timeseries;
pub mod vocab;

pub use derived::{DerivedEngine, DerivedMetadata};
pub use error::CoordinatorError;
pub use ids::Iri;
pub use timeseries::{TimeSeriesCoordinator, TimeSeriesMetadata, TimeSeriesStorage};
