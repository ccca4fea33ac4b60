//! Time-Series Coordinator subsystem (§4): a Metadata Module over the triple
//! store, a Storage Module over the relational store, and a Coordinator that
//! composes the two with compensating rollback.

pub mod coordinator;
pub mod metadata;
pub mod storage;
pub mod types;

pub use coordinator::{BulkInitOutcome, TimeSeriesCoordinator};
pub use metadata::TimeSeriesMetadata;
pub use storage::{InitTableError, StorageOpError, TimeSeriesStorage};
pub use types::{DataClass, LookupRow, SeriesBatch, TimeSeriesRow, TimeSeriesSnapshot, TimeValue};
