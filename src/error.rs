use thiserror::Error;

/// Argument-shape violations: size mismatches, unknown or duplicate
/// data-identifiers.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("data-ids and data-classes differ in length: {data_ids} vs {data_classes}")]
    SizeMismatch { data_ids: usize, data_classes: usize },

    #[error("data-id `{0}` is already registered to a time-series")]
    DuplicateDataId(String),

    #[error("data-id `{0}` is not registered to any time-series")]
    UnknownDataId(String),

    #[error("data-ids span more than one table: {0:?}")]
    MultipleTables(Vec<String>),
}

/// Triple-store update rejected by the gateway.
#[derive(Debug, Error)]
#[error("metadata write failed: {0}")]
pub struct MetadataWriteError(#[from] pub anyhow::Error);

/// Triple-store query rejected, or the result shape was unusable.
#[derive(Debug, Error)]
#[error("metadata read failed: {0}")]
pub struct MetadataReadError(#[from] pub anyhow::Error);

/// Relational DDL/DML rejected by the gateway.
#[derive(Debug, Error)]
#[error("storage operation failed: {0}")]
pub struct StorageError(#[from] pub anyhow::Error);

/// HTTP agent call failed, timed out, or its response body was malformed.
#[derive(Debug, Error)]
#[error("agent call failed: {0}")]
pub struct AgentError(#[from] pub anyhow::Error);

/// A derived node was reachable from itself through `isDerivedFrom`.
#[derive(Debug, Error)]
#[error("circular dependency detected at `{0}`")]
pub struct CircularDependencyError(pub String);

/// Output reconciliation could not find exactly one rdf:type match.
#[derive(Debug, Error)]
pub enum ReconnectionError {
    #[error("no new output of type `{rdf_type}` to reconnect downstream node `{downstream}`")]
    NoMatch { downstream: String, rdf_type: String },

    #[error("{count} new outputs of type `{rdf_type}` match downstream node `{downstream}`, expected exactly one")]
    AmbiguousMatch {
        downstream: String,
        rdf_type: String,
        count: usize,
    },
}

/// Compensation after a partial mutation itself failed. The identifier named
/// here requires manual reconciliation between the two stores.
#[derive(Debug, Error)]
#[error("inconsistent state: `{identifier}` is orphaned in {residual_store} after failed compensation ({cause})")]
pub struct InconsistentStateError {
    pub identifier: String,
    pub residual_store: ResidualStore,
    pub cause: anyhow::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualStore {
    Metadata,
    Storage,
}

impl std::fmt::Display for ResidualStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Metadata => write!(f, "the metadata store"),
            Self::Storage => write!(f, "the storage layer"),
        }
    }
}

/// A required configuration value (endpoint or credential) was missing.
#[derive(Debug, Error)]
#[error("configuration value missing: {0}")]
pub struct ConfigError(pub String);

/// Top-level error returned by every coordinator operation.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    MetadataWrite(#[from] MetadataWriteError),

    #[error(transparent)]
    MetadataRead(#[from] MetadataReadError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    CircularDependency(#[from] CircularDependencyError),

    #[error(transparent)]
    Reconnection(#[from] ReconnectionError),

    #[error(transparent)]
    InconsistentState(#[from] InconsistentStateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Composite operation failed at the storage step; the metadata write
    /// that preceded it was successfully compensated away.
    #[error("create failed: {0}")]
    Create(#[source] anyhow::Error),

    /// Composite delete failed after metadata removal; storage compensation
    /// (re-insertion) succeeded, so the store pair is consistent again.
    #[error("delete failed: {0}")]
    Delete(#[source] anyhow::Error),
}
