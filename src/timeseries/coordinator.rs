//! Time-Series Coordinator (§4.3): composes the metadata and storage
//! modules with compensating rollback on partial failure. Holds no SQL
//! connection itself; every mutating operation takes one supplied by the
//! caller (§5) — except the legacy constructor path (§9 "Ownership of
//! connections"), which opens its own per call.

use std::sync::Arc;

use postgres::{Client, NoTls};
use tracing::{error, warn};

use crate::error::{CoordinatorError, InconsistentStateError, PreconditionError, ResidualStore};
use crate::gateway::sparql::SparqlGateway;
use crate::ids::Iri;

use super::metadata::TimeSeriesMetadata;
use super::storage::{InitTableError, StorageOpError, TimeSeriesStorage};
use super::types::{DataClass, SeriesBatch, TimeSeriesRow, TimeSeriesSnapshot, TimeValue};

pub struct TimeSeriesCoordinator<V: TimeValue> {
    metadata: TimeSeriesMetadata,
    storage: TimeSeriesStorage<V>,
    rdb_url: Option<String>,
    rdb_user: Option<String>,
    rdb_password: Option<String>,
}

impl<V: TimeValue> TimeSeriesCoordinator<V> {
    pub fn new(gateway: Arc<dyn SparqlGateway>) -> Self {
        Self {
            metadata: TimeSeriesMetadata::new(gateway),
            storage: TimeSeriesStorage::new(),
            rdb_url: None,
            rdb_user: None,
            rdb_password: None,
        }
    }

    pub fn with_lookup_table(gateway: Arc<dyn SparqlGateway>, lookup_table: impl Into<String>) -> Self {
        Self {
            metadata: TimeSeriesMetadata::new(gateway),
            storage: TimeSeriesStorage::with_lookup_table(lookup_table),
            rdb_url: None,
            rdb_user: None,
            rdb_password: None,
        }
    }

    /// Legacy pass-through configuration (§6, §9): a coordinator built this
    /// way opens and closes a connection per call instead of taking one as
    /// an argument. Prefer the connection-as-argument methods in new code.
    pub fn set_rdb_url(&mut self, url: impl Into<String>) {
        self.rdb_url = Some(url.into());
    }

    pub fn set_rdb_user(&mut self, user: impl Into<String>) {
        self.rdb_user = Some(user.into());
    }

    pub fn set_rdb_password(&mut self, password: impl Into<String>) {
        self.rdb_password = Some(password.into());
    }

    fn legacy_connect(&self) -> Result<Client, CoordinatorError> {
        let url = self
            .rdb_url
            .as_deref()
            .ok_or_else(|| crate::error::ConfigError("db.url".into()))?;

        let mut config: postgres::Config = url.parse().map_err(|err| {
            CoordinatorError::Storage(crate::error::StorageError(anyhow::Error::from(err)))
        })?;
        if let Some(user) = &self.rdb_user {
            config.user(user);
        }
        if let Some(password) = &self.rdb_password {
            config.password(password);
        }

        config
            .connect(NoTls)
            .map_err(|err| CoordinatorError::Storage(crate::error::StorageError(anyhow::Error::from(err))))
    }

    /// Same as `init_time_series`, but opens its own connection from the
    /// legacy `set_rdb_*` configuration.
    pub fn init_time_series_legacy(
        &self,
        series_id: &Iri,
        data_ids: &[Iri],
        data_classes: &[DataClass],
        db_url: &str,
        time_unit: Option<&Iri>,
    ) -> Result<String, CoordinatorError> {
        let mut conn = self.legacy_connect()?;
        self.init_time_series(series_id, data_ids, data_classes, db_url, time_unit, &mut conn, None)
    }

    /// §4.3 Init-time-series.
    #[tracing::instrument(skip(self, conn))]
    pub fn init_time_series(
        &self,
        series_id: &Iri,
        data_ids: &[Iri],
        data_classes: &[DataClass],
        db_url: &str,
        time_unit: Option<&Iri>,
        conn: &mut Client,
        srid: Option<i32>,
    ) -> Result<String, CoordinatorError> {
        self.metadata
            .init(series_id, data_ids, db_url, time_unit)
            .map_err(|err| CoordinatorError::Create(anyhow::Error::from(err)))?;

        match self.storage.init_table(data_ids, data_classes, series_id, conn, srid) {
            Ok(table_name) => Ok(table_name),
            Err(storage_err) => {
                warn!(series = %series_id, "storage init failed, compensating metadata write");
                match self.metadata.remove(series_id) {
                    Ok(()) => Err(CoordinatorError::Create(anyhow::Error::new(init_table_anyhow(storage_err)))),
                    Err(compensation_err) => {
                        error!(series = %series_id, "metadata compensation failed after storage init failure");
                        Err(InconsistentStateError {
                            identifier: series_id.0.clone(),
                            residual_store: ResidualStore::Metadata,
                            cause: anyhow::Error::from(compensation_err),
                        }
                        .into())
                    }
                }
            }
        }
    }

    /// §4.3 Bulk-init: metadata for every series is written in one update;
    /// storage tables are then created sequentially. A storage failure at
    /// index *i* only compensates series *i*'s metadata.
    #[tracing::instrument(skip(self, series, conn))]
    pub fn bulk_init(
        &self,
        series: &[(Iri, Vec<Iri>, Vec<DataClass>, String, Option<Iri>)],
        conn: &mut Client,
        srid: Option<i32>,
    ) -> Result<Vec<BulkInitOutcome>, CoordinatorError> {
        let metadata_batch: Vec<(Iri, Vec<Iri>, String, Option<Iri>)> = series
            .iter()
            .map(|(series_id, data_ids, _, db_url, time_unit)| {
                (series_id.clone(), data_ids.clone(), db_url.clone(), time_unit.clone())
            })
            .collect();

        self.metadata
            .bulk_init(&metadata_batch)
            .map_err(|err| CoordinatorError::Create(anyhow::Error::from(err)))?;

        let mut outcomes = Vec::with_capacity(series.len());
        for (series_id, data_ids, data_classes, _, _) in series {
            let result = match self.storage.init_table(data_ids, data_classes, series_id, conn, srid) {
                Ok(table_name) => Ok(table_name),
                Err(storage_err) => {
                    warn!(series = %series_id, "bulk storage init failed, compensating this series only");
                    match self.metadata.remove(series_id) {
                        Ok(()) => Err(CoordinatorError::Create(anyhow::Error::new(init_table_anyhow(storage_err)))),
                        Err(compensation_err) => {
                            error!(series = %series_id, "metadata compensation failed in bulk-init");
                            Err(InconsistentStateError {
                                identifier: series_id.0.clone(),
                                residual_store: ResidualStore::Metadata,
                                cause: anyhow::Error::from(compensation_err),
                            }
                            .into())
                        }
                    }
                }
            };
            outcomes.push(BulkInitOutcome { series_id: series_id.clone(), result });
        }

        Ok(outcomes)
    }

    /// §4.3 Delete-time-series (whole series).
    #[tracing::instrument(skip(self, conn))]
    pub fn delete_time_series(&self, series_id: &Iri, conn: &mut Client) -> Result<(), CoordinatorError> {
        if !self.metadata.exists(series_id)? {
            return Err(PreconditionError::UnknownDataId(series_id.0.clone()).into());
        }

        let snapshot = TimeSeriesSnapshot {
            series_id: series_id.clone(),
            data_ids: self.metadata.associated_data(series_id)?,
            db_url: self.metadata.get_db_url(series_id)?.unwrap_or_default(),
            time_unit: self.metadata.get_time_unit(series_id)?,
        };

        self.metadata
            .remove(series_id)
            .map_err(|err| CoordinatorError::Delete(anyhow::Error::from(err)))?;

        let representative = match snapshot.data_ids.first() {
            Some(id) => id.clone(),
            None => return Ok(()),
        };

        if let Err(storage_err) = self.storage.delete_table(&representative, conn) {
            warn!(series = %series_id, "storage delete failed, re-inserting metadata snapshot");
            match self.reinsert_snapshot(&snapshot) {
                Ok(()) => Err(CoordinatorError::Delete(anyhow::Error::new(storage_op_anyhow(storage_err)))),
                Err(compensation_err) => {
                    error!(series = %series_id, "metadata re-insertion failed after storage delete failure");
                    Err(InconsistentStateError {
                        identifier: series_id.0.clone(),
                        residual_store: ResidualStore::Storage,
                        cause: anyhow::Error::from(compensation_err),
                    }
                    .into())
                }
            }
        } else {
            Ok(())
        }
    }

    fn reinsert_snapshot(&self, snapshot: &TimeSeriesSnapshot) -> Result<(), crate::error::MetadataWriteError> {
        self.metadata.init(
            &snapshot.series_id,
            &snapshot.data_ids,
            &snapshot.db_url,
            snapshot.time_unit.as_ref(),
        )
    }

    /// §4.3 Delete-individual(data-id).
    #[tracing::instrument(skip(self, conn))]
    pub fn delete_individual(&self, data_id: &Iri, conn: &mut Client) -> Result<(), CoordinatorError> {
        let series_id = self
            .metadata
            .get_series_of(data_id)?
            .ok_or_else(|| PreconditionError::UnknownDataId(data_id.0.clone()))?;

        let siblings = self.metadata.associated_data(&series_id)?;

        if siblings.len() <= 1 {
            return self.delete_time_series(&series_id, conn);
        }

        self.metadata
            .remove_association(data_id)
            .map_err(|err| CoordinatorError::Delete(anyhow::Error::from(err)))?;

        if let Err(storage_err) = self.storage.delete_series(data_id, conn) {
            warn!(data_id = %data_id, "column drop failed, re-inserting association");
            match self.metadata.insert_association(data_id, &series_id) {
                Ok(()) => Err(CoordinatorError::Delete(anyhow::Error::new(storage_op_anyhow(storage_err)))),
                Err(compensation_err) => {
                    error!(data_id = %data_id, "association re-insertion failed after column drop failure");
                    Err(InconsistentStateError {
                        identifier: data_id.0.clone(),
                        residual_store: ResidualStore::Storage,
                        cause: anyhow::Error::from(compensation_err),
                    }
                    .into())
                }
            }
        } else {
            Ok(())
        }
    }

    // Read-only passthroughs, not subject to compensation.

    pub fn add_data(&self, batches: &[SeriesBatch<V>], conn: &mut Client) -> Result<(), CoordinatorError> {
        self.storage.add_data(batches, conn).map_err(|err| storage_op_to_coordinator(err))
    }

    pub fn get_within_bounds(
        &self,
        data_ids: &[Iri],
        lower: Option<&V>,
        upper: Option<&V>,
        conn: &mut Client,
    ) -> Result<Vec<TimeSeriesRow<V>>, CoordinatorError> {
        self.storage
            .get_within_bounds(data_ids, lower, upper, conn)
            .map_err(storage_op_to_coordinator)
    }

    pub fn delete_history(
        &self,
        data_id: &Iri,
        lower: &V,
        upper: &V,
        conn: &mut Client,
    ) -> Result<(), CoordinatorError> {
        self.storage.delete_rows(data_id, lower, upper, conn).map_err(storage_op_to_coordinator)
    }

    pub fn metadata(&self) -> &TimeSeriesMetadata {
        &self.metadata
    }

    pub fn storage(&self) -> &TimeSeriesStorage<V> {
        &self.storage
    }
}

pub struct BulkInitOutcome {
    pub series_id: Iri,
    pub result: Result<String, CoordinatorError>,
}

fn storage_op_to_coordinator(err: StorageOpError) -> CoordinatorError {
    match err {
        StorageOpError::Precondition(err) => CoordinatorError::Precondition(err),
        StorageOpError::Storage(err) => CoordinatorError::Storage(err),
    }
}

fn storage_op_anyhow(err: StorageOpError) -> anyhow::Error {
    anyhow::Error::new(err)
}

fn init_table_anyhow(err: InitTableError) -> anyhow::Error {
    anyhow::Error::new(err)
}
