//! Time-Series Storage Module (§4.2): the central lookup table plus one
//! data table per time-series, driven over a caller-supplied `postgres`
//! connection. The coordinator never retains this connection (§5).

use postgres::Client;

use crate::error::{PreconditionError, StorageError};
use crate::ids::{fresh_column_name, fresh_table_name, Iri};

use super::types::{DataClass, LookupRow, SeriesBatch, TimeSeriesRow, TimeValue};

pub const DEFAULT_LOOKUP_TABLE: &str = "dbTable";

pub struct TimeSeriesStorage<V: TimeValue> {
    lookup_table: String,
    _time: std::marker::PhantomData<V>,
}

impl<V: TimeValue> Default for TimeSeriesStorage<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: TimeValue> TimeSeriesStorage<V> {
    pub fn new() -> Self {
        Self::with_lookup_table(DEFAULT_LOOKUP_TABLE)
    }

    pub fn with_lookup_table(name: impl Into<String>) -> Self {
        Self {
            lookup_table: name.into(),
            _time: std::marker::PhantomData,
        }
    }

    fn ensure_lookup_table(&self, conn: &mut Client) -> Result<(), StorageError> {
        conn.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                \"dataIRI\" TEXT PRIMARY KEY,
                \"timeseriesIRI\" TEXT NOT NULL,
                \"tableName\" TEXT NOT NULL,
                \"columnName\" TEXT NOT NULL
            )",
            table = self.lookup_table
        ))
        .map_err(|err| StorageError(anyhow::Error::from(err)))
    }

    fn lookup_row(&self, conn: &mut Client, data_id: &Iri) -> Result<Option<LookupRow>, StorageError> {
        let row = conn
            .query_opt(
                &format!(
                    "SELECT \"dataIRI\", \"timeseriesIRI\", \"tableName\", \"columnName\" FROM \"{}\" WHERE \"dataIRI\" = $1",
                    self.lookup_table
                ),
                &[&data_id.0],
            )
            .map_err(|err| StorageError(anyhow::Error::from(err)))?;

        Ok(row.map(|row| LookupRow {
            data_id: Iri(row.get(0)),
            series_id: Iri(row.get(1)),
            table_name: row.get(2),
            column_name: row.get(3),
        }))
    }

    /// Resolves the single table-name shared by every data-id in the slice,
    /// failing if any is unregistered or they span more than one table.
    fn resolve_single_table(
        &self,
        conn: &mut Client,
        data_ids: &[Iri],
    ) -> Result<(String, Vec<LookupRow>), PreconditionError> {
        let mut rows = Vec::with_capacity(data_ids.len());
        for data_id in data_ids {
            let row = self
                .lookup_row(conn, data_id)
                .map_err(|_| PreconditionError::UnknownDataId(data_id.0.clone()))?
                .ok_or_else(|| PreconditionError::UnknownDataId(data_id.0.clone()))?;
            rows.push(row);
        }

        let tables: std::collections::HashSet<&str> =
            rows.iter().map(|r| r.table_name.as_str()).collect();

        if tables.len() > 1 {
            let mut names: Vec<String> = tables.into_iter().map(String::from).collect();
            names.sort();
            return Err(PreconditionError::MultipleTables(names));
        }

        let table_name = rows[0].table_name.clone();
        Ok((table_name, rows))
    }

    /// §4.2 init-table. Creates the lookup table if missing, a fresh data
    /// table named and shaped per `data_classes`, and one lookup row per
    /// data-id. `srid` is accepted for forward compatibility with a future
    /// geometry-valued class; it has no effect on the closed `DataClass` set
    /// used today.
    pub fn init_table(
        &self,
        data_ids: &[Iri],
        data_classes: &[DataClass],
        series_id: &Iri,
        conn: &mut Client,
        srid: Option<i32>,
    ) -> Result<String, InitTableError> {
        let _ = srid;

        if data_ids.len() != data_classes.len() {
            return Err(PreconditionError::SizeMismatch {
                data_ids: data_ids.len(),
                data_classes: data_classes.len(),
            }
            .into());
        }

        self.ensure_lookup_table(conn).map_err(InitTableError::Storage)?;

        for data_id in data_ids {
            if self
                .lookup_row(conn, data_id)
                .map_err(InitTableError::Storage)?
                .is_some()
            {
                return Err(PreconditionError::DuplicateDataId(data_id.0.clone()).into());
            }
        }

        let table_name = fresh_table_name();
        let columns: Vec<(Iri, String, DataClass)> = data_ids
            .iter()
            .cloned()
            .zip(data_classes.iter().copied())
            .map(|(id, class)| (id, fresh_column_name(), class))
            .collect();

        let mut ddl = format!(
            "CREATE TABLE \"{table}\" (\"time\" {time_type} NOT NULL",
            table = table_name,
            time_type = V::SQL_TYPE
        );
        for (_, column_name, class) in &columns {
            ddl.push_str(&format!(", \"{}\" {}", column_name, class.sql_type()));
        }
        ddl.push(')');

        let mut txn = conn.transaction().map_err(|err| InitTableError::Storage(StorageError(err.into())))?;

        txn.batch_execute(&ddl)
            .map_err(|err| StorageError(anyhow::Error::from(err)))
            .map_err(InitTableError::Storage)?;

        for (data_id, column_name, _) in &columns {
            txn.execute(
                &format!(
                    "INSERT INTO \"{}\" (\"dataIRI\", \"timeseriesIRI\", \"tableName\", \"columnName\") VALUES ($1, $2, $3, $4)",
                    self.lookup_table
                ),
                &[&data_id.0, &series_id.0, &table_name, column_name],
            )
            .map_err(|err| StorageError(anyhow::Error::from(err)))
            .map_err(InitTableError::Storage)?;
        }

        txn.commit()
            .map_err(|err| InitTableError::Storage(StorageError(err.into())))?;

        Ok(table_name)
    }

    /// §4.2 add-data. Every batch's data-ids must already resolve to the
    /// same table; batches are applied in order, each in its own
    /// transaction.
    pub fn add_data(&self, batches: &[SeriesBatch<V>], conn: &mut Client) -> Result<(), StorageOpError> {
        for batch in batches {
            if batch.times.len() != batch.values.len() {
                return Err(PreconditionError::SizeMismatch {
                    data_ids: batch.times.len(),
                    data_classes: batch.values.len(),
                }
                .into());
            }

            let (table_name, rows) = self.resolve_single_table(conn, &batch.data_ids)?;
            let classes = self.column_classes(conn, &table_name)?;

            let mut txn = conn.transaction().map_err(|err| StorageError(err.into()))?;

            for (row_idx, time) in batch.times.iter().enumerate() {
                let mut column_names = vec!["\"time\"".to_string()];
                let mut text_values = vec![time.to_sql_text()];
                let mut casts = vec![V::SQL_TYPE.to_string()];

                for (col_idx, lookup) in rows.iter().enumerate() {
                    let value = &batch.values[row_idx][col_idx];
                    let class = classes
                        .get(lookup.column_name.as_str())
                        .copied()
                        .ok_or_else(|| StorageError(anyhow::anyhow!("unknown column {}", lookup.column_name)))?;
                    column_names.push(format!("\"{}\"", lookup.column_name));
                    text_values.push(class.to_sql_text(value).map_err(StorageError)?);
                    casts.push(class.sql_type().to_string());
                }

                let placeholders: Vec<String> = (1..=text_values.len())
                    .zip(casts.iter())
                    .map(|(i, cast)| format!("${}::{}", i, cast))
                    .collect();

                let sql = format!(
                    "INSERT INTO \"{table}\" ({cols}) VALUES ({vals})",
                    table = table_name,
                    cols = column_names.join(", "),
                    vals = placeholders.join(", ")
                );

                let params: Vec<&(dyn postgres::types::ToSql + Sync)> =
                    text_values.iter().map(|v| v as &(dyn postgres::types::ToSql + Sync)).collect();

                txn.execute(sql.as_str(), &params)
                    .map_err(|err| StorageError(anyhow::Error::from(err)))?;
            }

            txn.commit().map_err(|err| StorageError(err.into()))?;
        }

        Ok(())
    }

    /// Introspects column types for a data table from the lookup rows that
    /// reference it, by reading back each row's declared Postgres column
    /// type from `information_schema`.
    fn column_classes(
        &self,
        conn: &mut Client,
        table_name: &str,
    ) -> Result<std::collections::HashMap<String, DataClass>, StorageError> {
        let rows = conn
            .query(
                "SELECT column_name, data_type FROM information_schema.columns WHERE table_name = $1",
                &[&table_name],
            )
            .map_err(|err| StorageError(anyhow::Error::from(err)))?;

        let mut map = std::collections::HashMap::new();
        for row in rows {
            let name: String = row.get(0);
            let pg_type: String = row.get(1);
            if let Some(class) = class_from_information_schema(&pg_type) {
                map.insert(name, class);
            }
        }
        Ok(map)
    }

    /// §4.2 get-within-bounds. Bounds are inclusive when given, unbounded
    /// when `None`. Rows come back sorted ascending by time.
    pub fn get_within_bounds(
        &self,
        data_ids: &[Iri],
        lower: Option<&V>,
        upper: Option<&V>,
        conn: &mut Client,
    ) -> Result<Vec<TimeSeriesRow<V>>, StorageOpError> {
        let (table_name, rows) = self.resolve_single_table(conn, data_ids)?;

        let classes = self.column_classes(conn, &table_name)?;

        let mut columns: Vec<String> = vec!["\"time\"::text".to_string()];
        for lookup in &rows {
            columns.push(format!("\"{}\"::text", lookup.column_name));
        }

        let mut sql = format!(
            "SELECT {cols} FROM \"{table}\"",
            cols = columns.join(", "),
            table = table_name
        );

        let mut params: Vec<String> = Vec::new();
        let mut clauses = Vec::new();
        if let Some(lower) = lower {
            params.push(lower.to_sql_text());
            clauses.push(format!("\"time\" >= ${}::{}", params.len(), V::SQL_TYPE));
        }
        if let Some(upper) = upper {
            params.push(upper.to_sql_text());
            clauses.push(format!("\"time\" <= ${}::{}", params.len(), V::SQL_TYPE));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY \"time\" ASC");

        let bind_params: Vec<&(dyn postgres::types::ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn postgres::types::ToSql + Sync)).collect();

        let query_rows = conn
            .query(sql.as_str(), &bind_params)
            .map_err(|err| StorageError(anyhow::Error::from(err)))?;

        let mut result = Vec::with_capacity(query_rows.len());
        for row in query_rows {
            let time_text: String = row.get::<_, String>(0);
            let time = V::from_sql_text(&time_text);

            let mut values = Vec::with_capacity(rows.len());
            for (idx, lookup) in rows.iter().enumerate() {
                let class = classes.get(lookup.column_name.as_str()).copied().unwrap_or(DataClass::String);
                let text: Option<String> = row.get(idx + 1);
                values.push(class.from_sql_text(text.as_deref()));
            }
            result.push(TimeSeriesRow { time, values });
        }

        Ok(result)
    }

    /// §4.2 delete-rows.
    pub fn delete_rows(
        &self,
        data_id: &Iri,
        lower: &V,
        upper: &V,
        conn: &mut Client,
    ) -> Result<(), StorageOpError> {
        let (table_name, _) = self.resolve_single_table(conn, std::slice::from_ref(data_id))?;
        conn.execute(
            &format!(
                "DELETE FROM \"{}\" WHERE \"time\" >= $1::{t} AND \"time\" <= $2::{t}",
                table_name,
                t = V::SQL_TYPE
            ),
            &[&lower.to_sql_text(), &upper.to_sql_text()],
        )
        .map_err(|err| StorageError(anyhow::Error::from(err)))?;
        Ok(())
    }

    /// §4.2 delete-series: drops `data_id`'s column (if siblings remain) and
    /// its lookup row.
    pub fn delete_series(&self, data_id: &Iri, conn: &mut Client) -> Result<(), StorageOpError> {
        let lookup = self
            .lookup_row(conn, data_id)
            .map_err(StorageOpError::Storage)?
            .ok_or_else(|| PreconditionError::UnknownDataId(data_id.0.clone()))?;

        let sibling_count: i64 = conn
            .query_one(
                &format!(
                    "SELECT count(*) FROM \"{}\" WHERE \"tableName\" = $1",
                    self.lookup_table
                ),
                &[&lookup.table_name],
            )
            .map_err(|err| StorageError(anyhow::Error::from(err)))?
            .get(0);

        let mut txn = conn.transaction().map_err(|err| StorageError(err.into()))?;

        if sibling_count > 1 {
            txn.batch_execute(&format!(
                "ALTER TABLE \"{}\" DROP COLUMN \"{}\"",
                lookup.table_name, lookup.column_name
            ))
            .map_err(|err| StorageError(anyhow::Error::from(err)))?;
        } else {
            txn.batch_execute(&format!("DROP TABLE \"{}\"", lookup.table_name))
                .map_err(|err| StorageError(anyhow::Error::from(err)))?;
        }

        txn.execute(
            &format!("DELETE FROM \"{}\" WHERE \"dataIRI\" = $1", self.lookup_table),
            &[&data_id.0],
        )
        .map_err(|err| StorageError(anyhow::Error::from(err)))?;

        txn.commit().map_err(|err| StorageError(err.into()))?;
        Ok(())
    }

    /// §4.2 delete-table: drops the whole data table `data_id` belongs to
    /// and every lookup row pointing at it.
    pub fn delete_table(&self, data_id: &Iri, conn: &mut Client) -> Result<(), StorageOpError> {
        let lookup = self
            .lookup_row(conn, data_id)
            .map_err(StorageOpError::Storage)?
            .ok_or_else(|| PreconditionError::UnknownDataId(data_id.0.clone()))?;

        let mut txn = conn.transaction().map_err(|err| StorageError(err.into()))?;

        txn.batch_execute(&format!("DROP TABLE IF EXISTS \"{}\"", lookup.table_name))
            .map_err(|err| StorageError(anyhow::Error::from(err)))?;

        txn.execute(
            &format!("DELETE FROM \"{}\" WHERE \"tableName\" = $1", self.lookup_table),
            &[&lookup.table_name],
        )
        .map_err(|err| StorageError(anyhow::Error::from(err)))?;

        txn.commit().map_err(|err| StorageError(err.into()))?;
        Ok(())
    }

    /// §4.2 delete-all: drops every data table and the lookup table itself.
    pub fn delete_all(&self, conn: &mut Client) -> Result<(), StorageError> {
        let table_names: Vec<String> = conn
            .query(
                &format!("SELECT DISTINCT \"tableName\" FROM \"{}\"", self.lookup_table),
                &[],
            )
            .map_err(|err| StorageError(anyhow::Error::from(err)))?
            .into_iter()
            .map(|row| row.get(0))
            .collect();

        let mut txn = conn.transaction().map_err(|err| StorageError(err.into()))?;
        for table_name in table_names {
            txn.batch_execute(&format!("DROP TABLE IF EXISTS \"{}\"", table_name))
                .map_err(|err| StorageError(anyhow::Error::from(err)))?;
        }
        txn.batch_execute(&format!("DROP TABLE IF EXISTS \"{}\"", self.lookup_table))
            .map_err(|err| StorageError(anyhow::Error::from(err)))?;
        txn.commit().map_err(|err| StorageError(err.into()))?;
        Ok(())
    }

    /// §4.2 existence check used by the coordinator's invariant checks and
    /// by `exists`-style callers outside the metadata store.
    pub fn table_exists(&self, data_id: &Iri, conn: &mut Client) -> Result<bool, StorageError> {
        Ok(self.lookup_row(conn, data_id)?.is_some())
    }

    fn aggregate(
        &self,
        data_id: &Iri,
        conn: &mut Client,
        sql_fn: &str,
    ) -> Result<Option<serde_json::Value>, StorageOpError> {
        let lookup = self
            .lookup_row(conn, data_id)
            .map_err(StorageOpError::Storage)?
            .ok_or_else(|| PreconditionError::UnknownDataId(data_id.0.clone()))?;

        let class = self
            .column_classes(conn, &lookup.table_name)
            .map_err(StorageOpError::Storage)?
            .get(lookup.column_name.as_str())
            .copied()
            .unwrap_or(DataClass::String);

        let row = conn
            .query_one(
                &format!(
                    "SELECT {}(\"{}\")::text FROM \"{}\"",
                    sql_fn, lookup.column_name, lookup.table_name
                ),
                &[],
            )
            .map_err(|err| StorageError(anyhow::Error::from(err)))?;

        let text: Option<String> = row.get(0);
        Ok(Some(class.from_sql_text(text.as_deref())))
    }

    pub fn average(&self, data_id: &Iri, conn: &mut Client) -> Result<Option<serde_json::Value>, StorageOpError> {
        self.aggregate(data_id, conn, "avg")
    }

    pub fn max(&self, data_id: &Iri, conn: &mut Client) -> Result<Option<serde_json::Value>, StorageOpError> {
        self.aggregate(data_id, conn, "max")
    }

    pub fn min(&self, data_id: &Iri, conn: &mut Client) -> Result<Option<serde_json::Value>, StorageOpError> {
        self.aggregate(data_id, conn, "min")
    }

    fn time_at_extreme(
        &self,
        data_id: &Iri,
        conn: &mut Client,
        order: &str,
    ) -> Result<Option<V>, StorageOpError> {
        let (table_name, _) = self.resolve_single_table(conn, std::slice::from_ref(data_id))?;
        let row = conn
            .query_opt(
                &format!(
                    "SELECT \"time\"::text FROM \"{}\" ORDER BY \"time\" {} LIMIT 1",
                    table_name, order
                ),
                &[],
            )
            .map_err(|err| StorageError(anyhow::Error::from(err)))?;
        Ok(row.map(|row| V::from_sql_text(&row.get::<_, String>(0))))
    }

    pub fn max_time(&self, data_id: &Iri, conn: &mut Client) -> Result<Option<V>, StorageOpError> {
        self.time_at_extreme(data_id, conn, "DESC")
    }

    pub fn min_time(&self, data_id: &Iri, conn: &mut Client) -> Result<Option<V>, StorageOpError> {
        self.time_at_extreme(data_id, conn, "ASC")
    }

    fn row_at_extreme(
        &self,
        data_ids: &[Iri],
        conn: &mut Client,
        order: &str,
    ) -> Result<Option<TimeSeriesRow<V>>, StorageOpError> {
        let rows = self.get_within_bounds(data_ids, None, None, conn)?;
        Ok(match order {
            "ASC" => rows.into_iter().next(),
            _ => rows.into_iter().last(),
        })
    }

    pub fn latest_row(&self, data_ids: &[Iri], conn: &mut Client) -> Result<Option<TimeSeriesRow<V>>, StorageOpError> {
        self.row_at_extreme(data_ids, conn, "DESC")
    }

    pub fn oldest_row(&self, data_ids: &[Iri], conn: &mut Client) -> Result<Option<TimeSeriesRow<V>>, StorageOpError> {
        self.row_at_extreme(data_ids, conn, "ASC")
    }
}

fn class_from_information_schema(pg_type: &str) -> Option<DataClass> {
    match pg_type {
        "double precision" => Some(DataClass::Double),
        "bigint" => Some(DataClass::Integer),
        "boolean" => Some(DataClass::Boolean),
        "text" => Some(DataClass::String),
        "timestamp with time zone" => Some(DataClass::Timestamp),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitTableError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageOpError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
