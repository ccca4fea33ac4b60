mod common;

use std::sync::Arc;

use postgres::NoTls;
use pretty_assertions::assert_eq;
use serde_json::json;

use common::{InMemoryTripleStore, LocalDeps};
use kg_coordinator::error::CoordinatorError;
use kg_coordinator::ids::Iri;
use kg_coordinator::timeseries::{storage::DEFAULT_LOOKUP_TABLE, DataClass, SeriesBatch, TimeSeriesCoordinator};

fn connect(connection_string: &str) -> postgres::Client {
    postgres::Client::connect(connection_string, NoTls).expect("failed to connect to test postgres")
}

/// S1 — create/append/query round-trip (spec §8).
#[test]
fn s1_create_append_query_round_trip() {
    let deps = LocalDeps::new();
    let postgres = deps.run_postgres();
    let mut conn = connect(&postgres.connection_string);

    let gateway: Arc<InMemoryTripleStore> = Arc::new(InMemoryTripleStore::new());
    let coordinator: TimeSeriesCoordinator<i64> = TimeSeriesCoordinator::new(gateway.clone());

    let series_id = Iri::from("http://ts1");
    let a = Iri::from("http://a");
    let b = Iri::from("http://b");
    let time_unit = Iri::from("http://s");

    coordinator
        .init_time_series(
            &series_id,
            &[a.clone(), b.clone()],
            &[DataClass::Double, DataClass::Integer],
            "postgres://host/db",
            Some(&time_unit),
            &mut conn,
            None,
        )
        .expect("init_time_series should succeed");

    let t0 = 1_700_000_000i64;
    let batch = SeriesBatch {
        data_ids: vec![a.clone(), b.clone()],
        times: vec![t0, t0 + 1, t0 + 2],
        values: vec![
            vec![json!(1.0), json!(10)],
            vec![json!(2.0), json!(20)],
            vec![json!(3.0), json!(30)],
        ],
    };
    coordinator.add_data(&[batch], &mut conn).expect("add_data should succeed");

    let rows = coordinator
        .get_within_bounds(&[a.clone(), b.clone()], None, None, &mut conn)
        .expect("get_within_bounds should succeed");

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].time, t0);
    assert_eq!(rows[0].values, vec![json!(1.0), json!(10)]);
    assert_eq!(rows[1].time, t0 + 1);
    assert_eq!(rows[1].values, vec![json!(2.0), json!(20)]);
    assert_eq!(rows[2].time, t0 + 2);
    assert_eq!(rows[2].values, vec![json!(3.0), json!(30)]);
}

/// S2 — inclusive bounds (spec §8).
#[test]
fn s2_bounds_inclusive() {
    let deps = LocalDeps::new();
    let postgres = deps.run_postgres();
    let mut conn = connect(&postgres.connection_string);

    let gateway: Arc<InMemoryTripleStore> = Arc::new(InMemoryTripleStore::new());
    let coordinator: TimeSeriesCoordinator<i64> = TimeSeriesCoordinator::new(gateway.clone());

    let series_id = Iri::from("http://ts1");
    let a = Iri::from("http://a");

    coordinator
        .init_time_series(&series_id, &[a.clone()], &[DataClass::Double], "postgres://host/db", None, &mut conn, None)
        .unwrap();

    let t0 = 1_700_000_000i64;
    let batch = SeriesBatch {
        data_ids: vec![a.clone()],
        times: vec![t0, t0 + 1, t0 + 2],
        values: vec![vec![json!(1.0)], vec![json!(2.0)], vec![json!(3.0)]],
    };
    coordinator.add_data(&[batch], &mut conn).unwrap();

    let rows = coordinator
        .get_within_bounds(&[a], Some(&(t0 + 1)), Some(&(t0 + 1)), &mut conn)
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].time, t0 + 1);
    assert_eq!(rows[0].values, vec![json!(2.0)]);
}

/// S3 — init rollback (spec §8): a storage-side failure on the second
/// init-table call (duplicate data-id) compensates the second call's
/// metadata, leaving the first series intact and the second absent.
#[test]
fn s3_init_rollback_on_storage_failure() {
    let deps = LocalDeps::new();
    let postgres = deps.run_postgres();
    let mut conn = connect(&postgres.connection_string);

    let gateway: Arc<InMemoryTripleStore> = Arc::new(InMemoryTripleStore::new());
    let coordinator: TimeSeriesCoordinator<i64> = TimeSeriesCoordinator::new(gateway.clone());

    let shared_data_id = Iri::from("http://shared");
    let series_one = Iri::from("http://ts-one");
    let series_two = Iri::from("http://ts-two");

    coordinator
        .init_time_series(
            &series_one,
            &[shared_data_id.clone()],
            &[DataClass::Double],
            "postgres://host/db",
            None,
            &mut conn,
            None,
        )
        .expect("first init should succeed");

    let err = coordinator
        .init_time_series(
            &series_two,
            &[shared_data_id.clone()],
            &[DataClass::Double],
            "postgres://host/db",
            None,
            &mut conn,
            None,
        )
        .expect_err("second init reusing the data-id should fail");

    assert!(matches!(err, CoordinatorError::Create(_)));

    assert!(coordinator.metadata().exists(&series_one).unwrap());
    assert!(!coordinator.metadata().exists(&series_two).unwrap());
}

/// S4 — delete inconsistent state (spec §8): storage delete fails (the
/// lookup table is gone) and the compensating metadata re-insertion is
/// made to fail too, surfacing InconsistentStateError naming the series.
#[test]
fn s4_delete_inconsistent_state() {
    let deps = LocalDeps::new();
    let postgres = deps.run_postgres();
    let mut conn = connect(&postgres.connection_string);

    let gateway: Arc<InMemoryTripleStore> = Arc::new(InMemoryTripleStore::new());
    let coordinator: TimeSeriesCoordinator<i64> = TimeSeriesCoordinator::new(gateway.clone());

    let series_id = Iri::from("http://ts3");
    let data_id = Iri::from("http://c");

    coordinator
        .init_time_series(&series_id, &[data_id], &[DataClass::Double], "postgres://host/db", None, &mut conn, None)
        .expect("init should succeed");

    conn.batch_execute(&format!("DROP TABLE \"{}\"", DEFAULT_LOOKUP_TABLE))
        .expect("dropping the lookup table out-of-band should succeed");

    gateway.fail_updates_containing("INSERT DATA");

    let err = coordinator
        .delete_time_series(&series_id, &mut conn)
        .expect_err("delete should fail on both storage and its compensation");

    match err {
        CoordinatorError::InconsistentState(inner) => {
            assert!(inner.identifier.contains("ts3"));
        }
        other => panic!("expected InconsistentState, got {other:?}"),
    }
}
