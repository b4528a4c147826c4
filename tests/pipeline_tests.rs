//! Table pipeline end to end on SQLite.


use std::collections::HashMap;

use starhouse_exec::{ExecError, PipelineRunner, SqlExecutor, SqliteExecutor};
use starhouse_pipeline::{
    build_catalog, Catalog, CopySpec, Dialect, Phase, TimeField, INSERT_ORDER,
};
use test_data_gen::{create_temp_dir, memory_settings, sample_sources};

fn sqlite_catalog() -> Catalog {
    build_catalog(&memory_settings(Dialect::Sqlite, true)).unwrap()
}

fn counts(manifest_counts: &[(String, u64)]) -> HashMap<&str, u64> {
    manifest_counts.iter().map(|(t, n)| (t.as_str(), *n)).collect()
}

/// Stands in for the warehouse COPY: each staging load inserts fixed rows.
struct LiteralLoader {
    inner: SqliteExecutor,
}

impl SqlExecutor for LiteralLoader {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str) -> starhouse_exec::Result<()> {
        self.inner.execute(sql)
    }

    fn bulk_load(&mut self, spec: &CopySpec, _sql: &str) -> starhouse_exec::Result<Option<u64>> {
        let sql = match spec.table.as_str() {
            "staging_events" => {
                "INSERT INTO staging_events \
                 (artist, firstName, lastName, gender, level, location, page, sessionId, song, ts, userAgent, userId) \
                 VALUES ('Elena', 'Kaylee', 'Summers', 'F', 'free', 'Phoenix, AZ', 'NextSong', 139, \
                 'Setanta matins', 1541106106796, 'Mozilla/5.0', 8), \
                 ('Nobody Knows', 'Sylvie', 'Cruz', 'F', 'paid', 'Washington, DC', 'NextSong', 9, \
                 'Not In Catalog', 1541107053796, 'Mozilla/5.0', 10)"
            }
            "staging_songs" => {
                "INSERT INTO staging_songs \
                 (num_songs, artist_id, artist_location, artist_name, song_id, title, duration, year) \
                 VALUES (1, 'AR5KOSW1187FB35FF4', 'Dubai UAE', 'Elena', 'SOZCTXZ12AB0182364', \
                 'Setanta matins', 269.58322, 0)"
            }
            other => return Err(ExecError::Identifier(other.to_string())),
        };
        self.inner.execute(sql)?;
        Ok(None)
    }

    fn count_rows(&mut self, table: &str) -> starhouse_exec::Result<u64> {
        self.inner.count_rows(table)
    }
}

#[test]
fn drop_all_is_repeatable() {
    let catalog = sqlite_catalog();
    let mut exec = SqliteExecutor::in_memory().unwrap();
    let mut runner = PipelineRunner::new(&mut exec, &catalog).unwrap();
    runner.drop_all().unwrap();
    runner.drop_all().unwrap();
    runner.create_all().unwrap();
    runner.drop_all().unwrap();
    runner.drop_all().unwrap();
}

#[test]
fn create_all_twice_fails_on_first_staging_table() {
    let catalog = sqlite_catalog();
    let mut exec = SqliteExecutor::in_memory().unwrap();
    let mut runner = PipelineRunner::new(&mut exec, &catalog).unwrap();
    runner.create_all().unwrap();

    match runner.create_all().unwrap_err() {
        ExecError::Statement { phase, table, source } => {
            assert_eq!(phase, Phase::Create);
            assert_eq!(table, "staging_events");
            assert!(matches!(*source, ExecError::Sqlite(_)));
        }
        other => panic!("expected statement error, got {other:?}"),
    }
}

#[test]
fn create_tables_can_be_repeated() {
    let catalog = sqlite_catalog();
    let mut exec = SqliteExecutor::in_memory().unwrap();
    let mut runner = PipelineRunner::new(&mut exec, &catalog).unwrap();
    runner.create_tables().unwrap();
    runner.create_tables().unwrap();
}

#[test]
fn fact_before_dimensions_violates_foreign_keys() {
    let catalog = sqlite_catalog();
    let mut exec = LiteralLoader {
        inner: SqliteExecutor::in_memory().unwrap(),
    };
    {
        let mut runner = PipelineRunner::new(&mut exec, &catalog).unwrap();
        runner.create_tables().unwrap();
        runner.load_staging().unwrap();
    }

    let songplays = catalog.find(Phase::Insert, "songplays").unwrap();
    let err = exec.execute(&songplays.sql).unwrap_err();
    assert!(
        err.to_string().to_lowercase().contains("foreign key"),
        "unexpected error: {err}"
    );
    assert_eq!(exec.count_rows("songplays").unwrap(), 0);

    // The catalog order inserts the referenced dimensions first.
    for table in INSERT_ORDER {
        let stmt = catalog.find(Phase::Insert, table).unwrap();
        exec.execute(&stmt.sql).unwrap();
    }
    assert_eq!(exec.count_rows("songplays").unwrap(), 1);
}

#[test]
fn literal_rows_flow_into_fact_and_time() {
    let catalog = sqlite_catalog();
    let mut exec = LiteralLoader {
        inner: SqliteExecutor::in_memory().unwrap(),
    };
    let manifest = PipelineRunner::new(&mut exec, &catalog).unwrap().run_all().unwrap();
    let rows = counts(&manifest.row_counts);

    assert_eq!(rows["staging_events"], 2);
    assert_eq!(rows["staging_songs"], 1);
    // Only the first event matches a song; both users are still recorded.
    assert_eq!(rows["songplays"], 1);
    assert_eq!(rows["time"], 1);
    assert_eq!(rows["users"], 2);

    let (start, user, session): (String, i64, i64) = exec
        .inner
        .connection()
        .query_row(
            "SELECT start_time, user_id, session_id FROM songplays",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!(start, "2018-11-01 21:01:46");
    assert_eq!((user, session), (8, 139));

    let (hour, day, week, month, year, weekday): (i64, i64, i64, i64, i64, i64) = exec
        .inner
        .connection()
        .query_row(
            "SELECT hour, day, week, month, year, weekday FROM time",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
        )
        .unwrap();
    assert_eq!((hour, day, week, month, year, weekday), (21, 1, 44, 11, 2018, 4));

    let user_ids: Vec<i64> = exec
        .inner
        .connection()
        .prepare("SELECT user_id FROM users ORDER BY user_id")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(user_ids, vec![8, 10]);
}

#[test]
fn sqlite_week_matches_iso_weeks() {
    let exec = SqliteExecutor::in_memory().unwrap();
    let expr = Dialect::Sqlite.extract(TimeField::Week, "?1");
    let sql = format!("SELECT {expr}");
    // Year boundaries where ISO and Monday-based week numbers differ.
    for (date, week) in [
        ("2018-11-01 21:01:46", 44),
        ("2021-01-01 00:00:00", 53),
        ("2019-12-30 12:00:00", 1),
        ("2018-01-07 23:59:59", 1),
        ("2018-01-08 00:00:00", 2),
    ] {
        let got: i64 = exec
            .connection()
            .query_row(&sql, [date], |r| r.get(0))
            .unwrap();
        assert_eq!(got, week, "{date}");
    }
}

#[test]
fn json_sources_load_through_memory_store() {
    let catalog = sqlite_catalog();
    let mut exec = SqliteExecutor::in_memory()
        .unwrap()
        .with_source_store(Box::new(sample_sources()));
    let manifest = PipelineRunner::new(&mut exec, &catalog).unwrap().run_all().unwrap();

    let phases: Vec<&str> = manifest.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(phases, vec!["drop", "create", "copy", "insert"]);
    assert_eq!(manifest.catalog_hash, catalog.hash());

    let rows = counts(&manifest.row_counts);
    assert_eq!(rows["staging_events"], 3);
    assert_eq!(rows["staging_songs"], 2);
    // Two events by the same user collapse into one row, even though one id
    // is a string; the logged-out event's blank id loads as NULL.
    assert_eq!(rows["users"], 1);
    assert_eq!(rows["artists"], 2);
    assert_eq!(rows["songs"], 2);
    // Only the event whose artist and title match a known song.
    assert_eq!(rows["songplays"], 1);
    assert_eq!(rows["time"], 1);

    let (song, artist): (String, String) = exec
        .connection()
        .query_row("SELECT song_id, artist_id FROM songplays", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert_eq!(song, "SOZCTXZ12AB0182364");
    assert_eq!(artist, "AR5KOSW1187FB35FF4");

    let (blank_users, typed_users): (i64, i64) = exec
        .connection()
        .query_row(
            "SELECT SUM(userId IS NULL), SUM(typeof(userId) = 'integer') FROM staging_events",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!((blank_users, typed_users), (1, 2));
}

#[test]
fn auto_mapping_matches_jsonpaths_mapping() {
    let with_paths = build_catalog(&memory_settings(Dialect::Sqlite, true)).unwrap();
    let auto = build_catalog(&memory_settings(Dialect::Sqlite, false)).unwrap();
    assert_ne!(with_paths.hash(), auto.hash());

    let mut results = Vec::new();
    for catalog in [&with_paths, &auto] {
        let mut exec = SqliteExecutor::in_memory()
            .unwrap()
            .with_source_store(Box::new(sample_sources()));
        let manifest = PipelineRunner::new(&mut exec, catalog).unwrap().run_all().unwrap();
        results.push(manifest.row_counts);
    }
    assert_eq!(results[0], results[1]);
}

#[test]
fn rerunning_the_pipeline_rebuilds_from_scratch() {
    let dir = create_temp_dir("rerun");
    let db = dir.join("warehouse.db");
    let catalog = sqlite_catalog();

    let mut first = Vec::new();
    for _ in 0..2 {
        let mut exec = SqliteExecutor::open(&db)
            .unwrap()
            .with_source_store(Box::new(sample_sources()));
        let manifest = PipelineRunner::new(&mut exec, &catalog).unwrap().run_all().unwrap();
        if first.is_empty() {
            first = manifest.row_counts;
        } else {
            assert_eq!(manifest.row_counts, first);
        }
    }
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn missing_source_prefix_loads_nothing() {
    let catalog = sqlite_catalog();
    let store = starhouse_io::MemoryStorage::new();
    store
        .insert(test_data_gen::JSONPATHS, r#"{"jsonpaths": ["$.artist"]}"#)
        .unwrap();
    let mut exec = SqliteExecutor::in_memory()
        .unwrap()
        .with_source_store(Box::new(store));
    let manifest = PipelineRunner::new(&mut exec, &catalog).unwrap().run_all().unwrap();
    assert!(manifest.row_counts.iter().all(|(_, n)| *n == 0));
}

#[test]
fn redshift_script_names_sources_and_role() {
    let catalog = build_catalog(&memory_settings(Dialect::Redshift, true)).unwrap();
    let script = catalog.render_script();
    assert!(script.contains("DISTSTYLE ALL"));
    assert!(script.contains("IAM_ROLE 'arn:aws:iam::123456789012:role/dwhRole'"));
    assert!(script.contains("FORMAT AS JSON 'memory://udacity/log_json_path.json'"));
    assert!(script.contains("ss.artist_name = se.artist AND ss.title = se.song"));
    assert!(!script.contains("INSERT OR IGNORE"));
}
