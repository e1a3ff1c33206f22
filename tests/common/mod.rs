//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use baton::prelude::*;
use std::time::Duration;

/// Column indices of the `people` fixture table
pub const NAME: i64 = 0;
pub const AGE: i64 = 1;

/// Route `tracing` output to the test harness; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// Create an in-memory test database
pub fn create_db() -> Baton {
    Baton::in_memory().expect("Failed to create in-memory database")
}

/// In-memory database with a short writer timeout
pub fn create_db_with_timeout(timeout: Duration) -> Baton {
    Baton::builder()
        .mem_only()
        .write_timeout(timeout)
        .open()
        .expect("Failed to create in-memory database")
}

/// In-memory database keeping only `versions` recent versions
pub fn create_db_with_retention(versions: usize) -> Baton {
    Baton::builder()
        .mem_only()
        .history_retention(versions)
        .open()
        .expect("Failed to create in-memory database")
}

/// Create `people(name String, age Int)` with the given rows
///
/// Leaves the session reading at the committed version.
pub fn create_people(session: &mut Session, rows: &[(&str, i64)]) -> u64 {
    session.begin_write().unwrap();
    let people = session.add_table("people").unwrap();
    session
        .add_column(people, ColumnType::String, "name", false)
        .unwrap();
    session.add_column(people, ColumnType::Int, "age", false).unwrap();
    for &(name, age) in rows {
        let row = session.add_empty_row(people).unwrap() as i64;
        session.set_string(people, NAME, row, name).unwrap();
        session.set_int(people, AGE, row, age).unwrap();
    }
    session.commit_and_continue_as_read().unwrap();
    people
}

/// Append one person in its own write transaction; returns the new version
///
/// Ends any read the session has open and leaves it idle.
pub fn add_person(session: &mut Session, name: &str, age: i64) -> VersionId {
    if session.is_in_transaction() {
        session.end_read().unwrap();
    }
    session.begin_write().unwrap();
    let people = session.get_table("people").unwrap();
    let row = session.add_empty_row(people).unwrap() as i64;
    session.set_string(people, NAME, row, name).unwrap();
    session.set_int(people, AGE, row, age).unwrap();
    session.commit().unwrap()
}

/// `people` query filtered to `age > min_age`
pub fn older_than(session: &mut Session, people: u64, min_age: i64) -> u64 {
    let query = session.where_table(people).unwrap();
    session
        .query_filter(
            query,
            Predicate::compare(AGE as usize, Condition::Greater, min_age),
        )
        .unwrap();
    query
}

/// Names in a view handle, in view order
pub fn view_names(session: &Session, view: u64) -> Vec<String> {
    let size = session.view_size(view).unwrap();
    (0..size as i64)
        .map(|i| match session.view_get(view, NAME, i).unwrap() {
            Value::String(name) => name,
            other => panic!("expected a name, got {:?}", other),
        })
        .collect()
}

/// Engine calls forwarded so far
pub fn engine_calls(db: &Baton) -> u64 {
    db.metrics().engine_calls
}
