//! Argument Validation Tests
//!
//! Column, row, type and range checks, their messages, and the guarantee
//! that a rejected call makes no engine call.

use crate::*;

fn assert_rejected_without_engine_call<T: std::fmt::Debug>(
    db: &Baton,
    call: impl FnOnce() -> ApiResult<T>,
) -> ApiError {
    let before = engine_calls(db);
    let err = call().unwrap_err();
    assert_eq!(engine_calls(db), before, "rejected call reached the engine");
    err
}

// =============================================================================
// COLUMN AND ROW BOUNDS
// =============================================================================

#[test]
fn test_negative_column_rejected() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);

    let err = assert_rejected_without_engine_call(&db, || s.get_int(people, -1, 0));
    assert_eq!(err.kind(), ErrorKind::IndexOutOfBounds);
    assert_eq!(err.message(), "columnIndex is less than 0.");
}

#[test]
fn test_column_past_end_rejected() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);

    let err = assert_rejected_without_engine_call(&db, || s.get_int(people, 2, 0));
    assert_eq!(err.kind(), ErrorKind::IndexOutOfBounds);
    assert_eq!(err.message(), "columnIndex > available columns.");
}

#[test]
fn test_row_past_end_names_size() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30), ("Bo", 25)]);

    let err = assert_rejected_without_engine_call(&db, || s.get_int(people, AGE, 2));
    assert_eq!(err.kind(), ErrorKind::IndexOutOfBounds);
    assert_eq!(err.message(), "rowIndex 2 >= available rows (2).");

    let err = assert_rejected_without_engine_call(&db, || s.get_int(people, AGE, -1));
    assert_eq!(err.message(), "rowIndex is less than 0.");
}

#[test]
fn test_column_checked_before_row() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);

    let err = s.get_int(people, 9, 99).unwrap_err();
    assert_eq!(err.error_code(), "ColumnOutOfRange");
}

#[test]
fn test_insert_accepts_end_position_only() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30), ("Bo", 25)]);
    s.promote_to_write().unwrap();

    s.insert_empty_row(people, 2).unwrap();
    assert_eq!(s.size(people).unwrap(), 3);

    let err = s.insert_empty_row(people, 4).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfBounds);
    assert_eq!(err.message(), "rowIndex 4 > available rows (3).");
    s.rollback().unwrap();
}

// =============================================================================
// TYPES
// =============================================================================

#[test]
fn test_getter_on_wrong_column_type() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);

    let err = assert_rejected_without_engine_call(&db, || s.get_string(people, AGE, 0));
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    let wire = err.to_wire_error();
    assert_eq!(wire.details.get("expected").map(String::as_str), Some("String"));
    assert_eq!(wire.details.get("actual").map(String::as_str), Some("Int"));
}

#[test]
fn test_mixed_cell_resolves_per_row() {
    let db = create_db();
    let mut s = db.session();
    s.begin_write().unwrap();
    let things = s.add_table("things").unwrap();
    s.add_column(things, ColumnType::Mixed, "any", false).unwrap();
    s.add_empty_row(things).unwrap();
    s.add_empty_row(things).unwrap();
    s.set_mixed(things, 0, 0, Value::from("hello")).unwrap();
    s.set_mixed(things, 0, 1, Value::Int(7)).unwrap();
    s.commit_and_continue_as_read().unwrap();

    assert_eq!(s.get_string(things, 0, 0).unwrap().as_deref(), Some("hello"));
    assert_eq!(s.get_mixed_type(things, 0, 1).unwrap(), Some(ColumnType::Int));

    let err = s.get_string(things, 0, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    let wire = err.to_wire_error();
    assert_eq!(wire.details.get("actual").map(String::as_str), Some("Mixed(Int)"));
}

#[test]
fn test_set_null_requires_nullable_column() {
    let db = create_db();
    let mut s = db.session();
    create_people(&mut s, &[("Ann", 30)]);
    s.end_read().unwrap();
    s.begin_write().unwrap();
    let people = s.get_table("people").unwrap();
    s.add_column(people, ColumnType::Int, "score", true).unwrap();

    s.set_null(people, 2, 0).unwrap();
    assert!(s.is_null(people, 2, 0).unwrap());
    assert_eq!(s.get_int(people, 2, 0).unwrap(), None);

    let err = s.set_null(people, AGE, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);
    assert_eq!(err.message(), "This field is not nullable.");
    s.rollback().unwrap();
}

// =============================================================================
// MUTATORS
// =============================================================================

/// `people` plus `best` (Link) and `friends` (LinkList) columns pointing back
/// at `people`, left inside an open write transaction
fn people_with_links(s: &mut Session) -> (u64, i64, i64) {
    let people = create_people(s, &[("Ann", 30)]);
    s.promote_to_write().unwrap();
    let best = s
        .add_link_column(people, ColumnType::Link, "best", people)
        .unwrap() as i64;
    let friends = s
        .add_link_column(people, ColumnType::LinkList, "friends", people)
        .unwrap() as i64;
    (people, best, friends)
}

#[test]
fn test_row_set_type_checked_before_engine() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);
    s.promote_to_write().unwrap();
    let ann = s.get_row(people, 0).unwrap();

    let err = assert_rejected_without_engine_call(&db, || {
        s.row_set(ann, AGE, Value::from("not an int"))
    });
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);

    let err = assert_rejected_without_engine_call(&db, || s.row_set(ann, AGE, Value::Null));
    assert_eq!(err.message(), "This field is not nullable.");

    let err = assert_rejected_without_engine_call(&db, || s.row_set(ann, 7, Value::Int(1)));
    assert_eq!(err.error_code(), "ColumnOutOfRange");

    s.row_set(ann, AGE, Value::Int(31)).unwrap();
    assert_eq!(s.get_int(people, AGE, 0).unwrap(), Some(31));
    s.rollback().unwrap();
}

#[test]
fn test_link_target_row_checked_before_engine() {
    let db = create_db();
    let mut s = db.session();
    let (people, best, friends) = people_with_links(&mut s);

    let err = assert_rejected_without_engine_call(&db, || s.set_link(people, best, 0, 99));
    assert_eq!(err.kind(), ErrorKind::IndexOutOfBounds);
    assert_eq!(err.error_code(), "RowOutOfRange");
    assert_eq!(err.message(), "rowIndex 99 >= available rows (1).");

    let err = assert_rejected_without_engine_call(&db, || s.set_link(people, best, 0, -1));
    assert_eq!(err.message(), "rowIndex is less than 0.");

    let err = assert_rejected_without_engine_call(&db, || s.set_link(people, NAME, 0, 0));
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);

    let list = s.get_link_list(people, friends, 0).unwrap();
    let err = assert_rejected_without_engine_call(&db, || s.link_list_add(list, 1));
    assert_eq!(err.error_code(), "RowOutOfRange");
    assert_eq!(s.link_list_size(list).unwrap(), 0);

    let ann = s.get_row(people, 0).unwrap();
    let err = assert_rejected_without_engine_call(&db, || s.row_set(ann, best, Value::Link(5)));
    assert_eq!(err.error_code(), "RowOutOfRange");

    s.set_link(people, best, 0, 0).unwrap();
    s.link_list_add(list, 0).unwrap();
    assert_eq!(s.get_link(people, best, 0).unwrap(), Some(0));
    assert_eq!(s.link_list_target(list, 0).unwrap(), 0);
    s.rollback().unwrap();
}

#[test]
fn test_other_mutators_rejected_before_engine() {
    let db = create_db();
    let mut s = db.session();
    let (people, _, friends) = people_with_links(&mut s);
    let list = s.get_link_list(people, friends, 0).unwrap();

    let err = assert_rejected_without_engine_call(&db, || s.set_null(people, AGE, 0));
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);
    let err = assert_rejected_without_engine_call(&db, || s.set_null(people, friends, 0));
    assert_eq!(err.message(), "LinkList is not nullable.");
    let err = assert_rejected_without_engine_call(&db, || s.set_int(people, NAME, 0, 1));
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    let err = assert_rejected_without_engine_call(&db, || s.set_string(people, NAME, 1, "x"));
    assert_eq!(err.kind(), ErrorKind::IndexOutOfBounds);
    let err = assert_rejected_without_engine_call(&db, || s.remove_row(people, 1));
    assert_eq!(err.message(), "rowIndex 1 >= available rows (1).");
    let err = assert_rejected_without_engine_call(&db, || s.insert_empty_row(people, 2));
    assert_eq!(err.kind(), ErrorKind::IndexOutOfBounds);
    let err = assert_rejected_without_engine_call(&db, || s.remove_column(people, 9));
    assert_eq!(err.error_code(), "ColumnOutOfRange");
    let err = assert_rejected_without_engine_call(&db, || s.link_list_remove(list, 0));
    assert_eq!(err.kind(), ErrorKind::IndexOutOfBounds);

    assert_eq!(s.size(people).unwrap(), 1);
    s.rollback().unwrap();
}

// =============================================================================
// RANGES
// =============================================================================

#[test]
fn test_start_after_end_rejected_before_engine() {
    let db = create_db();
    let mut s = db.session();
    let rows: Vec<(String, i64)> = (0..10).map(|i| (format!("p{}", i), i)).collect();
    let rows: Vec<(&str, i64)> = rows.iter().map(|(n, a)| (n.as_str(), *a)).collect();
    let people = create_people(&mut s, &rows);
    let query = s.where_table(people).unwrap();

    let err = assert_rejected_without_engine_call(&db, || s.query_find_all(query, 5, 3, -1));
    assert_eq!(err.kind(), ErrorKind::IndexOutOfBounds);
    assert_eq!(err.message(), "startIndex > endIndex.");
}

#[test]
fn test_range_messages() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30), ("Bo", 25)]);
    let query = s.where_table(people).unwrap();

    let cases = [
        ((-1, -1, -1), "startIndex < 0."),
        ((3, -1, -1), "startIndex > available rows."),
        ((0, -2, -1), "endIndex < 0."),
        ((0, 3, -1), "endIndex > available rows."),
        ((0, -1, -2), "limit < 0."),
    ];
    for ((start, end, limit), message) in cases {
        let err = s.query_count(query, start, end, limit).unwrap_err();
        assert_eq!(err.message(), message, "for ({}, {}, {})", start, end, limit);
    }
    assert_eq!(s.query_count(query, 0, -1, 1).unwrap(), 1);
    assert_eq!(s.query_count(query, 2, 2, -1).unwrap(), 0);
}

// =============================================================================
// TRANSACTION STATE
// =============================================================================

#[test]
fn test_write_outside_write_transaction() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);

    let err = assert_rejected_without_engine_call(&db, || s.set_int(people, AGE, 0, 31));
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(
        err.message(),
        "Cannot modify managed objects outside of a write transaction."
    );
    assert_eq!(s.get_int(people, AGE, 0).unwrap(), Some(30));
}

#[test]
fn test_successful_calls_count_once() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);

    let before = engine_calls(&db);
    s.get_int(people, AGE, 0).unwrap();
    s.size(people).unwrap();
    assert_eq!(engine_calls(&db), before + 2);
}

#[test]
fn test_handle_and_view_reads_are_counted() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30), ("Bo", 25)]);

    let before = engine_calls(&db);
    let row = s.get_row(people, 1).unwrap();
    s.row_index(row).unwrap();
    let query = s.where_table(people).unwrap();
    assert_eq!(s.query_validate(query).unwrap(), None);
    let view = s.query_find_all(query, 0, -1, -1).unwrap();
    s.view_size(view).unwrap();
    s.view_row_index(view, 0).unwrap();
    assert_eq!(engine_calls(&db), before + 7);
}
