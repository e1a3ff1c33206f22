//! Detached Handle Tests
//!
//! Handles outlive the transaction or schema they were created in. Using one
//! afterwards fails with IllegalState before anything reaches the engine.

use crate::*;

#[test]
fn test_table_detaches_when_read_ends() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);
    s.end_read().unwrap();

    let before = engine_calls(&db);
    let err = s.get_string(people, NAME, 0).unwrap_err();
    assert_eq!(engine_calls(&db), before);
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(err.error_code(), "Detached");
    assert_eq!(err.message(), "Table is no longer valid to operate on.");
    assert!(!s.is_table_attached(people).unwrap());
}

#[test]
fn test_new_transaction_does_not_revive_handle() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);
    s.end_read().unwrap();
    s.begin_read().unwrap();

    assert!(s.get_int(people, AGE, 0).unwrap_err().is_detached());
    let fresh = s.get_table("people").unwrap();
    assert_eq!(s.get_int(fresh, AGE, 0).unwrap(), Some(30));
}

#[test]
fn test_handles_survive_advance_and_promote() {
    let db = create_db();
    let mut ui = db.session();
    let mut writer = db.session();
    let people = create_people(&mut ui, &[("Ann", 30)]);

    add_person(&mut writer, "Bo", 25);
    ui.advance_read().unwrap();
    assert_eq!(ui.size(people).unwrap(), 2);

    ui.promote_to_write().unwrap();
    ui.set_int(people, AGE, 1, 26).unwrap();
    ui.commit_and_continue_as_read().unwrap();
    assert_eq!(ui.get_int(people, AGE, 1).unwrap(), Some(26));
}

#[test]
fn test_row_detaches_when_removed() {
    let db = create_db();
    let mut ui = db.session();
    let mut writer = db.session();
    let people = create_people(&mut ui, &[("Ann", 30), ("Bo", 25)]);
    let bo = ui.get_row(people, 1).unwrap();
    assert_eq!(ui.row_get(bo, NAME).unwrap(), Value::from("Bo"));

    writer.begin_write().unwrap();
    let table = writer.get_table("people").unwrap();
    writer.remove_row(table, 1).unwrap();
    writer.commit().unwrap();

    ui.advance_read().unwrap();
    assert!(!ui.is_row_attached(bo).unwrap());
    let err = ui.row_get(bo, NAME).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(
        err.message(),
        "Object is no longer valid to operate on. Was it deleted by another thread?"
    );
}

#[test]
fn test_row_handle_follows_earlier_removal() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30), ("Bo", 25), ("Cy", 40)]);
    let bo = s.get_row(people, 1).unwrap();
    s.promote_to_write().unwrap();

    s.remove_row(people, 0).unwrap();
    assert!(s.is_row_attached(bo).unwrap());
    assert_eq!(s.row_index(bo).unwrap(), 0);
    assert_eq!(s.row_get(bo, NAME).unwrap(), Value::from("Bo"));

    s.insert_empty_row(people, 0).unwrap();
    assert_eq!(s.row_index(bo).unwrap(), 1);
    assert_eq!(s.row_get(bo, AGE).unwrap(), Value::Int(25));

    s.remove_row(people, 1).unwrap();
    assert!(!s.is_row_attached(bo).unwrap());
    let before = engine_calls(&db);
    assert!(s.row_get(bo, NAME).unwrap_err().is_detached());
    assert!(s.row_set(bo, AGE, Value::Int(1)).unwrap_err().is_detached());
    assert_eq!(engine_calls(&db), before);
    s.rollback().unwrap();
}

#[test]
fn test_row_handle_follows_removal_by_another_session() {
    let db = create_db();
    let mut ui = db.session();
    let mut writer = db.session();
    let people = create_people(&mut ui, &[("Ann", 30), ("Bo", 25), ("Cy", 40)]);
    let cy = ui.get_row(people, 2).unwrap();

    writer.begin_write().unwrap();
    let table = writer.get_table("people").unwrap();
    writer.remove_row(table, 0).unwrap();
    writer.commit().unwrap();

    assert_eq!(ui.row_index(cy).unwrap(), 2);
    ui.advance_read().unwrap();
    assert_eq!(ui.row_index(cy).unwrap(), 1);
    assert_eq!(ui.row_get(cy, NAME).unwrap(), Value::from("Cy"));
}

#[test]
fn test_link_list_handle_follows_its_row() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30), ("Bo", 25)]);
    s.promote_to_write().unwrap();
    let friends = s
        .add_link_column(people, ColumnType::LinkList, "friends", people)
        .unwrap() as i64;
    let list = s.get_link_list(people, friends, 1).unwrap();
    s.link_list_add(list, 1).unwrap();

    s.remove_row(people, 0).unwrap();
    assert_eq!(s.link_list_size(list).unwrap(), 1);
    assert_eq!(s.link_list_target(list, 0).unwrap(), 0);

    s.remove_row(people, 0).unwrap();
    assert!(s.link_list_size(list).unwrap_err().is_detached());
    s.rollback().unwrap();
}

#[test]
fn test_detached_mutators_make_no_engine_call() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);
    let ann = s.get_row(people, 0).unwrap();
    s.end_read().unwrap();
    s.begin_write().unwrap();

    let before = engine_calls(&db);
    assert!(s.set_int(people, AGE, 0, 31).unwrap_err().is_detached());
    assert!(s.set_null(people, AGE, 0).unwrap_err().is_detached());
    assert!(s.set_link(people, AGE, 0, 0).unwrap_err().is_detached());
    assert!(s.remove_row(people, 0).unwrap_err().is_detached());
    assert!(s.add_empty_row(people).unwrap_err().is_detached());
    assert!(s.row_set(ann, AGE, Value::Int(31)).unwrap_err().is_detached());
    assert_eq!(engine_calls(&db), before);
    s.rollback().unwrap();
}

#[test]
fn test_query_and_view_detach_on_schema_change() {
    let db = create_db();
    let mut ui = db.session();
    let mut writer = db.session();
    let people = create_people(&mut ui, &[("Ann", 30), ("Bo", 25)]);
    let query = older_than(&mut ui, people, 26);
    let view = ui.query_find_all(query, 0, -1, -1).unwrap();
    assert_eq!(view_names(&ui, view), vec!["Ann"]);

    writer.begin_write().unwrap();
    let table = writer.get_table("people").unwrap();
    writer
        .add_column(table, ColumnType::Bool, "active", false)
        .unwrap();
    writer.commit().unwrap();

    ui.advance_read().unwrap();
    assert!(ui.is_table_attached(people).unwrap());
    assert!(!ui.is_view_attached(view).unwrap());

    let err = ui.query_count(query, 0, -1, -1).unwrap_err();
    assert!(err.is_detached());
    assert_eq!(err.message(), "Query is no longer valid to operate on.");
    assert!(ui.view_size(view).unwrap_err().is_detached());
}

#[test]
fn test_removed_table_detaches() {
    let db = create_db();
    let mut ui = db.session();
    let mut writer = db.session();
    let people = create_people(&mut ui, &[("Ann", 30)]);

    writer.begin_write().unwrap();
    let table = writer.get_table("people").unwrap();
    writer.remove_table(table).unwrap();
    writer.commit().unwrap();

    ui.advance_read().unwrap();
    assert!(!ui.has_table("people").unwrap());
    assert!(ui.size(people).unwrap_err().is_detached());
}

#[test]
fn test_closed_handle_is_detached() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);
    s.close_table(people).unwrap();

    assert!(s.size(people).unwrap_err().is_detached());
    assert!(s.close_table(people).unwrap_err().is_detached());
}

#[test]
fn test_foreign_and_malformed_handles() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);
    let query = s.where_table(people).unwrap();

    let err = s.size(query).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);
    assert_eq!(err.error_code(), "WrongHandleKind");

    let err = s.size(0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);
}
