//! Export / Import Tests
//!
//! Envelopes carry rows, queries and views to another session, are consumed
//! exactly once, and bring the importing session to the exported version.

use crate::*;

#[test]
fn test_row_copy_keeps_source_handle() {
    let db = create_db();
    let mut ui = db.session();
    let people = create_people(&mut ui, &[("Ann", 30), ("Bo", 25)]);
    let bo = ui.get_row(people, 1).unwrap();

    let envelope = ui.export_row(bo, HandoverPolicy::Copy).unwrap();
    assert_eq!(db.metrics().pending_handovers, 1);

    let (name, index) = on_worker(&db, move |worker| {
        let row = worker.import_row(envelope).unwrap();
        (worker.row_get(row, NAME).unwrap(), worker.row_index(row).unwrap())
    });
    assert_eq!(name, Value::from("Bo"));
    assert_eq!(index, 1);
    assert_eq!(db.metrics().pending_handovers, 0);
    assert_eq!(ui.row_get(bo, AGE).unwrap(), Value::Int(25));
}

#[test]
fn test_view_move_releases_source_handle() {
    let db = create_db();
    let mut ui = db.session();
    let people = create_people(&mut ui, &[("Ann", 30), ("Bo", 25), ("Cy", 35)]);
    let query = older_than(&mut ui, people, 26);
    let view = ui.query_find_all(query, 0, -1, -1).unwrap();

    let envelope = ui.export_view(view, HandoverPolicy::Move).unwrap();
    assert!(ui.view_size(view).unwrap_err().is_detached());

    let names = on_worker(&db, move |worker| {
        let view = worker.import_view(envelope).unwrap();
        view_names(worker, view)
    });
    assert_eq!(names, vec!["Ann", "Cy"]);
}

#[test]
fn test_imported_query_runs_locally() {
    let db = create_db();
    let mut ui = db.session();
    let people = create_people(&mut ui, &[("Ann", 30), ("Bo", 25)]);
    let query = older_than(&mut ui, people, 20);
    let envelope = ui.export_query(query, HandoverPolicy::Copy).unwrap();

    let count = on_worker(&db, move |worker| {
        let query = worker.import_query(envelope).unwrap();
        worker.query_count(query, 0, -1, -1).unwrap()
    });
    assert_eq!(count, 2);
    assert_eq!(ui.query_count(query, 0, -1, -1).unwrap(), 2);
}

#[test]
fn test_import_brings_session_forward() {
    let db = create_db();
    let mut ui = db.session();
    let mut writer = db.session();
    let people = create_people(&mut ui, &[("Ann", 30)]);
    let exported_at = add_person(&mut writer, "Bo", 25);

    writer.begin_read().unwrap();
    let table = writer.get_table("people").unwrap();
    let bo = writer.get_row(table, 1).unwrap();
    let envelope = writer.export_row(bo, HandoverPolicy::Copy).unwrap();

    assert!(ui.version().unwrap() < exported_at);
    let row = ui.import_row(envelope).unwrap();
    assert_eq!(ui.version(), Some(exported_at));
    assert_eq!(ui.row_get(row, NAME).unwrap(), Value::from("Bo"));
    assert!(ui.is_table_attached(people).unwrap());
}

#[test]
fn test_envelope_is_single_use() {
    let db = create_db();
    let mut ui = db.session();
    let people = create_people(&mut ui, &[("Ann", 30)]);
    let query = ui.where_table(people).unwrap();
    let envelope = ui.export_query(query, HandoverPolicy::Copy).unwrap();

    let mut other = db.session();
    other.import_query(envelope).unwrap();

    let err = other.import_query(envelope).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(err.error_code(), "AlreadyConsumed");
    assert!(!err.is_detached());
}

#[test]
fn test_close_handover_consumes() {
    let db = create_db();
    let mut ui = db.session();
    let people = create_people(&mut ui, &[("Ann", 30)]);
    let row = ui.get_row(people, 0).unwrap();
    let envelope = ui.export_row(row, HandoverPolicy::Copy).unwrap();

    ui.close_handover(envelope).unwrap();
    assert_eq!(db.metrics().pending_handovers, 0);
    assert_eq!(
        ui.close_handover(envelope).unwrap_err().error_code(),
        "AlreadyConsumed"
    );
    assert_eq!(
        ui.import_row(envelope).unwrap_err().error_code(),
        "AlreadyConsumed"
    );
}

#[test]
fn test_wrong_import_kind_keeps_envelope() {
    let db = create_db();
    let mut ui = db.session();
    let people = create_people(&mut ui, &[("Ann", 30)]);
    let query = ui.where_table(people).unwrap();
    let envelope = ui.export_query(query, HandoverPolicy::Copy).unwrap();

    let mut other = db.session();
    let err = other.import_view(envelope).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);
    assert_eq!(db.metrics().pending_handovers, 1);
    assert!(!other.is_in_transaction());

    other.import_query(envelope).unwrap();
}

#[test]
fn test_export_requires_read_transaction() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);
    let query = s.where_table(people).unwrap();
    s.promote_to_write().unwrap();

    let err = s.export_query(query, HandoverPolicy::Move).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(db.metrics().pending_handovers, 0);
    s.rollback_and_continue_as_read().unwrap();

    // A failed Move leaves the source handle in place
    assert_eq!(s.query_count(query, 0, -1, -1).unwrap(), 1);
}
