//! Batch Update Tests
//!
//! Several queries exported at one version are re-run together; every
//! result reflects the same, latest snapshot.

use crate::*;

fn result_view(result: &HandedResult) -> u64 {
    match result {
        HandedResult::View(view) => *view,
        other => panic!("expected a view, got {:?}", other),
    }
}

#[test]
fn test_batch_results_share_latest_version() {
    let db = create_db();
    let mut ui = db.session();
    let mut writer = db.session();
    let people = create_people(&mut ui, &[("Ann", 30), ("Bo", 25)]);
    let exported_at = ui.version().unwrap();

    let adults = older_than(&mut ui, people, 18);
    let seniors = older_than(&mut ui, people, 29);
    let everyone = ui.where_table(people).unwrap();
    let requests = vec![
        (
            ui.export_query(adults, HandoverPolicy::Copy).unwrap(),
            QueryRequest::find_all(),
        ),
        (
            ui.export_query(seniors, HandoverPolicy::Copy).unwrap(),
            QueryRequest::Count {
                start: 0,
                end: -1,
                limit: -1,
            },
        ),
        (
            ui.export_query(everyone, HandoverPolicy::Copy).unwrap(),
            QueryRequest::Aggregate {
                kind: AggregateKind::Sum,
                column: AGE,
            },
        ),
    ];

    let latest = add_person(&mut writer, "Cy", 35);
    assert!(latest > exported_at);

    let batch = on_worker(&db, move |worker| {
        let batch = worker.batch_update_queries(requests).unwrap();
        assert_eq!(worker.version(), Some(batch.version));
        batch
    });
    assert_eq!(batch.version, latest);
    assert_eq!(batch.results.len(), 3);
    assert_eq!(batch.results[1], HandedResult::Count(2));
    assert_eq!(batch.results[2], HandedResult::Value(Value::Int(90)));

    let view = ui.import_view(result_view(&batch.results[0])).unwrap();
    assert_eq!(ui.version(), Some(latest));
    assert_eq!(view_names(&ui, view), vec!["Ann", "Bo", "Cy"]);
}

#[test]
fn test_batch_find_and_sort() {
    let db = create_db();
    let mut ui = db.session();
    let people = create_people(&mut ui, &[("Ann", 30), ("Bo", 25), ("Cy", 35)]);
    let query = ui.where_table(people).unwrap();
    let requests = vec![
        (
            ui.export_query(query, HandoverPolicy::Copy).unwrap(),
            QueryRequest::Find { from_row: 1 },
        ),
        (
            ui.export_query(query, HandoverPolicy::Copy).unwrap(),
            QueryRequest::FindAllSorted {
                start: 0,
                end: -1,
                limit: 2,
                keys: vec![(AGE, SortOrder::Ascending)],
            },
        ),
    ];

    let batch = on_worker(&db, move |worker| worker.batch_update_queries(requests).unwrap());
    let row = match &batch.results[0] {
        HandedResult::Row(Some(row)) => ui.import_row(*row).unwrap(),
        other => panic!("expected a row, got {:?}", other),
    };
    assert_eq!(ui.row_index(row).unwrap(), 1);
    let view = ui.import_view(result_view(&batch.results[1])).unwrap();
    assert_eq!(view_names(&ui, view), vec!["Bo", "Ann"]);
}

#[test]
fn test_empty_batch_rejected() {
    let db = create_db();
    let mut worker = db.session();
    let err = worker.batch_update_queries(Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);
    assert_eq!(err.message(), "Batch must contain at least one query");
}

#[test]
fn test_mixed_versions_rejected() {
    let db = create_db();
    let mut ui = db.session();
    let people = create_people(&mut ui, &[("Ann", 30)]);
    let query = ui.where_table(people).unwrap();
    let early = ui.export_query(query, HandoverPolicy::Copy).unwrap();

    ui.promote_to_write().unwrap();
    ui.add_empty_row(people).unwrap();
    ui.commit_and_continue_as_read().unwrap();
    let late = ui.export_query(query, HandoverPolicy::Copy).unwrap();

    let mut worker = db.session();
    let err = worker
        .batch_update_queries(vec![
            (early, QueryRequest::find_all()),
            (late, QueryRequest::find_all()),
        ])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadVersion);
    assert!(!worker.is_in_transaction());
}

#[test]
fn test_duplicate_handle_takes_nothing() {
    let db = create_db();
    let mut ui = db.session();
    let people = create_people(&mut ui, &[("Ann", 30)]);
    let query = ui.where_table(people).unwrap();
    let envelope = ui.export_query(query, HandoverPolicy::Copy).unwrap();

    let mut worker = db.session();
    let err = worker
        .batch_update_queries(vec![
            (envelope, QueryRequest::find_all()),
            (envelope, QueryRequest::find_all()),
        ])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);
    assert_eq!(db.metrics().pending_handovers, 1);
}

#[test]
fn test_non_query_entry_rejected() {
    let db = create_db();
    let mut ui = db.session();
    let people = create_people(&mut ui, &[("Ann", 30)]);
    let query = ui.where_table(people).unwrap();
    let row = ui.get_row(people, 0).unwrap();
    let requests = vec![
        (
            ui.export_query(query, HandoverPolicy::Copy).unwrap(),
            QueryRequest::find_all(),
        ),
        (
            ui.export_row(row, HandoverPolicy::Copy).unwrap(),
            QueryRequest::find_all(),
        ),
    ];

    let mut worker = db.session();
    let err = worker.batch_update_queries(requests).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);
}
