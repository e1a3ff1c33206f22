//! Version Availability Tests
//!
//! Envelopes name the version they were exported at. Once compaction drops
//! that version, or the importing session has already moved past it, the
//! handover fails with BadVersion.

use crate::*;

#[test]
fn test_export_version_compacted_before_worker_runs() {
    let db = create_db_with_retention(1);
    let mut ui = db.session();
    let mut writer = db.session();
    let people = create_people(&mut ui, &[("Ann", 30)]);
    let query = ui.where_table(people).unwrap();
    let envelope = ui.export_query(query, HandoverPolicy::Copy).unwrap();
    ui.end_read().unwrap();

    add_person(&mut writer, "Bo", 25);
    add_person(&mut writer, "Cy", 35);

    let mut worker = db.session();
    let err = worker
        .find_all_with_handover(envelope, 0, -1, -1)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadVersion);
    assert!(!worker.is_in_transaction());
}

#[test]
fn test_pinned_export_version_survives_compaction() {
    let db = create_db_with_retention(1);
    let mut ui = db.session();
    let mut writer = db.session();
    let people = create_people(&mut ui, &[("Ann", 30)]);
    let query = ui.where_table(people).unwrap();
    let envelope = ui.export_query(query, HandoverPolicy::Copy).unwrap();

    add_person(&mut writer, "Bo", 25);
    add_person(&mut writer, "Cy", 35);

    let count = on_worker(&db, move |worker| {
        worker.count_with_handover(envelope, 0, -1, -1).unwrap()
    });
    assert_eq!(count, 3);
    assert!(db.metrics().oldest_version <= ui.version().unwrap());
}

#[test]
fn test_import_into_session_ahead_of_export() {
    let db = create_db();
    let mut ui = db.session();
    let mut writer = db.session();
    let people = create_people(&mut ui, &[("Ann", 30)]);
    let row = ui.get_row(people, 0).unwrap();
    let envelope = ui.export_row(row, HandoverPolicy::Copy).unwrap();

    add_person(&mut writer, "Bo", 25);
    let mut ahead = db.session();
    let latest = ahead.begin_read().unwrap();

    let err = ahead.import_row(envelope).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadVersion);
    assert_eq!(ahead.version(), Some(latest));
}

#[test]
fn test_metrics_track_history() {
    let db = create_db_with_retention(2);
    let mut s = db.session();
    create_people(&mut s, &[("Ann", 30)]);
    for i in 0..4 {
        add_person(&mut s, &format!("p{}", i), i);
    }

    let metrics = db.metrics();
    assert_eq!(metrics.commits, 5);
    assert_eq!(metrics.latest_version.as_u64(), 6);
    assert_eq!(metrics.oldest_version.as_u64(), 5);
    assert_eq!(metrics.versions_dropped, 4);
}
