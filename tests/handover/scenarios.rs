//! End-to-End Scenarios
//!
//! Several threads, each with its own session, cooperating through envelope
//! handles only.

use crate::*;
use std::sync::mpsc;
use std::thread;

#[test]
fn test_ui_worker_writer_pipeline() {
    let db = create_db();
    let mut ui = db.session();
    let people = create_people(&mut ui, &[("Ann", 30), ("Bo", 25)]);
    let query = older_than(&mut ui, people, 26);

    let (to_worker, worker_inbox) = mpsc::channel::<u64>();
    let (to_ui, ui_inbox) = mpsc::channel::<u64>();

    let worker_db = db.clone();
    let worker = thread::spawn(move || {
        let mut session = worker_db.session();
        for envelope in worker_inbox {
            let view = session
                .find_all_with_handover(envelope, 0, -1, -1)
                .unwrap();
            to_ui.send(view).unwrap();
        }
    });

    // First round sees the initial data
    to_worker
        .send(ui.export_query(query, HandoverPolicy::Copy).unwrap())
        .unwrap();
    let view = ui.import_view(ui_inbox.recv().unwrap()).unwrap();
    assert_eq!(view_names(&ui, view), vec!["Ann"]);

    // A writer on its own thread adds Cy
    let writer_db = db.clone();
    thread::spawn(move || {
        let mut writer = writer_db.session();
        add_person(&mut writer, "Cy", 35);
    })
    .join()
    .unwrap();

    // Second round, exported from the old snapshot, sees the new row
    to_worker
        .send(ui.export_query(query, HandoverPolicy::Move).unwrap())
        .unwrap();
    let view = ui.import_view(ui_inbox.recv().unwrap()).unwrap();
    assert_eq!(view_names(&ui, view), vec!["Ann", "Cy"]);

    drop(to_worker);
    worker.join().unwrap();
    assert_eq!(db.metrics().pending_handovers, 0);
}

#[test]
fn test_many_workers_share_one_export_version() {
    let db = create_db();
    let mut ui = db.session();
    let people = create_people(&mut ui, &[("Ann", 30), ("Bo", 25), ("Cy", 35)]);
    let query = older_than(&mut ui, people, 26);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let envelope = ui.export_query(query, HandoverPolicy::Copy).unwrap();
            let db = db.clone();
            thread::spawn(move || {
                let mut session = db.session();
                session.count_with_handover(envelope, 0, -1, -1).unwrap()
            })
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().unwrap(), 2);
    }
}

#[test]
fn test_link_lists_follow_rows() {
    let db = create_db();
    let mut s = db.session();
    s.begin_write().unwrap();
    let people = s.add_table("people").unwrap();
    s.add_column(people, ColumnType::String, "name", false).unwrap();
    let friends = s
        .add_link_column(people, ColumnType::LinkList, "friends", people)
        .unwrap() as i64;
    let best = s
        .add_link_column(people, ColumnType::Link, "best", people)
        .unwrap() as i64;
    for name in ["Ann", "Bo", "Cy"] {
        let row = s.add_empty_row(people).unwrap() as i64;
        s.set_string(people, NAME, row, name).unwrap();
    }
    let list = s.get_link_list(people, friends, 0).unwrap();
    s.link_list_add(list, 1).unwrap();
    s.link_list_add(list, 2).unwrap();
    s.set_link(people, best, 0, 2).unwrap();
    s.commit_and_continue_as_read().unwrap();

    assert_eq!(s.link_list_size(list).unwrap(), 2);
    assert_eq!(s.link_list_target(list, 1).unwrap(), 2);
    assert_eq!(s.get_link(people, best, 0).unwrap(), Some(2));

    s.promote_to_write().unwrap();
    s.remove_row(people, 2).unwrap();
    s.commit_and_continue_as_read().unwrap();

    assert_eq!(s.get_link(people, best, 0).unwrap(), None);
    assert_eq!(s.link_list_size(list).unwrap(), 1);
    assert_eq!(s.link_list_target(list, 0).unwrap(), 1);

    let err = s.link_list_target(list, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfBounds);
}
