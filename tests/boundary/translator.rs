//! Error Translation Tests
//!
//! Every failure surfaces as one `ApiError` with a stable kind, a precise
//! code and the caller-facing message.

use crate::*;

#[test]
fn test_reading_compacted_version_is_bad_version() {
    let db = create_db_with_retention(1);
    let mut s = db.session();
    create_people(&mut s, &[("Ann", 30)]);
    let first = s.version().unwrap();
    add_person(&mut s, "Bo", 25);
    add_person(&mut s, "Cy", 35);

    let err = s.begin_read_at(first).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadVersion);
    assert!(Error::from(err).is_bad_version());
    assert!(db.metrics().versions_dropped > 0);
    assert!(!s.is_in_transaction());
}

#[test]
fn test_state_machine_violation() {
    let db = create_db();
    let mut s = db.session();
    s.begin_read().unwrap();

    let err = s.begin_write().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(err.error_code(), "StateInvalid");
    assert_eq!(
        err.details().get("operation").map(String::as_str),
        Some("begin_write")
    );

    let err = s.commit().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert!(s.is_in_transaction());
}

#[test]
fn test_unsupported_aggregate() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);
    let query = s.where_table(people).unwrap();

    let err = s
        .query_aggregate(query, AggregateKind::Sum, NAME)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert_eq!(
        s.query_aggregate(query, AggregateKind::Sum, AGE).unwrap(),
        Value::Int(30)
    );
}

#[test]
fn test_predicate_type_mismatch_leaves_query_usable() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30), ("Bo", 25)]);
    let query = s.where_table(people).unwrap();

    let err = s
        .query_filter(query, Predicate::compare(AGE as usize, Condition::Equal, "thirty"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert_eq!(s.query_validate(query).unwrap(), None);
    assert_eq!(s.query_count(query, 0, -1, -1).unwrap(), 2);
}

#[test]
fn test_wire_rendering() {
    let db = create_db();
    let mut s = db.session();
    let people = create_people(&mut s, &[("Ann", 30)]);
    s.end_read().unwrap();

    let err = s.size(people).unwrap_err();
    let wire = err.to_wire_error();
    assert_eq!(wire.kind, "IllegalState");
    assert_eq!(wire.code, "Detached");
    assert_eq!(wire.details.get("subject").map(String::as_str), Some("Table"));

    let json = err.to_json();
    assert!(json.contains("\"kind\":\"IllegalState\""));
    assert!(json.contains("Table is no longer valid to operate on."));
}

#[test]
fn test_facade_error_wraps_api_error() {
    fn size_after_end(db: &Baton) -> baton::Result<usize> {
        let mut s = db.session();
        let people = create_people(&mut s, &[("Ann", 30)]);
        s.end_read()?;
        Ok(s.size(people)?)
    }

    let db = create_db();
    let err = size_after_end(&db).unwrap_err();
    assert!(err.is_detached());
    assert_eq!(err.kind(), Some(ErrorKind::IllegalState));
    assert!(!err.is_serious());
    assert_eq!(
        err.to_string(),
        "IllegalState [Detached]: Table is no longer valid to operate on."
    );
}
