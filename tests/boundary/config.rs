//! Configuration Tests
//!
//! Settings are explicit, loaded from TOML or built in code, and reach the
//! sessions opened on the database.

use crate::*;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_open_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
durability = "mem_only"
trace_level = "detail"
history_retention = 4
write_timeout_ms = 250
"#
    )
    .unwrap();

    let db = Baton::from_config_file(file.path()).unwrap();
    let config = db.config();
    assert_eq!(config.durability, Durability::MemOnly);
    assert_eq!(config.trace_level, TraceLevel::Detail);
    assert_eq!(config.history_retention, 4);
    assert_eq!(config.write_timeout(), Some(Duration::from_millis(250)));

    let mut s = db.session();
    s.begin_read().unwrap();
    s.end_read().unwrap();
}

#[test]
fn test_missing_config_file_is_file_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Baton::from_config_file(dir.path().join("absent.toml")).unwrap_err();
    assert_eq!(
        err.kind(),
        Some(ErrorKind::FileError(baton::FileErrorKind::NotFound))
    );
}

#[test]
fn test_malformed_config_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("baton.toml");
    std::fs::write(&path, "history_retention = \"many\"").unwrap();

    let err = Baton::from_config_file(&path).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(err.kind(), None);
}

#[test]
fn test_config_round_trips_through_toml() {
    let dir = tempfile::tempdir().unwrap();
    let config = BoundaryConfig::in_memory()
        .with_path(dir.path().join("store.baton"))
        .with_history_retention(8)
        .with_trace_level(TraceLevel::Enter);
    let path = dir.path().join("baton.toml");
    std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

    let db = Baton::from_config_file(&path).unwrap();
    assert_eq!(db.config(), &config);
}

#[test]
fn test_encryption_key_length_checked() {
    let err = Baton::builder()
        .mem_only()
        .encryption_key(vec![7u8; 63])
        .open()
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::IllegalArgument));

    let db = Baton::builder()
        .mem_only()
        .encryption_key(vec![7u8; 64])
        .open()
        .unwrap();
    assert_eq!(db.config().encryption_key.as_ref().map(Vec::len), Some(64));
}

#[test]
fn test_path_is_kept_opaque() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never-created.baton");
    let db = Baton::open(&path).unwrap();
    assert_eq!(db.config().path.as_deref(), Some(path.as_path()));
    assert_eq!(db.config().durability, Durability::Full);
    assert!(!path.exists());
}

#[test]
fn test_databases_are_independent() {
    let a = create_db();
    let b = create_db();
    assert_ne!(a.id(), b.id());
    assert_eq!(a.clone().id(), a.id());
}

#[test]
fn test_every_trace_level_runs() {
    init_tracing();
    for level in [
        TraceLevel::Errors,
        TraceLevel::Enter,
        TraceLevel::Detail,
        TraceLevel::Leave,
    ] {
        let db = Baton::builder().mem_only().trace_level(level).open().unwrap();
        let mut s = db.session();
        let people = create_people(&mut s, &[("Ann", 30)]);
        assert!(s.get_int(people, 5, 0).is_err());
        assert_eq!(s.get_int(people, AGE, 0).unwrap(), Some(30));
        s.advance_read().unwrap();
    }
}
