//! Handover Test Suite
//!
//! Objects bound to one session's snapshot move to another session through
//! envelopes, and exported queries run on worker sessions against a newer
//! snapshot than the one they were built on.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test handover
//! cargo test --test handover batch::
//! ```

#[path = "../common/mod.rs"]
mod common;

pub use baton::prelude::*;
pub use common::*;

use std::thread;

mod batch;
mod compaction;
mod roundtrip;
mod scenarios;

/// Run `body` with a fresh session on another thread and return its result
pub fn on_worker<T, F>(db: &Baton, body: F) -> T
where
    T: Send + 'static,
    F: FnOnce(&mut Session) -> T + Send + 'static,
{
    let db = db.clone();
    thread::spawn(move || {
        let mut session = db.session();
        body(&mut session)
    })
    .join()
    .expect("worker thread panicked")
}
