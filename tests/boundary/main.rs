//! Boundary Test Suite
//!
//! Exercises the per-thread entry points the way a managed runtime drives
//! them: every call either succeeds or fails with exactly one translated
//! error, and a call rejected by validation never reaches the engine.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test boundary
//! cargo test --test boundary validation::
//! ```

#[path = "../common/mod.rs"]
mod common;

pub use baton::prelude::*;
pub use common::*;

mod config;
mod detached;
mod translator;
mod validation;
