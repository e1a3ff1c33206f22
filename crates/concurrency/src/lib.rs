//! Concurrency layer for baton
//!
//! This crate implements the per-thread side of the store:
//! - TransactionContext: Idle / ReadPinned / WritePending lifecycle
//! - AdvanceReport: tables removed or reshaped while a reader moved forward
//! - Handover: export of snapshot-bound objects into single-use envelopes
//!   and their import into another context

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod handover;

pub use context::{AdvanceReport, TransactionContext, TransactionState};
pub use handover::{
    check_envelope, export, import, sync_to_version, Handover, HandoverEnvelope,
    HandoverPayload, RowLocator, Source,
};
