//! Shared database object
//!
//! A [`Database`] owns the shared store and the registry of in-flight
//! handover envelopes. It is `Send + Sync` and shared behind `Arc`; each
//! thread opens its own [`Session`](crate::session::Session) on it.
//!
//! Envelopes live in the database rather than a session because they travel
//! between threads: one session registers an envelope, another takes it.

use crate::handles::Arena;
use crate::session::Session;
use baton_concurrency::HandoverEnvelope;
use baton_core::{BoundaryConfig, Error, HandleKind, Result, StoreId};
use baton_storage::{EngineStats, SharedStore};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Shared store plus the envelope registry
#[derive(Debug)]
pub struct Database {
    store: Arc<SharedStore>,
    envelopes: Mutex<Arena<HandoverEnvelope>>,
}

impl Database {
    /// Open a database with `config`
    pub fn open(config: BoundaryConfig) -> Result<Arc<Self>> {
        let store = Arc::new(SharedStore::open(config)?);
        info!(
            store = %store.id(),
            durability = ?store.config().durability,
            retention = store.config().history_retention,
            "Opened database"
        );
        Ok(Arc::new(Self {
            store,
            envelopes: Mutex::new(Arena::new(HandleKind::Envelope)),
        }))
    }

    /// Open a session for the calling thread
    pub fn session(self: &Arc<Self>) -> Session {
        Session::new(Arc::clone(self))
    }

    /// Store identity
    pub fn id(&self) -> StoreId {
        self.store.id()
    }

    /// Configuration the database was opened with
    pub fn config(&self) -> &BoundaryConfig {
        self.store.config()
    }

    /// Engine counters
    pub fn stats(&self) -> &EngineStats {
        self.store.stats()
    }

    /// The shared store
    pub fn store(&self) -> &Arc<SharedStore> {
        &self.store
    }

    /// Number of envelopes exported but not yet imported or closed
    pub fn pending_envelopes(&self) -> usize {
        self.envelopes.lock().len()
    }

    pub(crate) fn register_envelope(&self, envelope: HandoverEnvelope) -> u64 {
        self.envelopes.lock().insert(envelope)
    }

    pub(crate) fn take_envelope(&self, raw: u64) -> Result<HandoverEnvelope> {
        self.envelopes.lock().remove(raw)
    }

    /// Take an envelope only if it passes `check`; otherwise leave it registered
    pub(crate) fn take_envelope_checked(
        &self,
        raw: u64,
        check: impl FnOnce(&HandoverEnvelope) -> Result<()>,
    ) -> Result<HandoverEnvelope> {
        let mut envelopes = self.envelopes.lock();
        check(envelopes.get(raw)?)?;
        envelopes.remove(raw)
    }

    /// Take several envelopes, or none of them if any handle is invalid
    pub(crate) fn take_envelopes(&self, raws: &[u64]) -> Result<Vec<HandoverEnvelope>> {
        let mut envelopes = self.envelopes.lock();
        let mut seen = BTreeSet::new();
        for &raw in raws {
            envelopes.check(raw)?;
            if !seen.insert(raw) {
                return Err(Error::illegal_argument(format!(
                    "Handover {:#x} appears more than once",
                    raw
                )));
            }
        }
        raws.iter().map(|&raw| envelopes.remove(raw)).collect()
    }
}
