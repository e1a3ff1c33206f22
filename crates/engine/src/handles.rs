//! Generation-checked handle arena
//!
//! Every object handed across the boundary lives in an [`Arena`] slot and is
//! named by a [`Handle`]: kind, slot and the slot's generation when the
//! object was stored. Removing an object bumps the slot's generation, so a
//! stale handle is always recognized and never reaches a recycled object.
//!
//! Freed slots are reused oldest-first, which keeps a just-retired handle
//! distinguishable for as long as possible.

use baton_core::{Error, Handle, HandleKind, Result};
use std::collections::VecDeque;

#[derive(Debug)]
struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage for one kind of object
#[derive(Debug)]
pub struct Arena<T> {
    kind: HandleKind,
    entries: Vec<Entry<T>>,
    free: VecDeque<u32>,
    live: usize,
}

impl<T> Arena<T> {
    /// Create an empty arena for objects of `kind`
    pub fn new(kind: HandleKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            free: VecDeque::new(),
            live: 0,
        }
    }

    /// Kind of object stored
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if no object is live
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Store an object and return its raw handle
    pub fn insert(&mut self, value: T) -> u64 {
        let handle = match self.free.pop_front() {
            Some(slot) => {
                let entry = &mut self.entries[slot as usize];
                entry.value = Some(value);
                Handle::new(self.kind, slot, entry.generation)
            }
            None => {
                let slot = self.entries.len() as u32;
                self.entries.push(Entry {
                    generation: 1,
                    value: Some(value),
                });
                Handle::new(self.kind, slot, 1)
            }
        };
        self.live += 1;
        handle.to_raw()
    }

    fn decode(&self, raw: u64) -> Result<Handle> {
        let handle = Handle::from_raw(raw)
            .ok_or_else(|| Error::illegal_argument(format!("{:#x} is not a valid handle", raw)))?;
        if handle.kind() != self.kind {
            return Err(Error::WrongHandleKind {
                raw,
                expected: self.kind,
            });
        }
        Ok(handle)
    }

    fn stale(&self, handle: Handle) -> Error {
        match self.kind {
            HandleKind::Envelope => Error::AlreadyConsumed {
                handle: handle.to_string(),
            },
            kind => Error::detached(kind.name()),
        }
    }

    fn locate(&self, raw: u64) -> Result<(Handle, usize)> {
        let handle = self.decode(raw)?;
        let index = handle.slot() as usize;
        match self.entries.get(index) {
            Some(entry) if entry.generation == handle.generation() && entry.value.is_some() => {
                Ok((handle, index))
            }
            _ => Err(self.stale(handle)),
        }
    }

    /// Whether `raw` names a live object of this arena
    pub fn contains(&self, raw: u64) -> bool {
        self.locate(raw).is_ok()
    }

    /// Check `raw` names a live object, without borrowing it
    pub fn check(&self, raw: u64) -> Result<()> {
        self.locate(raw).map(|_| ())
    }

    /// Borrow the object named by `raw`
    pub fn get(&self, raw: u64) -> Result<&T> {
        let (handle, index) = self.locate(raw)?;
        self.entries[index]
            .value
            .as_ref()
            .ok_or_else(|| self.stale(handle))
    }

    /// Mutably borrow the object named by `raw`
    pub fn get_mut(&mut self, raw: u64) -> Result<&mut T> {
        let (handle, index) = self.locate(raw)?;
        let stale = self.stale(handle);
        self.entries[index].value.as_mut().ok_or(stale)
    }

    /// Remove the object named by `raw`; the handle becomes stale
    pub fn remove(&mut self, raw: u64) -> Result<T> {
        let (handle, index) = self.locate(raw)?;
        let entry = &mut self.entries[index];
        let value = entry.value.take().ok_or_else(|| Error::internal("slot emptied while located"))?;
        entry.generation = (entry.generation + 1) & Handle::GENERATION_MASK;
        if entry.generation == 0 {
            entry.generation = 1;
        }
        self.free.push_back(handle.slot());
        self.live -= 1;
        Ok(value)
    }

    /// Remove every object
    pub fn clear(&mut self) {
        for (slot, entry) in self.entries.iter_mut().enumerate() {
            if entry.value.take().is_some() {
                entry.generation = ((entry.generation + 1) & Handle::GENERATION_MASK).max(1);
                self.free.push_back(slot as u32);
            }
        }
        self.live = 0;
    }
}
