//! Per-commit change log entries
//!
//! Each commit records which tables it removed, which tables it reshaped and
//! which tables it otherwise touched. Advancing a read transaction replays
//! these entries to find out whether objects bound to the old snapshot are
//! still valid in the new one.

use crate::group::Group;
use baton_core::{TableKey, VersionId};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Changes introduced by the commit that produced `version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changeset {
    /// Version produced by the commit
    pub version: VersionId,
    /// Tables that existed before and not after
    pub removed_tables: Vec<TableKey>,
    /// Tables whose schema epoch changed
    pub schema_changed: Vec<TableKey>,
    /// Tables whose rows changed but whose schema did not
    pub modified_tables: Vec<TableKey>,
    /// Tables created by the commit
    pub added_tables: Vec<TableKey>,
}

impl Changeset {
    /// Diff the group a writer started from against the group it commits
    pub fn between(version: VersionId, base: &Group, next: &Group) -> Self {
        let mut changes = Changeset {
            version,
            removed_tables: Vec::new(),
            schema_changed: Vec::new(),
            modified_tables: Vec::new(),
            added_tables: Vec::new(),
        };
        for key in base.table_keys() {
            let (Some(before), Some(after)) = (base.table_arc(key), next.table_arc(key)) else {
                changes.removed_tables.push(key);
                continue;
            };
            if before.schema_epoch() != after.schema_epoch() {
                changes.schema_changed.push(key);
            } else if !Arc::ptr_eq(before, after) {
                changes.modified_tables.push(key);
            }
        }
        changes.added_tables = next
            .table_keys()
            .filter(|key| base.table(*key).is_none())
            .collect();
        changes
    }

    /// Whether the commit changed nothing
    pub fn is_empty(&self) -> bool {
        self.removed_tables.is_empty()
            && self.schema_changed.is_empty()
            && self.modified_tables.is_empty()
            && self.added_tables.is_empty()
    }
}

/// Summary of several consecutive changesets
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSummary {
    /// Tables removed anywhere in the interval
    pub removed_tables: BTreeSet<TableKey>,
    /// Tables reshaped anywhere in the interval
    pub schema_changed: BTreeSet<TableKey>,
}

impl ChangeSummary {
    /// Fold changesets, oldest first
    pub fn collect<'a>(changes: impl IntoIterator<Item = &'a Changeset>) -> Self {
        let mut summary = ChangeSummary::default();
        for change in changes {
            summary.removed_tables.extend(change.removed_tables.iter().copied());
            summary.schema_changed.extend(change.schema_changed.iter().copied());
        }
        summary
    }

    /// Whether `table` was removed or reshaped
    pub fn invalidates(&self, table: TableKey) -> bool {
        self.removed_tables.contains(&table) || self.schema_changed.contains(&table)
    }
}
