//! Snapshot of all tables at one version
//!
//! A [`Group`] is cheap to clone: tables are shared behind `Arc` and copied
//! on first write (`Arc::make_mut`). Committed groups are immutable; a write
//! transaction mutates its own clone of the latest group.

use crate::table::Table;
use baton_core::{ColumnType, Error, Result, TableKey, Value};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// All tables of one snapshot
#[derive(Debug, Clone, Default)]
pub struct Group {
    tables: BTreeMap<TableKey, Arc<Table>>,
    names: FxHashMap<String, TableKey>,
    next_key: u64,
}

impl Group {
    /// Create an empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tables
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Keys of all tables, in creation order
    pub fn table_keys(&self) -> impl Iterator<Item = TableKey> + '_ {
        self.tables.keys().copied()
    }

    /// Check if a table with this name exists
    pub fn has_table(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Key of the table with this name
    pub fn table_key(&self, name: &str) -> Option<TableKey> {
        self.names.get(name).copied()
    }

    /// Table by key
    pub fn table(&self, key: TableKey) -> Option<&Table> {
        self.tables.get(&key).map(|t| t.as_ref())
    }

    /// Shared table by key; used to tell modified tables apart by pointer
    pub(crate) fn table_arc(&self, key: TableKey) -> Option<&Arc<Table>> {
        self.tables.get(&key)
    }

    /// Table by key, failing with `Detached` when it no longer exists
    pub fn require_table(&self, key: TableKey) -> Result<&Table> {
        self.table(key).ok_or(Error::detached("Table"))
    }

    /// Mutable table by key; copies the table if it is shared
    pub fn table_mut(&mut self, key: TableKey) -> Result<&mut Table> {
        self.tables
            .get_mut(&key)
            .map(Arc::make_mut)
            .ok_or(Error::detached("Table"))
    }

    /// Create a new table
    pub fn add_table(&mut self, name: &str) -> Result<TableKey> {
        if name.is_empty() {
            return Err(Error::illegal_argument("Table name must not be empty"));
        }
        if self.has_table(name) {
            return Err(Error::illegal_argument(format!(
                "Table '{}' already exists",
                name
            )));
        }
        self.next_key += 1;
        let key = TableKey(self.next_key);
        self.tables.insert(key, Arc::new(Table::new(key, name)));
        self.names.insert(name.to_string(), key);
        Ok(key)
    }

    /// Remove a table
    ///
    /// A table that is the target of another table's link column cannot be
    /// removed.
    pub fn remove_table(&mut self, key: TableKey) -> Result<()> {
        let name = self.require_table(key)?.name().to_string();
        if let Some(origin) = self
            .tables
            .values()
            .find(|t| t.key() != key && t.links_to(key))
        {
            return Err(Error::illegal_argument(format!(
                "Table '{}' is the target of a link column in '{}'",
                name,
                origin.name()
            )));
        }
        self.tables.remove(&key);
        self.names.remove(&name);
        Ok(())
    }

    fn link_origins(&self, target: TableKey) -> Vec<TableKey> {
        self.tables
            .values()
            .filter(|t| t.links_to(target))
            .map(|t| t.key())
            .collect()
    }

    /// Remove a row and repair every link that pointed into the table
    pub fn remove_row(&mut self, key: TableKey, row: usize) -> Result<()> {
        self.table_mut(key)?.remove_row(row)?;
        for origin in self.link_origins(key) {
            self.table_mut(origin)?.repair_links_after_remove(key, row);
        }
        Ok(())
    }

    /// Remove all rows and nullify every link that pointed into the table
    pub fn clear_table(&mut self, key: TableKey) -> Result<()> {
        self.table_mut(key)?.clear();
        for origin in self.link_origins(key) {
            self.table_mut(origin)?.repair_links_after_clear(key);
        }
        Ok(())
    }

    fn link_target(&self, key: TableKey, column: usize, expected: ColumnType) -> Result<TableKey> {
        let descriptor = self.require_table(key)?.column(column)?;
        if descriptor.column_type != expected {
            return Err(Error::TypeMismatch {
                column,
                expected,
                actual: descriptor.column_type.name().to_string(),
            });
        }
        descriptor
            .link_target
            .ok_or_else(|| Error::internal("link column without target"))
    }

    fn check_target_row(&self, target: TableKey, row: usize) -> Result<()> {
        let size = self.require_table(target)?.size();
        if row >= size {
            return Err(Error::RowOutOfRange {
                index: row as i64,
                size,
                allow_end: false,
            });
        }
        Ok(())
    }

    /// Point a Link cell at a row of its target table
    pub fn set_link(&mut self, key: TableKey, column: usize, row: usize, target_row: usize) -> Result<()> {
        let target = self.link_target(key, column, ColumnType::Link)?;
        self.check_target_row(target, target_row)?;
        self.table_mut(key)?.set(column, row, Value::Link(target_row))
    }

    /// Append a target row to a LinkList cell
    pub fn link_list_add(&mut self, key: TableKey, column: usize, row: usize, target_row: usize) -> Result<()> {
        let target = self.link_target(key, column, ColumnType::LinkList)?;
        self.check_target_row(target, target_row)?;
        self.table_mut(key)?.link_list_mut(column, row)?.push(target_row);
        Ok(())
    }

    /// Remove the entry at `position` from a LinkList cell
    pub fn link_list_remove(&mut self, key: TableKey, column: usize, row: usize, position: usize) -> Result<()> {
        let targets = self.table_mut(key)?.link_list_mut(column, row)?;
        if position >= targets.len() {
            return Err(Error::RowOutOfRange {
                index: position as i64,
                size: targets.len(),
                allow_end: false,
            });
        }
        targets.remove(position);
        Ok(())
    }

    /// Remove every entry of a LinkList cell
    pub fn link_list_clear(&mut self, key: TableKey, column: usize, row: usize) -> Result<()> {
        self.table_mut(key)?.link_list_mut(column, row)?.clear();
        Ok(())
    }
}
