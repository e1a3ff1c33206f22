//! Session-side objects named by handles
//!
//! Each accessor records the context epoch it was created in, plus whatever
//! it needs to find its target again in the context's current snapshot.
//! An accessor is attached only while the context is still in the same
//! transaction lifecycle and its target still exists with the same schema.

use baton_concurrency::{RowLocator, TransactionContext};
use baton_core::{Error, Result, TableKey};
use baton_storage::{Query, Table, TableView};

/// Something that can detach from the snapshot it was created against
pub trait Attached {
    /// Subject used in `Detached` errors
    const SUBJECT: &'static str;

    /// Context epoch the accessor was created in
    fn context_epoch(&self) -> u64;

    /// Table the accessor reads
    fn table_key(&self) -> TableKey;

    /// Extra checks against the live table
    fn matches(&self, table: &Table) -> bool;

    /// Resolve the accessor's table in `context`, or fail with `Detached`
    fn resolve<'c>(&self, context: &'c TransactionContext) -> Result<&'c Table> {
        if !context.is_in_transaction() || context.epoch() != self.context_epoch() {
            return Err(Error::detached(Self::SUBJECT));
        }
        let group = context.group()?;
        match group.table(self.table_key()) {
            Some(table) if self.matches(table) => Ok(table),
            _ => Err(Error::detached(Self::SUBJECT)),
        }
    }

    /// Whether [`Attached::resolve`] would succeed
    fn is_attached(&self, context: &TransactionContext) -> bool {
        self.resolve(context).is_ok()
    }
}

/// A table
#[derive(Debug, Clone)]
pub struct TableAccessor {
    pub(crate) key: TableKey,
    pub(crate) context_epoch: u64,
}

impl Attached for TableAccessor {
    const SUBJECT: &'static str = "Table";

    fn context_epoch(&self) -> u64 {
        self.context_epoch
    }

    fn table_key(&self) -> TableKey {
        self.key
    }

    fn matches(&self, _table: &Table) -> bool {
        true
    }
}

/// One row
#[derive(Debug, Clone)]
pub struct RowAccessor {
    pub(crate) locator: RowLocator,
    pub(crate) context_epoch: u64,
}

impl Attached for RowAccessor {
    const SUBJECT: &'static str = "Row";

    fn context_epoch(&self) -> u64 {
        self.context_epoch
    }

    fn table_key(&self) -> TableKey {
        self.locator.table
    }

    fn matches(&self, table: &Table) -> bool {
        self.locator.index_in(table).is_some()
    }
}

/// A query under construction or ready to run
#[derive(Debug, Clone)]
pub struct QueryAccessor {
    pub(crate) query: Query,
    pub(crate) context_epoch: u64,
}

impl Attached for QueryAccessor {
    const SUBJECT: &'static str = "Query";

    fn context_epoch(&self) -> u64 {
        self.context_epoch
    }

    fn table_key(&self) -> TableKey {
        self.query.table()
    }

    fn matches(&self, table: &Table) -> bool {
        table.schema_epoch() == self.query.schema_epoch()
    }
}

/// A result view
#[derive(Debug, Clone)]
pub struct ViewAccessor {
    pub(crate) view: TableView,
    pub(crate) context_epoch: u64,
}

impl Attached for ViewAccessor {
    const SUBJECT: &'static str = "TableView";

    fn context_epoch(&self) -> u64 {
        self.context_epoch
    }

    fn table_key(&self) -> TableKey {
        self.view.table()
    }

    fn matches(&self, table: &Table) -> bool {
        self.view.is_attached(table)
    }
}

/// The LinkList cell of one row
#[derive(Debug, Clone)]
pub struct LinkListAccessor {
    pub(crate) locator: RowLocator,
    pub(crate) column: usize,
    pub(crate) context_epoch: u64,
}

impl Attached for LinkListAccessor {
    const SUBJECT: &'static str = "LinkList";

    fn context_epoch(&self) -> u64 {
        self.context_epoch
    }

    fn table_key(&self) -> TableKey {
        self.locator.table
    }

    fn matches(&self, table: &Table) -> bool {
        self.locator.index_in(table).is_some()
    }
}
