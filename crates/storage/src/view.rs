//! Result views
//!
//! A [`TableView`] is the materialized result of a query: an ordered list of
//! row indices into one table. It remembers where it came from (query and
//! range) and how it was shaped (sort keys, distinct column), so it can be
//! re-run against a newer snapshot with [`TableView::sync`].

use crate::query::{aggregate, Query, RowRange};
use crate::table::Table;
use baton_core::{AggregateKind, Error, Result, SortOrder, TableKey, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Ordered sort keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    keys: Vec<(usize, SortOrder)>,
}

impl SortDescriptor {
    /// Build and check sort keys against a table
    ///
    /// At least one key is required and every column must be of a sortable
    /// type.
    pub fn new(table: &Table, keys: Vec<(usize, SortOrder)>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::illegal_argument(
                "You must provide at least one field name.",
            ));
        }
        for &(column, _) in &keys {
            let column_type = table.column_type(column)?;
            if !column_type.is_sortable() {
                return Err(Error::illegal_argument(format!(
                    "Sort is not supported on binary data, object references and link lists (column {} is {})",
                    column, column_type
                )));
            }
        }
        Ok(Self { keys })
    }

    /// Single ascending or descending key
    pub fn single(table: &Table, column: usize, order: SortOrder) -> Result<Self> {
        Self::new(table, vec![(column, order)])
    }

    /// The sort keys
    pub fn keys(&self) -> &[(usize, SortOrder)] {
        &self.keys
    }

    fn compare(&self, table: &Table, a: usize, b: usize) -> Ordering {
        for &(column, order) in &self.keys {
            let (Ok(left), Ok(right)) = (table.get(column, a), table.get(column, b)) else {
                continue;
            };
            let ordering = match order {
                SortOrder::Ascending => left.sort_cmp(right),
                SortOrder::Descending => right.sort_cmp(left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Check that a distinct view can be built over `column`
pub fn check_distinct(table: &Table, column: usize) -> Result<()> {
    let column_type = table.column_type(column)?;
    if !column_type.supports_distinct() {
        return Err(Error::illegal_argument(format!(
            "Distinct is not supported on {} columns",
            column_type
        )));
    }
    Ok(())
}

/// Materialized query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableView {
    table: TableKey,
    schema_epoch: u64,
    rows: Vec<usize>,
    query: Query,
    range: RowRange,
    sort: Option<SortDescriptor>,
    distinct: Option<usize>,
}

impl TableView {
    /// Run `query` over `range` and keep the matching rows
    pub fn from_query(table: &Table, query: Query, range: RowRange) -> Result<Self> {
        let rows = query.find_all(table, range)?;
        Ok(Self {
            table: table.key(),
            schema_epoch: table.schema_epoch(),
            rows,
            query,
            range,
            sort: None,
            distinct: None,
        })
    }

    /// Table the rows belong to
    pub fn table(&self) -> TableKey {
        self.table
    }

    /// Schema epoch the view was built against
    pub fn schema_epoch(&self) -> u64 {
        self.schema_epoch
    }

    /// Source query
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Source range
    pub fn range(&self) -> RowRange {
        self.range
    }

    /// Active sort keys
    pub fn sort_descriptor(&self) -> Option<&SortDescriptor> {
        self.sort.as_ref()
    }

    /// Active distinct column
    pub fn distinct_column(&self) -> Option<usize> {
        self.distinct
    }

    /// Row indices in view order
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Number of rows
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Check if the view has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the view still matches the table's schema
    pub fn is_attached(&self, table: &Table) -> bool {
        table.key() == self.table && table.schema_epoch() == self.schema_epoch
    }

    fn check_attached(&self, table: &Table) -> Result<()> {
        if !self.is_attached(table) {
            return Err(Error::SchemaChanged {
                subject: "TableView",
                table: table.name().to_string(),
            });
        }
        Ok(())
    }

    /// Table row at view position `index`
    pub fn row_index(&self, index: usize) -> Result<usize> {
        self.rows.get(index).copied().ok_or(Error::RowOutOfRange {
            index: index as i64,
            size: self.rows.len(),
            allow_end: false,
        })
    }

    /// Cell at (column, view position)
    pub fn get<'a>(&self, table: &'a Table, column: usize, index: usize) -> Result<&'a Value> {
        self.check_attached(table)?;
        table.get(column, self.row_index(index)?)
    }

    /// Sort the view in place (stable)
    pub fn sort(&mut self, table: &Table, descriptor: SortDescriptor) -> Result<()> {
        self.check_attached(table)?;
        self.rows
            .sort_by(|&a, &b| descriptor.compare(table, a, b));
        self.sort = Some(descriptor);
        Ok(())
    }

    /// Keep only the first row for each distinct value of `column`
    pub fn distinct(&mut self, table: &Table, column: usize) -> Result<()> {
        self.check_attached(table)?;
        check_distinct(table, column)?;
        let mut seen: Vec<&Value> = Vec::new();
        let mut kept = Vec::with_capacity(self.rows.len());
        for &row in &self.rows {
            let value = table.get(column, row)?;
            if !seen.iter().any(|v| *v == value) {
                seen.push(value);
                kept.push(row);
            }
        }
        self.rows = kept;
        self.distinct = Some(column);
        Ok(())
    }

    /// Re-run the source query against `table` and reapply sort and distinct
    pub fn sync(&mut self, table: &Table) -> Result<()> {
        self.check_attached(table)?;
        self.rows = self.query.find_all(table, self.range)?;
        if let Some(descriptor) = self.sort.clone() {
            self.sort(table, descriptor)?;
        }
        if let Some(column) = self.distinct {
            self.distinct(table, column)?;
        }
        Ok(())
    }

    /// Aggregate a column over the view's rows
    pub fn aggregate(&self, table: &Table, kind: AggregateKind, column: usize) -> Result<Value> {
        self.check_attached(table)?;
        aggregate(table, self.rows.iter().copied(), kind, column)
    }

    /// Rebuild a view from frozen parts
    pub fn from_parts(
        table: TableKey,
        schema_epoch: u64,
        rows: Vec<usize>,
        query: Query,
        range: RowRange,
        sort: Option<SortDescriptor>,
        distinct: Option<usize>,
    ) -> Self {
        Self {
            table,
            schema_epoch,
            rows,
            query,
            range,
            sort,
            distinct,
        }
    }
}
