//! Argument validation for boundary entry points
//!
//! Checks run in a fixed order so the first failure reported is always the
//! same for the same bad input:
//!
//! 1. handle is attached ([`validate_attached`])
//! 2. column index in `[0, column_count)`
//! 3. row index in `[0, size)`, or `[0, size]` for inserts
//! 4. column type matches, resolving Mixed cells when allowed
//!
//! [`Access`] bundles steps 2-4 for one table. Nothing in this module
//! touches the engine; a rejected call never reaches it.

use crate::accessor::Attached;
use baton_concurrency::TransactionContext;
use baton_core::{ColumnType, Error, Result, Value};
use baton_storage::{Group, RowRange, Table};

/// Check that `accessor` is still live in `context` and return its table
pub fn validate_attached<'c, A: Attached>(
    accessor: &A,
    context: &'c TransactionContext,
) -> Result<&'c Table> {
    accessor.resolve(context)
}

/// Check a column index
pub fn validate_column(table: &Table, index: i64) -> Result<usize> {
    let count = table.column_count();
    if index < 0 || index as u64 >= count as u64 {
        return Err(Error::ColumnOutOfRange { index, count });
    }
    Ok(index as usize)
}

/// Check a row index; `allow_end` also accepts `size` (insert position)
pub fn validate_row(table: &Table, index: i64, allow_end: bool) -> Result<usize> {
    let size = table.size();
    let past_end = if allow_end {
        index as u64 > size as u64
    } else {
        index as u64 >= size as u64
    };
    if index < 0 || past_end {
        return Err(Error::RowOutOfRange {
            index,
            size,
            allow_end,
        });
    }
    Ok(index as usize)
}

/// Check the declared type of `column`
///
/// With `allow_mixed`, a Mixed column passes when the cell at `row` holds a
/// value of the expected type.
pub fn validate_type(
    table: &Table,
    column: usize,
    row: Option<usize>,
    expected: ColumnType,
    allow_mixed: bool,
) -> Result<()> {
    let declared = table.column_type(column)?;
    if declared == expected {
        return Ok(());
    }
    if declared == ColumnType::Mixed && allow_mixed {
        if let Some(row) = row {
            let runtime = table.mixed_type(column, row)?;
            if runtime == Some(expected) {
                return Ok(());
            }
            let actual = match runtime {
                Some(t) => format!("Mixed({})", t),
                None => "Mixed(Null)".to_string(),
            };
            return Err(Error::TypeMismatch {
                column,
                expected,
                actual,
            });
        }
    }
    Err(Error::TypeMismatch {
        column,
        expected,
        actual: declared.name().to_string(),
    })
}

/// Check a start/end/limit triple against a table of `size` rows
///
/// `end == -1` means the table size, `limit == -1` means no limit.
pub fn validate_range(size: usize, start: i64, end: i64, limit: i64) -> Result<RowRange> {
    if start < 0 {
        return Err(Error::InvalidRange("startIndex < 0.".into()));
    }
    if start as u64 > size as u64 {
        return Err(Error::InvalidRange("startIndex > available rows.".into()));
    }
    let resolved_end = match end {
        -1 => size,
        e if e < -1 => return Err(Error::InvalidRange("endIndex < 0.".into())),
        e if e as u64 > size as u64 => {
            return Err(Error::InvalidRange("endIndex > available rows.".into()))
        }
        e => e as usize,
    };
    if start as usize > resolved_end {
        return Err(Error::InvalidRange("startIndex > endIndex.".into()));
    }
    let limit = match limit {
        -1 => None,
        l if l < -1 => return Err(Error::InvalidRange("limit < 0.".into())),
        l => Some(l as usize),
    };
    Ok(RowRange::new(start as usize, Some(resolved_end), limit))
}

/// Check that `column` holds links (Link or LinkList)
pub fn validate_link_like(table: &Table, column: usize) -> Result<()> {
    let declared = table.column_type(column)?;
    if !declared.is_link_like() {
        return Err(Error::TypeMismatch {
            column,
            expected: ColumnType::Link,
            actual: declared.name().to_string(),
        });
    }
    Ok(())
}

/// Check that `column` may hold null
pub fn validate_nullable(table: &Table, column: usize) -> Result<()> {
    let descriptor = table.column(column)?;
    match descriptor.column_type {
        ColumnType::Link => Ok(()),
        ColumnType::LinkList => Err(Error::illegal_argument("LinkList is not nullable.")),
        _ if descriptor.nullable => Ok(()),
        _ => Err(Error::illegal_argument("This field is not nullable.")),
    }
}

/// Check that `value` may be stored in `column`
pub fn validate_value(table: &Table, column: usize, value: &Value) -> Result<()> {
    if value.is_null() {
        return validate_nullable(table, column);
    }
    let declared = table.column_type(column)?;
    if !value.fits(declared) {
        return Err(Error::TypeMismatch {
            column,
            expected: declared,
            actual: value.type_name().to_string(),
        });
    }
    Ok(())
}

/// Check `target_row` against the table that link `column` points at
pub fn validate_link_target(group: &Group, table: &Table, column: usize, target_row: i64) -> Result<usize> {
    validate_link_like(table, column)?;
    let target = table
        .column(column)?
        .link_target
        .ok_or_else(|| Error::internal("link column without a target table"))?;
    let target = group
        .table(target)
        .ok_or_else(|| Error::illegal_argument("The link target table has been removed."))?;
    validate_row(target, target_row, false)
}

/// Check that `context` has a write transaction open
pub fn validate_writable(context: &TransactionContext) -> Result<()> {
    context.require_writable()
}

#[derive(Debug, Clone, Copy)]
enum RowCheck {
    Existing(i64),
    Insert(i64),
}

/// Column, row and type checks for one table, always applied in that order
#[derive(Debug, Clone, Copy)]
pub struct Access<'t> {
    table: &'t Table,
    column: Option<i64>,
    row: Option<RowCheck>,
    expected: Option<(ColumnType, bool)>,
}

/// Indices that passed an [`Access`] check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checked {
    column: Option<usize>,
    row: Option<usize>,
}

impl Checked {
    /// The checked column index
    pub fn column(&self) -> Result<usize> {
        self.column
            .ok_or_else(|| Error::internal("access check did not include a column"))
    }

    /// The checked row index
    pub fn row(&self) -> Result<usize> {
        self.row
            .ok_or_else(|| Error::internal("access check did not include a row"))
    }
}

impl<'t> Access<'t> {
    /// Start a check against `table`
    pub fn new(table: &'t Table) -> Self {
        Self {
            table,
            column: None,
            row: None,
            expected: None,
        }
    }

    /// Check a column index
    pub fn column(mut self, index: i64) -> Self {
        self.column = Some(index);
        self
    }

    /// Check an existing row index
    pub fn row(mut self, index: i64) -> Self {
        self.row = Some(RowCheck::Existing(index));
        self
    }

    /// Check an insert position
    pub fn insert_at(mut self, index: i64) -> Self {
        self.row = Some(RowCheck::Insert(index));
        self
    }

    /// Require the column to have type `expected`
    pub fn expect(mut self, expected: ColumnType) -> Self {
        self.expected = Some((expected, false));
        self
    }

    /// Require `expected`, also accepting a Mixed cell holding it
    pub fn expect_resolving_mixed(mut self, expected: ColumnType) -> Self {
        self.expected = Some((expected, true));
        self
    }

    /// Run the checks
    pub fn check(self) -> Result<Checked> {
        let column = self
            .column
            .map(|index| validate_column(self.table, index))
            .transpose()?;
        let row = match self.row {
            Some(RowCheck::Existing(index)) => Some(validate_row(self.table, index, false)?),
            Some(RowCheck::Insert(index)) => Some(validate_row(self.table, index, true)?),
            None => None,
        };
        if let (Some((expected, allow_mixed)), Some(column)) = (self.expected, column) {
            validate_type(self.table, column, row, expected, allow_mixed)?;
        }
        Ok(Checked { column, row })
    }
}
