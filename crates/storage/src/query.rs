//! Predicate queries over one table
//!
//! A [`Query`] remembers the table and the schema epoch it was built
//! against; evaluating it against a table whose schema has since changed
//! fails instead of reading the wrong columns.

use crate::table::Table;
use baton_core::{AggregateKind, ColumnType, Error, Result, TableKey, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Comparison applied by a [`Predicate::Compare`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Cell equals the value
    Equal,
    /// Cell differs from the value
    NotEqual,
    /// Cell is greater than the value
    Greater,
    /// Cell is greater than or equal to the value
    GreaterEqual,
    /// Cell is less than the value
    Less,
    /// Cell is less than or equal to the value
    LessEqual,
    /// String cell starts with the value
    BeginsWith,
    /// String cell ends with the value
    EndsWith,
    /// String cell contains the value
    Contains,
    /// Cell is null
    IsNull,
    /// Cell is not null
    IsNotNull,
}

impl Condition {
    fn is_string_only(&self) -> bool {
        matches!(
            self,
            Condition::BeginsWith | Condition::EndsWith | Condition::Contains
        )
    }

    fn is_ordering(&self) -> bool {
        matches!(
            self,
            Condition::Greater | Condition::GreaterEqual | Condition::Less | Condition::LessEqual
        )
    }
}

/// Row filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every row
    All,
    /// Compares one column against a constant
    Compare {
        /// Column index
        column: usize,
        /// Comparison
        condition: Condition,
        /// Constant operand; ignored by IsNull / IsNotNull
        value: Value,
        /// Case sensitivity of string comparisons
        case_sensitive: bool,
    },
    /// All sub-predicates match
    And(Vec<Predicate>),
    /// At least one sub-predicate matches
    Or(Vec<Predicate>),
    /// The sub-predicate does not match
    Not(Box<Predicate>),
}

impl Predicate {
    /// Case-sensitive comparison of a column against a value
    pub fn compare(column: usize, condition: Condition, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            column,
            condition,
            value: value.into(),
            case_sensitive: true,
        }
    }

    fn columns(&self, out: &mut Vec<usize>) {
        match self {
            Predicate::All => {}
            Predicate::Compare { column, .. } => out.push(*column),
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().for_each(|p| p.columns(out))
            }
            Predicate::Not(inner) => inner.columns(out),
        }
    }

    fn validate(&self, table: &Table) -> Result<()> {
        match self {
            Predicate::All => Ok(()),
            Predicate::Compare {
                column,
                condition,
                value,
                ..
            } => {
                let column_type = table.column_type(*column)?;
                if matches!(condition, Condition::IsNull | Condition::IsNotNull) {
                    return Ok(());
                }
                if column_type.is_link_like() || column_type == ColumnType::Table {
                    return Err(Error::unsupported(format!(
                        "Queries on {} columns are not supported",
                        column_type
                    )));
                }
                if condition.is_string_only() && column_type != ColumnType::String {
                    return Err(Error::TypeMismatch {
                        column: *column,
                        expected: ColumnType::String,
                        actual: column_type.name().to_string(),
                    });
                }
                if condition.is_ordering() && matches!(column_type, ColumnType::Bool | ColumnType::Binary) {
                    return Err(Error::unsupported(format!(
                        "Ordering comparisons are not supported on {} columns",
                        column_type
                    )));
                }
                if !value.fits(column_type) {
                    return Err(Error::TypeMismatch {
                        column: *column,
                        expected: column_type,
                        actual: value.type_name().to_string(),
                    });
                }
                Ok(())
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().try_for_each(|p| p.validate(table))
            }
            Predicate::Not(inner) => inner.validate(table),
        }
    }

    fn matches(&self, row: &[Value]) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Compare {
                column,
                condition,
                value,
                case_sensitive,
            } => row
                .get(*column)
                .map(|cell| compare_cell(cell, *condition, value, *case_sensitive))
                .unwrap_or(false),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(row)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(row)),
            Predicate::Not(inner) => !inner.matches(row),
        }
    }
}

fn compare_cell(cell: &Value, condition: Condition, operand: &Value, case_sensitive: bool) -> bool {
    match condition {
        Condition::IsNull => return cell.is_null(),
        Condition::IsNotNull => return !cell.is_null(),
        _ => {}
    }
    if condition.is_string_only() {
        let (Some(haystack), Some(needle)) = (cell.as_str(), operand.as_str()) else {
            return false;
        };
        let (haystack, needle) = if case_sensitive {
            (haystack.to_string(), needle.to_string())
        } else {
            (haystack.to_lowercase(), needle.to_lowercase())
        };
        return match condition {
            Condition::BeginsWith => haystack.starts_with(&needle),
            Condition::EndsWith => haystack.ends_with(&needle),
            _ => haystack.contains(&needle),
        };
    }
    // Null only equals null; typed comparisons never coerce.
    if cell.is_null() || operand.is_null() || cell.runtime_type() != operand.runtime_type() {
        return match condition {
            Condition::Equal => cell.is_null() && operand.is_null(),
            Condition::NotEqual => !(cell.is_null() && operand.is_null()),
            _ => false,
        };
    }
    let ordering = match (cell.as_str(), operand.as_str(), case_sensitive) {
        (Some(a), Some(b), false) => a.to_lowercase().cmp(&b.to_lowercase()),
        _ => cell.sort_cmp(operand),
    };
    match condition {
        Condition::Equal => ordering == Ordering::Equal,
        Condition::NotEqual => ordering != Ordering::Equal,
        Condition::Greater => ordering == Ordering::Greater,
        Condition::GreaterEqual => ordering != Ordering::Less,
        Condition::Less => ordering == Ordering::Less,
        Condition::LessEqual => ordering != Ordering::Greater,
        _ => false,
    }
}

/// Validated window of rows a query runs over
///
/// `end == None` runs to the end of the table; `limit == None` is
/// unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowRange {
    /// First row examined
    pub start: usize,
    /// One past the last row examined
    pub end: Option<usize>,
    /// Maximum number of matches
    pub limit: Option<usize>,
}

impl RowRange {
    /// The whole table, unlimited
    pub fn all() -> Self {
        Self::default()
    }

    /// Explicit window
    pub fn new(start: usize, end: Option<usize>, limit: Option<usize>) -> Self {
        Self { start, end, limit }
    }

    fn bounds(&self, size: usize) -> (usize, usize) {
        let end = self.end.unwrap_or(size).min(size);
        (self.start.min(end), end)
    }
}

/// Filter over one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    table: TableKey,
    schema_epoch: u64,
    predicate: Predicate,
}

impl Query {
    /// Query matching every row of `table`
    pub fn new(table: &Table) -> Self {
        Self {
            table: table.key(),
            schema_epoch: table.schema_epoch(),
            predicate: Predicate::All,
        }
    }

    /// Rebuild a query from frozen parts
    pub fn from_parts(table: TableKey, schema_epoch: u64, predicate: Predicate) -> Self {
        Self {
            table,
            schema_epoch,
            predicate,
        }
    }

    /// Table this query runs over
    pub fn table(&self) -> TableKey {
        self.table
    }

    /// Schema epoch the query was built against
    pub fn schema_epoch(&self) -> u64 {
        self.schema_epoch
    }

    /// Current predicate
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Narrow the query with another predicate
    pub fn filter(&mut self, predicate: Predicate) {
        let current = std::mem::replace(&mut self.predicate, Predicate::All);
        self.predicate = match current {
            Predicate::All => predicate,
            Predicate::And(mut parts) => {
                parts.push(predicate);
                Predicate::And(parts)
            }
            other => Predicate::And(vec![other, predicate]),
        };
    }

    /// Columns referenced by the predicate
    pub fn columns(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.predicate.columns(&mut out);
        out
    }

    /// Check that the query can run against `table`
    pub fn validate(&self, table: &Table) -> Result<()> {
        if table.key() != self.table {
            return Err(Error::illegal_argument(format!(
                "Query over {} cannot run against {}",
                self.table,
                table.key()
            )));
        }
        if table.schema_epoch() != self.schema_epoch {
            return Err(Error::SchemaChanged {
                subject: "Query",
                table: table.name().to_string(),
            });
        }
        self.predicate.validate(table)
    }

    fn matching<'a>(&'a self, table: &'a Table, range: RowRange) -> impl Iterator<Item = usize> + 'a {
        let (start, end) = range.bounds(table.size());
        (start..end)
            .filter(move |&row| {
                table
                    .row(row)
                    .map(|cells| self.predicate.matches(cells))
                    .unwrap_or(false)
            })
            .take(range.limit.unwrap_or(usize::MAX))
    }

    /// First matching row at or after `from_row`
    pub fn find(&self, table: &Table, from_row: usize) -> Result<Option<usize>> {
        self.validate(table)?;
        Ok(self
            .matching(table, RowRange::new(from_row, None, None))
            .next())
    }

    /// Every matching row inside the range
    pub fn find_all(&self, table: &Table, range: RowRange) -> Result<Vec<usize>> {
        self.validate(table)?;
        Ok(self.matching(table, range).collect())
    }

    /// Number of matching rows inside the range
    pub fn count(&self, table: &Table, range: RowRange) -> Result<usize> {
        self.validate(table)?;
        Ok(self.matching(table, range).count())
    }

    /// Aggregate a column over the matching rows
    pub fn aggregate(
        &self,
        table: &Table,
        kind: AggregateKind,
        column: usize,
        range: RowRange,
    ) -> Result<Value> {
        self.validate(table)?;
        aggregate(table, self.matching(table, range), kind, column)
    }
}

/// Aggregate one column over the given rows
///
/// Nulls are skipped. Sum and average need a numeric column; min and max
/// also accept dates. An empty input yields `Null`, except for sum.
pub fn aggregate(
    table: &Table,
    rows: impl Iterator<Item = usize>,
    kind: AggregateKind,
    column: usize,
) -> Result<Value> {
    let column_type = table.column_type(column)?;
    let supported = match kind {
        AggregateKind::Sum | AggregateKind::Average => column_type.is_numeric(),
        AggregateKind::Min | AggregateKind::Max => {
            column_type.is_numeric() || column_type == ColumnType::Date
        }
    };
    if !supported {
        return Err(Error::unsupported(format!(
            "{} is not supported on {} columns",
            kind.name(),
            column_type
        )));
    }

    let mut values = Vec::new();
    for row in rows {
        let value = table.get(column, row)?;
        if !value.is_null() {
            values.push(value);
        }
    }

    Ok(match kind {
        AggregateKind::Sum => match column_type {
            ColumnType::Int => Value::Int(
                values
                    .iter()
                    .filter_map(|v| v.as_int())
                    .fold(0i64, |acc, v| acc.wrapping_add(v)),
            ),
            _ => Value::Double(values.iter().filter_map(|v| v.as_f64()).sum()),
        },
        AggregateKind::Average => {
            if values.is_empty() {
                Value::Null
            } else {
                let sum: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
                Value::Double(sum / values.len() as f64)
            }
        }
        AggregateKind::Min => values
            .into_iter()
            .min_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Value::Null),
        AggregateKind::Max => values
            .into_iter()
            .max_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Value::Null),
    })
}
