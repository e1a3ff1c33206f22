//! Tables with typed columns
//!
//! Rows are stored row-major. Every structural change (adding or removing a
//! column) bumps the table's schema epoch; accessors that captured an older
//! epoch are detached by the layers above.
//!
//! Each row also carries an id that is never reused within the table, so a
//! row can be found again after rows before it are inserted or removed.

use baton_core::{ColumnDescriptor, ColumnType, Error, Result, TableKey, Value};

/// A single table of a snapshot
#[derive(Debug, Clone)]
pub struct Table {
    key: TableKey,
    name: String,
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Vec<Value>>,
    row_ids: Vec<u64>,
    next_row_id: u64,
    schema_epoch: u64,
}

impl Table {
    /// Create an empty table without columns
    pub fn new(key: TableKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            row_ids: Vec::new(),
            next_row_id: 0,
            schema_epoch: 0,
        }
    }

    /// Stable key of this table
    pub fn key(&self) -> TableKey {
        self.key
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Counter bumped on every schema change
    pub fn schema_epoch(&self) -> u64 {
        self.schema_epoch
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All column descriptors
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Descriptor of one column
    pub fn column(&self, index: usize) -> Result<&ColumnDescriptor> {
        self.columns.get(index).ok_or(Error::ColumnOutOfRange {
            index: index as i64,
            count: self.columns.len(),
        })
    }

    /// Declared type of one column
    pub fn column_type(&self, index: usize) -> Result<ColumnType> {
        self.column(index).map(|c| c.column_type)
    }

    /// Index of the column with the given name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Append a column; existing rows get the column's default value
    pub fn add_column(&mut self, descriptor: ColumnDescriptor) -> Result<usize> {
        if descriptor.name.is_empty() {
            return Err(Error::illegal_argument("Column name must not be empty"));
        }
        if self.column_index(&descriptor.name).is_some() {
            return Err(Error::illegal_argument(format!(
                "Column '{}' already exists in table '{}'",
                descriptor.name, self.name
            )));
        }
        if descriptor.column_type.is_link_like() && descriptor.link_target.is_none() {
            return Err(Error::illegal_argument(
                "Link columns need a target table",
            ));
        }
        if descriptor.column_type == ColumnType::LinkList && descriptor.nullable {
            return Err(Error::illegal_argument("LinkList is not nullable."));
        }
        let default = Value::default_for(descriptor.column_type, descriptor.nullable);
        for row in &mut self.rows {
            row.push(default.clone());
        }
        self.columns.push(descriptor);
        self.schema_epoch += 1;
        Ok(self.columns.len() - 1)
    }

    /// Remove a column and its cells
    pub fn remove_column(&mut self, index: usize) -> Result<()> {
        self.column(index)?;
        self.columns.remove(index);
        for row in &mut self.rows {
            row.remove(index);
        }
        self.schema_epoch += 1;
        Ok(())
    }

    fn empty_row(&self) -> Vec<Value> {
        self.columns
            .iter()
            .map(|c| Value::default_for(c.column_type, c.nullable))
            .collect()
    }

    fn allocate_row_id(&mut self) -> u64 {
        let id = self.next_row_id;
        self.next_row_id += 1;
        id
    }

    /// Append a row of default values; returns its index
    pub fn add_empty_row(&mut self) -> usize {
        let row = self.empty_row();
        let id = self.allocate_row_id();
        self.rows.push(row);
        self.row_ids.push(id);
        self.rows.len() - 1
    }

    /// Insert a row of default values at `index` (which may equal the size)
    pub fn insert_empty_row(&mut self, index: usize) -> Result<()> {
        if index > self.rows.len() {
            return Err(Error::RowOutOfRange {
                index: index as i64,
                size: self.rows.len(),
                allow_end: true,
            });
        }
        let row = self.empty_row();
        let id = self.allocate_row_id();
        self.rows.insert(index, row);
        self.row_ids.insert(index, id);
        Ok(())
    }

    /// Remove one row; rows after it shift down by one
    pub fn remove_row(&mut self, index: usize) -> Result<()> {
        self.check_row(index)?;
        self.rows.remove(index);
        self.row_ids.remove(index);
        Ok(())
    }

    /// Remove all rows
    pub fn clear(&mut self) {
        self.rows.clear();
        self.row_ids.clear();
    }

    /// Id of the row at `index`
    pub fn row_id(&self, index: usize) -> Option<u64> {
        self.row_ids.get(index).copied()
    }

    /// Current index of the row with `id`, trying `hint` first
    pub fn find_row(&self, id: u64, hint: usize) -> Option<usize> {
        if self.row_id(hint) == Some(id) {
            return Some(hint);
        }
        self.row_ids.iter().position(|&r| r == id)
    }

    fn check_row(&self, index: usize) -> Result<()> {
        if index >= self.rows.len() {
            return Err(Error::RowOutOfRange {
                index: index as i64,
                size: self.rows.len(),
                allow_end: false,
            });
        }
        Ok(())
    }

    /// All cells of one row
    pub fn row(&self, index: usize) -> Result<&[Value]> {
        self.check_row(index)?;
        Ok(&self.rows[index])
    }

    /// Cell at (column, row)
    pub fn get(&self, column: usize, row: usize) -> Result<&Value> {
        self.column(column)?;
        self.check_row(row)?;
        Ok(&self.rows[row][column])
    }

    /// Runtime type of a cell; `None` when it holds null
    pub fn mixed_type(&self, column: usize, row: usize) -> Result<Option<ColumnType>> {
        Ok(self.get(column, row)?.runtime_type())
    }

    /// Overwrite one cell
    ///
    /// The value is checked completely before the cell is touched.
    pub fn set(&mut self, column: usize, row: usize, value: Value) -> Result<()> {
        let descriptor = self.column(column)?;
        self.check_row(row)?;
        if value.is_null() && !descriptor.nullable {
            return Err(Error::illegal_argument("This field is not nullable."));
        }
        if !value.fits(descriptor.column_type) {
            return Err(Error::TypeMismatch {
                column,
                expected: descriptor.column_type,
                actual: value.type_name().to_string(),
            });
        }
        self.rows[row][column] = value;
        Ok(())
    }

    /// Link targets stored in a LinkList cell
    pub fn link_list(&self, column: usize, row: usize) -> Result<&[usize]> {
        match self.get(column, row)? {
            Value::LinkList(targets) => Ok(targets),
            other => Err(Error::TypeMismatch {
                column,
                expected: ColumnType::LinkList,
                actual: other.type_name().to_string(),
            }),
        }
    }

    /// Mutable link targets of a LinkList cell
    pub(crate) fn link_list_mut(&mut self, column: usize, row: usize) -> Result<&mut Vec<usize>> {
        self.link_list(column, row)?;
        match &mut self.rows[row][column] {
            Value::LinkList(targets) => Ok(targets),
            _ => Err(Error::internal("link list cell changed type")),
        }
    }

    /// Rewrite every link into `target` after row `removed` was deleted there
    ///
    /// Links to the removed row are nullified (or dropped from link lists);
    /// links to later rows shift down by one.
    pub(crate) fn repair_links_after_remove(&mut self, target: TableKey, removed: usize) {
        let link_columns: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.link_target == Some(target))
            .map(|(i, _)| i)
            .collect();
        if link_columns.is_empty() {
            return;
        }
        for row in &mut self.rows {
            for &col in &link_columns {
                if let Value::Link(to) = row[col] {
                    if to == removed {
                        row[col] = Value::Null;
                    } else if to > removed {
                        row[col] = Value::Link(to - 1);
                    }
                } else if let Value::LinkList(targets) = &mut row[col] {
                    targets.retain(|&t| t != removed);
                    for t in targets.iter_mut() {
                        if *t > removed {
                            *t -= 1;
                        }
                    }
                }
            }
        }
    }

    /// Rewrite every link into `target` after that table was cleared
    pub(crate) fn repair_links_after_clear(&mut self, target: TableKey) {
        for (col, descriptor) in self.columns.iter().enumerate() {
            if descriptor.link_target != Some(target) {
                continue;
            }
            for row in &mut self.rows {
                if let Value::LinkList(targets) = &mut row[col] {
                    targets.clear();
                } else {
                    row[col] = Value::Null;
                }
            }
        }
    }

    /// Whether any column links to `target`
    pub fn links_to(&self, target: TableKey) -> bool {
        self.columns.iter().any(|c| c.link_target == Some(target))
    }
}
