//! Cell values
//!
//! Every cell of a table holds exactly one [`Value`]. A cell of a typed column
//! always holds a value of that column's type (or `Null` for nullable
//! columns); a cell of a Mixed column may hold any scalar value and its
//! *runtime* type is the type of whatever is stored there.
//!
//! ## Equality Rules
//!
//! - Different variants are NEVER equal (no coercion): `Int(1) != Double(1.0)`
//! - `String("abc") != Binary(b"abc")`
//! - Floats use IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`

use crate::types::ColumnType;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single cell value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Binary blob, distinct from String
    Binary(Vec<u8>),
    /// Milliseconds since the Unix epoch
    Date(i64),
    /// Row index in the link target table
    Link(usize),
    /// Row indices in the link target table
    LinkList(Vec<usize>),
}

impl Value {
    /// Returns the type name as a string (for error messages)
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::String(_) => "String",
            Value::Binary(_) => "Binary",
            Value::Date(_) => "Date",
            Value::Link(_) => "Link",
            Value::LinkList(_) => "LinkList",
        }
    }

    /// Column type this value belongs to
    ///
    /// `Null` has no type of its own and returns `None`.
    pub fn runtime_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Int(_) => Some(ColumnType::Int),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Double(_) => Some(ColumnType::Double),
            Value::String(_) => Some(ColumnType::String),
            Value::Binary(_) => Some(ColumnType::Binary),
            Value::Date(_) => Some(ColumnType::Date),
            Value::Link(_) => Some(ColumnType::Link),
            Value::LinkList(_) => Some(ColumnType::LinkList),
        }
    }

    /// Whether this value may be stored in a column of the given type
    ///
    /// `Null` is accepted here; nullability is checked separately.
    pub fn fits(&self, column_type: ColumnType) -> bool {
        match (self.runtime_type(), column_type) {
            (None, _) => true,
            (Some(ColumnType::Link), _) | (Some(ColumnType::LinkList), _) => {
                self.runtime_type() == Some(column_type)
            }
            (Some(_), ColumnType::Mixed) => true,
            (Some(actual), expected) => actual == expected,
        }
    }

    /// Value a freshly inserted cell gets
    pub fn default_for(column_type: ColumnType, nullable: bool) -> Value {
        if nullable {
            return Value::Null;
        }
        match column_type {
            ColumnType::Int | ColumnType::Mixed => Value::Int(0),
            ColumnType::Bool => Value::Bool(false),
            ColumnType::Float => Value::Float(0.0),
            ColumnType::Double => Value::Double(0.0),
            ColumnType::String => Value::String(String::new()),
            ColumnType::Binary => Value::Binary(Vec::new()),
            ColumnType::Date => Value::Date(0),
            ColumnType::LinkList => Value::LinkList(Vec::new()),
            ColumnType::Link | ColumnType::Table => Value::Null,
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f32
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Try to get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bytes slice
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get as a timestamp
    pub fn as_date(&self) -> Option<i64> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Try to get as a link target row
    pub fn as_link(&self) -> Option<usize> {
        match self {
            Value::Link(row) => Some(*row),
            _ => None,
        }
    }

    /// Try to get as link target rows
    pub fn as_link_list(&self) -> Option<&[usize]> {
        match self {
            Value::LinkList(rows) => Some(rows),
            _ => None,
        }
    }

    /// Numeric view used by aggregates
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f as f64),
            Value::Double(d) => Some(*d),
            Value::Date(d) => Some(*d as f64),
            _ => None,
        }
    }

    /// Total order used by sorting, distinct and min/max
    ///
    /// Nulls sort first. Values of different types order by type so the
    /// result is deterministic even for Mixed columns. Floats use
    /// `total_cmp`.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Link(a), Value::Link(b)) => a.cmp(b),
            (Value::LinkList(a), Value::LinkList(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Double(_) => 4,
            Value::String(_) => 5,
            Value::Binary(_) => 6,
            Value::Date(_) => 7,
            Value::Link(_) => 8,
            Value::LinkList(_) => 9,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Link(a), Value::Link(b)) => a == b,
            (Value::LinkList(a), Value::LinkList(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}
