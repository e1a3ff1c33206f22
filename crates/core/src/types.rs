//! Core types shared by every layer of the boundary
//!
//! This module defines the identifiers and descriptors used throughout:
//! - [`VersionId`]: Identity of a committed snapshot of the store
//! - [`StoreId`]: Identity of one open store, used to tag handover envelopes
//! - [`ContextId`] / [`TableKey`]: Stable identities of contexts and tables
//! - [`ColumnType`] / [`ColumnDescriptor`]: Column schema
//! - [`Handle`] / [`HandleKind`]: Opaque integer handles handed across the boundary
//! - [`HandoverPolicy`]: Copy or Move semantics of an export

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Version of a committed snapshot
///
/// Versions are allocated by the store, one per commit, and are strictly
/// increasing. A read transaction is always pinned to exactly one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionId(u64);

impl VersionId {
    /// Version of the empty store right after it is opened
    pub const INITIAL: VersionId = VersionId(1);

    /// Wrap a raw version number
    pub const fn new(raw: u64) -> Self {
        VersionId(raw)
    }

    /// Raw version number
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The version directly following this one
    pub fn next(&self) -> Self {
        VersionId(self.0 + 1)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Unique identity of an open store
///
/// Envelopes carry the id of the store they were exported from so they
/// cannot be imported into an unrelated store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(Uuid);

impl StoreId {
    /// Create a new random StoreId using UUID v4
    pub fn new() -> Self {
        StoreId(Uuid::new_v4())
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a transaction context within its store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Stable identity of a table
///
/// Keys are never reused within a store, so a removed table can never be
/// confused with a table created later under the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableKey(pub u64);

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 64-bit signed integer
    Int,
    /// Boolean
    Bool,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// UTF-8 string
    String,
    /// Binary blob
    Binary,
    /// Timestamp in milliseconds since the epoch
    Date,
    /// Dynamic "any" column; each cell has its own runtime type
    Mixed,
    /// Single link to a row of the target table
    Link,
    /// Ordered list of links to rows of the target table
    LinkList,
    /// Sub-table
    Table,
}

impl ColumnType {
    /// Name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int => "Int",
            ColumnType::Bool => "Bool",
            ColumnType::Float => "Float",
            ColumnType::Double => "Double",
            ColumnType::String => "String",
            ColumnType::Binary => "Binary",
            ColumnType::Date => "Date",
            ColumnType::Mixed => "Mixed",
            ColumnType::Link => "Link",
            ColumnType::LinkList => "LinkList",
            ColumnType::Table => "Table",
        }
    }

    /// Whether a result view can be sorted on a column of this type
    pub fn is_sortable(&self) -> bool {
        matches!(
            self,
            ColumnType::Bool
                | ColumnType::Int
                | ColumnType::Date
                | ColumnType::Float
                | ColumnType::Double
                | ColumnType::String
        )
    }

    /// Whether a distinct view can be built over a column of this type
    pub fn supports_distinct(&self) -> bool {
        matches!(
            self,
            ColumnType::Bool | ColumnType::Int | ColumnType::Date | ColumnType::String
        )
    }

    /// Whether numeric aggregates (sum, average) apply to this type
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Int | ColumnType::Float | ColumnType::Double
        )
    }

    /// Whether this is a Link or LinkList column
    pub fn is_link_like(&self) -> bool {
        matches!(self, ColumnType::Link | ColumnType::LinkList)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Schema of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name, unique within its table
    pub name: String,
    /// Declared type
    pub column_type: ColumnType,
    /// Whether cells may hold null
    pub nullable: bool,
    /// Target table for Link and LinkList columns
    pub link_target: Option<TableKey>,
}

impl ColumnDescriptor {
    /// Describe a non-link column
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
            link_target: None,
        }
    }

    /// Describe a Link or LinkList column pointing at `target`
    pub fn link(name: impl Into<String>, column_type: ColumnType, target: TableKey) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: column_type == ColumnType::Link,
            link_target: Some(target),
        }
    }
}

/// How an export treats its source object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandoverPolicy {
    /// The source object stays usable after export
    Copy,
    /// The source object is consumed by the export
    Move,
}

/// Kind of native object a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HandleKind {
    /// Table accessor
    Table = 1,
    /// Row accessor
    Row = 2,
    /// Query
    Query = 3,
    /// Result view
    View = 4,
    /// Link collection of one row
    LinkList = 5,
    /// Handover envelope
    Envelope = 6,
}

impl HandleKind {
    /// Name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            HandleKind::Table => "Table",
            HandleKind::Row => "Row",
            HandleKind::Query => "Query",
            HandleKind::View => "TableView",
            HandleKind::LinkList => "LinkList",
            HandleKind::Envelope => "Handover",
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(HandleKind::Table),
            2 => Some(HandleKind::Row),
            3 => Some(HandleKind::Query),
            4 => Some(HandleKind::View),
            5 => Some(HandleKind::LinkList),
            6 => Some(HandleKind::Envelope),
            _ => None,
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque handle to a native object
///
/// A handle names an arena slot together with the generation the slot had
/// when the object was stored. Closing or consuming the object bumps the
/// slot's generation, so a stale handle can always be told apart from a live
/// one and never dereferences a recycled object.
///
/// # Encoding
///
/// ```text
/// | kind (8 bits) | generation (24 bits) | slot (32 bits) |
/// ```
///
/// Kind tags start at 1, so the raw value `0` is never a valid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    kind: HandleKind,
    generation: u32,
    slot: u32,
}

impl Handle {
    /// Mask applied to generations so they fit the encoding
    pub const GENERATION_MASK: u32 = 0x00FF_FFFF;

    /// Build a handle from its parts
    pub fn new(kind: HandleKind, slot: u32, generation: u32) -> Self {
        Self {
            kind,
            generation: generation & Self::GENERATION_MASK,
            slot,
        }
    }

    /// Kind of object referenced
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Arena slot
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Slot generation at creation time
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Encode as the opaque integer passed across the boundary
    pub fn to_raw(&self) -> u64 {
        ((self.kind as u64) << 56) | ((self.generation as u64) << 32) | self.slot as u64
    }

    /// Decode an opaque integer
    ///
    /// Returns `None` for `0` and for unknown kind tags.
    pub fn from_raw(raw: u64) -> Option<Self> {
        let kind = HandleKind::from_tag((raw >> 56) as u8)?;
        Some(Self {
            kind,
            generation: ((raw >> 32) as u32) & Self::GENERATION_MASK,
            slot: raw as u32,
        })
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.kind, self.slot, self.generation)
    }
}

/// Sort direction of one sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

impl SortOrder {
    /// Build from a boolean `ascending` flag
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        }
    }
}

/// Aggregate operations over a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    /// Sum of the values
    Sum,
    /// Smallest value
    Min,
    /// Largest value
    Max,
    /// Arithmetic mean
    Average,
}

impl AggregateKind {
    /// Name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            AggregateKind::Sum => "sum",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::Average => "average",
        }
    }
}
