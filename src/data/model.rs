use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

use crate::error::{DashboardError, Result};

/// Output format used whenever a temporal cell is rendered as text.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Value – a single cell of the table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value mirroring the dtypes a CSV reader infers.
/// Grouping and distinct-value metadata live in `BTreeMap` / `BTreeSet`, so
/// `Value` must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDateTime),
    Null,
}

// -- Manual Eq/Ord so we can put Value in BTreeSet --

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{}", d.format(DATETIME_FORMAT)),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Date(d) => serializer.collect_str(&d.format(DATETIME_FORMAT)),
            Value::Null => serializer.serialize_none(),
        }
    }
}

impl Value {
    /// Numeric view of the cell, used by range filters and `mean`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::Date(d)
    }
}

// ---------------------------------------------------------------------------
// Record – one row of the table
// ---------------------------------------------------------------------------

/// One interaction (call or chat). Cells are aligned with [`Table::columns`];
/// fields a record type does not carry (`callId` on a chat, say) are `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub cells: Vec<Value>,
}

impl Record {
    pub fn new(cells: Vec<Value>) -> Self {
        Record { cells }
    }

    pub fn get(&self, idx: usize) -> &Value {
        self.cells.get(idx).unwrap_or(&Value::Null)
    }
}

// ---------------------------------------------------------------------------
// ValueRange – min / max of an ordered column
// ---------------------------------------------------------------------------

/// Observed extent of a numeric or temporal column (nulls ignored).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: Value,
    pub max: Value,
}

impl ValueRange {
    pub fn min_f64(&self) -> Option<f64> {
        self.min.as_f64()
    }

    pub fn max_f64(&self) -> Option<f64> {
        self.max.as_f64()
    }
}

// ---------------------------------------------------------------------------
// Table – the complete loaded dataset
// ---------------------------------------------------------------------------

/// The parsed dataset with pre-computed column metadata.
///
/// A `Table` is never mutated after construction; filtering produces a new one.
#[derive(Debug, Clone)]
pub struct Table {
    /// Column names in source order.
    columns: Vec<String>,
    /// Columns whose cells were parsed as date/time.
    date_columns: BTreeSet<String>,
    rows: Vec<Record>,
    /// For each column the sorted set of distinct values (including `Null`).
    unique_values: BTreeMap<String, BTreeSet<Value>>,
    /// For each numeric/date column the observed extent.
    ranges: BTreeMap<String, ValueRange>,
}

impl Table {
    /// Build a table and its metadata. Rows shorter than the header are
    /// padded with `Null`; longer rows are truncated.
    pub fn new(columns: Vec<String>, date_columns: BTreeSet<String>, rows: Vec<Record>) -> Self {
        let width = columns.len();
        let mut rows: Vec<Record> = rows
            .into_iter()
            .map(|mut r| {
                r.cells.resize(width, Value::Null);
                r
            })
            .collect();
        promote_mixed_numbers(&mut rows, width);

        let mut unique_values: BTreeMap<String, BTreeSet<Value>> = BTreeMap::new();
        let mut ranges: BTreeMap<String, ValueRange> = BTreeMap::new();

        for (idx, col) in columns.iter().enumerate() {
            let uniques = unique_values.entry(col.clone()).or_default();
            let mut extent: Option<(Value, Value)> = None;
            for row in &rows {
                let val = row.get(idx);
                uniques.insert(val.clone());
                if !matches!(val, Value::Integer(_) | Value::Float(_) | Value::Date(_)) {
                    continue;
                }
                extent = Some(match extent {
                    None => (val.clone(), val.clone()),
                    Some((lo, hi)) => (ordered_min(lo, val), ordered_max(hi, val)),
                });
            }
            if let Some((min, max)) = extent {
                ranges.insert(col.clone(), ValueRange { min, max });
            }
        }

        Table {
            columns,
            date_columns,
            rows,
            unique_values,
            ranges,
        }
    }

    /// Derive a new table holding only the given rows (in the given order).
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        let rows = indices
            .iter()
            .filter_map(|&i| self.rows.get(i).cloned())
            .collect();
        Table::new(self.columns.clone(), self.date_columns.clone(), rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn date_columns(&self) -> &BTreeSet<String> {
        &self.date_columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Like [`Table::column_index`] but fails with `UnknownColumn`.
    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| DashboardError::UnknownColumn(column.to_string()))
    }

    /// Iterate one column's cells in row order.
    pub fn column_values<'a>(&'a self, column: &str) -> Result<impl Iterator<Item = &'a Value>> {
        let idx = self.require_column(column)?;
        Ok(self.rows.iter().map(move |r| r.get(idx)))
    }

    /// Distinct observed values of a column, used to populate multiselect defaults.
    pub fn distinct_values(&self, column: &str) -> Result<&BTreeSet<Value>> {
        self.unique_values
            .get(column)
            .ok_or_else(|| DashboardError::UnknownColumn(column.to_string()))
    }

    /// Observed `{min, max}` of a numeric or date column. `Ok(None)` when the
    /// column exists but holds no orderable value.
    pub fn range(&self, column: &str) -> Result<Option<&ValueRange>> {
        self.require_column(column)?;
        Ok(self.ranges.get(column))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// Integer and Float share one numeric axis for extents.
/// A column holding both integers and floats becomes all floats, so `32`
/// and `32.0` are one group and one selectable value.
fn promote_mixed_numbers(rows: &mut [Record], width: usize) {
    for idx in 0..width {
        let has_float = rows.iter().any(|r| matches!(r.cells[idx], Value::Float(_)));
        if !has_float {
            continue;
        }
        for row in rows.iter_mut() {
            if let Value::Integer(i) = row.cells[idx] {
                row.cells[idx] = Value::Float(i as f64);
            }
        }
    }
}

fn ordered_min(current: Value, candidate: &Value) -> Value {
    match (current.as_f64(), candidate.as_f64()) {
        (Some(a), Some(b)) if b < a => candidate.clone(),
        (Some(_), Some(_)) => current,
        _ if candidate < &current => candidate.clone(),
        _ => current,
    }
}

fn ordered_max(current: Value, candidate: &Value) -> Value {
    match (current.as_f64(), candidate.as_f64()) {
        (Some(a), Some(b)) if b > a => candidate.clone(),
        (Some(_), Some(_)) => current,
        _ if candidate > &current => candidate.clone(),
        _ => current,
    }
}
