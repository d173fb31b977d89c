use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use log::debug;
use serde::Serialize;

use super::model::{Table, Value};

/// Column holding the interaction timestamp.
pub const DATE_COLUMN: &str = "date";
/// Column holding the call length in seconds.
pub const DURATION_COLUMN: &str = "duration";

/// Categorical columns exposed as multiselect widgets, in sidebar order.
pub const CATEGORICAL_DIMENSIONS: &[&str] = &[
    "category",
    "province",
    "gender",
    "language",
    "chatType",
    "countryName",
];

// ---------------------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------------------

/// Inclusive calendar-day range. `start > end` is allowed and matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

impl NumericRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f64) -> bool {
        self.min <= v && v <= self.max
    }

    /// Whether this range spans all of `[lo, hi]`.
    pub fn covers(&self, lo: f64, hi: f64) -> bool {
        self.min <= lo && hi <= self.max
    }
}

// ---------------------------------------------------------------------------
// FilterSpec – the user's current constraints
// ---------------------------------------------------------------------------

/// Per-column selection state: maps column_name → set of selected values.
/// A column absent from the map imposes no constraint; an empty set selects nothing.
pub type Selections = BTreeMap<String, BTreeSet<Value>>;

/// All active constraints for one evaluation, combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    /// `None` = no date constraint. When set, rows with a null date never pass.
    pub date_range: Option<DateRange>,
    /// `None` = no duration constraint.
    pub duration_range: Option<NumericRange>,
    pub selections: Selections,
}

impl FilterSpec {
    /// A spec that restricts nothing.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Widget defaults: full observed date and duration extents, every value
    /// of every categorical dimension the table carries selected.
    pub fn from_table(table: &Table) -> Self {
        let date_range = table
            .range(DATE_COLUMN)
            .ok()
            .flatten()
            .and_then(|r| Some(DateRange::new(r.min.as_datetime()?.date(), r.max.as_datetime()?.date())));

        let duration_range = table
            .range(DURATION_COLUMN)
            .ok()
            .flatten()
            .and_then(|r| Some(NumericRange::new(r.min_f64()?, r.max_f64()?)));

        let selections = CATEGORICAL_DIMENSIONS
            .iter()
            .filter_map(|col| {
                let values = table.distinct_values(col).ok()?;
                Some((col.to_string(), values.clone()))
            })
            .collect();

        Self {
            date_range,
            duration_range,
            selections,
        }
    }

    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some(DateRange::new(start, end));
        self
    }

    pub fn with_duration_range(mut self, min: f64, max: f64) -> Self {
        self.duration_range = Some(NumericRange::new(min, max));
        self
    }

    /// Replace the selection for one column.
    pub fn select<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.selections
            .insert(column.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Deselect every value of a column (nothing passes).
    pub fn select_none(mut self, column: &str) -> Self {
        self.selections.insert(column.to_string(), BTreeSet::new());
        self
    }

    /// Remove a column's constraint entirely.
    pub fn clear(mut self, column: &str) -> Self {
        self.selections.remove(column);
        self
    }

    /// Whether some dimension has an empty selection, which forces an empty result.
    pub fn selects_nothing(&self) -> bool {
        self.selections.values().any(BTreeSet::is_empty)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// A categorical constraint resolved against the table's columns.
struct CategoricalPredicate<'a> {
    column: Option<usize>,
    selected: &'a BTreeSet<Value>,
}

impl CategoricalPredicate<'_> {
    fn accepts(&self, cells: &[Value]) -> bool {
        let val = self
            .column
            .and_then(|idx| cells.get(idx))
            .unwrap_or(&Value::Null);
        if self.selected.contains(val) {
            return true;
        }
        // Whole floats also match an integer selection of the same number.
        match val {
            Value::Float(f) if f.fract() == 0.0 => self.selected.contains(&Value::Integer(*f as i64)),
            _ => false,
        }
    }
}

/// Return indices of rows that pass all active filters.
///
/// A row passes a column filter when:
/// * The column is not present in `spec.selections` → passes (no constraint)
/// * The selected set for that column is empty → nothing selected → fails
/// * The row's value for that column is in the selected set → passes
///   (a column the table lacks reads as `Null`)
///
/// Date and duration filters compare inclusively; a null cell fails an
/// active comparison. The duration filter is inactive when it spans the
/// whole observed extent or when the table has no duration column.
pub fn filtered_indices(table: &Table, spec: &FilterSpec) -> Vec<usize> {
    if spec.selects_nothing() {
        debug!("filter: empty selection, no rows pass");
        return Vec::new();
    }

    let categorical: Vec<CategoricalPredicate<'_>> = spec
        .selections
        .iter()
        .filter(|(col, selected)| {
            // All observed values selected → no effective filter.
            match table.distinct_values(col) {
                Ok(all_vals) => !selected.is_superset(all_vals),
                Err(_) => true,
            }
        })
        .map(|(col, selected)| CategoricalPredicate {
            column: table.column_index(col),
            selected,
        })
        .collect();

    let date = spec
        .date_range
        .map(|range| (table.column_index(DATE_COLUMN), range));

    let duration = spec.duration_range.and_then(|range| {
        let idx = table.column_index(DURATION_COLUMN)?;
        let full_extent = table
            .range(DURATION_COLUMN)
            .ok()
            .flatten()
            .and_then(|r| Some(range.covers(r.min_f64()?, r.max_f64()?)))
            .unwrap_or(false);
        (!full_extent).then_some((idx, range))
    });

    let indices: Vec<usize> = table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            if let Some((idx, range)) = &date {
                let day = idx
                    .and_then(|i| row.get(i).as_datetime())
                    .map(|dt| dt.date());
                match day {
                    Some(day) if range.contains(day) => {}
                    _ => return false,
                }
            }
            if let Some((idx, range)) = &duration {
                match row.get(*idx).as_f64() {
                    Some(v) if range.contains(v) => {}
                    _ => return false,
                }
            }
            categorical.iter().all(|p| p.accepts(&row.cells))
        })
        .map(|(i, _)| i)
        .collect();

    debug!(
        "filter: {} of {} rows pass ({} categorical predicates active)",
        indices.len(),
        table.len(),
        categorical.len()
    );
    indices
}

/// Derive the table of rows passing `spec`. The source table is untouched.
pub fn filter(table: &Table, spec: &FilterSpec) -> Table {
    table.select_rows(&filtered_indices(table, spec))
}
