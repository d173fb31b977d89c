use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::debug;
use serde::{Serialize, Serializer};

use super::model::{Table, Value};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Measures
// ---------------------------------------------------------------------------

/// What to compute per group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Measure {
    /// Number of rows in the group, nulls included.
    Count,
    /// Number of rows whose `column` is not null.
    CountNonNull(String),
    /// Mean of the numeric values of `column`; nulls do not contribute.
    Mean(String),
    /// Number of distinct non-null values of `column`.
    NUnique(String),
}

impl Measure {
    /// Column the measure reads, if any.
    pub fn column(&self) -> Option<&str> {
        match self {
            Measure::Count => None,
            Measure::CountNonNull(c) | Measure::Mean(c) | Measure::NUnique(c) => Some(c),
        }
    }

    /// Name of the output column.
    pub fn label(&self) -> String {
        match self {
            Measure::Count => "count".to_string(),
            Measure::CountNonNull(c) => format!("count({c})"),
            Measure::Mean(c) => format!("mean({c})"),
            Measure::NUnique(c) => format!("nunique({c})"),
        }
    }
}

/// Result of a measure for one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasureValue {
    Count(u64),
    /// `None` when no value contributed; distinct from a mean of zero.
    Mean(Option<f64>),
}

impl MeasureValue {
    pub fn as_count(&self) -> Option<u64> {
        match self {
            MeasureValue::Count(n) => Some(*n),
            MeasureValue::Mean(_) => None,
        }
    }

    pub fn as_mean(&self) -> Option<f64> {
        match self {
            MeasureValue::Mean(m) => *m,
            MeasureValue::Count(_) => None,
        }
    }

    pub fn is_not_available(&self) -> bool {
        matches!(self, MeasureValue::Mean(None))
    }
}

impl fmt::Display for MeasureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureValue::Count(n) => write!(f, "{n}"),
            MeasureValue::Mean(Some(m)) => write!(f, "{m:.2}"),
            MeasureValue::Mean(None) => write!(f, "N/A"),
        }
    }
}

impl Serialize for MeasureValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MeasureValue::Count(n) => serializer.serialize_u64(*n),
            MeasureValue::Mean(Some(m)) => serializer.serialize_f64(*m),
            MeasureValue::Mean(None) => serializer.serialize_none(),
        }
    }
}

/// Running state for one group's measure.
#[derive(Debug)]
enum Accumulator {
    Count(u64),
    Mean { sum: f64, n: u64 },
    Distinct(BTreeSet<Value>),
}

impl Accumulator {
    fn new(measure: &Measure) -> Self {
        match measure {
            Measure::Count | Measure::CountNonNull(_) => Accumulator::Count(0),
            Measure::Mean(_) => Accumulator::Mean { sum: 0.0, n: 0 },
            Measure::NUnique(_) => Accumulator::Distinct(BTreeSet::new()),
        }
    }

    /// `value` is the measured cell, or `None` for plain `Count`.
    fn push(&mut self, value: Option<&Value>) {
        match (self, value) {
            (Accumulator::Count(n), None) => *n += 1,
            (Accumulator::Count(n), Some(v)) if !v.is_null() => *n += 1,
            (Accumulator::Mean { sum, n }, Some(v)) => {
                if let Some(x) = v.as_f64().filter(|x| !x.is_nan()) {
                    *sum += x;
                    *n += 1;
                }
            }
            (Accumulator::Distinct(seen), Some(v)) if !v.is_null() => {
                seen.insert(v.clone());
            }
            _ => {}
        }
    }

    fn finish(self) -> MeasureValue {
        match self {
            Accumulator::Count(n) => MeasureValue::Count(n),
            Accumulator::Mean { n: 0, .. } => MeasureValue::Mean(None),
            Accumulator::Mean { sum, n } => MeasureValue::Mean(Some(sum / n as f64)),
            Accumulator::Distinct(seen) => MeasureValue::Count(seen.len() as u64),
        }
    }
}

// ---------------------------------------------------------------------------
// AggregateView / GroupedTable
// ---------------------------------------------------------------------------

/// A named grouping request backing one chart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateView {
    pub name: String,
    pub group_by: Vec<String>,
    pub measure: Measure,
}

impl AggregateView {
    pub fn new(name: &str, group_by: &[&str], measure: Measure) -> Self {
        Self {
            name: name.to_string(),
            group_by: group_by.iter().map(|c| c.to_string()).collect(),
            measure,
        }
    }

    /// Every column the view reads: group keys first, then the measured column.
    pub fn required_columns(&self) -> impl Iterator<Item = &str> {
        self.group_by
            .iter()
            .map(String::as_str)
            .chain(self.measure.column())
    }
}

/// One output row: the group key and its measure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: Vec<Value>,
    pub value: MeasureValue,
}

/// Output of [`aggregate`]: one row per key combination present in the input,
/// in ascending key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedTable {
    pub name: String,
    pub group_by: Vec<String>,
    pub measure: String,
    pub rows: Vec<GroupRow>,
}

impl GroupedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up the measure for an exact key.
    pub fn get(&self, key: &[Value]) -> Option<&MeasureValue> {
        self.rows.iter().find(|r| r.key == key).map(|r| &r.value)
    }

    /// Sum of all count measures (0 for mean views).
    pub fn total_count(&self) -> u64 {
        self.rows.iter().filter_map(|r| r.value.as_count()).sum()
    }
}

impl fmt::Display for GroupedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "  {} | {}", self.group_by.join(" | "), self.measure)?;
        for row in &self.rows {
            let key: Vec<String> = row.key.iter().map(|v| v.to_string()).collect();
            writeln!(f, "  {} | {}", key.join(" | "), row.value)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Group `table` by `view.group_by` and compute `view.measure` per group.
///
/// Fails with `UnknownColumn` when a key or measured column is absent.
/// A null key cell forms its own group, so group counts always sum to the
/// number of input rows.
pub fn aggregate(table: &Table, view: &AggregateView) -> Result<GroupedTable> {
    let key_idx: Vec<usize> = view
        .group_by
        .iter()
        .map(|c| table.require_column(c))
        .collect::<Result<_>>()?;
    let measure_idx = view
        .measure
        .column()
        .map(|c| table.require_column(c))
        .transpose()?;

    let mut groups: BTreeMap<Vec<Value>, Accumulator> = BTreeMap::new();
    for row in table.rows() {
        let key: Vec<Value> = key_idx.iter().map(|&i| row.get(i).clone()).collect();
        groups
            .entry(key)
            .or_insert_with(|| Accumulator::new(&view.measure))
            .push(measure_idx.map(|i| row.get(i)));
    }

    let rows: Vec<GroupRow> = groups
        .into_iter()
        .map(|(key, acc)| GroupRow {
            key,
            value: acc.finish(),
        })
        .collect();

    debug!(
        "aggregate '{}': {} rows -> {} groups",
        view.name,
        table.len(),
        rows.len()
    );

    Ok(GroupedTable {
        name: view.name.clone(),
        group_by: view.group_by.clone(),
        measure: view.measure.label(),
        rows,
    })
}

/// Compute `measure` over the whole table (a single, key-less group).
/// An empty table yields `Count(0)` or a null mean.
pub fn summarize(table: &Table, measure: &Measure) -> Result<MeasureValue> {
    let measure_idx = measure
        .column()
        .map(|c| table.require_column(c))
        .transpose()?;
    let mut acc = Accumulator::new(measure);
    for row in table.rows() {
        acc.push(measure_idx.map(|i| row.get(i)));
    }
    Ok(acc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Record;
    use crate::error::DashboardError;
    use std::collections::BTreeSet;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table::new(
            columns.iter().map(|c| c.to_string()).collect(),
            BTreeSet::new(),
            rows.into_iter().map(Record::new).collect(),
        )
    }

    #[test]
    fn count_by_category() {
        let t = table(&["category"], vec![vec!["A".into()], vec!["A".into()], vec!["B".into()]]);
        let view = AggregateView::new("by_category", &["category"], Measure::Count);
        let grouped = aggregate(&t, &view).unwrap();

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.get(&["A".into()]), Some(&MeasureValue::Count(2)));
        assert_eq!(grouped.get(&["B".into()]), Some(&MeasureValue::Count(1)));
        assert_eq!(grouped.measure, "count");
    }

    #[test]
    fn multi_key_groups_only_observed_combinations() {
        let t = table(
            &["province", "category"],
            vec![
                vec!["Gaza".into(), "A".into()],
                vec!["Maputo".into(), "B".into()],
                vec!["Gaza".into(), "A".into()],
            ],
        );
        let view = AggregateView::new("pc", &["province", "category"], Measure::Count);
        let grouped = aggregate(&t, &view).unwrap();
        let keys: Vec<_> = grouped.rows.iter().map(|r| r.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                vec![Value::from("Gaza"), Value::from("A")],
                vec![Value::from("Maputo"), Value::from("B")],
            ]
        );
        assert_eq!(grouped.total_count(), 3);
    }

    #[test]
    fn count_includes_rows_with_null_cells() {
        let t = table(
            &["category", "chatId"],
            vec![
                vec!["A".into(), Value::Null],
                vec!["A".into(), "h1".into()],
                vec![Value::Null, "h2".into()],
            ],
        );
        let count = aggregate(&t, &AggregateView::new("c", &["category"], Measure::Count)).unwrap();
        assert_eq!(count.get(&["A".into()]), Some(&MeasureValue::Count(2)));
        assert_eq!(count.get(&[Value::Null]), Some(&MeasureValue::Count(1)));
        assert_eq!(count.total_count(), 3);

        let non_null = aggregate(
            &t,
            &AggregateView::new("c", &["category"], Measure::CountNonNull("chatId".into())),
        )
        .unwrap();
        assert_eq!(non_null.get(&["A".into()]), Some(&MeasureValue::Count(1)));
    }

    #[test]
    fn mean_skips_nulls_and_reports_missing() {
        let t = table(
            &["province", "duration"],
            vec![
                vec!["Gaza".into(), Value::Integer(10)],
                vec!["Gaza".into(), Value::Null],
                vec!["Gaza".into(), Value::Float(20.0)],
                vec!["Tete".into(), Value::Null],
            ],
        );
        let view = AggregateView::new("m", &["province"], Measure::Mean("duration".into()));
        let grouped = aggregate(&t, &view).unwrap();

        assert_eq!(grouped.get(&["Gaza".into()]), Some(&MeasureValue::Mean(Some(15.0))));
        let tete = grouped.get(&["Tete".into()]).unwrap();
        assert!(tete.is_not_available());
        assert_ne!(*tete, MeasureValue::Mean(Some(0.0)));
        assert_eq!(tete.to_string(), "N/A");
    }

    #[test]
    fn nunique_ignores_nulls_and_duplicates() {
        let t = table(
            &["category", "userId"],
            vec![
                vec!["A".into(), "u1".into()],
                vec!["A".into(), "u1".into()],
                vec!["A".into(), "u2".into()],
                vec!["A".into(), Value::Null],
            ],
        );
        let view = AggregateView::new("u", &["category"], Measure::NUnique("userId".into()));
        let grouped = aggregate(&t, &view).unwrap();
        assert_eq!(grouped.get(&["A".into()]), Some(&MeasureValue::Count(2)));
    }

    #[test]
    fn unknown_group_or_measure_column_fails() {
        let t = table(&["category"], vec![vec!["A".into()]]);
        let bad_key = AggregateView::new("x", &["province"], Measure::Count);
        assert!(matches!(
            aggregate(&t, &bad_key),
            Err(DashboardError::UnknownColumn(c)) if c == "province"
        ));

        let bad_measure = AggregateView::new("x", &["category"], Measure::Mean("duration".into()));
        assert!(matches!(
            aggregate(&t, &bad_measure),
            Err(DashboardError::UnknownColumn(c)) if c == "duration"
        ));
    }

    #[test]
    fn empty_table_yields_no_groups() {
        let t = table(&["category"], vec![]);
        let grouped = aggregate(&t, &AggregateView::new("e", &["category"], Measure::Count)).unwrap();
        assert!(grouped.is_empty());
    }

    #[test]
    fn summarize_whole_table() {
        let t = table(
            &["userId", "duration"],
            vec![
                vec!["u1".into(), Value::Integer(4)],
                vec!["u1".into(), Value::Null],
                vec!["u2".into(), Value::Integer(8)],
            ],
        );
        assert_eq!(
            summarize(&t, &Measure::NUnique("userId".into())).unwrap(),
            MeasureValue::Count(2)
        );
        assert_eq!(
            summarize(&t, &Measure::Mean("duration".into())).unwrap(),
            MeasureValue::Mean(Some(6.0))
        );
        let empty = t.select_rows(&[]);
        assert_eq!(
            summarize(&empty, &Measure::Mean("duration".into())).unwrap(),
            MeasureValue::Mean(None)
        );
    }
}
