use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{Context, anyhow, bail};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Date64Array, Float32Array, Float64Array,
    Int8Array, Int16Array, Int32Array, Int64Array, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray, UInt8Array,
    UInt16Array, UInt32Array, UInt64Array,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, TimeUnit};
use log::{debug, info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::dates::parse_datetime;
use super::model::{Record, Table, Value};
use crate::error::{DashboardError, Result};

/// Columns parsed as date/time unless the caller says otherwise.
pub const DEFAULT_DATE_COLUMNS: &[&str] = &["date", "createdAt"];

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How a source file is read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoaderOptions {
    /// Field delimiter for delimited-text sources.
    pub delimiter: u8,
    /// Columns whose text is parsed into temporal values.
    pub date_columns: BTreeSet<String>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            date_columns: DEFAULT_DATE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl LoaderOptions {
    fn is_date_column(&self, name: &str) -> bool {
        self.date_columns.contains(name)
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a dataset from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv` / `.tsv` / `.txt` – delimited text with a header row
/// * `.json`                  – `[{ "date": "...", "category": "...", ... }, ...]`
/// * `.parquet`               – flat scalar columns
///
/// Date cells that cannot be parsed become `Null`; they never fail the load.
pub fn load_file(path: &Path, options: &LoaderOptions) -> Result<Table> {
    if !path.exists() {
        return Err(DashboardError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" | "txt" => load_csv(path, options.delimiter, options)?,
        "tsv" => load_csv(path, b'\t', options)?,
        "json" => load_json(path, options)?,
        "parquet" | "pq" => load_parquet(path, options)?,
        other => return Err(DashboardError::UnsupportedFormat(other.to_string())),
    };

    info!(
        "loaded {} rows x {} columns from {}",
        table.len(),
        table.columns().len(),
        path.display()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Read-mostly cache of loaded tables keyed by canonical source path.
///
/// Each source is read at most once; later requests get the same `Arc`.
#[derive(Debug, Default)]
pub struct DatasetCache {
    entries: Mutex<HashMap<PathBuf, Arc<Table>>>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by [`load`].
    pub fn global() -> &'static DatasetCache {
        static CACHE: OnceLock<DatasetCache> = OnceLock::new();
        CACHE.get_or_init(DatasetCache::new)
    }

    /// Return the cached table for `path`, loading it on first request.
    pub fn get_or_load(&self, path: &Path, options: &LoaderOptions) -> Result<Arc<Table>> {
        let key = path
            .canonicalize()
            .map_err(|_| DashboardError::SourceNotFound {
                path: path.to_path_buf(),
            })?;

        // The lock is held across the load so two callers never read the same file twice.
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(table) = entries.get(&key) {
            debug!("dataset cache hit for {}", key.display());
            return Ok(Arc::clone(table));
        }

        let table = Arc::new(load_file(&key, options)?);
        entries.insert(key, Arc::clone(&table));
        Ok(table)
    }

    /// Drop a cached source so the next request re-reads it.
    pub fn invalidate(&self, path: &Path) -> bool {
        let Ok(key) = path.canonicalize() else {
            return false;
        };
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&key)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load `path` with default options through the process-wide cache.
pub fn load(path: impl AsRef<Path>) -> Result<Arc<Table>> {
    DatasetCache::global().get_or_load(path.as_ref(), &LoaderOptions::default())
}

// ---------------------------------------------------------------------------
// Cell conversion
// ---------------------------------------------------------------------------

/// Tracks how many date cells were coerced to null, per column.
#[derive(Default)]
struct CoercionLog {
    counts: BTreeMap<String, usize>,
}

impl CoercionLog {
    fn record(&mut self, column: &str) {
        *self.counts.entry(column.to_string()).or_default() += 1;
    }

    fn report(self) {
        for (column, count) in self.counts {
            warn!("{count} unparsable value(s) in date column '{column}' set to null");
        }
    }
}

fn date_cell(text: &str, column: &str, coerced: &mut CoercionLog) -> Value {
    if is_null_marker(text.trim()) {
        return Value::Null;
    }
    match parse_datetime(text) {
        Some(dt) => Value::Date(dt),
        None => {
            coerced.record(column);
            Value::Null
        }
    }
}

/// Cell text read as missing, matching the markers pandas treats as NA.
const NULL_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_null_marker(s: &str) -> bool {
    NULL_MARKERS.contains(&s)
}

fn guess_value_type(s: &str) -> Value {
    let s = s.trim();
    if is_null_marker(s) {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::Float(f);
    }
    match s {
        "true" | "True" => Value::Bool(true),
        "false" | "False" => Value::Bool(false),
        _ => Value::String(s.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Header row with column names; every other row is one record. Ragged rows
/// are tolerated: missing trailing cells become `Null`.
fn load_csv(path: &Path, delimiter: u8, options: &LoaderOptions) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;
    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let is_date: Vec<bool> = columns.iter().map(|c| options.is_date_column(c)).collect();

    let mut coerced = CoercionLog::default();
    let mut rows = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result
            .with_context(|| format!("CSV row {row_no}"))
            .map_err(DashboardError::Malformed)?;

        let cells = record
            .iter()
            .take(columns.len())
            .enumerate()
            .map(|(col_idx, text)| {
                if is_date[col_idx] {
                    date_cell(text, &columns[col_idx], &mut coerced)
                } else {
                    guess_value_type(text)
                }
            })
            .collect();
        rows.push(Record::new(cells));
    }

    coerced.report();
    let date_columns = date_columns_present(&columns, options);
    Ok(Table::new(columns, date_columns, rows))
}

fn date_columns_present(columns: &[String], options: &LoaderOptions) -> BTreeSet<String> {
    columns
        .iter()
        .filter(|c| options.is_date_column(c))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "date": "2024-01-05", "category": "Health", "duration": 120.0, "chatId": null },
///   ...
/// ]
/// ```
///
/// Column order is first-seen order across records; keys missing from a
/// record are `Null`.
fn load_json(path: &Path, options: &LoaderOptions) -> Result<Table> {
    let text = std::fs::read_to_string(path)?;
    let root: JsonValue = serde_json::from_str(&text)?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut raw_rows: Vec<Vec<(usize, &JsonValue)>> = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        let mut row = Vec::with_capacity(obj.len());
        for (key, val) in obj {
            let idx = *index.entry(key.clone()).or_insert_with(|| {
                columns.push(key.clone());
                columns.len() - 1
            });
            row.push((idx, val));
        }
        raw_rows.push(row);
    }

    let mut coerced = CoercionLog::default();
    let rows = raw_rows
        .into_iter()
        .map(|raw| {
            let mut cells = vec![Value::Null; columns.len()];
            for (idx, val) in raw {
                let column = &columns[idx];
                cells[idx] = if options.is_date_column(column) {
                    match val {
                        JsonValue::String(s) => date_cell(s, column, &mut coerced),
                        JsonValue::Null => Value::Null,
                        _ => {
                            coerced.record(column);
                            Value::Null
                        }
                    }
                } else {
                    json_to_value(val)
                };
            }
            Record::new(cells)
        })
        .collect();

    coerced.report();
    let date_columns = date_columns_present(&columns, options);
    Ok(Table::new(columns, date_columns, rows))
}

fn json_to_value(val: &JsonValue) -> Value {
    match val {
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Null => Value::Null,
        other => Value::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file of flat scalar columns.
///
/// Utf8 columns listed as date columns are parsed like CSV text; native
/// Arrow `Date32`/`Date64`/`Timestamp` columns are converted directly.
/// Dictionary-encoded columns (pandas categoricals) are decoded to their
/// values. Signed and unsigned integers of any width, `Float32`/`Float64`,
/// `Boolean` and the `Utf8`/`LargeUtf8`/`Utf8View` string types are read;
/// any other column type fails the load.
fn load_parquet(path: &Path, options: &LoaderOptions) -> Result<Table> {
    let file = std::fs::File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut coerced = CoercionLog::default();
    let mut rows = Vec::new();
    let mut temporal_columns: BTreeSet<String> = date_columns_present(&columns, options);

    for batch_result in reader {
        let batch = batch_result?;
        let n_rows = batch.num_rows();
        debug!("parquet batch with {n_rows} rows");
        let arrays = batch
            .columns()
            .iter()
            .map(decode_dictionary)
            .collect::<anyhow::Result<Vec<_>>>()?;

        for row in 0..n_rows {
            let mut cells = Vec::with_capacity(columns.len());
            for (col_idx, column) in columns.iter().enumerate() {
                let array = &arrays[col_idx];
                if is_temporal(array.data_type()) {
                    temporal_columns.insert(column.clone());
                }
                let value = extract_value(array, row)
                    .with_context(|| format!("Row {row}, column '{column}'"))?;
                let value = match value {
                    Value::String(s) if options.is_date_column(column) => {
                        date_cell(&s, column, &mut coerced)
                    }
                    other => other,
                };
                cells.push(value);
            }
            rows.push(Record::new(cells));
        }
    }

    coerced.report();
    Ok(Table::new(columns, temporal_columns, rows))
}

// -- Parquet / Arrow helpers --

fn is_temporal(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _)
    )
}

/// Decode a dictionary-encoded column to a plain array of its value type.
fn decode_dictionary(col: &ArrayRef) -> anyhow::Result<ArrayRef> {
    match col.data_type() {
        DataType::Dictionary(_, values) => Ok(cast(col, values)?),
        _ => Ok(Arc::clone(col)),
    }
}

fn downcast<'a, T: 'static>(col: &'a ArrayRef) -> anyhow::Result<&'a T> {
    col.as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| anyhow!("unexpected array layout for {:?}", col.data_type()))
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_value(col: &ArrayRef, row: usize) -> anyhow::Result<Value> {
    if col.is_null(row) {
        return Ok(Value::Null);
    }
    let value = match col.data_type() {
        DataType::Utf8 => Value::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Utf8View => Value::String(col.as_string_view().value(row).to_string()),
        DataType::Int8 => Value::Integer(downcast::<Int8Array>(col)?.value(row) as i64),
        DataType::Int16 => Value::Integer(downcast::<Int16Array>(col)?.value(row) as i64),
        DataType::Int32 => Value::Integer(downcast::<Int32Array>(col)?.value(row) as i64),
        DataType::Int64 => Value::Integer(downcast::<Int64Array>(col)?.value(row)),
        DataType::UInt8 => Value::Integer(downcast::<UInt8Array>(col)?.value(row) as i64),
        DataType::UInt16 => Value::Integer(downcast::<UInt16Array>(col)?.value(row) as i64),
        DataType::UInt32 => Value::Integer(downcast::<UInt32Array>(col)?.value(row) as i64),
        DataType::UInt64 => {
            let v = downcast::<UInt64Array>(col)?.value(row);
            i64::try_from(v).map_or(Value::Float(v as f64), Value::Integer)
        }
        DataType::Float32 => Value::Float(downcast::<Float32Array>(col)?.value(row) as f64),
        DataType::Float64 => Value::Float(downcast::<Float64Array>(col)?.value(row)),
        DataType::Boolean => Value::Bool(downcast::<BooleanArray>(col)?.value(row)),
        DataType::Date32 => temporal(downcast::<Date32Array>(col)?.value_as_datetime(row)),
        DataType::Date64 => temporal(downcast::<Date64Array>(col)?.value_as_datetime(row)),
        DataType::Timestamp(unit, _) => temporal(match unit {
            TimeUnit::Second => downcast::<TimestampSecondArray>(col)?.value_as_datetime(row),
            TimeUnit::Millisecond => {
                downcast::<TimestampMillisecondArray>(col)?.value_as_datetime(row)
            }
            TimeUnit::Microsecond => {
                downcast::<TimestampMicrosecondArray>(col)?.value_as_datetime(row)
            }
            TimeUnit::Nanosecond => {
                downcast::<TimestampNanosecondArray>(col)?.value_as_datetime(row)
            }
        }),
        other => bail!("unsupported column type {other:?}"),
    };
    Ok(value)
}

fn temporal(dt: Option<chrono::NaiveDateTime>) -> Value {
    dt.map(Value::Date).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn csv_keeps_column_order_and_coerces_bad_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "calls.csv",
            "userId,date,duration,category\n\
             u1,2024-01-05,120,Health\n\
             u2,garbage,,Legal\n\
             u1,,45.5,Health\n",
        );

        let table = load_file(&path, &LoaderOptions::default()).unwrap();
        assert_eq!(table.columns(), ["userId", "date", "duration", "category"]);
        assert_eq!(table.len(), 3);
        assert!(table.date_columns().contains("date"));

        let dates: Vec<_> = table.column_values("date").unwrap().cloned().collect();
        assert!(matches!(dates[0], Value::Date(_)));
        assert_eq!(dates[1], Value::Null);
        assert_eq!(dates[2], Value::Null);

        let durations: Vec<_> = table.column_values("duration").unwrap().cloned().collect();
        // 120 shares a column with 45.5, so it is read as a float.
        assert_eq!(durations, vec![Value::Float(120.0), Value::Null, Value::Float(45.5)]);
    }

    #[test]
    fn csv_ragged_rows_are_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "short.csv", "a,b,c\n1,2\n");
        let table = load_file(&path, &LoaderOptions::default()).unwrap();
        assert_eq!(
            table.rows()[0].cells,
            vec![Value::Integer(1), Value::Integer(2), Value::Null]
        );
    }

    #[test]
    fn csv_null_markers_read_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "markers.csv",
            "callId,chatId,date
             c1,NA,2024-01-05
             N/A,h1,#N/A
             None,<NA>,NaN
             c4,null,
",
        );
        let table = load_file(&path, &LoaderOptions::default()).unwrap();
        let calls: Vec<_> = table.column_values("callId").unwrap().cloned().collect();
        assert_eq!(
            calls,
            vec![Value::from("c1"), Value::Null, Value::Null, Value::from("c4")]
        );
        let chats: Vec<_> = table.column_values("chatId").unwrap().cloned().collect();
        assert_eq!(chats, vec![Value::Null, Value::from("h1"), Value::Null, Value::Null]);
        assert!(table.date_columns().contains("date"));
        assert_eq!(table.rows()[1].get(2), &Value::Null);
        // "NA" is not a real value, so it is not offered as a filter option.
        assert!(!table.distinct_values("chatId").unwrap().contains(&Value::from("NA")));
    }

    #[test]
    fn parquet_reads_narrow_integers_and_dictionaries() {
        use arrow::array::{DictionaryArray, StringArray};
        use arrow::datatypes::{Field, Int32Type, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typed.parquet");
        let category: DictionaryArray<Int32Type> =
            vec![Some("Health"), None, Some("Health")].into_iter().collect();
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int16Array::from(vec![23, 31, 45])),
            Arc::new(UInt8Array::from(vec![Some(1), Some(2), None])),
            Arc::new(UInt32Array::from(vec![160, 175, 170])),
            Arc::new(category),
            Arc::new(StringArray::from(vec!["u1", "u2", "u3"])),
        ];
        let schema = Arc::new(Schema::new(
            ["age", "visits", "height", "category", "userId"]
                .iter()
                .zip(&columns)
                .map(|(name, col)| Field::new(*name, col.data_type().clone(), true))
                .collect::<Vec<_>>(),
        ));
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
        let mut writer =
            ArrowWriter::try_new(std::fs::File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_file(&path, &LoaderOptions::default()).unwrap();
        assert_eq!(
            table.rows()[0].cells,
            vec![
                Value::Integer(23),
                Value::Integer(1),
                Value::Integer(160),
                Value::from("Health"),
                Value::from("u1"),
            ]
        );
        assert_eq!(table.rows()[1].get(3), &Value::Null);
        assert_eq!(table.rows()[2].get(1), &Value::Null);
        let categories: Vec<_> = table.distinct_values("category").unwrap().iter().cloned().collect();
        assert_eq!(categories, vec![Value::Null, Value::from("Health")]);
    }

    #[test]
    fn json_records_fill_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "rows.json",
            r#"[{"callId": "c1", "date": "2024-02-01"}, {"chatId": "h1", "date": 17}]"#,
        );
        let table = load_file(&path, &LoaderOptions::default()).unwrap();
        assert_eq!(table.columns(), ["callId", "date", "chatId"]);
        assert_eq!(table.rows()[0].get(2), &Value::Null);
        assert_eq!(table.rows()[1].get(0), &Value::Null);
        // A number in a date column is not a date.
        assert_eq!(table.rows()[1].get(1), &Value::Null);
    }

    #[test]
    fn json_must_be_an_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "obj.json", r#"{"date": "2024-02-01"}"#);
        assert!(matches!(
            load_file(&path, &LoaderOptions::default()),
            Err(DashboardError::Malformed(_))
        ));
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let err = load_file(Path::new("/definitely/not/here.csv"), &LoaderOptions::default())
            .unwrap_err();
        assert!(matches!(err, DashboardError::SourceNotFound { .. }));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "data.xlsx", "");
        assert!(matches!(
            load_file(&path, &LoaderOptions::default()),
            Err(DashboardError::UnsupportedFormat(ext)) if ext == "xlsx"
        ));
    }

    #[test]
    fn cache_returns_same_table_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "cached.csv", "category\nA\nB\n");
        let cache = DatasetCache::new();
        let options = LoaderOptions::default();

        let first = cache.get_or_load(&path, &options).unwrap();
        // Rewriting the file must not be observed while the entry is cached.
        write_file(&dir, "cached.csv", "category\nA\n");
        let second = cache.get_or_load(&path, &options).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 2);
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate(&path));
        let third = cache.get_or_load(&path, &options).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn cache_reports_missing_source() {
        let cache = DatasetCache::new();
        let err = cache
            .get_or_load(Path::new("/no/such/file.csv"), &LoaderOptions::default())
            .unwrap_err();
        assert!(matches!(err, DashboardError::SourceNotFound { .. }));
        assert!(cache.is_empty());
    }
}
