use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::warn;
use serde::Deserialize;

use crate::data::aggregate::AggregateView;
use crate::data::filter::FilterSpec;
use crate::data::loader::LoaderOptions;
use crate::data::model::{Table, Value};
use crate::data::views::{dashboard_views, view_by_name};
use crate::error::{DashboardError, Result};

// ---------------------------------------------------------------------------
// DashboardConfig – optional JSON file
// ---------------------------------------------------------------------------

/// Settings read from a JSON file; every field is optional.
///
/// ```json
/// {
///   "data_path": "dashboard_data.csv",
///   "delimiter": ",",
///   "date_columns": ["date", "createdAt"],
///   "filters": {
///     "date_from": "2024-01-01",
///     "duration_max": 600,
///     "select": { "province": ["Maputo", "Gaza"] }
///   },
///   "views": ["province_categories", "chat_types"]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub data_path: Option<PathBuf>,
    pub delimiter: Option<char>,
    pub date_columns: Option<Vec<String>>,
    pub filters: FilterOverrides,
    /// Names of dashboard views to evaluate; empty = all.
    pub views: Vec<String>,
}

/// Changes applied on top of the widget defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterOverrides {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub duration_min: Option<f64>,
    pub duration_max: Option<f64>,
    /// column → values, matched against each value's text form.
    pub select: BTreeMap<String, Vec<String>>,
}

impl DashboardConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DashboardError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| DashboardError::Config(format!("invalid dashboard config: {e}")))
    }

    pub fn loader_options(&self) -> Result<LoaderOptions> {
        let mut options = LoaderOptions::default();
        if let Some(delimiter) = self.delimiter {
            if !delimiter.is_ascii() {
                return Err(DashboardError::Config(format!(
                    "delimiter must be a single ASCII character, got {delimiter:?}"
                )));
            }
            options.delimiter = delimiter as u8;
        }
        if let Some(columns) = &self.date_columns {
            options.date_columns = columns.iter().cloned().collect();
        }
        Ok(options)
    }

    /// Views to evaluate, in the order listed (all dashboard views when none listed).
    pub fn selected_views(&self) -> Result<Vec<AggregateView>> {
        if self.views.is_empty() {
            return Ok(dashboard_views());
        }
        self.views
            .iter()
            .map(|name| {
                view_by_name(name)
                    .ok_or_else(|| DashboardError::Config(format!("unknown view '{name}'")))
            })
            .collect()
    }
}

impl FilterOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Start from the table's defaults and apply the overrides.
    ///
    /// Selected values are matched by their displayed text against the
    /// column's observed values; text matching nothing is dropped with a warning.
    pub fn to_spec(&self, table: &Table) -> FilterSpec {
        let mut spec = FilterSpec::from_table(table);

        if self.date_from.is_some() || self.date_to.is_some() {
            let (default_start, default_end) = match spec.date_range {
                Some(r) => (r.start, r.end),
                None => (NaiveDate::MIN, NaiveDate::MAX),
            };
            spec = spec.with_date_range(
                self.date_from.unwrap_or(default_start),
                self.date_to.unwrap_or(default_end),
            );
        }

        if self.duration_min.is_some() || self.duration_max.is_some() {
            let (default_min, default_max) = match spec.duration_range {
                Some(r) => (r.min, r.max),
                None => (f64::NEG_INFINITY, f64::INFINITY),
            };
            spec = spec.with_duration_range(
                self.duration_min.unwrap_or(default_min),
                self.duration_max.unwrap_or(default_max),
            );
        }

        for (column, wanted) in &self.select {
            let observed = table.distinct_values(column).ok();
            let selected: BTreeSet<Value> = wanted
                .iter()
                .filter_map(|text| {
                    let hit = observed
                        .and_then(|vals| vals.iter().find(|v| v.to_string() == *text))
                        .cloned();
                    if hit.is_none() {
                        warn!("'{text}' is not an observed value of '{column}', ignoring");
                    }
                    hit
                })
                .collect();
            spec = spec.select(column, selected);
        }

        spec
    }
}
