use std::fmt;

use serde::Serialize;

use crate::data::aggregate::{AggregateView, GroupedTable};
use crate::data::filter::{FilterSpec, filter};
use crate::data::model::Table;
use crate::data::views::{Kpis, evaluate_views};

// ---------------------------------------------------------------------------
// Report – everything one dashboard refresh produces
// ---------------------------------------------------------------------------

/// One view's outcome as shown to the reader.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ViewOutcome {
    Ok(GroupedTable),
    Failed { view: String, error: String },
}

/// Output of one filter + aggregate pass.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub source: String,
    pub total_rows: usize,
    pub filtered_rows: usize,
    pub kpis: Kpis,
    pub views: Vec<ViewOutcome>,
}

impl DashboardReport {
    /// Filter `table` with `spec`, then compute the KPIs and every view from the subset.
    ///
    /// A missing column never aborts the refresh: the KPI reads `N/A` and a
    /// view records the mismatch in its own outcome.
    pub fn build(
        source: &str,
        table: &Table,
        spec: &FilterSpec,
        views: &[AggregateView],
    ) -> Self {
        let filtered = filter(table, spec);
        let kpis = Kpis::compute(&filtered);
        let views = evaluate_views(&filtered, views)
            .into_iter()
            .map(|v| match v.result {
                Ok(grouped) => ViewOutcome::Ok(grouped),
                Err(e) => ViewOutcome::Failed {
                    view: v.view.name,
                    error: e.to_string(),
                },
            })
            .collect();

        DashboardReport {
            source: source.to_string(),
            total_rows: table.len(),
            filtered_rows: filtered.len(),
            kpis,
            views,
        }
    }

    pub fn failed_views(&self) -> usize {
        self.views
            .iter()
            .filter(|v| matches!(v, ViewOutcome::Failed { .. }))
            .count()
    }
}

impl fmt::Display for DashboardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Source: {}", self.source)?;
        writeln!(f, "Rows: {} of {}", self.filtered_rows, self.total_rows)?;
        writeln!(f)?;
        writeln!(f, "Total Users: {}", self.kpis.total_users_label())?;
        writeln!(f, "Total Calls: {}", self.kpis.total_calls_label())?;
        writeln!(f, "Total Chats: {}", self.kpis.total_chats_label())?;
        writeln!(f, "Avg Call Duration (sec): {}", self.kpis.avg_duration_label())?;
        for view in &self.views {
            writeln!(f)?;
            match view {
                ViewOutcome::Ok(grouped) => write!(f, "{grouped}")?,
                ViewOutcome::Failed { view, error } => writeln!(f, "{view}: unavailable ({error})")?,
            }
        }
        Ok(())
    }
}
