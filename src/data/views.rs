//! The fixed set of summaries the dashboard charts are drawn from.

use log::warn;
use serde::Serialize;

use super::aggregate::{AggregateView, GroupedTable, Measure, MeasureValue, aggregate, summarize};
use super::model::Table;
use crate::error::{DashboardError, Result};

// ---------------------------------------------------------------------------
// KPI strip
// ---------------------------------------------------------------------------

/// Headline numbers shown above the charts.
///
/// Each figure is computed on its own: a dataset lacking `chatId` still
/// reports users, calls and duration, with chats as `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    /// Distinct `userId` values.
    pub total_users: Option<u64>,
    /// Rows with a `callId`.
    pub total_calls: Option<u64>,
    /// Rows with a `chatId`.
    pub total_chats: Option<u64>,
    /// Mean `duration` in seconds; `None` when no row has one.
    pub avg_duration: Option<f64>,
}

impl Kpis {
    pub fn compute(table: &Table) -> Self {
        let count = |measure: Measure| summarize_kpi(table, measure).and_then(|v| v.as_count());
        Kpis {
            total_users: count(Measure::NUnique("userId".into())),
            total_calls: count(Measure::CountNonNull("callId".into())),
            total_chats: count(Measure::CountNonNull("chatId".into())),
            avg_duration: summarize_kpi(table, Measure::Mean("duration".into()))
                .and_then(|v| v.as_mean()),
        }
    }

    pub fn total_users_label(&self) -> String {
        count_label(self.total_users)
    }

    pub fn total_calls_label(&self) -> String {
        count_label(self.total_calls)
    }

    pub fn total_chats_label(&self) -> String {
        count_label(self.total_chats)
    }

    /// Average duration formatted for display, `N/A` when missing.
    pub fn avg_duration_label(&self) -> String {
        match self.avg_duration {
            Some(d) => format!("{d:.2}"),
            None => "N/A".to_string(),
        }
    }
}

fn summarize_kpi(table: &Table, measure: Measure) -> Option<MeasureValue> {
    let column = measure.column()?;
    if !table.has_column(column) {
        warn!("KPI unavailable: dataset has no '{column}' column");
        return None;
    }
    summarize(table, &measure).ok()
}

fn count_label(count: Option<u64>) -> String {
    count.map_or_else(|| "N/A".to_string(), |n| n.to_string())
}

// ---------------------------------------------------------------------------
// Chart views
// ---------------------------------------------------------------------------

/// Stacked bar: province × category counts.
pub fn province_categories() -> AggregateView {
    AggregateView::new("province_categories", &["province", "category"], Measure::Count)
}

/// Pie: share of each chat type.
pub fn chat_types() -> AggregateView {
    AggregateView::new("chat_types", &["chatType"], Measure::Count)
}

/// Line: chats per timestamp.
pub fn chats_over_time() -> AggregateView {
    AggregateView::new(
        "chats_over_time",
        &["date"],
        Measure::CountNonNull("chatId".into()),
    )
}

/// Map markers sized by the number of cases at each location.
pub fn geo_cases() -> AggregateView {
    AggregateView::new(
        "geo_cases",
        &[
            "latitude",
            "longitude",
            "category",
            "countryName",
            "province",
            "thoroughfare",
        ],
        Measure::Count,
    )
}

/// Sunburst drill-down rooted at province.
pub fn province_drilldown() -> AggregateView {
    AggregateView::new(
        "province_drilldown",
        &["province", "category", "chatType", "gender"],
        Measure::Count,
    )
}

/// Sunburst drill-down rooted at country.
pub fn country_drilldown() -> AggregateView {
    AggregateView::new(
        "country_drilldown",
        &["countryName", "gender", "category", "chatType"],
        Measure::Count,
    )
}

/// Mean call duration per province.
pub fn duration_by_province() -> AggregateView {
    AggregateView::new(
        "duration_by_province",
        &["province"],
        Measure::Mean("duration".into()),
    )
}

/// Distinct users reaching out per category.
pub fn users_by_category() -> AggregateView {
    AggregateView::new(
        "users_by_category",
        &["category"],
        Measure::NUnique("userId".into()),
    )
}

/// Every view the dashboard renders, in page order.
pub fn dashboard_views() -> Vec<AggregateView> {
    vec![
        province_categories(),
        chat_types(),
        chats_over_time(),
        geo_cases(),
        province_drilldown(),
        country_drilldown(),
        duration_by_province(),
        users_by_category(),
    ]
}

/// Look up a dashboard view by name.
pub fn view_by_name(name: &str) -> Option<AggregateView> {
    dashboard_views().into_iter().find(|v| v.name == name)
}

/// Outcome of evaluating one named view.
#[derive(Debug)]
pub struct ViewResult {
    pub view: AggregateView,
    pub result: Result<GroupedTable>,
}

/// Evaluate each view on its own. A missing column fails only the view that
/// needs it, as `SchemaMismatch` naming the first absent column.
pub fn evaluate_views(table: &Table, views: &[AggregateView]) -> Vec<ViewResult> {
    views
        .iter()
        .map(|view| {
            let result = match check_columns(table, view) {
                Ok(()) => aggregate(table, view).map_err(|e| schema_mismatch(&view.name, e)),
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                warn!("{e}");
            }
            ViewResult {
                view: view.clone(),
                result,
            }
        })
        .collect()
}

fn check_columns(table: &Table, view: &AggregateView) -> Result<()> {
    match view.required_columns().find(|c| !table.has_column(c)) {
        Some(column) => Err(DashboardError::SchemaMismatch {
            view: view.name.clone(),
            column: column.to_string(),
        }),
        None => Ok(()),
    }
}

fn schema_mismatch(view: &str, err: DashboardError) -> DashboardError {
    match err {
        DashboardError::UnknownColumn(column) => DashboardError::SchemaMismatch {
            view: view.to_string(),
            column,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Record, Value};
    use std::collections::BTreeSet;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table::new(
            columns.iter().map(|c| c.to_string()).collect(),
            BTreeSet::new(),
            rows.into_iter().map(Record::new).collect(),
        )
    }

    fn interactions() -> Table {
        table(
            &["userId", "callId", "chatId", "duration", "province", "category"],
            vec![
                vec!["u1".into(), "c1".into(), Value::Null, Value::Integer(100), "Gaza".into(), "A".into()],
                vec!["u1".into(), Value::Null, "h1".into(), Value::Null, "Gaza".into(), "B".into()],
                vec!["u2".into(), "c2".into(), Value::Null, Value::Integer(50), "Tete".into(), "A".into()],
            ],
        )
    }

    #[test]
    fn kpis_count_users_calls_and_chats() {
        let kpis = Kpis::compute(&interactions());
        assert_eq!(
            kpis,
            Kpis {
                total_users: Some(2),
                total_calls: Some(2),
                total_chats: Some(1),
                avg_duration: Some(75.0),
            }
        );
        assert_eq!(kpis.avg_duration_label(), "75.00");
    }

    #[test]
    fn kpis_on_empty_table_report_not_available() {
        let kpis = Kpis::compute(&interactions().select_rows(&[]));
        assert_eq!(kpis.total_users, Some(0));
        assert_eq!(kpis.avg_duration, None);
        assert_eq!(kpis.avg_duration_label(), "N/A");
    }

    #[test]
    fn missing_kpi_column_blanks_only_that_figure() {
        let t = table(
            &["userId", "callId", "duration"],
            vec![
                vec!["u1".into(), "c1".into(), Value::Integer(40)],
                vec!["u2".into(), "c2".into(), Value::Integer(20)],
            ],
        );
        let kpis = Kpis::compute(&t);
        assert_eq!(kpis.total_users, Some(2));
        assert_eq!(kpis.total_calls, Some(2));
        assert_eq!(kpis.total_chats, None);
        assert_eq!(kpis.avg_duration, Some(30.0));
        assert_eq!(kpis.total_chats_label(), "N/A");
        assert_eq!(kpis.total_calls_label(), "2");
    }

    #[test]
    fn first_missing_column_names_the_mismatch() {
        let t = table(&["province"], vec![vec!["Gaza".into()]]);
        let results = evaluate_views(&t, &[province_categories(), duration_by_province()]);
        assert!(matches!(
            &results[0].result,
            Err(DashboardError::SchemaMismatch { view, column }) if view == "province_categories" && column == "category"
        ));
        assert!(matches!(
            &results[1].result,
            Err(DashboardError::SchemaMismatch { view, column }) if view == "duration_by_province" && column == "duration"
        ));
    }

    #[test]
    fn missing_column_fails_only_its_view() {
        let views = vec![province_categories(), chat_types(), duration_by_province()];
        let results = evaluate_views(&interactions(), &views);
        assert_eq!(results.len(), 3);

        let bar = results[0].result.as_ref().unwrap();
        assert_eq!(bar.total_count(), 3);

        assert!(matches!(
            &results[1].result,
            Err(DashboardError::SchemaMismatch { view, column }) if view == "chat_types" && column == "chatType"
        ));

        let means = results[2].result.as_ref().unwrap();
        assert_eq!(means.rows.len(), 2);
    }

    #[test]
    fn views_are_addressable_by_name() {
        for view in dashboard_views() {
            assert_eq!(view_by_name(&view.name), Some(view.clone()));
        }
        assert_eq!(view_by_name("nope"), None);
    }
}
