//! Filter-and-aggregate core for the helpline support-center dashboard.
//!
//! A flat file of call/chat records is loaded once into an immutable
//! [`Table`]; each user interaction builds a [`FilterSpec`], and every chart
//! asks [`aggregate`] for its grouped summary of the filtered rows.

pub mod config;
pub mod data;
pub mod error;
pub mod report;

pub use data::aggregate::{AggregateView, GroupedTable, Measure, MeasureValue, aggregate, summarize};
pub use data::filter::{DateRange, FilterSpec, NumericRange, filter, filtered_indices};
pub use data::loader::{DatasetCache, LoaderOptions, load, load_file};
pub use data::model::{Record, Table, Value, ValueRange};
pub use data::views::{Kpis, dashboard_views, evaluate_views};
pub use error::{DashboardError, Result};
pub use report::DashboardReport;
