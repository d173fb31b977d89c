use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use log::info;

use helpline_dashboard::config::DashboardConfig;
use helpline_dashboard::{DashboardReport, DatasetCache};

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(about = "Summarize call/chat support-center records the way the dashboard charts them.")]
struct Args {
    /// Data file (.csv, .tsv, .json or .parquet). Overrides `data_path` from the config.
    data: Option<PathBuf>,

    /// JSON config with loader options, filter overrides and views.
    #[arg(long)]
    config: Option<PathBuf>,

    /// First day to include (YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Only evaluate these views (repeatable).
    #[arg(long = "view")]
    views: Vec<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DashboardConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DashboardConfig::default(),
    };
    if args.from.is_some() {
        config.filters.date_from = args.from;
    }
    if args.to.is_some() {
        config.filters.date_to = args.to;
    }
    if !args.views.is_empty() {
        config.views = args.views.clone();
    }

    let Some(data_path) = args.data.clone().or_else(|| config.data_path.clone()) else {
        bail!("no data file given (pass a path or set data_path in the config)");
    };

    let options = config.loader_options()?;
    let views = config.selected_views()?;
    let table = DatasetCache::global().get_or_load(&data_path, &options)?;
    let spec = config.filters.to_spec(&table);
    info!("filter: {spec:?}");

    let report = DashboardReport::build(&data_path.display().to_string(), &table, &spec, &views);
    match args.format {
        OutputFormat::Text => print!("{report}"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
