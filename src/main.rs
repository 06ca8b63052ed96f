use clap::Parser;
use fuel_analytics::analyzer::{Analyzer, AnalyzerImpl};
use fuel_analytics::commands::handle_command;
use fuel_analytics::config::{load_config_or_default, AppConfig};
use fuel_analytics::ingest::ingest_all;
use fuel_analytics::model::{AnalysisError, Product, SortOrder};
use fuel_analytics::parser::{export_csv, FuelCsvParser, Parser as RecordParser};
use fuel_analytics::storage::{RecordFilter, RecordStore, SqliteStorage};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Nigerian fuel price analytics.
///
/// With a trailing command (e.g. `/top PMS desc`) the answer is printed as JSON
/// and the process exits; without one it logs a price digest on an interval.
#[derive(Parser, Debug)]
#[command(name = "fuel-analytics", version, about)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// CSV file to import before doing anything else
    #[arg(long)]
    import: Option<PathBuf>,

    /// Write every stored record to this CSV file and exit
    #[arg(long)]
    export: Option<PathBuf>,

    /// Command to run once, e.g. `/weekly PMS`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration before logging so the configured level applies
    let loaded = load_config_or_default(&cli.config);
    let level = loaded
        .as_ref()
        .map(|cfg| cfg.log_level.as_str())
        .unwrap_or("info");
    init_tracing(level);

    // Set panic hook to log details about any panic
    std::panic::set_hook(Box::new(|panic_info| {
        error!("Panic occurred: {}", panic_info);
    }));

    let config: Arc<AppConfig> = match loaded {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("Config load error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let storage: Arc<dyn RecordStore> = match SqliteStorage::new(&config.database_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to initialize storage: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = cli.import.as_ref().or(config.import_path.as_ref()) {
        if let Err(e) = import_file(path, storage.as_ref()).await {
            error!("Import of {} failed: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    }

    if let Some(path) = cli.export.as_ref() {
        return match export_file(path, storage.as_ref()).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Export to {} failed: {}", path.display(), e);
                ExitCode::FAILURE
            }
        };
    }

    let analyzer = AnalyzerImpl::new(storage);

    if !cli.command.is_empty() {
        let response = handle_command(&cli.command.join(" "), &analyzer).await;
        match serde_json::to_string_pretty(&response.body) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to render response: {}", e),
        }
        return if response.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    loop {
        info!("Building price digest...");
        if let Err(e) = log_digest(&analyzer, &config).await {
            warn!("Digest failed: {}", e);
        }

        info!(
            "Waiting for timer ({}s) or Ctrl-C...",
            config.report_interval_seconds
        );
        tokio::select! {
            _ = sleep(Duration::from_secs(config.report_interval_seconds)) => {
                info!("Timer triggered.");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down.");
                break;
            }
        }
    }

    ExitCode::SUCCESS
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parses the CSV file and stores every valid row.
async fn import_file(
    path: &Path,
    store: &dyn RecordStore,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Importing {}", path.display());
    let text = tokio::fs::read_to_string(path).await?;
    let records = FuelCsvParser::new().parse(&text)?;
    info!("Parsed {} rows", records.len());
    ingest_all(store, records).await?;
    Ok(())
}

async fn export_file(
    path: &Path,
    store: &dyn RecordStore,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = store.find_all(&RecordFilter::new()).await?;
    tokio::fs::write(path, export_csv(&records)?).await?;
    info!("Exported {} records to {}", records.len(), path.display());
    Ok(())
}

fn format_percentage(value: Option<f64>) -> String {
    value
        .map(|p| format!("{:+.2}%", p))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Logs the summary, averages, rankings and watched-state changes.
async fn log_digest(analyzer: &AnalyzerImpl, config: &AppConfig) -> Result<(), AnalysisError> {
    let total = analyzer.record_store().count(&RecordFilter::new()).await?;
    info!("Store holds {} records", total);

    for entry in analyzer.summary().await? {
        info!(
            "{}: {:.2} -> {:.2} ({:+.2}, {}) {:?}",
            entry.product,
            entry.previous_price,
            entry.current_price,
            entry.value_change,
            format_percentage(entry.percentage_change),
            entry.trend_direction
        );
    }

    let national = analyzer.national_average().await?;
    info!(
        "National average: PMS {:?} | AGO {:?} | DPK {:?} | LPG {:?}",
        national.avg_pms, national.avg_ago, national.avg_dpk, national.avg_lpg
    );

    for region in analyzer.average_by_region().await? {
        info!("{}: PMS average {:?}", region.region, region.avg_pms);
    }

    for product in Product::ALL {
        let top = analyzer.top_states(product.code(), SortOrder::Desc).await?;
        let ranking: Vec<String> = top
            .iter()
            .map(|s| format!("{} {:.2}", s.state, s.value))
            .collect();
        info!("Most expensive {}: {}", product, ranking.join(", "));
    }

    for state in &config.watch_states {
        for product in Product::ALL {
            match analyzer
                .price_change(state, product, config.price_change_window_days)
                .await?
            {
                Some(change) => info!(
                    "{} {} over {}d: {:.2} -> {:.2} ({})",
                    state,
                    product,
                    config.price_change_window_days,
                    change.previous_price,
                    change.current_price,
                    format_percentage(change.percentage_change)
                ),
                None => info!("{} {}: insufficient data", state, product),
            }
        }
    }

    let weekly = analyzer.weekly_report(Product::Pms.code()).await?;
    info!("Weekly PMS report covers {} states", weekly.len());

    Ok(())
}
