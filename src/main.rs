use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use teotil_report::aggregate::RegionAggregator;
use teotil_report::config::{ConfigOverrides, ReportConfig};
use teotil_report::export::SpreadsheetExporter;
use teotil_report::reconcile::{BatchSummary, FailurePolicy, OverlapPolicy};

#[derive(Parser)]
#[command(name = "teotil-report")]
#[command(about = "Build the per-region nutrient load tables for the annual report", long_about = None)]
struct Cli {
    /// Report configuration file
    #[arg(long, env = "TEOTIL_CONFIG", default_value = "teotil_report.toml", global = true)]
    config: PathBuf,

    /// Report year, substituted for {year} in configured paths
    #[arg(long, env = "TEOTIL_REPORT_YEAR", global = true)]
    report_year: Option<i32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge legacy tables for the historical window with the current tables
    Reconcile(ReconcileArgs),
    /// Write the merged tables into one workbook, one sheet per table
    Export(ExportArgs),
    /// Build the current region tables from per-catchment model results
    Aggregate(AggregateArgs),
    /// Validate the configuration and print what it contains
    CheckConfig,
}

#[derive(Args)]
struct ReconcileArgs {
    /// First year taken from the legacy tables
    #[arg(long, env = "TEOTIL_WINDOW_START")]
    window_start: Option<i32>,

    /// Last year taken from the legacy tables
    #[arg(long, env = "TEOTIL_WINDOW_END")]
    window_end: Option<i32>,

    #[arg(long, env = "TEOTIL_LEGACY_DIR")]
    legacy_dir: Option<PathBuf>,

    #[arg(long, env = "TEOTIL_CURRENT_DIR")]
    current_dir: Option<PathBuf>,

    #[arg(long, env = "TEOTIL_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Baseline file (replaces the configured path; needs a [baseline] section)
    #[arg(long, env = "TEOTIL_BASELINE")]
    baseline: Option<PathBuf>,

    /// Stop at the first failing pair instead of reporting every failure
    #[arg(long)]
    fail_fast: bool,

    /// Drop current rows that fall inside the legacy window instead of failing the pair
    #[arg(long)]
    discard_overlap: bool,

    /// Print the summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ExportArgs {
    /// Directory holding the tables (default: the reconcile output directory)
    #[arg(long, env = "TEOTIL_EXPORT_DIR")]
    data_dir: Option<PathBuf>,

    /// Workbook to write (default: workbook_path from the config)
    #[arg(long, env = "TEOTIL_WORKBOOK")]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct AggregateArgs {
    /// Directory with teotil2_results_<year>.csv files
    #[arg(long, env = "TEOTIL_RESULTS_DIR")]
    results_dir: Option<PathBuf>,

    /// Directory for the region tables (default: current_dir from the config)
    #[arg(long, env = "TEOTIL_CURRENT_DIR")]
    current_dir: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists (ignore errors if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,teotil_report=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let mut overrides = ConfigOverrides {
        report_year: cli.report_year,
        ..Default::default()
    };

    match cli.command {
        Command::Reconcile(args) => {
            overrides.window_start = args.window_start;
            overrides.window_end = args.window_end;
            overrides.legacy_dir = args.legacy_dir.clone();
            overrides.current_dir = args.current_dir.clone();
            overrides.output_dir = args.output_dir.clone();
            overrides.baseline_path = args.baseline.clone();
            let config = ReportConfig::resolve(&cli.config, &overrides)?;
            run_reconcile(&config, &args)?;
        }
        Command::Export(args) => {
            overrides.workbook_path = args.output.clone();
            let config = ReportConfig::resolve(&cli.config, &overrides)?;
            run_export(&config, args.data_dir)?;
        }
        Command::Aggregate(args) => {
            overrides.results_dir = args.results_dir.clone();
            overrides.current_dir = args.current_dir.clone();
            let config = ReportConfig::resolve(&cli.config, &overrides)?;
            run_aggregate(&config)?;
        }
        Command::CheckConfig => {
            let config = ReportConfig::resolve(&cli.config, &overrides)?;
            print_config(&config);
        }
    }

    Ok(())
}

fn run_reconcile(
    config: &ReportConfig,
    args: &ReconcileArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let failure_policy = if args.fail_fast {
        FailurePolicy::FailFast
    } else {
        FailurePolicy::ContinueAndReport
    };
    let overlap_policy = if args.discard_overlap {
        OverlapPolicy::DiscardCurrent
    } else {
        OverlapPolicy::Fail
    };

    let reconciler = config
        .reconciler()?
        .with_failure_policy(failure_policy)
        .with_overlap_policy(overlap_policy);

    info!(
        "Reconciling {} pairs: legacy {} years {}, current {}, output {}",
        reconciler.mapping().len(),
        config.legacy_dir.display(),
        config.window,
        config.current_dir.display(),
        config.output_dir.display()
    );

    let start_time = Instant::now();
    let pb = ProgressBar::new(reconciler.mapping().len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    let summary = reconciler.reconcile_all(|entry, _outcome| {
        pb.set_message(entry.current.clone());
        pb.inc(1);
    });
    pb.finish_and_clear();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, start_time.elapsed().as_secs_f64());
    }

    if summary.is_success() {
        Ok(())
    } else {
        error!(
            "{} of {} pairs failed",
            summary.failed.len(),
            reconciler.mapping().len()
        );
        Err(format!(
            "reconciliation incomplete: {} failed, {} not attempted",
            summary.failed.len(),
            summary.skipped
        )
        .into())
    }
}

fn print_summary(summary: &BatchSummary, seconds: f64) {
    println!("\n{}", "=".repeat(60));
    println!("Reconciliation Summary");
    println!("{}", "=".repeat(60));
    for merged in &summary.merged {
        println!(
            "  ✓ {:<36} {:>1} baseline + {:>3} legacy + {:>3} current",
            merged.pair, merged.baseline_rows, merged.legacy_rows, merged.current_rows
        );
    }
    for failed in &summary.failed {
        println!("  ✗ {:<36} {}", failed.pair, failed.error);
    }
    println!("{}", "-".repeat(60));
    println!("Merged:             {}", summary.merged.len());
    println!("Failed:             {}", summary.failed.len());
    println!("Not attempted:      {}", summary.skipped);
    println!("Total Time:         {seconds:.2}s");
    println!("{}", "=".repeat(60));
}

fn run_export(
    config: &ReportConfig,
    data_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = data_dir.unwrap_or_else(|| config.output_dir.clone());
    let output = config.workbook_path()?;

    info!(
        "Exporting tables from {} to {}",
        data_dir.display(),
        output.display()
    );

    let regions = config.region_names();
    let exporter = SpreadsheetExporter::new(&data_dir);
    let summary = exporter.export_workbook(regions.as_slice(), &config.parameters, output)?;

    println!(
        "✓ Wrote {} sheets to {}",
        summary.sheets.len(),
        summary.workbook.display()
    );
    Ok(())
}

fn run_aggregate(config: &ReportConfig) -> Result<(), Box<dyn std::error::Error>> {
    let settings = config.aggregate_settings()?;
    let last_year = config.aggregate_last_year().unwrap_or(config.report_year);

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!(
        "Aggregating catchment results {}-{last_year}...",
        settings.first_year
    ));

    let aggregator = RegionAggregator::new(&settings.results_dir, settings.first_year, last_year)?
        .with_year_column(config.year_column.clone());
    let written =
        aggregator.write_region_tables(&config.regions, &config.parameters, &config.current_dir)?;

    pb.finish_with_message(format!(
        "✓ Wrote {} region tables to {}",
        written.len(),
        config.current_dir.display()
    ));
    Ok(())
}

fn print_config(config: &ReportConfig) {
    let identity = config
        .filename_map
        .iter()
        .filter(|e| e.is_identity())
        .count();

    println!("Report year:        {}", config.report_year);
    println!("Legacy window:      {}", config.window);
    println!("Year column:        {}", config.year_column);
    println!("Legacy tables:      {}", config.legacy_dir.display());
    println!("Current tables:     {}", config.current_dir.display());
    println!("Merged tables:      {}", config.output_dir.display());
    if let Some(path) = &config.workbook_path {
        println!("Workbook:           {}", path.display());
    }
    if let Some(baseline) = &config.baseline {
        println!(
            "Baseline:           {} ({}, keyed by {})",
            baseline.path.display(),
            baseline.year,
            baseline.key_column
        );
    }
    println!(
        "Parameters:         {}",
        config
            .parameters
            .iter()
            .map(|p| p.suffix())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "Mapping entries:    {} ({} unchanged names)",
        config.filename_map.len(),
        identity
    );
    for (from, to) in config.renames.iter() {
        println!("Column rename:      {from} -> {to}");
    }
    println!("Regions:");
    for region in &config.regions {
        match &region.catchments {
            Some(span) => println!(
                "  {:<30} catchments {:03}-{:03} {:?}",
                region.name,
                span.from,
                span.to.saturating_sub(1),
                span.extra
            ),
            None => println!("  {}", region.name),
        }
    }
}
