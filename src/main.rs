use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use cancer_incidence::app::incidence_use_case::IncidenceUseCase;
use cancer_incidence::config::Config;
use cancer_incidence::constants::DEFAULT_TOP_N;
use cancer_incidence::infra::cache_store::FsCacheStore;
use cancer_incidence::infra::credential::StaticCredential;
use cancer_incidence::infra::http_client::ReqwestHttp;
use cancer_incidence::logging;
use cancer_incidence::observability::metrics;
use cancer_incidence::pipeline::output::read_incidence_csv;
use cancer_incidence::pipeline::processing::views::buckets::bucket_view;
use cancer_incidence::pipeline::processing::views::ranking::{rank_buckets, rank_by_year, rank_year, RankMetric};
use cancer_incidence::pipeline::processing::views::recompute::{recompute, CancerSelection};
use cancer_incidence::pipeline::processing::views::ViewFilter;
use cancer_incidence::types::Sex;

const API_KEY_VAR: &str = "KOSIS_API_KEY";
const METRICS_PORT_VAR: &str = "INCIDENCE_METRICS_PORT";

#[derive(Parser)]
#[command(name = "cancer_incidence")]
#[command(about = "Age- and sex-stratified cancer incidence from KOSIS population and case tables")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch both series, reconcile them and write the CSV outputs
    Run {
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
        /// Overrides `output.dir` from the config
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Ignore and do not write the raw response cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Print bucket proportions and rankings from a final incidence CSV
    Views {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        sex: Sex,
        /// Restrict to a single year; all years otherwise
        #[arg(long)]
        year: Option<i32>,
        /// Cancer types left out of every view (repeatable)
        #[arg(long = "exclude-type")]
        exclude_types: Vec<String>,
        /// All-cancers aggregate to recompute with the excluded types removed
        #[arg(long)]
        primary: Option<String>,
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top: usize,
    },
}

fn init_metrics() {
    let Ok(raw) = std::env::var(METRICS_PORT_VAR) else { return };
    match raw.parse::<u16>() {
        Ok(port) => metrics::init(port),
        Err(_) => warn!("Ignoring {}={}: not a port number", METRICS_PORT_VAR, raw),
    }
}

async fn run_pipeline(config_path: PathBuf, output_dir: Option<PathBuf>, no_cache: bool) -> Result<()> {
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(&config.output.dir));

    let api_key = std::env::var(API_KEY_VAR).unwrap_or_else(|_| {
        warn!("{} is not set; only cached series will load", API_KEY_VAR);
        String::new()
    });

    let http = ReqwestHttp::new(Duration::from_secs(config.api.timeout_seconds)).context("building HTTP client")?;
    let cache = FsCacheStore::new(&config.output.cache_dir);
    let use_case = IncidenceUseCase::new(
        Arc::new(http),
        Arc::new(cache),
        Arc::new(StaticCredential::new(api_key)),
        config,
    );

    println!("🚀 Running incidence pipeline...");
    let run = use_case.run(!no_cache, Some(&output_dir)).await?;
    let summary = &run.summary;

    println!("\n📊 Pipeline Results:");
    println!("   Raw population rows: {}", summary.population_raw);
    println!("   Raw case rows: {}", summary.cancer_raw);
    println!("   Skipped rows: {}", summary.population_skipped + summary.cancer_skipped);
    println!("   Matched: {}", summary.matched);
    println!("   Missing population: {}", summary.unmatched);
    println!("   Output rows: {}", summary.output_rows);
    for skip in &summary.estimation_skips {
        println!("   ⚠️  80+ split skipped for {}: {:?}", skip.sex, skip.cause);
    }
    if let Some(outputs) = &summary.outputs {
        println!("   Output file: {}", outputs.final_table.display());
    }
    Ok(())
}

fn print_views(
    input: PathBuf,
    sex: Sex,
    year: Option<i32>,
    exclude_types: Vec<String>,
    primary: Option<String>,
    top: usize,
) -> Result<()> {
    let table = read_incidence_csv(&input).with_context(|| format!("reading {}", input.display()))?;
    info!("Loaded {} incidence rows from {}", table.len(), input.display());

    let mut filter = ViewFilter::new();
    if let Some(year) = year {
        filter = filter.years(year..=year);
    }
    for cancer_type in exclude_types.iter().chain(primary.iter()) {
        filter = filter.exclude(cancer_type.clone());
    }

    let rankings = match year {
        Some(year) => serde_json::to_value(rank_year(&table, year, sex, top, &filter))?,
        None => serde_json::to_value(rank_by_year(&table, sex, top, &filter))?,
    };

    let recomputed = match primary {
        Some(primary) => {
            let view = recompute(&table, &CancerSelection::Exclusion { primary, excluded: exclude_types })
                .restrict(sex, &filter);
            for warning in &view.warnings {
                warn!("{}", warning);
            }
            Some(serde_json::json!({ "rows": view.rows, "warnings": view.warnings }))
        }
        None => None,
    };

    let report = serde_json::json!({
        "sex": sex,
        "buckets": bucket_view(&table, sex, &filter),
        "bucket_rankings": rank_buckets(&table, sex, RankMetric::Proportion, top, &filter),
        "rankings": rankings,
        "recomputed": recomputed,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();
    init_metrics();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, output_dir, no_cache } => run_pipeline(config, output_dir, no_cache).await?,
        Commands::Views { input, sex, year, exclude_types, primary, top } => {
            print_views(input, sex, year, exclude_types, primary, top)?
        }
    }
    Ok(())
}
