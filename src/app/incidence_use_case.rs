use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::app::ports::{CacheStorePort, CredentialPort, HttpClientPort};
use crate::config::Config;
use crate::constants::{CANCER_SERIES, POPULATION_COARSE_80_PLUS_CODE, POPULATION_SERIES};
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::ingestion::fetcher::BatchFetcher;
use crate::pipeline::ingestion::{load_series, SeriesLoad, SeriesRequest};
use crate::pipeline::output::write_outputs;
use crate::pipeline::processing::estimate::GapEstimator;
use crate::pipeline::{transform, PipelineOutput, PipelineSummary};

const POPULATION_REQUIRED_CODES: [&str; 1] = [POPULATION_COARSE_80_PLUS_CODE];

/// Tables and counts from one full run.
#[derive(Debug, Clone)]
pub struct IncidenceRun {
    pub output: PipelineOutput,
    pub summary: PipelineSummary,
}

/// Use case for producing the incidence table: load both series, transform,
/// and optionally persist the CSV outputs.
pub struct IncidenceUseCase {
    fetcher: BatchFetcher,
    cache: Arc<dyn CacheStorePort>,
    config: Config,
}

impl IncidenceUseCase {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        cache: Arc<dyn CacheStorePort>,
        credential: Arc<dyn CredentialPort>,
        config: Config,
    ) -> Self {
        let fetcher = BatchFetcher::new(http, credential, config.api.batch_width);
        Self { fetcher, cache, config }
    }

    async fn load(&self, series: &str, url_template: &str, required: &[&str], use_cache: bool) -> Result<SeriesLoad> {
        let request = SeriesRequest {
            series,
            url_template,
            start_year: self.config.api.start_year,
            end_year: self.config.api.end_year,
            required_age_codes: required,
        };
        let load = load_series(&self.fetcher, self.cache.as_ref(), &request, use_cache).await?;
        if let Some(report) = &load.fetch_report {
            if !report.failures.is_empty() {
                warn!(
                    "{}: {} of {} batches failed; continuing with {} records",
                    series,
                    report.failures.len(),
                    report.batches,
                    load.records.len()
                );
            }
        }
        Ok(load)
    }

    /// Runs the whole pipeline. A series with no records at all stops the
    /// run before any transform; partial batch failures do not.
    pub async fn run(&self, use_cache: bool, output_dir: Option<&Path>) -> Result<IncidenceRun> {
        let started = Instant::now();
        let api = &self.config.api;

        let population = self
            .load(POPULATION_SERIES, &api.population_url, &POPULATION_REQUIRED_CODES, use_cache)
            .await?;
        let cancer = self.load(CANCER_SERIES, &api.cancer_url, &[], use_cache).await?;

        let estimator = GapEstimator::new(self.config.estimation.gap_year, self.config.estimation.reference_year);
        let output = transform(&population.records, &cancer.records, &estimator);

        let outputs = match output_dir {
            Some(dir) => Some(write_outputs(dir, &output.incidence, &output.reconciled)?),
            None => None,
        };

        let summary = PipelineSummary::new(population.records.len(), cancer.records.len(), &output, outputs);
        summary.log();
        let elapsed = started.elapsed().as_secs_f64();
        metrics::pipeline_duration(elapsed);
        info!("Pipeline completed in {:.2}s", elapsed);

        Ok(IncidenceRun { output, summary })
    }
}
