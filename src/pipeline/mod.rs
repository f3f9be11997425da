// Incidence pipeline: ingestion, in-memory processing, and CSV output

pub mod ingestion;
pub mod output;
pub mod processing;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use output::OutputPaths;
use processing::estimate::{EstimationSkip, GapEstimator};
use processing::normalize::{normalize_cancer, normalize_population, NormalizationReport};
use processing::rates::compute_incidence;
use processing::reconcile::{reconcile, ReconciledTable};
use crate::types::{EstimationRatio, IncidenceRecord, PopulationRecord};

/// Everything the transform stages derive from one pair of raw series.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Aggregated population after gap-year estimation.
    pub population: Vec<PopulationRecord>,
    pub population_report: NormalizationReport,
    pub cancer_report: NormalizationReport,
    pub ratios: Vec<EstimationRatio>,
    pub estimation_skips: Vec<EstimationSkip>,
    pub synthesized_rows: usize,
    pub reconciled: ReconciledTable,
    pub incidence: Vec<IncidenceRecord>,
}

/// Runs normalize, estimate, reconcile and rates over already-loaded raw
/// records. Each stage reads the previous stage's table and builds a new one.
pub fn transform(population_raw: &[Value], cancer_raw: &[Value], estimator: &GapEstimator) -> PipelineOutput {
    let population = normalize_population(population_raw);
    let cancer = normalize_cancer(cancer_raw);

    let estimated = estimator.estimate(&population.records);
    let reconciled = reconcile(&cancer.records, &estimated.population);
    let incidence = compute_incidence(&reconciled.matched);

    PipelineOutput {
        population: estimated.population,
        population_report: population.report,
        cancer_report: cancer.report,
        ratios: estimated.ratios,
        estimation_skips: estimated.skipped,
        synthesized_rows: estimated.synthesized_rows,
        reconciled,
        incidence,
    }
}

/// Run summary printed by the binary.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub finished_at: DateTime<Utc>,
    pub population_raw: usize,
    pub cancer_raw: usize,
    pub population_skipped: usize,
    pub cancer_skipped: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub output_rows: usize,
    pub synthesized_rows: usize,
    pub ratios: Vec<EstimationRatio>,
    pub estimation_skips: Vec<EstimationSkip>,
    pub outputs: Option<OutputPaths>,
}

impl PipelineSummary {
    pub fn new(population_raw: usize, cancer_raw: usize, output: &PipelineOutput, outputs: Option<OutputPaths>) -> Self {
        Self {
            finished_at: Utc::now(),
            population_raw,
            cancer_raw,
            population_skipped: output.population_report.skipped_total(),
            cancer_skipped: output.cancer_report.skipped_total(),
            matched: output.reconciled.matched.len(),
            unmatched: output.reconciled.unmatched.len(),
            output_rows: output.incidence.len(),
            synthesized_rows: output.synthesized_rows,
            ratios: output.ratios.clone(),
            estimation_skips: output.estimation_skips.clone(),
            outputs,
        }
    }

    pub fn log(&self) {
        info!(
            "Pipeline finished: {} population / {} case raw rows, {} matched, {} unmatched, {} output rows",
            self.population_raw, self.cancer_raw, self.matched, self.unmatched, self.output_rows
        );
    }
}
