//! Splits the gap year's coarse 80+ population stratum into 80-84 and 85+
//! using per-sex ratios learned from a reference year.

use serde::Serialize;
use tracing::{info, warn};

use crate::constants::{AGE_80_84, AGE_80_PLUS, AGE_85_PLUS};
use crate::observability::metrics;
use crate::pipeline::processing::normalize::aggregate_population;
use crate::types::{EstimationRatio, PopulationRecord, Sex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EstimationSkipCause {
    /// The gap year has no coarse 80+ row for this sex.
    NoCoarseRows,
    /// No usable reference year: a fine stratum is missing or both are zero.
    ReferenceUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimationSkip {
    pub sex: Sex,
    pub cause: EstimationSkipCause,
}

#[derive(Debug, Clone)]
pub struct EstimationOutcome {
    /// Re-aggregated population table, one row per (year, sex, age_group).
    pub population: Vec<PopulationRecord>,
    pub ratios: Vec<EstimationRatio>,
    pub skipped: Vec<EstimationSkip>,
    pub synthesized_rows: usize,
}

#[derive(Debug, Clone)]
pub struct GapEstimator {
    gap_year: i32,
    reference_year: Option<i32>,
}

impl GapEstimator {
    pub fn new(gap_year: i32, reference_year: Option<i32>) -> Self {
        Self { gap_year, reference_year }
    }

    fn stratum_sum(population: &[PopulationRecord], year: i32, sex: Sex, age_group: &str) -> Option<f64> {
        let mut rows = population
            .iter()
            .filter(|r| r.year == year && r.sex == sex && r.age_group == age_group)
            .peekable();
        rows.peek()?;
        Some(rows.map(|r| r.population).sum())
    }

    /// Earliest non-gap year reporting both fine strata for `sex`.
    fn detect_reference_year(&self, population: &[PopulationRecord], sex: Sex) -> Option<i32> {
        population
            .iter()
            .filter(|r| r.sex == sex && r.year != self.gap_year && r.age_group == AGE_80_84)
            .map(|r| r.year)
            .filter(|&year| Self::stratum_sum(population, year, sex, AGE_85_PLUS).is_some())
            .min()
    }

    /// Split ratio for `sex`, or `None` when the reference year cannot
    /// define one.
    pub fn ratio_for(&self, population: &[PopulationRecord], sex: Sex) -> Option<EstimationRatio> {
        let reference_year = match self.reference_year {
            Some(year) => year,
            None => self.detect_reference_year(population, sex)?,
        };
        let pop_80_84 = Self::stratum_sum(population, reference_year, sex, AGE_80_84)?;
        let pop_85_plus = Self::stratum_sum(population, reference_year, sex, AGE_85_PLUS)?;
        let total = pop_80_84 + pop_85_plus;
        if !(total > 0.0) || !total.is_finite() {
            return None;
        }
        let ratio_80_84 = pop_80_84 / total;
        Some(EstimationRatio {
            sex,
            reference_year,
            ratio_80_84,
            ratio_85_plus: 1.0 - ratio_80_84,
        })
    }

    /// Replaces gap-year 80+ rows with synthetic 80-84 and 85+ rows for every
    /// sex that has a ratio, then re-aggregates the whole table.
    pub fn estimate(&self, population: &[PopulationRecord]) -> EstimationOutcome {
        let mut table: Vec<PopulationRecord> = population.to_vec();
        let mut ratios = Vec::new();
        let mut skipped = Vec::new();
        let mut synthesized = Vec::new();

        for sex in Sex::all() {
            let is_gap_row =
                |r: &PopulationRecord| r.year == self.gap_year && r.sex == sex && r.age_group == AGE_80_PLUS;

            if !table.iter().any(is_gap_row) {
                skipped.push(EstimationSkip { sex, cause: EstimationSkipCause::NoCoarseRows });
                continue;
            }
            let Some(ratio) = self.ratio_for(population, sex) else {
                warn!("No reference ratio for {}; {} 80+ rows left unsplit", sex, self.gap_year);
                metrics::estimation::skipped(sex.as_str());
                skipped.push(EstimationSkip { sex, cause: EstimationSkipCause::ReferenceUnavailable });
                continue;
            };

            info!(
                "Estimating {} {} population for 80-84 and 85+ from {} (ratio {:.4}/{:.4})",
                self.gap_year, sex, ratio.reference_year, ratio.ratio_80_84, ratio.ratio_85_plus
            );
            for row in table.iter().filter(|r| is_gap_row(*r)) {
                synthesized.push(PopulationRecord {
                    year: row.year,
                    sex,
                    age_group: AGE_80_84.to_string(),
                    population: row.population * ratio.ratio_80_84,
                });
                synthesized.push(PopulationRecord {
                    year: row.year,
                    sex,
                    age_group: AGE_85_PLUS.to_string(),
                    population: row.population * ratio.ratio_85_plus,
                });
            }
            table.retain(|r| !is_gap_row(r));
            ratios.push(ratio);
        }

        let synthesized_rows = synthesized.len();
        metrics::estimation::synthesized(synthesized_rows);
        table.extend(synthesized);

        EstimationOutcome {
            population: aggregate_population(&table),
            ratios,
            skipped,
            synthesized_rows,
        }
    }
}
