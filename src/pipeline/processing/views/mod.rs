//! Read-only views derived from the incidence table for dashboard consumers.
//!
//! Every function here takes the table by shared reference and returns new
//! rows; the table itself is never modified.

pub mod buckets;
pub mod ranking;
pub mod recompute;

use serde::Serialize;
use std::fmt;
use std::ops::RangeInclusive;

use crate::types::{IncidenceRecord, Sex};

/// Row selection applied before a view aggregates.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    pub years: Option<RangeInclusive<i32>>,
    /// Usually the all-cancers aggregate, which would dominate shares.
    pub exclude_types: Vec<String>,
}

impl ViewFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn years(mut self, years: RangeInclusive<i32>) -> Self {
        self.years = Some(years);
        self
    }

    pub fn exclude(mut self, cancer_type: impl Into<String>) -> Self {
        self.exclude_types.push(cancer_type.into());
        self
    }

    pub fn accepts_year(&self, year: i32) -> bool {
        self.years.as_ref().map_or(true, |y| y.contains(&year))
    }

    pub fn accepts(&self, row: &IncidenceRecord) -> bool {
        self.accepts_year(row.year) && !self.exclude_types.iter().any(|t| t == &row.cancer_type)
    }
}

/// Upstream integrity problems found while deriving a view. Reported next to
/// the best-effort rows, never raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataWarning {
    PopulationMismatch {
        year: i32,
        sex: Sex,
        age_group: String,
        cancer_type: String,
        expected: f64,
        found: f64,
    },
    NegativeRemainder {
        year: i32,
        sex: Sex,
        age_group: String,
        cases: f64,
    },
    MissingPrimary {
        year: i32,
        sex: Sex,
        age_group: String,
        primary: String,
    },
}

impl DataWarning {
    /// Year and sex of the stratum the warning is about.
    pub fn stratum(&self) -> (i32, Sex) {
        match self {
            DataWarning::PopulationMismatch { year, sex, .. }
            | DataWarning::NegativeRemainder { year, sex, .. }
            | DataWarning::MissingPrimary { year, sex, .. } => (*year, *sex),
        }
    }
}

impl fmt::Display for DataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataWarning::PopulationMismatch { year, sex, age_group, cancer_type, expected, found } => write!(
                f,
                "population for {} {} {} differs across cancer types: {} has {}, expected {}",
                year, sex, age_group, cancer_type, found, expected
            ),
            DataWarning::NegativeRemainder { year, sex, age_group, cases } => write!(
                f,
                "excluded cases exceed the primary total for {} {} {} ({}); clamped to 0",
                year, sex, age_group, cases
            ),
            DataWarning::MissingPrimary { year, sex, age_group, primary } => {
                write!(f, "no '{}' row for {} {} {}", primary, year, sex, age_group)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::pipeline::processing::rates::incidence_record;
    use crate::types::{IncidenceRecord, Sex};

    pub fn row(year: i32, sex: Sex, age: &str, cancer_type: &str, cases: f64, population: f64) -> IncidenceRecord {
        incidence_record(year, sex, age.to_string(), cancer_type.to_string(), cases, population)
    }
}
