//! Incidence per 100,000 for each matched stratum plus one ALL_AGES row per
//! (year, sex, cancer_type).

use std::collections::BTreeMap;
use tracing::info;

use crate::constants::{ALL_AGES, RATE_MULTIPLIER};
use crate::observability::metrics;
use crate::types::{IncidenceRecord, JoinedRecord, Sex};

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The one zero-population policy: no population means a rate of 0.0.
/// Never NaN, infinite or negative.
pub fn safe_rate(cases: f64, population: f64) -> f64 {
    if !(population > 0.0) || !population.is_finite() || !cases.is_finite() {
        return 0.0;
    }
    let rate = round2(cases / population * RATE_MULTIPLIER);
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        0.0
    }
}

pub fn incidence_record(
    year: i32,
    sex: Sex,
    age_group: String,
    cancer_type: String,
    cases: f64,
    population: f64,
) -> IncidenceRecord {
    IncidenceRecord {
        year,
        sex,
        age_group,
        cancer_type,
        cases,
        population,
        incidence_rate: safe_rate(cases, population),
    }
}

/// Sorts rows by (year, sex, age_group, cancer_type).
pub fn sort_incidence(rows: &mut [IncidenceRecord]) {
    rows.sort_by(|a, b| {
        (a.year, a.sex, &a.age_group, &a.cancer_type).cmp(&(b.year, b.sex, &b.age_group, &b.cancer_type))
    });
}

/// Per-stratum rows for every matched record followed by the ALL_AGES
/// aggregates, as one sorted table. Unmatched rows are ignored.
pub fn compute_incidence(matched: &[JoinedRecord]) -> Vec<IncidenceRecord> {
    let mut rows: Vec<IncidenceRecord> = Vec::with_capacity(matched.len());
    let mut totals: BTreeMap<(i32, Sex, String), (f64, f64)> = BTreeMap::new();

    for r in matched {
        let Some(population) = r.population else { continue };
        rows.push(incidence_record(
            r.year,
            r.sex,
            r.age_group.clone(),
            r.cancer_type.clone(),
            r.cases,
            population,
        ));
        let entry = totals.entry((r.year, r.sex, r.cancer_type.clone())).or_insert((0.0, 0.0));
        entry.0 += r.cases;
        entry.1 += population;
    }

    let strata = rows.len();
    rows.extend(
        totals
            .into_iter()
            .map(|((year, sex, cancer_type), (cases, population))| {
                incidence_record(year, sex, ALL_AGES.to_string(), cancer_type, cases, population)
            }),
    );
    sort_incidence(&mut rows);

    metrics::rates::rows_produced(rows.len());
    info!(
        "Computed {} incidence rows ({} strata, {} ALL_AGES)",
        rows.len(),
        strata,
        rows.len() - strata
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(year: i32, sex: Sex, age: &str, cancer_type: &str, cases: f64, population: Option<f64>) -> JoinedRecord {
        JoinedRecord {
            year,
            sex,
            age_group: age.into(),
            cancer_type: cancer_type.into(),
            cases,
            population,
        }
    }

    #[test]
    fn zero_population_yields_zero_rate() {
        assert_eq!(safe_rate(10.0, 0.0), 0.0);
        assert_eq!(safe_rate(10.0, f64::NAN), 0.0);
        assert_eq!(safe_rate(f64::INFINITY, 10.0), 0.0);
        assert_eq!(safe_rate(-5.0, 100.0), 0.0);
    }

    #[test]
    fn rate_is_rounded_per_100k() {
        assert_eq!(safe_rate(3.0, 7000.0), 42.86);
        assert_eq!(safe_rate(1.0, 100_000.0), 1.0);
        assert_eq!(safe_rate(0.0, 100.0), 0.0);
    }

    #[test]
    fn all_ages_row_sums_strata_exactly() {
        let matched = vec![
            joined(2000, Sex::Male, "50-54", "위", 10.0, Some(1000.0)),
            joined(2000, Sex::Male, "55-59", "위", 7.5, Some(500.0)),
            joined(2000, Sex::Male, "60-64", "위", 2.25, Some(0.0)),
            joined(2000, Sex::Female, "50-54", "위", 1.0, Some(800.0)),
        ];
        let rows = compute_incidence(&matched);
        assert_eq!(rows.len(), 6);

        let all_male = rows
            .iter()
            .find(|r| r.sex == Sex::Male && r.age_group == ALL_AGES)
            .unwrap();
        let strata_sum: f64 = rows
            .iter()
            .filter(|r| r.sex == Sex::Male && r.age_group != ALL_AGES)
            .map(|r| r.cases)
            .sum();
        assert_eq!(all_male.cases, strata_sum);
        assert_eq!(all_male.population, 1500.0);
        assert_eq!(all_male.incidence_rate, round2(19.75 / 1500.0 * 100_000.0));

        let zero = rows.iter().find(|r| r.age_group == "60-64").unwrap();
        assert_eq!(zero.incidence_rate, 0.0);
    }

    #[test]
    fn output_is_sorted_and_skips_unmatched() {
        let matched = vec![
            joined(2001, Sex::Female, "0-4", "폐", 1.0, Some(10.0)),
            joined(2000, Sex::Male, "5-9", "위", 1.0, Some(10.0)),
            joined(2000, Sex::Male, "0-4", "위", 1.0, None),
        ];
        let rows = compute_incidence(&matched);
        let keys: Vec<(i32, &str)> = rows.iter().map(|r| (r.year, r.age_group.as_str())).collect();
        assert_eq!(keys, vec![(2000, "5-9"), (2000, ALL_AGES), (2001, "0-4"), (2001, ALL_AGES)]);
        assert!(rows.iter().all(|r| r.incidence_rate.is_finite() && r.incidence_rate >= 0.0));
    }
}
