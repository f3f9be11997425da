use std::collections::BTreeMap;
use tracing::warn;

use super::{DataWarning, ViewFilter};
use crate::observability::metrics;
use crate::pipeline::processing::rates::{incidence_record, sort_incidence};
use crate::types::{IncidenceRecord, Sex, StratumKey};

/// Relative tolerance when comparing populations that should be identical.
const POPULATION_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum CancerSelection {
    /// The all-cancers row minus the listed specific types.
    Exclusion { primary: String, excluded: Vec<String> },
    /// Several specific types summed into one.
    Combination { types: Vec<String> },
}

impl CancerSelection {
    /// Cancer type label carried by the recomputed rows.
    pub fn label(&self) -> String {
        match self {
            CancerSelection::Exclusion { primary, excluded } if excluded.is_empty() => primary.clone(),
            CancerSelection::Exclusion { primary, excluded } => {
                format!("{} excl. {}", primary, excluded.join(", "))
            }
            CancerSelection::Combination { types } => types.join(" + "),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecomputedView {
    pub rows: Vec<IncidenceRecord>,
    pub warnings: Vec<DataWarning>,
}

impl RecomputedView {
    /// Narrows rows and warnings to one sex and the filter's year range.
    pub fn restrict(mut self, sex: Sex, filter: &ViewFilter) -> Self {
        self.rows.retain(|r| r.sex == sex && filter.accepts_year(r.year));
        self.warnings.retain(|w| {
            let (year, warned_sex) = w.stratum();
            warned_sex == sex && filter.accepts_year(year)
        });
        self
    }
}

fn populations_differ(a: f64, b: f64) -> bool {
    (a - b).abs() > POPULATION_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

fn group_by_key<'a>(
    table: &'a [IncidenceRecord],
    wanted: impl Fn(&str) -> bool,
) -> BTreeMap<StratumKey, Vec<&'a IncidenceRecord>> {
    let mut groups: BTreeMap<StratumKey, Vec<&IncidenceRecord>> = BTreeMap::new();
    for row in table.iter().filter(|r| wanted(&r.cancer_type)) {
        groups.entry((row.year, row.sex, row.age_group.clone())).or_default().push(row);
    }
    groups
}

/// Recomputes cases and incidence per (year, sex, age_group) for a multi-type
/// selection. Population is taken as-is from the matched rows; rates go
/// through the shared zero-population policy.
pub fn recompute(table: &[IncidenceRecord], selection: &CancerSelection) -> RecomputedView {
    let label = selection.label();
    let mut view = RecomputedView::default();

    match selection {
        CancerSelection::Exclusion { primary, excluded } => {
            let groups = group_by_key(table, |t| t == primary || excluded.iter().any(|e| e == t));
            for ((year, sex, age_group), rows) in groups {
                let Some(primary_row) = rows.iter().find(|r| &r.cancer_type == primary) else {
                    view.warnings.push(DataWarning::MissingPrimary {
                        year,
                        sex,
                        age_group,
                        primary: primary.clone(),
                    });
                    continue;
                };

                let mut excluded_cases = 0.0;
                for row in rows.iter().filter(|r| &r.cancer_type != primary) {
                    if populations_differ(primary_row.population, row.population) {
                        view.warnings.push(DataWarning::PopulationMismatch {
                            year,
                            sex,
                            age_group: age_group.clone(),
                            cancer_type: row.cancer_type.clone(),
                            expected: primary_row.population,
                            found: row.population,
                        });
                    }
                    excluded_cases += row.cases;
                }

                let mut cases = primary_row.cases - excluded_cases;
                if cases < 0.0 {
                    view.warnings.push(DataWarning::NegativeRemainder {
                        year,
                        sex,
                        age_group: age_group.clone(),
                        cases,
                    });
                    cases = 0.0;
                }
                view.rows.push(incidence_record(year, sex, age_group, label.clone(), cases, primary_row.population));
            }
        }
        CancerSelection::Combination { types } => {
            let groups = group_by_key(table, |t| types.iter().any(|s| s == t));
            for ((year, sex, age_group), rows) in groups {
                let population = rows[0].population;
                for row in rows.iter().skip(1) {
                    if populations_differ(population, row.population) {
                        view.warnings.push(DataWarning::PopulationMismatch {
                            year,
                            sex,
                            age_group: age_group.clone(),
                            cancer_type: row.cancer_type.clone(),
                            expected: population,
                            found: row.population,
                        });
                    }
                }
                let cases: f64 = rows.iter().map(|r| r.cases).sum();
                view.rows.push(incidence_record(year, sex, age_group, label.clone(), cases, population));
            }
        }
    }

    sort_incidence(&mut view.rows);
    if !view.warnings.is_empty() {
        warn!("Recomputing '{}' raised {} data warnings", label, view.warnings.len());
        metrics::views::warnings(view.warnings.len());
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::views::test_support::row;

    const ALL: &str = "모든 암";

    #[test]
    fn exclusion_subtracts_and_recomputes_rate() {
        let table = vec![
            row(2000, Sex::Male, "50-54", ALL, 100.0, 10_000.0),
            row(2000, Sex::Male, "50-54", "위", 30.0, 10_000.0),
            row(2000, Sex::Male, "50-54", "폐", 20.0, 10_000.0),
            row(2000, Sex::Male, "50-54", "간", 5.0, 10_000.0),
        ];
        let selection = CancerSelection::Exclusion { primary: ALL.into(), excluded: vec!["위".into(), "폐".into()] };
        let view = recompute(&table, &selection);

        assert!(view.warnings.is_empty());
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].cases, 50.0);
        assert_eq!(view.rows[0].incidence_rate, 500.0);
        assert_eq!(view.rows[0].cancer_type, "모든 암 excl. 위, 폐");
        // Source table untouched
        assert_eq!(table[0].cases, 100.0);
    }

    #[test]
    fn exclusion_with_zero_population_is_zero_rate() {
        let table = vec![row(2000, Sex::Female, "0-4", ALL, 10.0, 0.0)];
        let selection = CancerSelection::Exclusion { primary: ALL.into(), excluded: vec![] };
        let view = recompute(&table, &selection);
        assert_eq!(view.rows[0].incidence_rate, 0.0);
        assert_eq!(view.rows[0].cancer_type, ALL);
    }

    #[test]
    fn negative_remainder_is_clamped_and_warned() {
        let table = vec![
            row(2000, Sex::Male, "0-4", ALL, 1.0, 100.0),
            row(2000, Sex::Male, "0-4", "위", 3.0, 100.0),
        ];
        let selection = CancerSelection::Exclusion { primary: ALL.into(), excluded: vec!["위".into()] };
        let view = recompute(&table, &selection);
        assert_eq!(view.rows[0].cases, 0.0);
        assert!(matches!(view.warnings[0], DataWarning::NegativeRemainder { .. }));
    }

    #[test]
    fn missing_primary_is_reported() {
        let table = vec![row(2000, Sex::Male, "0-4", "위", 3.0, 100.0)];
        let selection = CancerSelection::Exclusion { primary: ALL.into(), excluded: vec!["위".into()] };
        let view = recompute(&table, &selection);
        assert!(view.rows.is_empty());
        assert!(matches!(view.warnings[0], DataWarning::MissingPrimary { .. }));
    }

    #[test]
    fn combination_sums_cases_over_shared_population() {
        let table = vec![
            row(2000, Sex::Male, "50-54", "위", 30.0, 10_000.0),
            row(2000, Sex::Male, "50-54", "폐", 20.0, 10_000.0),
            row(2000, Sex::Male, "50-54", "간", 5.0, 10_000.0),
            row(2001, Sex::Male, "50-54", "위", 1.0, 20_000.0),
        ];
        let selection = CancerSelection::Combination { types: vec!["위".into(), "폐".into()] };
        let view = recompute(&table, &selection);

        assert!(view.warnings.is_empty());
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.rows[0].cases, 50.0);
        assert_eq!(view.rows[0].population, 10_000.0);
        assert_eq!(view.rows[0].incidence_rate, 500.0);
        assert_eq!(view.rows[0].cancer_type, "위 + 폐");
        assert_eq!(view.rows[1].year, 2001);
        assert_eq!(view.rows[1].incidence_rate, 5.0);
    }

    #[test]
    fn restrict_keeps_one_sex_and_year_range() {
        let table = vec![
            row(2000, Sex::Male, "0-4", ALL, 10.0, 100.0),
            row(2000, Sex::Female, "0-4", ALL, 10.0, 100.0),
            row(2000, Sex::Female, "0-4", "위", 30.0, 100.0),
            row(2001, Sex::Female, "0-4", ALL, 10.0, 100.0),
        ];
        let selection = CancerSelection::Exclusion { primary: ALL.into(), excluded: vec!["위".into()] };
        let full = recompute(&table, &selection);
        assert_eq!(full.rows.len(), 3);
        assert_eq!(full.warnings.len(), 1);

        let female = full.clone().restrict(Sex::Female, &ViewFilter::new());
        assert_eq!(female.rows.len(), 2);
        assert!(female.rows.iter().all(|r| r.sex == Sex::Female));
        assert_eq!(female.warnings.len(), 1);

        let male_2000 = full.restrict(Sex::Male, &ViewFilter::new().years(2000..=2000));
        assert_eq!(male_2000.rows.len(), 1);
        assert_eq!(male_2000.rows[0].sex, Sex::Male);
        assert!(male_2000.warnings.is_empty());
    }

    #[test]
    fn divergent_population_is_warned_not_averaged() {
        let table = vec![
            row(2000, Sex::Male, "50-54", "위", 30.0, 10_000.0),
            row(2000, Sex::Male, "50-54", "폐", 20.0, 12_000.0),
        ];
        let selection = CancerSelection::Combination { types: vec!["위".into(), "폐".into()] };
        let view = recompute(&table, &selection);

        assert_eq!(view.rows[0].population, 10_000.0);
        assert_eq!(view.warnings.len(), 1);
        assert!(matches!(
            &view.warnings[0],
            DataWarning::PopulationMismatch { cancer_type, found, .. } if cancer_type == "폐" && *found == 12_000.0
        ));
    }
}
