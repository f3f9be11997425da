use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, warn};

use crate::observability::metrics;
use crate::types::{CancerRecord, JoinedRecord, PopulationRecord, StratumKey};

/// A distinct (year, age_group) pair with at least one unmatched case row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MissingCombination {
    pub year: i32,
    pub age_group: String,
}

/// Every case row lands in exactly one of the two partitions.
#[derive(Debug, Clone, Default)]
pub struct ReconciledTable {
    pub matched: Vec<JoinedRecord>,
    /// Sorted by (year, sex, age_group), then cancer_type.
    pub unmatched: Vec<JoinedRecord>,
}

impl ReconciledTable {
    pub fn total(&self) -> usize {
        self.matched.len() + self.unmatched.len()
    }

    /// Distinct sorted (year, age_group) pairs behind the unmatched rows.
    pub fn unmatched_summary(&self) -> Vec<MissingCombination> {
        self.unmatched
            .iter()
            .map(|r| MissingCombination { year: r.year, age_group: r.age_group.clone() })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Population joined per key, counted once per key regardless of how
    /// many cancer types matched it.
    pub fn matched_population_totals(&self) -> BTreeMap<StratumKey, f64> {
        self.matched
            .iter()
            .filter_map(|r| r.population.map(|p| ((r.year, r.sex, r.age_group.clone()), p)))
            .collect()
    }
}

/// Left-joins case rows onto the (aggregated) population table on
/// (year, sex, age_group).
pub fn reconcile(cancer: &[CancerRecord], population: &[PopulationRecord]) -> ReconciledTable {
    let mut lookup: HashMap<StratumKey, f64> = HashMap::with_capacity(population.len());
    for p in population {
        *lookup.entry((p.year, p.sex, p.age_group.clone())).or_insert(0.0) += p.population;
    }

    let (matched, mut unmatched): (Vec<JoinedRecord>, Vec<JoinedRecord>) = cancer
        .iter()
        .map(|c| JoinedRecord {
            year: c.year,
            sex: c.sex,
            age_group: c.age_group.clone(),
            cancer_type: c.cancer_type.clone(),
            cases: c.cases,
            population: lookup.get(&(c.year, c.sex, c.age_group.clone())).copied(),
        })
        .partition(|r| r.population.is_some());

    unmatched.sort_by(|a, b| {
        (a.year, a.sex, &a.age_group, &a.cancer_type).cmp(&(b.year, b.sex, &b.age_group, &b.cancer_type))
    });

    metrics::reconcile::partitioned(matched.len(), unmatched.len());
    if unmatched.is_empty() {
        info!("All {} case rows matched a population record", matched.len());
    } else {
        warn!("Found {} records missing population data", unmatched.len());
    }

    ReconciledTable { matched, unmatched }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sex;

    fn case(year: i32, sex: Sex, age: &str, cancer_type: &str, cases: f64) -> CancerRecord {
        CancerRecord { year, sex, age_group: age.into(), cancer_type: cancer_type.into(), cases }
    }

    fn pop(year: i32, sex: Sex, age: &str, population: f64) -> PopulationRecord {
        PopulationRecord { year, sex, age_group: age.into(), population }
    }

    #[test]
    fn every_case_row_lands_in_exactly_one_partition() {
        let population = vec![pop(2000, Sex::Male, "50-54", 1000.0), pop(2000, Sex::Female, "50-54", 900.0)];
        let cancer = vec![
            case(2000, Sex::Male, "50-54", "위", 10.0),
            case(2000, Sex::Male, "50-54", "폐", 3.0),
            case(2000, Sex::Female, "85+", "위", 1.0),
            case(1999, Sex::Male, "80-84", "위", 2.0),
            case(2000, Sex::Male, "", "위", 4.0),
        ];
        let table = reconcile(&cancer, &population);

        assert_eq!(table.total(), cancer.len());
        assert_eq!(table.matched.len(), 2);
        assert_eq!(table.unmatched.len(), 3);
        assert!(table.matched.iter().all(|r| r.population.is_some()));
        assert!(table.unmatched.iter().all(|r| r.population.is_none()));

        // Sorted by year, then sex, then age group
        let order: Vec<(i32, Sex, &str)> =
            table.unmatched.iter().map(|r| (r.year, r.sex, r.age_group.as_str())).collect();
        assert_eq!(order, vec![(1999, Sex::Male, "80-84"), (2000, Sex::Male, ""), (2000, Sex::Female, "85+")]);
    }

    #[test]
    fn summary_lists_distinct_year_age_pairs() {
        let cancer = vec![
            case(1999, Sex::Male, "85+", "위", 1.0),
            case(1999, Sex::Female, "85+", "위", 1.0),
            case(1999, Sex::Male, "80-84", "폐", 1.0),
        ];
        let table = reconcile(&cancer, &[]);
        assert_eq!(
            table.unmatched_summary(),
            vec![
                MissingCombination { year: 1999, age_group: "80-84".into() },
                MissingCombination { year: 1999, age_group: "85+".into() },
            ]
        );
    }

    #[test]
    fn population_totals_are_per_key() {
        let population = vec![pop(2000, Sex::Male, "50-54", 1000.0)];
        let cancer = vec![case(2000, Sex::Male, "50-54", "위", 10.0), case(2000, Sex::Male, "50-54", "폐", 3.0)];
        let totals = reconcile(&cancer, &population).matched_population_totals();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[&(2000, Sex::Male, "50-54".to_string())], 1000.0);
    }
}
