use serde::Serialize;
use std::collections::BTreeSet;

use super::buckets::{bucket_shares, by_value_desc, AgeBucket};
use super::ViewFilter;
use crate::constants::{ALL_AGES, OTHER_LABEL};
use crate::types::{IncidenceRecord, Sex};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub cancer_type: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub top: Vec<RankedEntry>,
    /// Sum of everything outside `top`; absent when nothing was cut.
    pub other: Option<RankedEntry>,
    /// Sum over all ranked types. `top` plus `other` add up to this.
    pub total: f64,
}

impl Ranking {
    pub fn entries(&self) -> impl Iterator<Item = &RankedEntry> {
        self.top.iter().chain(self.other.iter())
    }
}

/// Which figure a bucket ranking orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMetric {
    Rate,
    Proportion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearRanking {
    pub year: i32,
    pub sex: Sex,
    pub ranking: Ranking,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketRanking {
    pub sex: Sex,
    pub bucket: AgeBucket,
    pub metric: RankMetric,
    pub ranking: Ranking,
}

/// Keeps the `n` largest values (ties by cancer type ascending) and folds
/// the rest into a single "Other" entry.
pub fn rank_top_n(values: Vec<(String, f64)>, n: usize) -> Ranking {
    let mut sorted = values;
    sorted.sort_by(|(a_name, a), (b_name, b)| by_value_desc(*a, *b, a_name, b_name));

    let total: f64 = sorted.iter().map(|(_, v)| v).sum();
    let rest = if sorted.len() > n { sorted.split_off(n) } else { Vec::new() };
    let other = (!rest.is_empty()).then(|| RankedEntry {
        cancer_type: OTHER_LABEL.to_string(),
        value: rest.iter().map(|(_, v)| v).sum(),
    });

    Ranking {
        top: sorted
            .into_iter()
            .map(|(cancer_type, value)| RankedEntry { cancer_type, value })
            .collect(),
        other,
        total,
    }
}

/// Ranks cancer types for one (year, sex) by their ALL_AGES incidence rate.
pub fn rank_year(table: &[IncidenceRecord], year: i32, sex: Sex, n: usize, filter: &ViewFilter) -> Ranking {
    let values = table
        .iter()
        .filter(|r| r.year == year && r.sex == sex && r.age_group == ALL_AGES && filter.accepts(r))
        .map(|r| (r.cancer_type.clone(), r.incidence_rate))
        .collect();
    rank_top_n(values, n)
}

/// One ranking per year present in the filtered table, oldest first; the
/// frames of an animated chart.
pub fn rank_by_year(table: &[IncidenceRecord], sex: Sex, n: usize, filter: &ViewFilter) -> Vec<YearRanking> {
    let years: BTreeSet<i32> = table
        .iter()
        .filter(|r| r.sex == sex && r.age_group == ALL_AGES && filter.accepts(r))
        .map(|r| r.year)
        .collect();

    years
        .into_iter()
        .map(|year| YearRanking { year, sex, ranking: rank_year(table, year, sex, n, filter) })
        .collect()
}

/// Ranks each age bucket on its own, so the top set and the contents of
/// "Other" can differ between buckets.
pub fn rank_buckets(
    table: &[IncidenceRecord],
    sex: Sex,
    metric: RankMetric,
    n: usize,
    filter: &ViewFilter,
) -> Vec<BucketRanking> {
    AgeBucket::all()
        .into_iter()
        .filter_map(|bucket| {
            let shares = bucket_shares(table, sex, bucket, filter);
            if shares.is_empty() {
                return None;
            }
            let values = shares
                .into_iter()
                .map(|s| {
                    let value = match metric {
                        RankMetric::Rate => s.incidence_rate,
                        RankMetric::Proportion => s.proportion,
                    };
                    (s.cancer_type, value)
                })
                .collect();
            Some(BucketRanking { sex, bucket, metric, ranking: rank_top_n(values, n) })
        })
        .collect()
}
