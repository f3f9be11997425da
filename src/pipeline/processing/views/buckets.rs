use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::ViewFilter;
use crate::pipeline::processing::rates::{round2, safe_rate};
use crate::types::{IncidenceRecord, Sex};

/// Coarse age ranges used only by the proportion views. The widths are
/// uneven on purpose; the published charts use exactly these cut points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AgeBucket {
    #[serde(rename = "0-19")]
    Age0To19,
    #[serde(rename = "20-39")]
    Age20To39,
    #[serde(rename = "40-49")]
    Age40To49,
    #[serde(rename = "50-59")]
    Age50To59,
    #[serde(rename = "60+")]
    Age60Plus,
}

/// Canonical stratum to bucket. Anything absent (ALL_AGES, unnormalized
/// labels) belongs to no bucket.
const AGE_BUCKET_TABLE: [(&str, AgeBucket); 19] = [
    ("0-4", AgeBucket::Age0To19),
    ("5-9", AgeBucket::Age0To19),
    ("10-14", AgeBucket::Age0To19),
    ("15-19", AgeBucket::Age0To19),
    ("20-24", AgeBucket::Age20To39),
    ("25-29", AgeBucket::Age20To39),
    ("30-34", AgeBucket::Age20To39),
    ("35-39", AgeBucket::Age20To39),
    ("40-44", AgeBucket::Age40To49),
    ("45-49", AgeBucket::Age40To49),
    ("50-54", AgeBucket::Age50To59),
    ("55-59", AgeBucket::Age50To59),
    ("60-64", AgeBucket::Age60Plus),
    ("65-69", AgeBucket::Age60Plus),
    ("70-74", AgeBucket::Age60Plus),
    ("75-79", AgeBucket::Age60Plus),
    ("80-84", AgeBucket::Age60Plus),
    ("85+", AgeBucket::Age60Plus),
    ("80+", AgeBucket::Age60Plus),
];

impl AgeBucket {
    pub fn all() -> [AgeBucket; 5] {
        [
            AgeBucket::Age0To19,
            AgeBucket::Age20To39,
            AgeBucket::Age40To49,
            AgeBucket::Age50To59,
            AgeBucket::Age60Plus,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBucket::Age0To19 => "0-19",
            AgeBucket::Age20To39 => "20-39",
            AgeBucket::Age40To49 => "40-49",
            AgeBucket::Age50To59 => "50-59",
            AgeBucket::Age60Plus => "60+",
        }
    }

    pub fn for_age_group(age_group: &str) -> Option<AgeBucket> {
        AGE_BUCKET_TABLE
            .iter()
            .find(|(stratum, _)| *stratum == age_group)
            .map(|(_, bucket)| *bucket)
    }
}

/// One cancer type's slice of a (sex, bucket) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketShare {
    pub sex: Sex,
    pub bucket: AgeBucket,
    pub cancer_type: String,
    pub cases: f64,
    pub population: f64,
    pub incidence_rate: f64,
    /// Percentage of the bucket's summed incidence rate.
    pub proportion: f64,
}

pub(crate) fn by_value_desc(a: f64, b: f64, a_name: &str, b_name: &str) -> Ordering {
    b.total_cmp(&a).then_with(|| a_name.cmp(b_name))
}

/// Per-type cases, population, bucket-local rate and share of the bucket's
/// total rate, largest share first.
pub fn bucket_shares(table: &[IncidenceRecord], sex: Sex, bucket: AgeBucket, filter: &ViewFilter) -> Vec<BucketShare> {
    let mut sums: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for row in table
        .iter()
        .filter(|r| r.sex == sex && filter.accepts(r))
        .filter(|r| AgeBucket::for_age_group(&r.age_group) == Some(bucket))
    {
        let entry = sums.entry(row.cancer_type.as_str()).or_insert((0.0, 0.0));
        entry.0 += row.cases;
        entry.1 += row.population;
    }

    let rates: Vec<(&str, f64, f64, f64)> = sums
        .into_iter()
        .map(|(cancer_type, (cases, population))| (cancer_type, cases, population, safe_rate(cases, population)))
        .collect();
    let total_rate: f64 = rates.iter().map(|(_, _, _, rate)| rate).sum();

    let mut shares: Vec<BucketShare> = rates
        .into_iter()
        .map(|(cancer_type, cases, population, incidence_rate)| BucketShare {
            sex,
            bucket,
            cancer_type: cancer_type.to_string(),
            cases,
            population,
            incidence_rate,
            proportion: if total_rate > 0.0 { round2(incidence_rate / total_rate * 100.0) } else { 0.0 },
        })
        .collect();
    shares.sort_by(|a, b| by_value_desc(a.proportion, b.proportion, &a.cancer_type, &b.cancer_type));
    shares
}

/// [`bucket_shares`] for all five buckets, in bucket order.
pub fn bucket_view(table: &[IncidenceRecord], sex: Sex, filter: &ViewFilter) -> Vec<BucketShare> {
    AgeBucket::all()
        .into_iter()
        .flat_map(|bucket| bucket_shares(table, sex, bucket, filter))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ALL_AGES;
    use crate::pipeline::processing::views::test_support::row;

    #[test]
    fn every_canonical_stratum_maps_to_one_bucket() {
        let strata = [
            "0-4", "5-9", "10-14", "15-19", "20-24", "25-29", "30-34", "35-39", "40-44", "45-49", "50-54", "55-59",
            "60-64", "65-69", "70-74", "75-79", "80-84", "85+",
        ];
        for stratum in strata {
            assert!(AgeBucket::for_age_group(stratum).is_some(), "{stratum} unmapped");
        }
        assert_eq!(AgeBucket::for_age_group("15-19"), Some(AgeBucket::Age0To19));
        assert_eq!(AgeBucket::for_age_group("40-44"), Some(AgeBucket::Age40To49));
        assert_eq!(AgeBucket::for_age_group("85+"), Some(AgeBucket::Age60Plus));
        assert_eq!(AgeBucket::for_age_group(ALL_AGES), None);
        assert_eq!(AgeBucket::for_age_group(""), None);
    }

    #[test]
    fn shares_sum_to_one_hundred() {
        let table = vec![
            row(2000, Sex::Male, "50-54", "위", 30.0, 10_000.0),
            row(2000, Sex::Male, "55-59", "위", 10.0, 10_000.0),
            row(2000, Sex::Male, "50-54", "폐", 20.0, 10_000.0),
            row(2000, Sex::Male, "55-59", "간", 7.0, 10_000.0),
            row(2000, Sex::Male, ALL_AGES, "위", 40.0, 20_000.0),
            row(2000, Sex::Female, "50-54", "위", 99.0, 10_000.0),
            row(2000, Sex::Male, "60-64", "위", 99.0, 10_000.0),
        ];
        let shares = bucket_shares(&table, Sex::Male, AgeBucket::Age50To59, &ViewFilter::default());

        assert_eq!(shares.len(), 3);
        assert_eq!(shares[0].cancer_type, "위");
        assert_eq!(shares[0].cases, 40.0);
        assert_eq!(shares[0].population, 20_000.0);
        assert_eq!(shares[0].incidence_rate, 200.0);
        let total: f64 = shares.iter().map(|s| s.proportion).sum();
        assert!((total - 100.0).abs() < 0.05, "total {total}");
    }

    #[test]
    fn excluded_types_do_not_take_a_share() {
        let table = vec![
            row(2000, Sex::Female, "20-24", "모든 암", 50.0, 1000.0),
            row(2000, Sex::Female, "20-24", "갑상선", 25.0, 1000.0),
            row(2000, Sex::Female, "20-24", "유방", 25.0, 1000.0),
        ];
        let shares = bucket_shares(&table, Sex::Female, AgeBucket::Age20To39, &ViewFilter::new().exclude("모든 암"));
        assert_eq!(shares.len(), 2);
        assert!(shares.iter().all(|s| s.proportion == 50.0));
        // Ties break by name
        assert_eq!(shares[0].cancer_type, "갑상선");
    }

    #[test]
    fn empty_bucket_yields_no_rows_and_zero_rates_no_share() {
        let table = vec![row(2000, Sex::Male, "0-4", "위", 0.0, 0.0)];
        assert!(bucket_shares(&table, Sex::Male, AgeBucket::Age60Plus, &ViewFilter::default()).is_empty());
        let shares = bucket_shares(&table, Sex::Male, AgeBucket::Age0To19, &ViewFilter::default());
        assert_eq!(shares[0].proportion, 0.0);
    }

    #[test]
    fn view_covers_buckets_in_order() {
        let table = vec![
            row(2000, Sex::Male, "70-74", "위", 1.0, 100.0),
            row(2000, Sex::Male, "0-4", "위", 1.0, 100.0),
        ];
        let view = bucket_view(&table, Sex::Male, &ViewFilter::default());
        let buckets: Vec<AgeBucket> = view.iter().map(|s| s.bucket).collect();
        assert_eq!(buckets, vec![AgeBucket::Age0To19, AgeBucket::Age60Plus]);
    }
}
