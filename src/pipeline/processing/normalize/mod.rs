//! Turns raw API observations into typed population and case records.
//!
//! Age labels arrive as free text ("75-79세", "85세 이상", "0 - 4세") and are
//! reduced to the canonical vocabulary used as the join key.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::constants::{AGE_85_PLUS, MERGED_INTO_85_PLUS};
use crate::observability::metrics;
use crate::types::{CancerRecord, PopulationRecord, RawObservation, Sex, StratumKey};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static RANGE_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-~〜～–—−－]{2,}|[~〜～–—−－]").expect("separator pattern"));
static REPEATED_PLUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\+{2,}").expect("plus pattern"));

/// Canonical form of an age label. Pure, total and idempotent; an empty
/// label stays empty.
pub fn normalize_age_label(label: &str) -> String {
    if label.is_empty() {
        return String::new();
    }
    // Spaces go first: "이 상" must read as "이상"
    let cleaned = WHITESPACE.replace_all(label, "");
    let cleaned = cleaned.replace('세', "").replace("이상", "+");
    let cleaned = RANGE_SEPARATOR.replace_all(&cleaned, "-");
    let cleaned = REPEATED_PLUS.replace_all(&cleaned, "+");

    if MERGED_INTO_85_PLUS.contains(&cleaned.as_ref()) {
        return AGE_85_PLUS.to_string();
    }
    cleaned.into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    Malformed,
    InvalidYear,
    UnknownSex,
    MissingValue,
    NegativeValue,
    MissingCancerType,
}

/// Rows dropped while decoding, by reason.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizationReport {
    pub accepted: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
}

impl NormalizationReport {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    fn skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedSeries<T> {
    pub records: Vec<T>,
    pub report: NormalizationReport,
}

/// Fields shared by both series once a raw row has been validated.
struct DecodedRow {
    year: i32,
    sex: Sex,
    age_group: String,
    value: f64,
    c1_label: Option<String>,
}

fn decode(record: &Value) -> Result<DecodedRow, SkipReason> {
    let raw = RawObservation::deserialize(record).map_err(|_| SkipReason::Malformed)?;
    let year = raw.period.trim().parse::<i32>().map_err(|_| SkipReason::InvalidYear)?;
    let sex = raw
        .sex_label
        .as_deref()
        .and_then(Sex::from_label)
        .ok_or(SkipReason::UnknownSex)?;
    let value = raw.value.ok_or(SkipReason::MissingValue)?;
    if value < 0.0 {
        return Err(SkipReason::NegativeValue);
    }
    Ok(DecodedRow {
        year,
        sex,
        age_group: normalize_age_label(raw.age_label.as_deref().unwrap_or_default()),
        value,
        c1_label: raw.c1_label,
    })
}

/// Population rows as reported; duplicates are summed later by
/// [`aggregate_population`], never dropped here.
pub fn normalize_population(records: &[Value]) -> NormalizedSeries<PopulationRecord> {
    let mut report = NormalizationReport::default();
    let mut out = Vec::with_capacity(records.len());

    for record in records {
        match decode(record) {
            Ok(row) => out.push(PopulationRecord {
                year: row.year,
                sex: row.sex,
                age_group: row.age_group,
                population: row.value,
            }),
            Err(reason) => report.skip(reason),
        }
    }

    report.accepted = out.len();
    metrics::normalize::rows("population", report.accepted, report.skipped_total());
    info!(
        "Normalized {} population rows ({} skipped)",
        report.accepted,
        report.skipped_total()
    );
    NormalizedSeries { records: out, report }
}

/// Case rows, with exact duplicate rows collapsed to one.
pub fn normalize_cancer(records: &[Value]) -> NormalizedSeries<CancerRecord> {
    let mut report = NormalizationReport::default();
    let mut out = Vec::with_capacity(records.len());

    for record in records {
        let row = match decode(record) {
            Ok(row) => row,
            Err(reason) => {
                report.skip(reason);
                continue;
            }
        };
        let cancer_type = match row.c1_label.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
            Some(t) => t,
            None => {
                report.skip(SkipReason::MissingCancerType);
                continue;
            }
        };
        out.push(CancerRecord {
            year: row.year,
            sex: row.sex,
            age_group: row.age_group,
            cancer_type,
            cases: row.value,
        });
    }

    let out = dedupe_cancer(out);
    report.accepted = out.len();
    metrics::normalize::rows("cancer", report.accepted, report.skipped_total());
    info!(
        "Normalized {} cancer rows ({} skipped)",
        report.accepted,
        report.skipped_total()
    );
    NormalizedSeries { records: out, report }
}

/// Collapses rows identical in key and value, keeping first occurrence order.
pub fn dedupe_cancer(records: Vec<CancerRecord>) -> Vec<CancerRecord> {
    let before = records.len();
    let mut seen = HashSet::new();
    let out: Vec<CancerRecord> = records
        .into_iter()
        .filter(|r| seen.insert((r.year, r.sex, r.age_group.clone(), r.cancer_type.clone(), r.cases.to_bits())))
        .collect();
    if out.len() != before {
        debug!("Collapsed {} duplicate cancer rows", before - out.len());
    }
    out
}

/// Sums population per (year, sex, age_group); output sorted by key.
pub fn aggregate_population(records: &[PopulationRecord]) -> Vec<PopulationRecord> {
    let mut totals: BTreeMap<StratumKey, f64> = BTreeMap::new();
    for r in records {
        *totals.entry((r.year, r.sex, r.age_group.clone())).or_insert(0.0) += r.population;
    }
    totals
        .into_iter()
        .map(|((year, sex, age_group), population)| PopulationRecord { year, sex, age_group, population })
        .collect()
}
