//! CSV persistence for the reconciled and final tables.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::{FINAL_TABLE_FILE, MISSING_JOINS_FILE, MISSING_SUMMARY_FILE};
use crate::error::Result;
use crate::pipeline::processing::reconcile::{MissingCombination, ReconciledTable};
use crate::types::{IncidenceRecord, JoinedRecord};

const INCIDENCE_HEADER: [&str; 7] = ["year", "sex", "age_group", "cancer_type", "cases", "population", "incidence_rate"];
const JOINED_HEADER: [&str; 6] = ["year", "sex", "age_group", "cancer_type", "cases", "population"];
const SUMMARY_HEADER: [&str; 2] = ["year", "age_group"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputPaths {
    pub final_table: PathBuf,
    pub missing_joins: PathBuf,
    pub missing_summary: PathBuf,
}

impl OutputPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            final_table: dir.join(FINAL_TABLE_FILE),
            missing_joins: dir.join(MISSING_JOINS_FILE),
            missing_summary: dir.join(MISSING_SUMMARY_FILE),
        }
    }
}

/// Header row first, so a file with zero rows still documents its columns.
fn write_rows<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_incidence(path: &Path, rows: &[IncidenceRecord]) -> Result<()> {
    write_rows(path, &INCIDENCE_HEADER, rows)
}

/// Unmatched rows keep an empty population column.
pub fn write_unmatched(path: &Path, rows: &[JoinedRecord]) -> Result<()> {
    write_rows(path, &JOINED_HEADER, rows)
}

pub fn write_unmatched_summary(path: &Path, rows: &[MissingCombination]) -> Result<()> {
    write_rows(path, &SUMMARY_HEADER, rows)
}

/// Writes all three output files into `dir`, creating it if needed.
pub fn write_outputs(dir: &Path, incidence: &[IncidenceRecord], reconciled: &ReconciledTable) -> Result<OutputPaths> {
    fs::create_dir_all(dir)?;
    let paths = OutputPaths::in_dir(dir);

    write_unmatched(&paths.missing_joins, &reconciled.unmatched)?;
    let summary = reconciled.unmatched_summary();
    write_unmatched_summary(&paths.missing_summary, &summary)?;
    if !reconciled.unmatched.is_empty() {
        info!(
            "Saved {} unmatched rows ({} year/age combinations) to {}",
            reconciled.unmatched.len(),
            summary.len(),
            paths.missing_joins.display()
        );
    }

    write_incidence(&paths.final_table, incidence)?;
    info!("Final data saved to {} ({} rows)", paths.final_table.display(), incidence.len());
    Ok(paths)
}

/// Loads a final incidence table previously written by [`write_incidence`].
pub fn read_incidence_csv(path: &Path) -> Result<Vec<IncidenceRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}
