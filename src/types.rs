use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Sex stratum. Ordering follows the upstream tables: male rows first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Maps the localized or English sex label onto the enum.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "남자" | "남" | "male" | "Male" | "M" => Some(Sex::Male),
            "여자" | "여" | "female" | "Female" | "F" => Some(Sex::Female),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }

    pub fn all() -> [Sex; 2] {
        [Sex::Male, Sex::Female]
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sex::from_label(s).ok_or_else(|| format!("unknown sex: {}", s))
    }
}

/// One record as returned by the statistics API. Only lives between fetch
/// and normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawObservation {
    #[serde(rename = "PRD_DE", default)]
    pub period: String,
    #[serde(rename = "C1", default)]
    pub c1_code: Option<String>,
    #[serde(rename = "C1_NM", default)]
    pub c1_label: Option<String>,
    #[serde(rename = "C2", default)]
    pub sex_code: Option<String>,
    #[serde(rename = "C2_NM", default)]
    pub sex_label: Option<String>,
    #[serde(rename = "C3", default)]
    pub age_code: Option<String>,
    #[serde(rename = "C3_NM", default)]
    pub age_label: Option<String>,
    #[serde(rename = "DT", default, deserialize_with = "deserialize_numeric")]
    pub value: Option<f64>,
}

/// KOSIS sends values as strings ("12345", "-") and occasionally as numbers.
fn deserialize_numeric<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationRecord {
    pub year: i32,
    pub sex: Sex,
    pub age_group: String,
    pub population: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancerRecord {
    pub year: i32,
    pub sex: Sex,
    pub age_group: String,
    pub cancer_type: String,
    pub cases: f64,
}

/// Split of the coarse 80+ stratum learned from a reference year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimationRatio {
    pub sex: Sex,
    pub reference_year: i32,
    pub ratio_80_84: f64,
    pub ratio_85_plus: f64,
}

/// A case row after the population join. `population` is `None` when no
/// population record shares the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRecord {
    pub year: i32,
    pub sex: Sex,
    pub age_group: String,
    pub cancer_type: String,
    pub cases: f64,
    pub population: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidenceRecord {
    pub year: i32,
    pub sex: Sex,
    pub age_group: String,
    pub cancer_type: String,
    pub cases: f64,
    pub population: f64,
    pub incidence_rate: f64,
}

/// Join key shared by the population and case tables.
pub type StratumKey = (i32, Sex, String);
