use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::constants;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub estimation: EstimationConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub population_url: String,
    pub cancer_url: String,
    pub start_year: i32,
    pub end_year: i32,
    pub batch_width: i32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    pub gap_year: i32,
    /// `None` picks the earliest non-gap year reporting both fine strata.
    pub reference_year: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
    pub cache_dir: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            population_url: constants::POPULATION_URL_TEMPLATE.to_string(),
            cancer_url: constants::CANCER_URL_TEMPLATE.to_string(),
            start_year: constants::DEFAULT_START_YEAR,
            end_year: constants::DEFAULT_END_YEAR,
            batch_width: constants::BATCH_WIDTH_YEARS,
            timeout_seconds: constants::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            gap_year: constants::GAP_YEAR,
            reference_year: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "output".to_string(),
            cache_dir: "cache".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            estimation: EstimationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `config_path` when it exists, defaults otherwise.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.start_year > self.api.end_year {
            return Err(PipelineError::Config(format!(
                "start_year {} is after end_year {}",
                self.api.start_year, self.api.end_year
            )));
        }
        if self.api.batch_width < 1 {
            return Err(PipelineError::Config("batch_width must be at least 1".to_string()));
        }
        Ok(())
    }
}
