pub mod fetcher;

use serde_json::Value;
use tracing::{info, warn};

use crate::app::ports::CacheStorePort;
use crate::constants::cache_key;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use fetcher::{BatchFetcher, FetchReport};

/// Which upstream series to load and how to validate a cached copy of it.
#[derive(Debug, Clone)]
pub struct SeriesRequest<'a> {
    pub series: &'a str,
    pub url_template: &'a str,
    pub start_year: i32,
    pub end_year: i32,
    /// Age category codes (`C3`) a cached payload must contain to be trusted.
    pub required_age_codes: &'a [&'a str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    Cache,
    Api,
}

#[derive(Debug)]
pub struct SeriesLoad {
    pub records: Vec<Value>,
    pub source: RecordSource,
    /// Present when the records came from the API.
    pub fetch_report: Option<FetchReport>,
}

fn has_required_codes(records: &[Value], required: &[&str]) -> bool {
    required
        .iter()
        .all(|code| records.iter().any(|r| r.get("C3").and_then(Value::as_str) == Some(*code)))
}

/// Reads the series from cache when a trustworthy copy exists, otherwise
/// fetches it and caches a non-empty result.
pub async fn load_series(
    fetcher: &BatchFetcher,
    cache: &dyn CacheStorePort,
    request: &SeriesRequest<'_>,
    use_cache: bool,
) -> Result<SeriesLoad> {
    let key = cache_key(request.series, request.start_year, request.end_year);

    if use_cache {
        match cache.get(&key).await {
            Ok(Some(records)) if !records.is_empty() && has_required_codes(&records, request.required_age_codes) => {
                info!("Loading {} from cache: {}", request.series, key);
                metrics::fetch::cache_hit(request.series);
                return Ok(SeriesLoad { records, source: RecordSource::Cache, fetch_report: None });
            }
            Ok(Some(_)) => {
                info!("Cached {} is empty or missing required age codes; refreshing", key);
                if let Err(e) = cache.remove(&key).await {
                    warn!("Failed to drop stale cache entry {}: {}", key, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Cache read for {} failed, fetching instead: {}", key, e),
        }
    }

    metrics::fetch::cache_miss(request.series);
    info!("No usable cache for {}. Fetching from API...", request.series);
    let report = fetcher
        .fetch(request.series, request.url_template, request.start_year, request.end_year)
        .await;

    if report.records.is_empty() {
        return Err(PipelineError::NoData { series: request.series.to_string() });
    }

    if use_cache {
        match cache.put(&key, &report.records).await {
            Ok(()) => info!("Saved {} to cache: {}", request.series, key),
            Err(e) => warn!("Failed to cache {}: {}", key, e),
        }
    }

    Ok(SeriesLoad {
        records: report.records.clone(),
        source: RecordSource::Api,
        fetch_report: Some(report),
    })
}
