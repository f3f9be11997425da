//! Metric names and recording helpers for each pipeline phase.
//!
//! Recording is a no-op until a recorder is installed, so library callers and
//! tests never need to initialize anything.

use std::fmt;
use std::net::SocketAddr;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Fetch metrics
    FetchBatchesSuccess,
    FetchBatchesError,
    FetchRecordsReceived,
    FetchDuration,
    CacheHits,
    CacheMisses,

    // Normalize metrics
    NormalizeRowsAccepted,
    NormalizeRowsSkipped,

    // Estimation metrics
    EstimationSynthesizedRows,
    EstimationSkipped,

    // Reconcile metrics
    ReconcileMatched,
    ReconcileUnmatched,

    // Rates and views
    RatesRowsProduced,
    ViewWarnings,

    PipelineDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::FetchBatchesSuccess => "incidence_fetch_batches_success_total",
            MetricName::FetchBatchesError => "incidence_fetch_batches_error_total",
            MetricName::FetchRecordsReceived => "incidence_fetch_records_received_total",
            MetricName::FetchDuration => "incidence_fetch_duration_seconds",
            MetricName::CacheHits => "incidence_cache_hits_total",
            MetricName::CacheMisses => "incidence_cache_misses_total",
            MetricName::NormalizeRowsAccepted => "incidence_normalize_rows_accepted_total",
            MetricName::NormalizeRowsSkipped => "incidence_normalize_rows_skipped_total",
            MetricName::EstimationSynthesizedRows => "incidence_estimation_synthesized_rows_total",
            MetricName::EstimationSkipped => "incidence_estimation_skipped_total",
            MetricName::ReconcileMatched => "incidence_reconcile_matched_total",
            MetricName::ReconcileUnmatched => "incidence_reconcile_unmatched_total",
            MetricName::RatesRowsProduced => "incidence_rates_rows_produced_total",
            MetricName::ViewWarnings => "incidence_view_warnings_total",
            MetricName::PipelineDuration => "incidence_pipeline_duration_seconds",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            FetchBatchesSuccess,
            FetchBatchesError,
            FetchRecordsReceived,
            FetchDuration,
            CacheHits,
            CacheMisses,
            NormalizeRowsAccepted,
            NormalizeRowsSkipped,
            EstimationSynthesizedRows,
            EstimationSkipped,
            ReconcileMatched,
            ReconcileUnmatched,
            RatesRowsProduced,
            ViewWarnings,
            PipelineDuration,
        ]
        .into_iter()
    }
}

/// Installs the Prometheus exporter with an HTTP listener on `port`.
pub fn init(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => tracing::warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}

pub mod fetch {
    use super::MetricName;

    pub fn batch_success(series: &str, records: usize) {
        ::metrics::counter!(MetricName::FetchBatchesSuccess.as_str(), "series" => series.to_string()).increment(1);
        ::metrics::counter!(MetricName::FetchRecordsReceived.as_str(), "series" => series.to_string())
            .increment(records as u64);
    }

    pub fn batch_error(series: &str) {
        ::metrics::counter!(MetricName::FetchBatchesError.as_str(), "series" => series.to_string()).increment(1);
    }

    pub fn duration(series: &str, secs: f64) {
        ::metrics::histogram!(MetricName::FetchDuration.as_str(), "series" => series.to_string()).record(secs);
    }

    pub fn cache_hit(series: &str) {
        ::metrics::counter!(MetricName::CacheHits.as_str(), "series" => series.to_string()).increment(1);
    }

    pub fn cache_miss(series: &str) {
        ::metrics::counter!(MetricName::CacheMisses.as_str(), "series" => series.to_string()).increment(1);
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn rows(series: &str, accepted: usize, skipped: usize) {
        ::metrics::counter!(MetricName::NormalizeRowsAccepted.as_str(), "series" => series.to_string())
            .increment(accepted as u64);
        ::metrics::counter!(MetricName::NormalizeRowsSkipped.as_str(), "series" => series.to_string())
            .increment(skipped as u64);
    }
}

pub mod estimation {
    use super::MetricName;

    pub fn synthesized(rows: usize) {
        ::metrics::counter!(MetricName::EstimationSynthesizedRows.as_str()).increment(rows as u64);
    }

    pub fn skipped(sex: &str) {
        ::metrics::counter!(MetricName::EstimationSkipped.as_str(), "sex" => sex.to_string()).increment(1);
    }
}

pub mod reconcile {
    use super::MetricName;

    pub fn partitioned(matched: usize, unmatched: usize) {
        ::metrics::counter!(MetricName::ReconcileMatched.as_str()).increment(matched as u64);
        ::metrics::counter!(MetricName::ReconcileUnmatched.as_str()).increment(unmatched as u64);
    }
}

pub mod rates {
    use super::MetricName;

    pub fn rows_produced(rows: usize) {
        ::metrics::counter!(MetricName::RatesRowsProduced.as_str()).increment(rows as u64);
    }
}

pub mod views {
    use super::MetricName;

    pub fn warnings(count: usize) {
        ::metrics::counter!(MetricName::ViewWarnings.as_str()).increment(count as u64);
    }
}

pub fn pipeline_duration(secs: f64) {
    ::metrics::histogram!(MetricName::PipelineDuration.as_str()).record(secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn metric_names_are_unique_and_prefixed() {
        let names: HashSet<&str> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        assert_eq!(names.len(), MetricName::all_metrics().count());
        assert!(names.iter().all(|n| n.starts_with("incidence_")));
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        fetch::batch_success("population", 10);
        reconcile::partitioned(1, 2);
        pipeline_duration(0.5);
    }
}
