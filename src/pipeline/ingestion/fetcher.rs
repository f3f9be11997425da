use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::app::ports::{CredentialPort, HttpClientPort};
use crate::constants::{PARAM_API_KEY, PARAM_END_YEAR, PARAM_START_YEAR};
use crate::observability::metrics;

/// One year window of a batched query, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWindow {
    pub index: usize,
    pub start_year: i32,
    pub end_year: i32,
}

/// Why a batch contributed no records.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchFailureKind {
    InvalidUrl(String),
    Transport(String),
    Status(u16),
    Malformed(String),
    /// Body failed to parse and the server labelled it as something else,
    /// typically an HTML error page.
    UnexpectedContentType(String),
    NotAList,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub window: BatchWindow,
    pub kind: BatchFailureKind,
}

/// Result of a batched fetch: whatever parsed, plus which batches did not.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub records: Vec<Value>,
    pub batches: usize,
    pub failures: Vec<BatchFailure>,
}

impl FetchReport {
    pub fn all_failed(&self) -> bool {
        self.batches > 0 && self.failures.len() == self.batches
    }
}

/// Splits `[start_year, end_year]` into consecutive windows of `width` years,
/// the last one clipped to `end_year`.
pub fn batch_windows(start_year: i32, end_year: i32, width: i32) -> Vec<BatchWindow> {
    let width = width.max(1);
    let mut windows = Vec::new();
    let mut year = start_year;
    while year <= end_year {
        windows.push(BatchWindow {
            index: windows.len(),
            start_year: year,
            end_year: (year + width - 1).min(end_year),
        });
        year += width;
    }
    windows
}

/// Rewrites the template's year bounds and credential, leaving every other
/// query parameter as it was.
pub fn build_batch_url(template: &str, window: &BatchWindow, api_key: &str) -> Result<String, String> {
    let mut url = reqwest::Url::parse(template).map_err(|e| e.to_string())?;
    let replaced = [PARAM_START_YEAR, PARAM_END_YEAR, PARAM_API_KEY];
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !replaced.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.push((PARAM_START_YEAR.to_string(), window.start_year.to_string()));
    pairs.push((PARAM_END_YEAR.to_string(), window.end_year.to_string()));
    pairs.push((PARAM_API_KEY.to_string(), api_key.to_string()));
    url.query_pairs_mut().clear().extend_pairs(pairs);
    Ok(url.to_string())
}

/// Issues every batch of a series concurrently and concatenates whatever
/// parsed. A failing batch never fails the call.
pub struct BatchFetcher {
    http: Arc<dyn HttpClientPort>,
    credential: Arc<dyn CredentialPort>,
    batch_width: i32,
}

impl BatchFetcher {
    pub fn new(http: Arc<dyn HttpClientPort>, credential: Arc<dyn CredentialPort>, batch_width: i32) -> Self {
        Self { http, credential, batch_width }
    }

    #[instrument(skip(self, url_template))]
    pub async fn fetch(&self, series: &str, url_template: &str, start_year: i32, end_year: i32) -> FetchReport {
        let windows = batch_windows(start_year, end_year, self.batch_width);
        let api_key = self.credential.api_key();
        info!("Sending {} batch requests for {}", windows.len(), series);
        let started = Instant::now();

        let requests = windows
            .iter()
            .map(|window| self.fetch_window(url_template, *window, &api_key));
        let outcomes = join_all(requests).await;

        let mut report = FetchReport {
            batches: windows.len(),
            ..FetchReport::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(mut records) => {
                    metrics::fetch::batch_success(series, records.len());
                    report.records.append(&mut records);
                }
                Err(failure) => {
                    metrics::fetch::batch_error(series);
                    report.failures.push(failure);
                }
            }
        }

        metrics::fetch::duration(series, started.elapsed().as_secs_f64());
        info!(
            "Fetched {} records for {} ({} of {} batches failed)",
            report.records.len(),
            series,
            report.failures.len(),
            report.batches
        );
        report
    }

    async fn fetch_window(&self, url_template: &str, window: BatchWindow, api_key: &str) -> Result<Vec<Value>, BatchFailure> {
        let fail = |kind: BatchFailureKind| BatchFailure { window, kind };

        let url = build_batch_url(url_template, &window, api_key).map_err(|e| fail(BatchFailureKind::InvalidUrl(e)))?;
        let response = self.http.get(&url).await.map_err(|e| {
            error!("Batch {} ({}-{}) transport failure: {}", window.index, window.start_year, window.end_year, e);
            fail(BatchFailureKind::Transport(e))
        })?;

        if !response.is_success() {
            error!("Batch {} failed with status {}", window.index, response.status);
            return Err(fail(BatchFailureKind::Status(response.status)));
        }

        match serde_json::from_slice::<Value>(&response.bytes) {
            Ok(Value::Array(records)) => Ok(records),
            Ok(_) => {
                warn!("Batch {} returned non-list data", window.index);
                Err(fail(BatchFailureKind::NotAList))
            }
            Err(_) if response.is_foreign_media() => {
                error!("Batch {} answered with {} instead of JSON", window.index, response.content_type);
                Err(fail(BatchFailureKind::UnexpectedContentType(response.content_type)))
            }
            Err(e) => {
                error!("Failed to parse JSON for batch {}: {}", window.index, e);
                Err(fail(BatchFailureKind::Malformed(e.to_string())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpGetResult;
    use crate::infra::credential::StaticCredential;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers by the `startPrdDe` parameter of each request.
    struct ScriptedHttp {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClientPort for ScriptedHttp {
        async fn get(&self, url: &str) -> Result<HttpGetResult, String> {
            self.seen.lock().unwrap().push(url.to_string());
            let parsed = reqwest::Url::parse(url).unwrap();
            let start = parsed
                .query_pairs()
                .find(|(k, _)| k == PARAM_START_YEAR)
                .map(|(_, v)| v.into_owned())
                .unwrap();
            let ok = |body: Value| HttpGetResult {
                status: 200,
                bytes: serde_json::to_vec(&body).unwrap(),
                content_type: "application/json".into(),
            };
            match start.as_str() {
                "1999" => Ok(ok(json!([{"PRD_DE": "1999"}, {"PRD_DE": "2000"}]))),
                "2004" => Err("connection reset".into()),
                "2009" => Ok(HttpGetResult { status: 500, bytes: vec![], content_type: "text/plain".into() }),
                "2014" => Ok(ok(json!({"err": "30", "errMsg": "no data"}))),
                "2019" => Ok(HttpGetResult {
                    status: 200,
                    bytes: b"<html>".to_vec(),
                    content_type: "text/html; charset=utf-8".into(),
                }),
                "2029" => Ok(HttpGetResult {
                    status: 200,
                    bytes: b"[{\"PRD_DE\": ".to_vec(),
                    content_type: "application/json;charset=UTF-8".into(),
                }),
                "2034" => Ok(HttpGetResult { status: 200, bytes: b"not json".to_vec(), content_type: String::new() }),
                _ => Ok(ok(json!([{"PRD_DE": start}]))),
            }
        }
    }

    #[test]
    fn windows_cover_span_and_clip_last() {
        let windows = batch_windows(1999, 2023, 5);
        assert_eq!(windows.len(), 5);
        assert_eq!((windows[0].start_year, windows[0].end_year), (1999, 2003));
        assert_eq!((windows[4].start_year, windows[4].end_year), (2019, 2023));

        let clipped = batch_windows(2000, 2006, 5);
        assert_eq!((clipped[1].start_year, clipped[1].end_year), (2005, 2006));
        assert!(batch_windows(2010, 2009, 5).is_empty());
    }

    #[test]
    fn batch_url_replaces_bounds_and_key() {
        let template = "https://kosis.kr/openapi/x.do?method=getList&apiKey=&itmId=T10+&startPrdDe=1999&endPrdDe=2023";
        let window = BatchWindow { index: 1, start_year: 2004, end_year: 2008 };
        let url = build_batch_url(template, &window, "KEY").unwrap();
        let parsed = reqwest::Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();

        let get = |name: &str| pairs.iter().filter(|(k, _)| k == name).map(|(_, v)| v.clone()).collect::<Vec<_>>();
        assert_eq!(get("startPrdDe"), vec!["2004"]);
        assert_eq!(get("endPrdDe"), vec!["2008"]);
        assert_eq!(get("apiKey"), vec!["KEY"]);
        assert_eq!(get("itmId"), vec!["T10 "]);
        assert_eq!(get("method"), vec!["getList"]);
    }

    #[tokio::test]
    async fn failing_batches_contribute_nothing() {
        let http = Arc::new(ScriptedHttp { seen: Mutex::new(Vec::new()) });
        let fetcher = BatchFetcher::new(http.clone(), Arc::new(StaticCredential::new("KEY")), 5);

        let report = fetcher.fetch("population", "https://example.org/api?startPrdDe=0&endPrdDe=0", 1999, 2023).await;

        assert_eq!(report.batches, 5);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.failures.len(), 4);
        assert!(!report.all_failed());
        assert_eq!(http.seen.lock().unwrap().len(), 5);

        let kinds: Vec<_> = report.failures.iter().map(|f| (f.window.start_year, f.kind.clone())).collect();
        assert!(kinds.contains(&(2004, BatchFailureKind::Transport("connection reset".into()))));
        assert!(kinds.contains(&(2009, BatchFailureKind::Status(500))));
        assert!(kinds.contains(&(2014, BatchFailureKind::NotAList)));
        assert!(kinds.contains(&(2019, BatchFailureKind::UnexpectedContentType("text/html; charset=utf-8".into()))));
    }

    #[tokio::test]
    async fn truncated_json_is_malformed_not_foreign() {
        let http = Arc::new(ScriptedHttp { seen: Mutex::new(Vec::new()) });
        let fetcher = BatchFetcher::new(http, Arc::new(StaticCredential::new("KEY")), 5);

        let report = fetcher.fetch("cancer", "https://example.org/api", 2029, 2038).await;

        assert_eq!(report.batches, 2);
        assert!(report.all_failed());
        // Declared JSON, then no declared type at all
        assert!(report.failures.iter().all(|f| matches!(f.kind, BatchFailureKind::Malformed(_))));
    }

    #[tokio::test]
    async fn every_batch_failing_is_reported() {
        let http = Arc::new(ScriptedHttp { seen: Mutex::new(Vec::new()) });
        let fetcher = BatchFetcher::new(http, Arc::new(StaticCredential::new("KEY")), 5);

        let report = fetcher.fetch("cancer", "https://example.org/api", 2004, 2008).await;
        assert!(report.records.is_empty());
        assert!(report.all_failed());
    }
}
