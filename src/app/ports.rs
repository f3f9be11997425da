use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpGetResult, String>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl HttpGetResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the server named a media type and it is not JSON. An
    /// absent header counts as unknown, not foreign.
    pub fn is_foreign_media(&self) -> bool {
        let media = self.content_type.to_ascii_lowercase();
        !media.trim().is_empty() && !media.contains("json")
    }
}

/// Key-value store for raw API responses, keyed by a logical identifier
/// such as `population-1999-2023`.
#[async_trait]
pub trait CacheStorePort: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<Value>>, String>;
    async fn put(&self, key: &str, records: &[Value]) -> Result<(), String>;
    async fn remove(&self, key: &str) -> Result<(), String>;
}

/// Supplies the API key injected into every batch query.
pub trait CredentialPort: Send + Sync {
    fn api_key(&self) -> String;
}
