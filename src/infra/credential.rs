use crate::app::ports::CredentialPort;

/// A credential resolved once by the caller and handed to the pipeline.
pub struct StaticCredential {
    api_key: String,
}

impl StaticCredential {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into() }
    }
}

impl CredentialPort for StaticCredential {
    fn api_key(&self) -> String {
        self.api_key.clone()
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredential").field("api_key", &"***").finish()
    }
}
