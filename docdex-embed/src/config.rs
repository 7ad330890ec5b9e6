//! Configuration for the remote embedding provider.

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default API version sent to the embeddings endpoint.
pub const DEFAULT_API_VERSION: &str = "2024-02-01";

/// Token budget applied before every embedding call. Text beyond this is
/// truncated deterministically rather than rejected by the service.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 8000;

/// Connection settings for a deployment-style embeddings endpoint.
///
/// The provider treats the embedding function as pure for a fixed
/// `model_id`: the same identifier must always point at the same
/// model/deployment, because cached vectors are keyed by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Service base URL, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    /// API key sent in the `api-key` header.
    pub api_key: String,
    /// Name of the embedding deployment to call.
    pub deployment: String,
    /// API version query parameter.
    pub api_version: String,
    /// Model identity folded into cache fingerprints. Defaults to the
    /// deployment name.
    pub model_id: String,
    /// Expected vector dimension; responses with another dimension are
    /// rejected. Zero disables the check.
    pub dimension: usize,
    /// Maximum input length in tokens before deterministic truncation.
    pub max_input_tokens: usize,
    /// Per-call timeout.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl EmbedConfig {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
        dimension: usize,
    ) -> Self {
        let deployment = deployment.into();
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model_id: deployment.clone(),
            deployment,
            api_version: DEFAULT_API_VERSION.to_string(),
            dimension,
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_max_input_tokens(mut self, max_input_tokens: usize) -> Self {
        self.max_input_tokens = max_input_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate the configuration before any call is made.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(EmbedError::config("embedding endpoint is empty"));
        }
        if self.api_key.trim().is_empty() {
            return Err(EmbedError::config("embedding api key is empty"));
        }
        if self.deployment.trim().is_empty() {
            return Err(EmbedError::config("embedding deployment is empty"));
        }
        if self.max_input_tokens == 0 {
            return Err(EmbedError::config("max input tokens must be positive"));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_id_defaults_to_deployment() {
        let config = EmbedConfig::new("https://x.example.com", "key", "text-embedding-3-small", 1536);
        assert_eq!(config.model_id, "text-embedding-3-small");

        let config = config.with_model_id("custom-id");
        assert_eq!(config.model_id, "custom-id");
    }

    #[test]
    fn validation_rejects_blank_fields() {
        assert!(EmbedConfig::new("", "key", "dep", 1536).validate().is_err());
        assert!(EmbedConfig::new("https://x", "", "dep", 1536).validate().is_err());
        assert!(EmbedConfig::new("https://x", "key", "", 1536).validate().is_err());
        assert!(EmbedConfig::new("https://x", "key", "dep", 1536).validate().is_ok());
    }
}
