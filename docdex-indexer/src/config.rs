//! Application configuration: TOML file with environment overrides.
//!
//! Everything has a usable default except the remote endpoints and keys,
//! which must come from the file or from `DOCDEX_*` environment variables.
//! Validation happens before a run starts; a bad configuration is the one
//! error class that is fatal rather than absorbed into run statistics.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::SearchBackendConfig;
use crate::pipeline::PipelineConfig;
use docdex_embed::{EmbedConfig, RetryPolicy};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DocdexConfig {
    pub search: SearchSection,
    pub embedding: EmbeddingSection,
    pub indexing: IndexingSection,
    pub retry: RetrySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Search service base URL.
    pub endpoint: String,
    /// API key for the search service.
    pub api_key: String,
    /// Target index name.
    pub index: String,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            index: "documents".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    /// Embedding service base URL.
    pub endpoint: String,
    /// API key for the embedding service.
    pub api_key: String,
    /// Embedding deployment name.
    pub deployment: String,
    /// Model identity for cache fingerprints; defaults to the deployment.
    pub model_id: Option<String>,
    /// Expected embedding dimension.
    pub dimension: usize,
    /// Token budget before deterministic truncation.
    pub max_input_tokens: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            deployment: String::new(),
            model_id: None,
            dimension: 1536,
            max_input_tokens: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexingSection {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    pub max_workers: usize,
    pub embed_concurrency: usize,
    pub incremental: bool,
    pub cache: bool,
    pub max_file_size_mb: u64,
    pub extensions: Vec<String>,
    pub excluded_dirs: Vec<String>,
    /// Location of the tracker/cache database.
    pub state_db: PathBuf,
}

impl Default for IndexingSection {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            chunk_size: defaults.chunk_size,
            chunk_overlap: defaults.chunk_overlap,
            batch_size: defaults.batch_size,
            max_workers: defaults.max_workers,
            embed_concurrency: defaults.embed_concurrency,
            incremental: defaults.incremental,
            cache: defaults.use_cache,
            max_file_size_mb: 100,
            extensions: defaults.supported_extensions,
            excluded_dirs: defaults.excluded_dirs,
            state_db: PathBuf::from(".docdex.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

impl DocdexConfig {
    /// Load configuration from an optional TOML file, then apply
    /// `DOCDEX_*` environment overrides for the remote credentials.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        override_from_env("DOCDEX_SEARCH_ENDPOINT", &mut self.search.endpoint);
        override_from_env("DOCDEX_SEARCH_API_KEY", &mut self.search.api_key);
        override_from_env("DOCDEX_SEARCH_INDEX", &mut self.search.index);
        override_from_env("DOCDEX_EMBEDDING_ENDPOINT", &mut self.embedding.endpoint);
        override_from_env("DOCDEX_EMBEDDING_API_KEY", &mut self.embedding.api_key);
        override_from_env("DOCDEX_EMBEDDING_DEPLOYMENT", &mut self.embedding.deployment);
    }

    /// Validate the pieces required to reach the remote services.
    pub fn validate_remote(&self) -> Result<()> {
        if self.search.endpoint.trim().is_empty() {
            bail!("search.endpoint is not configured (or set DOCDEX_SEARCH_ENDPOINT)");
        }
        if self.search.api_key.trim().is_empty() {
            bail!("search.api_key is not configured (or set DOCDEX_SEARCH_API_KEY)");
        }
        if self.embedding.endpoint.trim().is_empty() {
            bail!("embedding.endpoint is not configured (or set DOCDEX_EMBEDDING_ENDPOINT)");
        }
        if self.embedding.api_key.trim().is_empty() {
            bail!("embedding.api_key is not configured (or set DOCDEX_EMBEDDING_API_KEY)");
        }
        if self.embedding.deployment.trim().is_empty() {
            bail!("embedding.deployment is not configured (or set DOCDEX_EMBEDDING_DEPLOYMENT)");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    pub fn embed_config(&self) -> EmbedConfig {
        let mut config = EmbedConfig::new(
            self.embedding.endpoint.clone(),
            self.embedding.api_key.clone(),
            self.embedding.deployment.clone(),
            self.embedding.dimension,
        )
        .with_max_input_tokens(self.embedding.max_input_tokens);
        if let Some(model_id) = &self.embedding.model_id {
            config = config.with_model_id(model_id.clone());
        }
        config
    }

    pub fn search_backend_config(&self) -> SearchBackendConfig {
        SearchBackendConfig::new(
            self.search.endpoint.clone(),
            self.search.api_key.clone(),
            self.search.index.clone(),
        )
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            chunk_size: self.indexing.chunk_size,
            chunk_overlap: self.indexing.chunk_overlap,
            batch_size: self.indexing.batch_size,
            max_workers: self.indexing.max_workers,
            embed_concurrency: self.indexing.embed_concurrency,
            incremental: self.indexing.incremental,
            use_cache: self.indexing.cache,
            max_file_size: self.indexing.max_file_size_mb * 1024 * 1024,
            supported_extensions: self.indexing.extensions.clone(),
            excluded_dirs: self.indexing.excluded_dirs.clone(),
            retry: self.retry_policy(),
        }
    }
}

fn override_from_env(key: &str, target: &mut String) {
    if let Ok(value) = std::env::var(key) {
        if !value.trim().is_empty() {
            *target = value;
        }
    }
}
