use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub data_sources: DataSources,
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub llm_model: LlmModelConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataSources {
    pub pdf: PdfSource,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PdfSource {
    pub directory: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Qdrant server; the on-disk store under `path` is used when absent.
    #[serde(default)]
    pub url: Option<String>,
}

fn default_collection() -> String {
    "all".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmModelConfig {
    /// Display name to model identifier.
    #[serde(default)]
    pub models: BTreeMap<String, String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for LlmModelConfig {
    fn default() -> Self {
        Self {
            models: BTreeMap::new(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.data_sources.pdf.directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "data_sources.pdf.directory must not be empty".to_string(),
            ));
        }
        if self.vector_store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "vector_store.path must not be empty".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
