//! Configuration management for docseek.
//!
//! Configuration is merged from several sources, later ones winning:
//! - Built-in defaults
//! - Config file (`.docseek/config.yaml` in the workspace, or `DOCSEEK_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with local state stored in `.docseek/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .docseek/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Vector store connection
    pub store: StoreSettings,

    /// Embedding provider
    pub embedding: EmbeddingSettings,

    /// Collection layout used when a collection is created
    pub collection: CollectionSettings,

    /// Ingestion defaults
    pub indexing: IndexingSettings,

    /// Query defaults
    pub search: SearchSettings,

    /// Collaborator call bounds
    pub timeouts: TimeoutSettings,

    /// Answer generation over retrieved pages
    pub generation: GenerationSettings,
}

/// Vector store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Backend name: "qdrant" or "memory"
    pub backend: String,

    /// Qdrant gRPC endpoint
    pub url: String,

    /// Qdrant API key
    pub api_key: Option<String>,

    /// Collection holding the page entries
    pub collection: String,

    /// Keep payloads on disk rather than in RAM
    pub on_disk_payload: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: "qdrant".to_string(),
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "docseek_pages".to_string(),
            on_disk_payload: true,
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Provider name: "http" or "mock"
    pub provider: String,

    /// Model identifier forwarded to the provider
    pub model: String,

    /// Base URL of the embedding service (http provider)
    pub endpoint: String,

    /// Per-vector dimension produced by the mock provider
    pub mock_dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "http".to_string(),
            model: "vidore/colqwen2-v0.1".to_string(),
            endpoint: "http://localhost:8080".to_string(),
            mock_dimension: 128,
        }
    }
}

/// Collection layout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSettings {
    /// Explicit per-vector dimension; inferred from the first page when unset
    pub dimension: Option<usize>,

    /// Distance metric: "cosine", "dot" or "euclid"
    pub distance: String,

    /// Scalar quantization; `None` stores full-precision vectors
    pub quantization: Option<QuantizationSettings>,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            dimension: None,
            distance: "cosine".to_string(),
            quantization: Some(QuantizationSettings::default()),
        }
    }
}

/// Scalar quantization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizationSettings {
    /// Bit width of each quantized component
    pub bits: u8,

    /// Outlier quantile used to clip the value range
    pub quantile: f32,

    /// Keep quantized vectors resident in RAM
    pub always_ram: bool,
}

impl Default for QuantizationSettings {
    fn default() -> Self {
        Self {
            bits: 8,
            quantile: 0.99,
            always_ram: true,
        }
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingSettings {
    /// Directory scanned for page renders
    pub data_directory: PathBuf,

    /// Pages per embedding call
    pub batch_size: usize,

    /// Value of the payload `source` tag
    pub source: String,

    /// Allow destructive re-creation of an existing collection
    pub allow_replace: bool,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("data/prepared_data"),
            batch_size: 3,
            source: "document_archive".to_string(),
            allow_replace: false,
        }
    }
}

/// Query settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_top_k: usize,
    pub max_top_k: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 20,
        }
    }
}

/// Timeouts for collaborator calls, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub embed_secs: u64,
    pub store_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            embed_secs: 30,
            store_secs: 30,
        }
    }
}

/// Answer generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// LLM provider name: "ollama"
    pub provider: String,

    /// Base URL of the LLM runtime
    pub endpoint: String,

    /// Vision-capable model that reads the page images
    pub model: String,

    /// Upper bound on generated tokens
    pub max_tokens: u32,

    /// Retrieved pages passed to the model as images
    pub pages: usize,

    /// Bound on a single generation call, in seconds
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            model: "minicpm-v".to_string(),
            max_tokens: 2048,
            pages: 1,
            timeout_secs: 120,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    store: Option<StoreSettings>,
    embedding: Option<EmbeddingSettings>,
    collection: Option<CollectionSettings>,
    indexing: Option<IndexingSettings>,
    search: Option<SearchSettings>,
    timeouts: Option<TimeoutSettings>,
    generation: Option<GenerationSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            store: StoreSettings::default(),
            embedding: EmbeddingSettings::default(),
            collection: CollectionSettings::default(),
            indexing: IndexingSettings::default(),
            search: SearchSettings::default(),
            timeouts: TimeoutSettings::default(),
            generation: GenerationSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and the environment.
    ///
    /// Environment variables:
    /// - `DOCSEEK_WORKSPACE`: Override workspace path
    /// - `DOCSEEK_CONFIG`: Path to config file
    /// - `QDRANT_URL`, `QDRANT_API_KEY`: Vector store connection
    /// - `DOCSEEK_COLLECTION`: Collection name
    /// - `DOCSEEK_EMBEDDING_PROVIDER`, `DOCSEEK_EMBEDDING_URL`: Embedding provider
    /// - `DOCSEEK_LLM_URL`, `DOCSEEK_LLM_MODEL`: Answer generation runtime
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use docseek_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Collection: {}", config.store.collection);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Load with an explicit workspace and config file, falling back to
    /// `DOCSEEK_WORKSPACE` and `DOCSEEK_CONFIG`.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        match workspace {
            Some(workspace) => config.workspace = workspace,
            None => {
                if let Ok(workspace) = std::env::var("DOCSEEK_WORKSPACE") {
                    config.workspace = PathBuf::from(workspace);
                }
            }
        }

        match config_file {
            Some(config_file) => config.config_file = Some(config_file),
            None => {
                if let Ok(config_file) = std::env::var("DOCSEEK_CONFIG") {
                    config.config_file = Some(PathBuf::from(config_file));
                }
            }
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.workspace.join(".docseek/config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env();

        Ok(config)
    }

    /// Environment variables override the YAML config.
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.store.url = url;
        }

        if let Ok(api_key) = std::env::var("QDRANT_API_KEY") {
            self.store.api_key = Some(api_key);
        }

        if let Ok(collection) = std::env::var("DOCSEEK_COLLECTION") {
            self.store.collection = collection;
        }

        if let Ok(provider) = std::env::var("DOCSEEK_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Ok(endpoint) = std::env::var("DOCSEEK_EMBEDDING_URL") {
            self.embedding.endpoint = endpoint;
        }

        if let Ok(endpoint) = std::env::var("DOCSEEK_LLM_URL") {
            self.generation.endpoint = endpoint;
        }

        if let Ok(model) = std::env::var("DOCSEEK_LLM_MODEL") {
            self.generation.model = model;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }

        if std::env::var_os("NO_COLOR").is_some() {
            self.no_color = true;
        }
    }

    /// Merge YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(store) = config_file.store {
            result.store = store;
        }
        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(collection) = config_file.collection {
            result.collection = collection;
        }
        if let Some(indexing) = config_file.indexing {
            result.indexing = indexing;
        }
        if let Some(search) = config_file.search {
            result.search = search;
        }
        if let Some(timeouts) = config_file.timeouts {
            result.timeouts = timeouts;
        }
        if let Some(generation) = config_file.generation {
            result.generation = generation;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        collection: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(collection) = collection {
            self.store.collection = collection;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .docseek directory.
    pub fn docseek_dir(&self) -> PathBuf {
        self.workspace.join(".docseek")
    }

    /// Ensure the .docseek directory exists.
    pub fn ensure_docseek_dir(&self) -> AppResult<()> {
        let dir = self.docseek_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .docseek directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolve the data directory against the workspace.
    pub fn data_directory(&self) -> PathBuf {
        if self.indexing.data_directory.is_absolute() {
            self.indexing.data_directory.clone()
        } else {
            self.workspace.join(&self.indexing.data_directory)
        }
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> AppResult<()> {
        let backends = ["qdrant", "memory"];
        if !backends.contains(&self.store.backend.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown store backend: {}. Supported: {}",
                self.store.backend,
                backends.join(", ")
            )));
        }

        let providers = ["http", "mock"];
        if !providers.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                providers.join(", ")
            )));
        }

        if self.store.collection.trim().is_empty() {
            return Err(AppError::Config("Collection name must not be empty".into()));
        }

        if self.indexing.batch_size == 0 {
            return Err(AppError::Config("indexing.batch_size must be positive".into()));
        }

        if self.search.max_top_k == 0 {
            return Err(AppError::Config("search.max_top_k must be positive".into()));
        }

        if self.search.default_top_k == 0 || self.search.default_top_k > self.search.max_top_k {
            return Err(AppError::Config(format!(
                "search.default_top_k must be between 1 and {}",
                self.search.max_top_k
            )));
        }

        if self.collection.dimension == Some(0) {
            return Err(AppError::Config("collection.dimension must be positive".into()));
        }

        if self.timeouts.embed_secs == 0 || self.timeouts.store_secs == 0 {
            return Err(AppError::Config("timeouts must be positive".into()));
        }

        let llm_providers = ["ollama"];
        if !llm_providers.contains(&self.generation.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown LLM provider: {}. Supported: {}",
                self.generation.provider,
                llm_providers.join(", ")
            )));
        }

        if self.generation.pages == 0
            || self.generation.max_tokens == 0
            || self.generation.timeout_secs == 0
        {
            return Err(AppError::Config(
                "generation.pages, max_tokens and timeout_secs must be positive".into(),
            ));
        }

        Ok(())
    }
}
