use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Default OpenAI-compatible chat completions endpoint used for summarization.
pub const DEFAULT_SUMMARIZATION_URL: &str = "https://api.hyperbolic.xyz/v1/chat/completions";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Chunking parameters cannot produce a terminating window walk.
    #[error("CHUNK_OVERLAP ({overlap}) must be smaller than CHUNK_SIZE ({chunk_size})")]
    InvalidChunking {
        /// Configured window length.
        chunk_size: usize,
        /// Configured overlap.
        overlap: usize,
    },
}

/// Runtime configuration for the document QA service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Window length (characters) used when chunking page text.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    pub chunk_overlap: usize,
    /// Number of results returned when the caller does not ask for a specific amount.
    pub top_k: usize,
    /// Upper bound applied to caller-supplied `top_k`.
    pub max_top_k: usize,
    /// Directory holding the persisted index and metadata store.
    pub index_dir: PathBuf,
    /// Directory where uploaded PDFs are written.
    pub data_dir: PathBuf,
    /// Embedding backend used for both corpus chunks and queries.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier; stored alongside the corpus and checked at query time.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Optional Ollama base URL.
    pub ollama_url: Option<String>,
    /// Backend used by the summarizing answer strategy.
    pub summarization_provider: SummarizationProvider,
    /// Optional endpoint override for the summarization provider.
    pub summarization_url: Option<String>,
    /// Credential for the OpenAI-compatible summarization endpoint.
    pub summarization_api_key: Option<String>,
    /// Model requested from the summarization provider.
    pub summarization_model: String,
    /// Upper bound on a single summarization call.
    pub summarization_timeout_secs: u64,
    /// Completion budget forwarded to the summarization provider.
    pub summarization_max_tokens: u32,
    /// Evict sessions idle for longer than this many seconds.
    pub session_idle_ttl_secs: Option<u64>,
    /// Maximum number of sessions kept in memory.
    pub session_max_entries: Option<usize>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic in-process byte hashing.
    Hashing,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported summarization backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarizationProvider {
    /// Summarization disabled; only the extractive strategy works.
    None,
    /// OpenAI-compatible chat completions API (Hyperbolic by default).
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 3,
            max_top_k: 50,
            index_dir: PathBuf::from("models"),
            data_dir: PathBuf::from("data"),
            embedding_provider: EmbeddingProvider::Hashing,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dimension: 384,
            ollama_url: None,
            summarization_provider: SummarizationProvider::None,
            summarization_url: None,
            summarization_api_key: None,
            summarization_model: "openai/gpt-oss-20b".to_string(),
            summarization_timeout_secs: 60,
            summarization_max_tokens: 512,
            session_idle_ttl_secs: None,
            session_max_entries: None,
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            chunk_size: parse_or("CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            top_k: parse_or("TOP_K", defaults.top_k)?,
            max_top_k: parse_or("MAX_TOP_K", defaults.max_top_k)?,
            index_dir: load_env_optional("INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_dir),
            data_dir: load_env_optional("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(defaults.embedding_provider),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .or_else(|| load_env_optional("MODEL_NAME"))
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_or("EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            ollama_url: load_env_optional("OLLAMA_URL"),
            summarization_provider: load_env_optional("SUMMARIZATION_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("SUMMARIZATION_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(defaults.summarization_provider),
            summarization_url: load_env_optional("SUMMARIZATION_URL"),
            summarization_api_key: load_env_optional("SUMMARIZATION_API_KEY")
                .or_else(|| load_env_optional("HYPERBOLIC_API_KEY")),
            summarization_model: load_env_optional("SUMMARIZATION_MODEL")
                .unwrap_or(defaults.summarization_model),
            summarization_timeout_secs: parse_or(
                "SUMMARIZATION_TIMEOUT_SECS",
                defaults.summarization_timeout_secs,
            )?,
            summarization_max_tokens: parse_or(
                "SUMMARIZATION_MAX_TOKENS",
                defaults.summarization_max_tokens,
            )?,
            session_idle_ttl_secs: parse_optional("SESSION_IDLE_TTL_SECS")?,
            session_max_entries: parse_optional("SESSION_MAX_ENTRIES")?,
            server_port: parse_optional("SERVER_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that cannot be used by the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunking {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.top_k == 0 || self.max_top_k == 0 {
            return Err(ConfigError::InvalidValue("TOP_K".into()));
        }
        Ok(())
    }

    /// Location of the serialized vector index.
    pub fn index_path(&self) -> PathBuf {
        self.index_dir.join("index.faiss")
    }

    /// Location of the metadata store paired with the index.
    pub fn store_path(&self) -> PathBuf {
        self.index_dir.join("store.json")
    }

    /// Timeout applied to summarization requests.
    pub fn summarization_timeout(&self) -> Duration {
        Duration::from_secs(self.summarization_timeout_secs.max(1))
    }

    /// Idle TTL applied to conversation sessions, if any.
    pub fn session_idle_ttl(&self) -> Option<Duration> {
        self.session_idle_ttl_secs.map(Duration::from_secs)
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional(key)?.unwrap_or(default))
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hashing" | "hash" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl FromStr for SummarizationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "openai" | "hyperbolic" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        index_dir = %config.index_dir.display(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        summarization_provider = ?config.summarization_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.index_path(), PathBuf::from("models/index.faiss"));
        assert_eq!(config.store_path(), PathBuf::from("models/store.json"));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let config = Config {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidChunking {
                chunk_size: 100,
                overlap: 100
            })
        ));
    }

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!("Ollama".parse(), Ok(EmbeddingProvider::Ollama));
        assert_eq!("HASHING".parse(), Ok(EmbeddingProvider::Hashing));
        assert_eq!("hyperbolic".parse(), Ok(SummarizationProvider::OpenAI));
        assert!("openai".parse::<EmbeddingProvider>().is_err());
    }
}
