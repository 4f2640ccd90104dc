use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub generation: GenerationConfig,
}

/// Generative-language API configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Injected credential, resolved before the stored one.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Per-request timeout. `None` leaves the call unbounded.
    pub timeout_ms: Option<u64>,
    /// Retries granted to HTTP 429 responses.
    pub max_retries: u32,
    /// Base backoff; attempt `n` waits `retry_delay_ms * 2^(n-1)`.
    pub retry_delay_ms: u64,
}

/// Generation pipeline configuration
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Quality-gate retries before a weak result is accepted anyway.
    pub quality_max_retries: u32,
    /// Debounce window for canvas snapshots.
    pub persist_debounce_ms: u64,
    /// Inject artificial latency into deterministic generation.
    pub simulate_latency: bool,
}

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let gemini = GeminiConfig {
            api_key: env::var("GEMINI_API_KEY")
                .ok()
                .or_else(|| option_env!("ATLAS_GEMINI_API_KEY").map(str::to_string))
                .filter(|k| !k.trim().is_empty()),
            base_url: env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/atlas.db".to_string()),
            ),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS")?.unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: parse_var("REQUEST_TIMEOUT_MS")?,
            max_retries: parse_var("MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            retry_delay_ms: parse_var("RETRY_DELAY_MS")?.unwrap_or(defaults.retry_delay_ms),
        };

        let defaults = GenerationConfig::default();
        let generation = GenerationConfig {
            quality_max_retries: parse_var("QUALITY_MAX_RETRIES")?
                .unwrap_or(defaults.quality_max_retries),
            persist_debounce_ms: parse_var("PERSIST_DEBOUNCE_MS")?
                .unwrap_or(defaults.persist_debounce_ms),
            simulate_latency: parse_var("SIMULATE_LATENCY")?.unwrap_or(defaults.simulate_latency),
        };

        Ok(Config {
            gemini,
            database,
            logging,
            request,
            generation,
        })
    }
}

/// Parse an optional environment variable, rejecting values that do not parse.
fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, AppError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| AppError::Config {
            message: format!("{} has an invalid value: {}", name, raw),
        }),
        Err(_) => Ok(None),
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            quality_max_retries: 2,
            persist_debounce_ms: 500,
            simulate_latency: true,
        }
    }
}
