//! Application Configuration Module
//!
//! Centralizes configuration for the interview API service. Settings are
//! loaded from environment variables (optionally via a `.env` file) into
//! a single struct handed to the rest of the application at startup.

use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;
use vivavoce_core::generation::GeminiConfig;
use vivavoce_core::retry::RetryPolicy;
use vivavoce_core::speech::ElevenLabsConfig;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which session store backend the service runs against.
#[derive(Clone)]
pub enum StoreBackend {
    Memory,
    Kv { url: String, token: String },
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Kv { .. } => "kv",
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub gemini: GeminiConfig,
    pub elevenlabs: ElevenLabsConfig,
    pub store: StoreBackend,
}

fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

fn parsed<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// This function will look for a `.env` file in the current directory
    /// and load the following variables:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:3000".
    /// *   `GEMINI_API_KEY`: Your secret key for the Gemini API. Required.
    /// *   `GEMINI_MODEL`: (Optional) The generation model. Defaults to "gemini-2.5-flash".
    /// *   `GEMINI_TEMPERATURE`: (Optional) Sampling temperature. Defaults to 0.7.
    /// *   `GEMINI_MAX_RETRIES`: (Optional) Attempt budget per backend call. Defaults to 3.
    /// *   `GEMINI_MAX_OUTPUT_TOKENS`: (Optional) Output length bound. Defaults to 1024.
    /// *   `ELEVENLABS_API_KEY`: Your secret key for the ElevenLabs API. Required.
    /// *   `ELEVENLABS_VOICE_ID`: The interviewer voice. Required.
    /// *   `ELEVENLABS_MODEL_ID`: (Optional) Defaults to "eleven_multilingual_v2".
    /// *   `ELEVENLABS_STABILITY`: (Optional) Defaults to 0.5.
    /// *   `ELEVENLABS_SIMILARITY_BOOST`: (Optional) Defaults to 0.75.
    /// *   `SESSION_STORE`: (Optional) "memory" or "kv". Defaults to "memory".
    /// *   `KV_REST_API_URL` / `KV_REST_API_TOKEN`: Required when SESSION_STORE is "kv".
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let mut gemini = GeminiConfig::new(required("GEMINI_API_KEY")?);
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            gemini.model = model;
        }
        gemini.temperature = parsed("GEMINI_TEMPERATURE", gemini.temperature)?;
        gemini.max_output_tokens = parsed("GEMINI_MAX_OUTPUT_TOKENS", gemini.max_output_tokens)?;
        gemini.retry = RetryPolicy::with_max_attempts(parsed(
            "GEMINI_MAX_RETRIES",
            gemini.retry.max_attempts,
        )?);

        let mut elevenlabs = ElevenLabsConfig::new(
            required("ELEVENLABS_API_KEY")?,
            required("ELEVENLABS_VOICE_ID")?,
        );
        if let Ok(model_id) = std::env::var("ELEVENLABS_MODEL_ID") {
            elevenlabs.model_id = model_id;
        }
        elevenlabs.stability = parsed("ELEVENLABS_STABILITY", elevenlabs.stability)?;
        elevenlabs.similarity_boost =
            parsed("ELEVENLABS_SIMILARITY_BOOST", elevenlabs.similarity_boost)?;

        let store_str = std::env::var("SESSION_STORE").unwrap_or_else(|_| "memory".to_string());
        let store = match store_str.to_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            "kv" => StoreBackend::Kv {
                url: required("KV_REST_API_URL")?,
                token: required("KV_REST_API_TOKEN")?,
            },
            other => {
                return Err(ConfigError::InvalidValue(
                    "SESSION_STORE".to_string(),
                    format!("'{other}' is not a supported backend (expected memory or kv)"),
                ));
            }
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            log_level,
            gemini,
            elevenlabs,
            store,
        })
    }
}
