//! Error types for the delivery engine.

use thiserror::Error;

/// Errors raised while loading pool configuration or parsing policy names.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown {kind} policy '{value}'")]
    UnknownPolicy { kind: &'static str, value: String },
}
