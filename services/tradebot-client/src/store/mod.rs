//! Durable credential storage

pub mod secrets;
pub mod tokens;

pub use secrets::SecretsManager;
pub use tokens::{TokenPair, TokenStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid secrets key: {0}")]
    InvalidKey(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
