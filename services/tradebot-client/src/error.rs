//! Error types shared across the client

/// Failure returned by every repository method.
///
/// Transport exceptions never cross the repository boundary; they are
/// folded into one of these variants first.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Not authenticated")]
    Unauthorized,

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Cache error: {0}")]
    Cache(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ClientError {
    /// Whether a caller may reasonably offer a "try again" action
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::Timeout => true,
            ClientError::Api { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// Message suitable for an error banner
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Unauthorized => "Your session has expired. Please log in again.".to_string(),
            ClientError::Api { message, .. } => message.clone(),
            ClientError::Network(_) => "Unable to reach the server. Check your connection.".to_string(),
            ClientError::Timeout => "The server took too long to respond.".to_string(),
            ClientError::Validation(msg) => msg.clone(),
            ClientError::Cache(_) | ClientError::Storage(_) => {
                "Local storage is unavailable.".to_string()
            }
            ClientError::Unexpected(_) => "Something went wrong.".to_string(),
        }
    }
}

impl From<crate::store::StoreError> for ClientError {
    fn from(e: crate::store::StoreError) -> Self {
        ClientError::Storage(e.to_string())
    }
}

impl From<crate::cache::CacheError> for ClientError {
    fn from(e: crate::cache::CacheError) -> Self {
        match e {
            crate::cache::CacheError::Sqlx(inner) => ClientError::Cache(inner),
            other => ClientError::Storage(other.to_string()),
        }
    }
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, ClientError>;
