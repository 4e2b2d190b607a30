//! Result envelope for remote calls
//!
//! Every HTTP outcome is normalized into [`ApiResult`] before anything
//! else looks at it. Repositories fold the envelope into
//! [`crate::error::Result`] and never let raw transport errors escape.

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Synthetic code for I/O failures that never produced a status
pub const CODE_NETWORK: u16 = 0;
/// Synthetic code for client-side timeouts
pub const CODE_TIMEOUT: u16 = 408;

/// Structured error body returned by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    fn best_message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.error.as_deref())
            .filter(|m| !m.trim().is_empty())
    }
}

/// Tri-state outcome of a remote call
#[derive(Debug)]
pub enum ApiResult<T> {
    Success(T),
    Error {
        code: u16,
        message: String,
        body: Option<ErrorBody>,
    },
    Exception(anyhow::Error),
}

impl<T> ApiResult<T> {
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ApiResult::Error {
            code,
            message: message.into(),
            body: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResult::Success(_))
    }

    /// Status code of an `Error`, if any
    pub fn code(&self) -> Option<u16> {
        match self {
            ApiResult::Error { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// 5xx, network failures (code 0) and timeouts (408) are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiResult::Error { code, .. } => {
                *code >= 500 || *code == CODE_NETWORK || *code == CODE_TIMEOUT
            }
            _ => false,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResult<U> {
        match self {
            ApiResult::Success(v) => ApiResult::Success(f(v)),
            ApiResult::Error {
                code,
                message,
                body,
            } => ApiResult::Error {
                code,
                message,
                body,
            },
            ApiResult::Exception(e) => ApiResult::Exception(e),
        }
    }

    /// Fold into the repository-level result type
    pub fn into_result(self) -> Result<T, ClientError> {
        match self {
            ApiResult::Success(v) => Ok(v),
            ApiResult::Error { code, message, .. } => Err(match code {
                401 => ClientError::Unauthorized,
                CODE_NETWORK => ClientError::Network(message),
                CODE_TIMEOUT => ClientError::Timeout,
                _ => ClientError::Api { code, message },
            }),
            ApiResult::Exception(e) => Err(ClientError::Unexpected(format!("{:#}", e))),
        }
    }

    /// Map a transport error raised while sending or reading a response
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiResult::error(CODE_TIMEOUT, format!("Request timed out: {}", err))
        } else if err.is_connect() || err.is_request() || err.is_body() {
            ApiResult::error(CODE_NETWORK, format!("Network error: {}", err))
        } else {
            ApiResult::Exception(err.into())
        }
    }
}

impl<T: DeserializeOwned> ApiResult<T> {
    /// Decode a JSON success body, or map a non-2xx response
    pub async fn from_response(response: Response) -> Self {
        let status = response.status();
        if !status.is_success() {
            return Self::from_error_response(response).await;
        }
        match response.json::<T>().await {
            Ok(value) => ApiResult::Success(value),
            Err(e) if e.is_decode() => {
                ApiResult::Exception(anyhow::Error::new(e).context("Invalid response body"))
            }
            Err(e) => ApiResult::from_transport(e),
        }
    }

    async fn from_error_response(response: Response) -> Self {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        error_from_parts(status, &text)
    }
}

impl ApiResult<()> {
    /// Map a response whose success body is ignored
    pub async fn from_empty_response(response: Response) -> Self {
        let status = response.status();
        if status.is_success() {
            return ApiResult::Success(());
        }
        let text = response.text().await.unwrap_or_default();
        error_from_parts(status, &text)
    }
}

fn error_from_parts<T>(status: StatusCode, text: &str) -> ApiResult<T> {
    let body = serde_json::from_str::<ErrorBody>(text).ok();
    let message = body
        .as_ref()
        .and_then(|b| b.best_message())
        .map(str::to_string)
        .unwrap_or_else(|| status_line(status));
    ApiResult::Error {
        code: status.as_u16(),
        message,
        body,
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_message_preferred() {
        let result: ApiResult<()> = error_from_parts(
            StatusCode::BAD_REQUEST,
            r#"{"error":"bad_request","message":"Symbol is required"}"#,
        );
        match result {
            ApiResult::Error { code, message, body } => {
                assert_eq!(code, 400);
                assert_eq!(message, "Symbol is required");
                assert_eq!(body.unwrap().error.as_deref(), Some("bad_request"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_field_used_when_message_missing() {
        let result: ApiResult<()> =
            error_from_parts(StatusCode::CONFLICT, r#"{"error":"Strategy already running"}"#);
        assert_eq!(result.code(), Some(409));
        match result {
            ApiResult::Error { message, .. } => assert_eq!(message, "Strategy already running"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_status_line_fallback() {
        let result: ApiResult<()> = error_from_parts(StatusCode::NOT_FOUND, "<html>nope</html>");
        match result {
            ApiResult::Error { message, body, .. } => {
                assert_eq!(message, "404 Not Found");
                assert!(body.is_none());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_retry_classification() {
        assert!(ApiResult::<()>::error(500, "boom").is_retryable());
        assert!(ApiResult::<()>::error(503, "unavailable").is_retryable());
        assert!(ApiResult::<()>::error(CODE_NETWORK, "io").is_retryable());
        assert!(ApiResult::<()>::error(CODE_TIMEOUT, "slow").is_retryable());
        assert!(!ApiResult::<()>::error(404, "missing").is_retryable());
        assert!(!ApiResult::<()>::error(401, "expired").is_retryable());
        assert!(!ApiResult::Success(()).is_retryable());
        assert!(!ApiResult::<()>::Exception(anyhow::anyhow!("decode")).is_retryable());
    }

    #[test]
    fn test_fold_into_client_error() {
        assert!(matches!(
            ApiResult::<()>::error(401, "expired").into_result(),
            Err(ClientError::Unauthorized)
        ));
        assert!(matches!(
            ApiResult::<()>::error(CODE_TIMEOUT, "slow").into_result(),
            Err(ClientError::Timeout)
        ));
        assert!(matches!(
            ApiResult::<()>::error(CODE_NETWORK, "io").into_result(),
            Err(ClientError::Network(_))
        ));
        match ApiResult::<()>::error(422, "Invalid timeframe").into_result() {
            Err(ClientError::Api { code, message }) => {
                assert_eq!(code, 422);
                assert_eq!(message, "Invalid timeframe");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ApiResult::Success(7).into_result().unwrap(), 7);
    }
}
