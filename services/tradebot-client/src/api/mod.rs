//! Remote access: HTTP pipeline, auth, retry and the result envelope

pub mod auth;
pub mod client;
pub mod dto;
pub mod http;
pub mod result;
pub mod retry;

pub use auth::{AuthState, Authenticator, RefreshError, RefreshFailurePolicy, TokenRefresher};
pub use client::{HttpTokenRefresher, TradingApi};
pub use http::{build_http_client, Auth, HttpPipeline};
pub use result::ApiResult;
pub use retry::{retry, RetryPolicy};
