use tokio::sync::watch;
use tracing::{info, warn};

use super::{remote, require};
use crate::api::dto::{LoginRequest, RegisterRequest, UserProfile};
use crate::api::{AuthState, Authenticator, RetryPolicy, TradingApi};
use crate::cache::CacheDb;
use crate::error::{ClientError, Result};

const MIN_PASSWORD_LEN: usize = 8;

/// Login, registration and session teardown
#[derive(Clone)]
pub struct AuthRepository {
    api: TradingApi,
    auth: Authenticator,
    cache: CacheDb,
    retry: RetryPolicy,
}

impl AuthRepository {
    pub fn new(api: TradingApi, auth: Authenticator, cache: CacheDb, retry: RetryPolicy) -> Self {
        Self {
            api,
            auth,
            cache,
            retry,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        validate_email(email)?;
        require(password, "Password")?;

        let req = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let tokens = remote(&self.retry, || self.api.login(&req)).await?;
        self.auth.store_tokens(tokens.into())?;

        info!("Logged in as {}", req.email);
        Ok(())
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<()> {
        validate_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ClientError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let req = RegisterRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
            display_name: display_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        };
        let tokens = remote(&self.retry, || self.api.register(&req)).await?;
        self.auth.store_tokens(tokens.into())?;

        info!("Registered {}", req.email);
        Ok(())
    }

    /// Tell the server (best effort), then drop tokens and cached data
    pub async fn logout(&self) -> Result<()> {
        if self.auth.access_token().is_some() {
            if let Err(e) = self.api.logout().await.into_result() {
                warn!("Server logout failed, clearing local session anyway: {}", e);
            }
        }

        self.auth.sign_out();
        self.cache.clear_all().await?;
        info!("Logged out");
        Ok(())
    }

    pub async fn current_user(&self) -> Result<UserProfile> {
        remote(&self.retry, || self.api.current_user()).await
    }

    pub fn is_logged_in(&self) -> bool {
        self.auth.tokens().is_logged_in()
    }

    pub fn auth_state(&self) -> watch::Receiver<AuthState> {
        self.auth.subscribe()
    }
}

fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    require(email, "Email")?;
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ClientError::Validation("Email address is invalid".to_string())),
    }
}
