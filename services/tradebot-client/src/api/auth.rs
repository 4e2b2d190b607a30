//! Token refresh coordination
//!
//! Concurrent 401s share one refresh: the first caller installs a shared
//! future in the slot and every other caller awaits that same future.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::store::{TokenPair, TokenStore};

/// Whether the client currently holds usable credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Authenticated,
    Unauthenticated,
}

/// What to do with stored tokens when the refresh call fails at the transport level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshFailurePolicy {
    /// Treat network errors like a rejection and log the user out
    #[default]
    ClearTokens,
    /// Keep the pair so a later request can try again
    KeepTokens,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("Refresh token rejected ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("Refresh request failed: {0}")]
    Transport(String),
}

/// Exchanges a refresh token for a new pair
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError>;
}

type RefreshFuture = Shared<BoxFuture<'static, Option<String>>>;

struct AuthInner {
    tokens: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    policy: RefreshFailurePolicy,
    in_flight: Mutex<Option<RefreshFuture>>,
    state_tx: watch::Sender<AuthState>,
}

/// Handles 401 responses for one HTTP pipeline
#[derive(Clone)]
pub struct Authenticator {
    inner: Arc<AuthInner>,
}

impl Authenticator {
    pub fn new(
        tokens: Arc<TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        policy: RefreshFailurePolicy,
    ) -> Self {
        let initial = if tokens.is_logged_in() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        let (state_tx, _) = watch::channel(initial);

        Self {
            inner: Arc::new(AuthInner {
                tokens,
                refresher,
                policy,
                in_flight: Mutex::new(None),
                state_tx,
            }),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    /// Current access token, if any
    pub fn access_token(&self) -> Option<String> {
        self.inner.tokens.access_token()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state_tx.subscribe()
    }

    pub fn state(&self) -> AuthState {
        *self.inner.state_tx.borrow()
    }

    /// Record a freshly issued pair (login/registration)
    pub fn store_tokens(&self, pair: TokenPair) -> Result<(), crate::store::StoreError> {
        self.inner.tokens.set(pair)?;
        self.inner.state_tx.send_replace(AuthState::Authenticated);
        Ok(())
    }

    /// Drop credentials and publish `Unauthenticated`
    pub fn sign_out(&self) {
        AuthInner::clear(&self.inner);
    }

    /// Called after a 401 for a request sent with `failed_token`.
    ///
    /// Returns the access token to retry with, or `None` if the request
    /// must fail.
    pub async fn authenticate(&self, failed_token: Option<&str>) -> Option<String> {
        // Nothing was attached, so there is nothing to refresh
        let failed_token = failed_token?;

        let refresh = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            match slot.as_ref() {
                Some(pending) => {
                    debug!("Refresh already in flight, joining it");
                    pending.clone()
                }
                None => {
                    match self.inner.tokens.access_token() {
                        None => return None,
                        Some(current) if current != failed_token => {
                            debug!("Token already refreshed, retrying with stored token");
                            return Some(current);
                        }
                        Some(_) => {}
                    }
                    let pending = AuthInner::refresh(self.inner.clone()).boxed().shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        let outcome = refresh.clone().await;

        let mut slot = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref().is_some_and(|pending| pending.ptr_eq(&refresh)) {
            *slot = None;
        }

        outcome
    }
}

impl AuthInner {
    async fn refresh(inner: Arc<AuthInner>) -> Option<String> {
        let refresh_token = match inner.tokens.get() {
            Some(pair) if !pair.refresh_token.is_empty() => pair.refresh_token,
            _ => {
                warn!("No refresh token stored, signing out");
                Self::clear(&inner);
                return None;
            }
        };

        info!("Access token expired, refreshing");
        match inner.refresher.refresh(&refresh_token).await {
            Ok(pair) => {
                let access = pair.access_token.clone();
                if let Err(e) = inner.tokens.set(pair) {
                    // The new token still works for this process
                    warn!("Failed to persist refreshed tokens: {}", e);
                }
                inner.state_tx.send_replace(AuthState::Authenticated);
                info!("Token refresh succeeded");
                Some(access)
            }
            Err(RefreshError::Transport(e))
                if inner.policy == RefreshFailurePolicy::KeepTokens =>
            {
                warn!("Token refresh failed ({}), keeping stored tokens", e);
                None
            }
            Err(e) => {
                warn!("Token refresh failed, signing out: {}", e);
                Self::clear(&inner);
                None
            }
        }
    }

    fn clear(inner: &AuthInner) {
        if let Err(e) = inner.tokens.clear() {
            warn!("Failed to clear token store: {}", e);
        }
        inner.state_tx.send_replace(AuthState::Unauthenticated);
    }
}
