//! Encrypted access/refresh token storage
//!
//! Holds at most one [`TokenPair`]. The pair is cached in memory and
//! mirrored to a single encrypted file so it survives restarts.
//! Refresh coordination lives in [`crate::api::auth`], not here.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

use super::secrets::write_private;
use super::{SecretsManager, StoreError};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens never show up in logs
impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

pub struct TokenStore {
    path: PathBuf,
    secrets: SecretsManager,
    current: RwLock<Option<TokenPair>>,
}

impl TokenStore {
    /// Open the store at `path`, loading any persisted pair
    pub fn open(path: impl Into<PathBuf>, secrets: SecretsManager) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let current = load_pair(&path, &secrets);
        debug!(
            "Token store opened at {} (logged_in={})",
            path.display(),
            current.is_some()
        );

        Ok(Self {
            path,
            secrets,
            current: RwLock::new(current),
        })
    }

    pub fn get(&self) -> Option<TokenPair> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.get().map(|pair| pair.access_token)
    }

    /// Persist a new pair, replacing any existing one
    pub fn set(&self, pair: TokenPair) -> Result<(), StoreError> {
        let json = serde_json::to_string(&pair)?;
        let sealed = self.secrets.encrypt(&json)?;
        write_atomic(&self.path, sealed.as_bytes())?;

        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(pair);
        Ok(())
    }

    /// Forget the stored pair
    pub fn clear(&self) -> Result<(), StoreError> {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// True iff an access token is present
    pub fn is_logged_in(&self) -> bool {
        self.get().is_some_and(|pair| !pair.access_token.is_empty())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load_pair(path: &Path, secrets: &SecretsManager) -> Option<TokenPair> {
    let sealed = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read token file {}: {}", path.display(), e);
            return None;
        }
    };

    let decoded = secrets
        .decrypt(&sealed)
        .and_then(|json| serde_json::from_str::<TokenPair>(&json).map_err(StoreError::from));

    match decoded {
        Ok(pair) => Some(pair),
        Err(e) => {
            warn!("Discarding unreadable token file {}: {}", path.display(), e);
            None
        }
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    write_private(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
