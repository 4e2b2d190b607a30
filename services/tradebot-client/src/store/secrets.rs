use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::info;

use super::StoreError;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Encrypts small secrets at rest with AES-256-GCM
///
/// Ciphertext is `base64(nonce || sealed)`; a fresh nonce is drawn for
/// every encryption.
#[derive(Clone)]
pub struct SecretsManager {
    encryption_key: [u8; KEY_LEN],
}

impl std::fmt::Debug for SecretsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsManager").finish_non_exhaustive()
    }
}

impl SecretsManager {
    /// Create from a raw 32-byte key
    pub fn new(encryption_key: [u8; KEY_LEN]) -> Self {
        Self { encryption_key }
    }

    /// Create from a hex-encoded 32-byte key
    pub fn from_hex(key_hex: &str) -> Result<Self, StoreError> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| StoreError::InvalidKey(format!("not hex: {}", e)))?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            StoreError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, b.len()))
        })?;
        Ok(Self::new(key))
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Load the hex key stored at `path`, creating one on first use
    pub fn load_or_create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            let key_hex = fs::read_to_string(path)?;
            return Self::from_hex(&key_hex);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let manager = Self::generate();
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        write_private(&tmp, manager.key_hex().as_bytes())?;

        // Publish without replacing a key another process wrote first
        match fs::hard_link(&tmp, path) {
            Ok(()) => fs::remove_file(&tmp)?,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                fs::remove_file(&tmp)?;
                return Self::from_hex(&fs::read_to_string(path)?);
            }
            // No hard links on this filesystem
            Err(_) => fs::rename(&tmp, path)?,
        }
        info!("Generated new secrets key at {}", path.display());
        Ok(manager)
    }

    pub fn key_hex(&self) -> String {
        hex::encode(self.encryption_key)
    }

    /// Encrypt a plaintext value
    pub fn encrypt(&self, plaintext: &str) -> Result<String, StoreError> {
        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| StoreError::Crypto("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    /// Decrypt a value produced by [`SecretsManager::encrypt`]
    pub fn decrypt(&self, encrypted: &str) -> Result<String, StoreError> {
        let raw = STANDARD
            .decode(encrypted.trim())
            .map_err(|e| StoreError::Crypto(format!("invalid encoding: {}", e)))?;
        if raw.len() <= NONCE_LEN {
            return Err(StoreError::Crypto("ciphertext too short".to_string()));
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| StoreError::Crypto("decryption failed (wrong key or corrupt data)".to_string()))?;

        String::from_utf8(plain).map_err(|e| StoreError::Crypto(e.to_string()))
    }

    fn cipher(&self) -> Result<Aes256Gcm, StoreError> {
        Aes256Gcm::new_from_slice(&self.encryption_key)
            .map_err(|_| StoreError::InvalidKey("bad key length".to_string()))
    }
}

/// Write `contents` to a fresh owner-only file and flush it to disk
pub(super) fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let secrets = SecretsManager::generate();
        let sealed = secrets.encrypt("refresh-token-abc").unwrap();
        assert_ne!(sealed, "refresh-token-abc");
        assert_eq!(secrets.decrypt(&sealed).unwrap(), "refresh-token-abc");
    }

    #[test]
    fn test_nonce_differs_per_call() {
        let secrets = SecretsManager::generate();
        let a = secrets.encrypt("same").unwrap();
        let b = secrets.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = SecretsManager::generate().encrypt("secret").unwrap();
        let other = SecretsManager::generate();
        assert!(matches!(other.decrypt(&sealed), Err(StoreError::Crypto(_))));
    }

    #[test]
    fn test_from_hex_validates_length() {
        assert!(SecretsManager::from_hex("abcd").is_err());
        assert!(SecretsManager::from_hex("zz").is_err());
        let key = SecretsManager::generate().key_hex();
        assert!(SecretsManager::from_hex(&key).is_ok());
    }

    #[test]
    fn test_load_or_create_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("secrets.key");
        let first = SecretsManager::load_or_create(&path).unwrap();
        let second = SecretsManager::load_or_create(&path).unwrap();
        assert_eq!(first.key_hex(), second.key_hex());
    }

    #[test]
    fn test_key_file_is_complete_and_private() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.key");

        // Leftover from a crashed write, readable by everyone
        let stale = path.with_extension(format!("tmp.{}", std::process::id()));
        fs::write(&stale, "partial").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&stale, fs::Permissions::from_mode(0o644)).unwrap();
        }

        let manager = SecretsManager::load_or_create(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), manager.key_hex());

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("secrets.key")]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_existing_key_is_never_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.key");
        let original = SecretsManager::generate();
        fs::write(&path, original.key_hex()).unwrap();

        let loaded = SecretsManager::load_or_create(&path).unwrap();
        assert_eq!(loaded.key_hex(), original.key_hex());
    }
}
