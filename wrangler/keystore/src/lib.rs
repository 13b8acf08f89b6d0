//! # Wrangler Keystore
//!
//! Keeps the reasoning-service API key encrypted at rest.
//!
//! Two files live in the data directory:
//!
//! - `secret.key`: the 32-byte master key as 64 hex characters, created on first use
//! - `api-key.enc`: a single record `ivHex:authTagHex:ciphertextHex` (AES-256-GCM)
//!
//! Reading never fails: a missing, malformed or unauthenticated record reads as "no key".
//!
//! ```no_run
//! use wrangler_keystore::ApiKeyStore;
//!
//! let store = ApiKeyStore::new("./data");
//! store.save("sk-test")?;
//! assert_eq!(store.load().as_deref(), Some("sk-test"));
//! # Ok::<(), wrangler_keystore::KeyStoreError>(())
//! ```

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use miette::Diagnostic;
use tracing::{debug, instrument, warn};

pub const MASTER_KEY_FILE: &str = "secret.key";
pub const RECORD_FILE: &str = "api-key.enc";

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum KeyStoreError {
    #[error("Failed to access '{path}'")]
    #[diagnostic(
        code(wrangler::keystore::io),
        help("Check that the data directory exists and is writable")
    )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encrypt API key")]
    #[diagnostic(code(wrangler::keystore::encrypt))]
    Encrypt,
}

/// Why a stored record could not be read back
#[derive(Debug, thiserror::Error)]
enum ReadError {
    #[error(transparent)]
    Store(#[from] KeyStoreError),
    #[error("expected 3 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid hex in field '{field}': {source}")]
    Hex {
        field: &'static str,
        source: hex::FromHexError,
    },
    #[error("{field} must be {expected} bytes, found {found}")]
    Length {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("authentication failed")]
    Decrypt,
    #[error("decrypted key is not valid UTF-8")]
    Utf8,
}

/// File-backed store for a single encrypted API key
#[derive(Debug, Clone)]
pub struct ApiKeyStore {
    dir: PathBuf,
}

impl ApiKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn master_key_path(&self) -> PathBuf {
        self.dir.join(MASTER_KEY_FILE)
    }

    fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    /// Encrypt `api_key` under a fresh nonce and replace the stored record
    #[instrument(skip_all, fields(dir = %self.dir.display()))]
    pub fn save(&self, api_key: &str) -> Result<(), KeyStoreError> {
        let master = self.master_key()?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&master));

        let iv = rand::random::<[u8; IV_LEN]>();
        let sealed = cipher
            .encrypt(Nonce::from_slice(&iv), api_key.as_bytes())
            .map_err(|_| KeyStoreError::Encrypt)?;

        // the tag is appended to the ciphertext
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        let record = [hex::encode(iv), hex::encode(tag), hex::encode(ciphertext)].join(":");

        write_file(&self.record_path(), &record)?;
        debug!("Stored encrypted API key");

        Ok(())
    }

    /// The stored API key, or `None` when there is none or it cannot be decrypted
    #[instrument(skip_all, fields(dir = %self.dir.display()))]
    pub fn load(&self) -> Option<String> {
        let path = self.record_path();
        if !path.exists() {
            debug!("No stored API key");
            return None;
        }

        match self.read_record(&path) {
            Ok(api_key) => Some(api_key),
            Err(error) => {
                warn!("Failed to read stored API key: {error}");
                None
            }
        }
    }

    pub fn has_key(&self) -> bool {
        self.load().is_some()
    }

    /// Remove the stored record, returning whether there was one. The master key is kept.
    pub fn clear(&self) -> Result<bool, KeyStoreError> {
        let path = self.record_path();

        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(KeyStoreError::Io { path, source }),
        }
    }

    fn read_record(&self, path: &Path) -> Result<String, ReadError> {
        let record = std::fs::read_to_string(path).map_err(|source| KeyStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let fields = record.trim().split(':').collect::<Vec<_>>();
        let [iv, tag, ciphertext] = fields.as_slice() else {
            return Err(ReadError::FieldCount(fields.len()));
        };

        let iv = decode_field("iv", iv, Some(IV_LEN))?;
        let tag = decode_field("authTag", tag, Some(TAG_LEN))?;
        let mut sealed = decode_field("ciphertext", ciphertext, None)?;
        sealed.extend_from_slice(&tag);

        let master = self.master_key()?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&master));
        let plain = cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| ReadError::Decrypt)?;

        String::from_utf8(plain).map_err(|_| ReadError::Utf8)
    }

    /// Read the master key, generating and persisting a new one if it is missing or malformed
    fn master_key(&self) -> Result<[u8; KEY_LEN], KeyStoreError> {
        let path = self.master_key_path();

        if let Ok(contents) = std::fs::read_to_string(&path) {
            let contents = contents.trim();
            let mut key = [0u8; KEY_LEN];

            if contents.len() == KEY_LEN * 2 && hex::decode_to_slice(contents, &mut key).is_ok() {
                return Ok(key);
            }

            warn!("Master key at {} is malformed, generating a new one", path.display());
        }

        std::fs::create_dir_all(&self.dir).map_err(|source| KeyStoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let key = rand::random::<[u8; KEY_LEN]>();
        write_file(&path, &hex::encode(key))?;
        debug!("Generated master key at {}", path.display());

        Ok(key)
    }
}

fn decode_field(
    field: &'static str,
    value: &str,
    expected: Option<usize>,
) -> Result<Vec<u8>, ReadError> {
    let bytes = hex::decode(value).map_err(|source| ReadError::Hex { field, source })?;

    match expected {
        Some(expected) if bytes.len() != expected => Err(ReadError::Length {
            field,
            expected,
            found: bytes.len(),
        }),
        _ => Ok(bytes),
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), KeyStoreError> {
    let io_error = |source| KeyStoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, contents).map_err(io_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(io_error)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_key_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let store = ApiKeyStore::new(dir.path());

        let first = store.master_key().unwrap();
        let second = store.master_key().unwrap();
        assert_eq!(first, second);

        let on_disk = std::fs::read_to_string(dir.path().join(MASTER_KEY_FILE)).unwrap();
        assert_eq!(on_disk.len(), 64);
        assert_eq!(hex::decode(on_disk).unwrap(), first.to_vec());
    }

    #[test]
    fn test_malformed_master_key_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MASTER_KEY_FILE), "not-hex").unwrap();

        let store = ApiKeyStore::new(dir.path());
        store.master_key().unwrap();

        let on_disk = std::fs::read_to_string(dir.path().join(MASTER_KEY_FILE)).unwrap();
        assert_eq!(on_disk.len(), 64);
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_tampered_record_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ApiKeyStore::new(dir.path());
        store.save("sk-live-123").unwrap();

        let path = dir.path().join(RECORD_FILE);
        let record = std::fs::read_to_string(&path).unwrap();
        let (head, last) = record.split_at(record.len() - 1);
        let flipped = if last == "0" { "1" } else { "0" };
        std::fs::write(&path, format!("{head}{flipped}")).unwrap();

        assert_eq!(store.load(), None);
        assert!(logs_contain("authentication failed"));
    }

    #[test]
    fn test_decode_field_checks_length() {
        assert!(matches!(
            decode_field("iv", "abcd", Some(IV_LEN)),
            Err(ReadError::Length {
                expected: 12,
                found: 2,
                ..
            })
        ));
        assert!(matches!(
            decode_field("iv", "zz", None),
            Err(ReadError::Hex { .. })
        ));
    }
}
