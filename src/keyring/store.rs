//! Encrypted credential store.
//!
//! Secrets are keyed by `(username, attribute)` and kept in a single file,
//! AES-256-GCM encrypted under a key derived from the master key. The file
//! is rewritten whole on flush, through an adjacent temporary file and a
//! rename, and restricted to the owner.

use crate::core::fs_util::tmp_sibling;
use crate::core::{BootstrapError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const KEYRING_MAGIC: &[u8; 4] = b"RKR1";
const NONCE_LEN: usize = 12;

type Entries = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug)]
pub struct Keyring {
    path: PathBuf,
    cipher_key: [u8; 32],
    entries: Entries,
}

impl Keyring {
    /// Open the keyring at `path` under `master_key`, creating an empty one
    /// if the file does not exist and `create_if_missing` is set.
    pub fn init(path: &Path, master_key: &str, create_if_missing: bool) -> Result<Self> {
        let cipher_key: [u8; 32] = Sha256::digest(master_key.as_bytes()).into();
        if path.exists() {
            let data = fs::read(path)
                .map_err(|e| BootstrapError::io(&format!("Could not read keyring {}", path.display()), e))?;
            let entries = decrypt_entries(&data, &cipher_key, path)?;
            Ok(Self {
                path: path.to_path_buf(),
                cipher_key,
                entries,
            })
        } else if create_if_missing {
            Ok(Self {
                path: path.to_path_buf(),
                cipher_key,
                entries: Entries::new(),
            })
        } else {
            Err(BootstrapError::KeyringError(format!(
                "Keyring file {} does not exist",
                path.display()
            )))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set a secret; an existing secret for the same pair is superseded.
    pub fn store(&mut self, username: &str, attribute: &str, secret: &str) {
        self.entries
            .entry(username.to_string())
            .or_default()
            .insert(attribute.to_string(), secret.to_string());
    }

    pub fn fetch(&self, username: &str, attribute: &str) -> Option<&str> {
        self.entries
            .get(username)
            .and_then(|attrs| attrs.get(attribute))
            .map(String::as_str)
    }

    /// Encrypt and write the store to durable storage.
    pub fn flush(&self) -> Result<()> {
        let plaintext = serde_json::to_vec(&self.entries)
            .map_err(|e| BootstrapError::KeyringError(format!("Could not serialize keyring: {}", e)))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.cipher_key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| BootstrapError::KeyringError("Could not encrypt keyring".to_string()))?;

        let mut data = Vec::with_capacity(KEYRING_MAGIC.len() + NONCE_LEN + ciphertext.len());
        data.extend_from_slice(KEYRING_MAGIC);
        data.extend_from_slice(&nonce);
        data.extend_from_slice(&ciphertext);

        let tmp_path = tmp_sibling(&self.path);
        fs::write(&tmp_path, &data).map_err(|e| {
            BootstrapError::io(&format!("Could not write keyring {}", tmp_path.display()), e)
        })?;
        make_file_private(&tmp_path)?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            BootstrapError::io(
                &format!("Could not move keyring to {}", self.path.display()),
                e,
            )
        })?;
        Ok(())
    }
}

fn decrypt_entries(data: &[u8], cipher_key: &[u8; 32], path: &Path) -> Result<Entries> {
    if data.len() < KEYRING_MAGIC.len() + NONCE_LEN || &data[..KEYRING_MAGIC.len()] != KEYRING_MAGIC
    {
        return Err(BootstrapError::KeyringError(format!(
            "File {} is not a keyring",
            path.display()
        )));
    }
    let nonce = &data[KEYRING_MAGIC.len()..KEYRING_MAGIC.len() + NONCE_LEN];
    let ciphertext = &data[KEYRING_MAGIC.len() + NONCE_LEN..];
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(cipher_key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            BootstrapError::KeyringError(format!(
                "Could not decrypt keyring {}: wrong master key or corrupted file",
                path.display()
            ))
        })?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| BootstrapError::KeyringError(format!("Corrupted keyring payload: {}", e)))
}

/// Restrict a file to owner read/write.
pub fn make_file_private(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
            BootstrapError::io(
                &format!("Could not change permissions for {}", path.display()),
                e,
            )
        })?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
