//! Key files and the handles that wrap them.
//!
//! Each keypair lives in `.keys/<FINGERPRINT>.key` as JSON:
//!
//! ```json
//! {
//!   "version": 1,
//!   "key_type": "X25519",
//!   "user_id": "credvault",
//!   "created_at": "2026-01-01T00:00:00Z",
//!   "public_key": "<base64>",
//!   "protection": { "memory_kib": 65536, "iterations": 3, "parallelism": 4 },
//!   "salt": "<base64>",
//!   "wrapped_secret": "<base64 nonce || AES-GCM(secret key)>"
//! }
//! ```
//!
//! A [`KeyHandle`] only knows the public half; [`KeyHandle::unlock`]
//! turns it into an [`UnlockedKey`] once the passphrase checks out.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use super::request::KEY_TYPE;
use crate::crypto::encryption::{decrypt, encrypt};
use crate::crypto::kdf::{derive_key, Argon2Params};
use crate::crypto::keys::fingerprint;
use crate::errors::{CredVaultError, Result};

/// Current key file format version.
pub const KEY_FILE_VERSION: u8 = 1;

/// File extension of key files inside the key store.
pub const KEY_FILE_EXTENSION: &str = "key";

const KEY_LEN: usize = 32;

/// On-disk representation of one keypair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct KeyFile {
    pub version: u8,
    pub key_type: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub public_key: Vec<u8>,
    pub protection: Argon2Params,
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub wrapped_secret: Vec<u8>,
}

impl KeyFile {
    /// Wrap a freshly generated secret key under `passphrase`.
    pub fn seal(
        secret: &StaticSecret,
        user_id: &str,
        passphrase: &str,
        salt: &[u8],
        protection: Argon2Params,
    ) -> Result<Self> {
        let public = PublicKey::from(secret);

        let mut wrap_key = derive_key(passphrase.as_bytes(), salt, &protection)?;
        let mut secret_bytes = secret.to_bytes();
        let wrapped = encrypt(&wrap_key, &secret_bytes);
        wrap_key.zeroize();
        secret_bytes.zeroize();

        Ok(Self {
            version: KEY_FILE_VERSION,
            key_type: KEY_TYPE.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            public_key: public.as_bytes().to_vec(),
            protection,
            salt: salt.to_vec(),
            wrapped_secret: wrapped?,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| CredVaultError::SerializationError(format!("key file: {e}")))
    }
}

/// Handle to the vault keypair. Holds the public key and the still
/// wrapped secret key; cheap to clone, safe to keep around.
#[derive(Clone)]
pub struct KeyHandle {
    path: PathBuf,
    fingerprint: String,
    public: PublicKey,
    file: KeyFile,
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("fingerprint", &self.fingerprint)
            .field("user_id", &self.file.user_id)
            .field("path", &self.path)
            .finish()
    }
}

impl KeyHandle {
    /// Build a handle from a decoded key file, checking it is usable.
    pub(crate) fn from_file(path: PathBuf, file: KeyFile) -> Result<Self> {
        let corrupt = |reason: &str| CredVaultError::KeyringNotFound(path.clone(), reason.to_string());

        if file.version != KEY_FILE_VERSION {
            return Err(corrupt(&format!(
                "unsupported key file version {}",
                file.version
            )));
        }
        if file.key_type != KEY_TYPE {
            return Err(corrupt(&format!("unsupported key type {}", file.key_type)));
        }
        let public_bytes: [u8; KEY_LEN] = file
            .public_key
            .as_slice()
            .try_into()
            .map_err(|_| corrupt("public key must be 32 bytes"))?;
        if file.protection.validate().is_err() {
            return Err(corrupt("key protection parameters are invalid"));
        }

        let fingerprint = fingerprint(&public_bytes);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if stem != fingerprint {
            return Err(corrupt("file name does not match key fingerprint"));
        }

        Ok(Self {
            public: PublicKey::from(public_bytes),
            fingerprint,
            path,
            file,
        })
    }

    /// Read and validate a key file from disk.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let file: KeyFile = serde_json::from_slice(&data).map_err(|e| {
            CredVaultError::KeyringNotFound(path.to_path_buf(), format!("corrupt key file: {e}"))
        })?;
        Self::from_file(path.to_path_buf(), file)
    }

    /// Unwrap the secret key with `passphrase`.
    ///
    /// Fails with `InvalidPassphrase` when the passphrase does not open
    /// the wrapped secret.
    pub fn unlock(&self, passphrase: &str) -> Result<UnlockedKey> {
        let mut wrap_key = derive_key(passphrase.as_bytes(), &self.file.salt, &self.file.protection)?;
        let unwrapped = decrypt(&wrap_key, &self.file.wrapped_secret);
        wrap_key.zeroize();

        let mut secret_bytes = unwrapped
            .map_err(|_| CredVaultError::InvalidPassphrase(self.fingerprint.clone()))?;

        let bytes: Option<[u8; KEY_LEN]> = secret_bytes.as_slice().try_into().ok();
        secret_bytes.zeroize();
        let Some(mut bytes) = bytes else {
            return Err(CredVaultError::KeyringNotFound(
                self.path.clone(),
                "secret key must be 32 bytes".into(),
            ));
        };
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();

        if PublicKey::from(&secret) != self.public {
            return Err(CredVaultError::KeyringNotFound(
                self.path.clone(),
                "secret key does not match public key".into(),
            ));
        }

        Ok(UnlockedKey {
            secret,
            public: self.public,
            fingerprint: self.fingerprint.clone(),
        })
    }

    /// Upper-case hex fingerprint of the public key.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Owner name recorded at generation time.
    pub fn user_id(&self) -> &str {
        &self.file.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.file.created_at
    }

    /// Path of the key file backing this handle.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The vault keypair with its secret half in memory.
///
/// The secret is zeroized when this value is dropped.
pub struct UnlockedKey {
    secret: StaticSecret,
    public: PublicKey,
    fingerprint: String,
}

impl fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl UnlockedKey {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&BASE64.encode(data))
}

fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}
