//! Keyring manager: creates, opens and queries the vault keypair.
//!
//! The key store is the `.keys` directory under the vault root. It holds
//! one JSON key file per generated keypair (see [`handle`]). A usable
//! vault has exactly one.
//!
//! Key generation is split in two: [`build_key_generation_request`] is a
//! pure function producing the batch text, and [`generate_keys`] executes
//! a batch. Only the latter touches entropy, Argon2 or the disk.

pub mod handle;
pub mod request;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use aes_gcm::aead::OsRng;
use tracing::{debug, info, instrument};
use x25519_dalek::StaticSecret;

use crate::config::Settings;
use crate::crypto::kdf::generate_salt;
use crate::errors::{CredVaultError, Result};
use crate::storage;

pub use handle::{KeyHandle, UnlockedKey, KEY_FILE_EXTENSION};
pub use request::KeyGenRequest;

/// Name of the key store directory inside a vault root.
pub const KEYS_DIR: &str = ".keys";

/// Path of the key store for the vault rooted at `path`.
pub fn keys_path(path: &Path) -> PathBuf {
    path.join(KEYS_DIR)
}

/// Build the key generation batch for the vault at `path`.
///
/// Pure: uses the default key parameters and embeds `passphrase`
/// verbatim on a `Passphrase:` line.
pub fn build_key_generation_request(path: &Path, passphrase: &str) -> String {
    KeyGenRequest::new(path, passphrase).to_batch()
}

/// Generate a keypair for the vault at `path` with default settings.
///
/// Creates `path/.keys` if needed. Each call adds a new key file; callers
/// that must not end up with two keys check [`key_files`] first.
pub fn create_keyring(path: &Path, passphrase: &str) -> Result<KeyHandle> {
    create_keyring_with(path, passphrase, &Settings::default())
}

/// Like [`create_keyring`], with the owner name and passphrase
/// protection cost taken from `settings`.
pub fn create_keyring_with(path: &Path, passphrase: &str, settings: &Settings) -> Result<KeyHandle> {
    // The batch is line-oriented; a line break would split the passphrase.
    if passphrase.contains(|c: char| c == '\r' || c == '\n') {
        return Err(CredVaultError::KeyGeneration(
            "passphrase must not contain line breaks".into(),
        ));
    }

    let batch = KeyGenRequest::new(path, passphrase)
        .with_user_id(&settings.key_user_id)
        .with_protection(settings.argon2_params())
        .to_batch();
    generate_keys(path, &batch)
}

/// Execute a key generation batch for the vault at `path`.
///
/// Parses the batch, generates an X25519 keypair, wraps the secret half
/// under the batch passphrase and writes the key file atomically.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn generate_keys(path: &Path, batch: &str) -> Result<KeyHandle> {
    let request = KeyGenRequest::parse(batch)?;

    let keys_dir = keys_path(path);
    fs::create_dir_all(&keys_dir)?;

    debug!(user_id = %request.name_real, "generating keypair");
    let secret = StaticSecret::random_from_rng(OsRng);
    let salt = generate_salt();
    let file = handle::KeyFile::seal(
        &secret,
        &request.name_real,
        &request.passphrase,
        &salt,
        request.protection,
    )
    .map_err(|e| CredVaultError::KeyGeneration(e.to_string()))?;

    let fingerprint = crate::crypto::keys::fingerprint(&file.public_key);
    let key_path = keys_dir.join(format!("{fingerprint}.{KEY_FILE_EXTENSION}"));
    let json = file.to_json()?;
    let handle = KeyHandle::from_file(key_path.clone(), file)?;

    storage::write_new(&key_path, &json)?;
    info!(fingerprint = %fingerprint, "keypair created");

    Ok(handle)
}

/// Open the key store of the vault at `path`.
///
/// Fails with `KeyringNotFound` unless exactly one valid key file is
/// present.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn open_keyring(path: &Path) -> Result<KeyHandle> {
    let keys_dir = keys_path(path);
    if !keys_dir.is_dir() {
        return Err(CredVaultError::KeyringNotFound(
            keys_dir,
            "key store directory is missing".into(),
        ));
    }

    let mut files = key_files(path)?;
    match files.len() {
        0 => Err(CredVaultError::KeyringNotFound(
            keys_dir,
            "no keypair found".into(),
        )),
        1 => {
            let key_path = files.remove(0);
            let handle = KeyHandle::load(&key_path)?;
            debug!(fingerprint = %handle.fingerprint(), "keyring opened");
            Ok(handle)
        }
        n => Err(CredVaultError::KeyringNotFound(
            keys_dir,
            format!("found {n} keypairs, expected exactly one"),
        )),
    }
}

/// List the key files present in the key store of the vault at `path`,
/// sorted by name. A missing key store yields an empty list.
pub fn key_files(path: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(keys_path(path)) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(KEY_FILE_EXTENSION)
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
