//! High-level vault operations.
//!
//! `Vault` ties the keyring, the cipher and the record format together
//! over a directory tree:
//!
//! ```text
//! <root>/
//!   .keys/<FINGERPRINT>.key
//!   .credvault.toml            (optional)
//!   example.com/john.doe.cred
//!   github.com/octocat.cred
//! ```
//!
//! Every write lands via temp file + move, so a credential file is either
//! absent or complete. Group directories are derived structure: created on
//! first `add`, removed when their last credential goes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use super::credential::{group_of, validate_group, validate_login, Credential};
use super::format::{self, CREDENTIAL_EXTENSION};
use crate::config::Settings;
use crate::errors::{CredVaultError, Result};
use crate::keyring::{self, KeyHandle, UnlockedKey, KEYS_DIR};
use crate::storage;

/// A credential file that could not be read during enumeration.
#[derive(Debug, Error)]
#[error("{}: {source}", .path.display())]
pub struct EntryError {
    /// Path of the offending `.cred` file.
    pub path: PathBuf,
    /// Credential name, when the plaintext part of the record was readable.
    pub name: Option<String>,
    pub source: CredVaultError,
}

/// Outcome of enumerating one credential file.
pub type Entry = std::result::Result<Credential, EntryError>;

/// An open vault. Create one with `Vault::create` or `Vault::open`; the
/// keypair stays unlocked until the value is dropped.
pub struct Vault {
    /// Vault root directory.
    root: PathBuf,

    /// Public handle of the vault keypair.
    key: KeyHandle,

    /// The same keypair with its secret half unwrapped (zeroized on drop).
    unlocked: UnlockedKey,
}

impl Vault {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a new vault at `path` and return it opened.
    ///
    /// Settings come from `path/.credvault.toml` when that file already
    /// exists, defaults otherwise.
    pub fn create(path: &Path, passphrase: &str) -> Result<Self> {
        let settings = Settings::load(path)?;
        Self::create_with_settings(path, passphrase, &settings)
    }

    /// Create a new vault at `path` using explicit settings.
    ///
    /// Fails with `VaultAlreadyExists` if the key store already holds any
    /// key material, whether or not it is usable: generating a second key
    /// would orphan everything encrypted to the first.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn create_with_settings(path: &Path, passphrase: &str, settings: &Settings) -> Result<Self> {
        fs::create_dir_all(path)?;

        if !keyring::key_files(path)?.is_empty() {
            return Err(CredVaultError::VaultAlreadyExists(path.to_path_buf()));
        }

        let key = keyring::create_keyring_with(path, passphrase, settings)?;
        let vault = Self::finish_create(path, key, passphrase)?;
        info!(fingerprint = %vault.key.fingerprint(), "vault created");
        Ok(vault)
    }

    /// Unlock a freshly generated key. If that fails, the key file is
    /// deleted so the root is left without a keyring and `create` can be
    /// retried.
    fn finish_create(path: &Path, key: KeyHandle, passphrase: &str) -> Result<Self> {
        match key.unlock(passphrase) {
            Ok(unlocked) => Ok(Self {
                root: path.to_path_buf(),
                key,
                unlocked,
            }),
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(key.path()) {
                    warn!(path = %key.path().display(), error = %cleanup, "failed to remove unusable key file");
                }
                Err(e)
            }
        }
    }

    /// Open an existing vault, checking that `passphrase` unlocks its key.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path, passphrase: &str) -> Result<Self> {
        let key = keyring::open_keyring(path)?;
        let unlocked = key.unlock(passphrase)?;
        debug!(fingerprint = %key.fingerprint(), "vault opened");

        Ok(Self {
            root: path.to_path_buf(),
            key,
            unlocked,
        })
    }

    // ------------------------------------------------------------------
    // Credential operations
    // ------------------------------------------------------------------

    /// Store a new credential and return the path it was written to.
    ///
    /// Never overwrites: an existing `(directory, login)` slot fails with
    /// `CredentialExists` and leaves the stored file untouched.
    #[instrument(skip_all, fields(name = %credential.name, login = %credential.login))]
    pub fn add(&self, credential: &Credential) -> Result<PathBuf> {
        credential.validate()?;

        let path = format::expand_path(&self.root, credential);
        if path.exists() {
            return Err(CredVaultError::CredentialExists(path));
        }

        // Encrypt before touching the tree so a crypto failure leaves nothing behind.
        let text = format::to_storable_text(credential, &self.key)?;

        let dir = self.group_dir(&credential.name);
        let created_dir = !dir.exists();
        fs::create_dir_all(&dir)?;

        match storage::write_new(&path, text.as_bytes()) {
            Ok(()) => {
                debug!(path = %path.display(), "credential added");
                Ok(path)
            }
            Err(e) => {
                if created_dir {
                    if let Err(cleanup) = storage::remove_dir_if_empty(&dir) {
                        warn!(dir = %dir.display(), error = %cleanup, "failed to remove group directory");
                    }
                }
                if e.kind() == io::ErrorKind::AlreadyExists {
                    Err(CredVaultError::CredentialExists(path))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Replace a stored credential with `new`.
    ///
    /// When both map to the same file the record is swapped atomically.
    /// Otherwise `new` is added (failing if its slot is taken) and `old`
    /// removed afterwards. If `old` cannot be removed, the freshly added
    /// `new` is deleted again and the removal error is returned.
    #[instrument(skip_all, fields(name = %old.name, login = %old.login))]
    pub fn update(&self, old: &Credential, new: &Credential) -> Result<PathBuf> {
        new.validate()?;

        let old_path = format::expand_path(&self.root, old);
        if !old_path.is_file() {
            return Err(CredVaultError::CredentialNotFound(describe(&old.name, &old.login)));
        }

        let new_path = format::expand_path(&self.root, new);
        if new_path == old_path {
            let text = format::to_storable_text(new, &self.key)?;
            storage::replace(&new_path, text.as_bytes())?;
            debug!(path = %new_path.display(), "credential updated in place");
            return Ok(new_path);
        }

        let added = self.add(new)?;
        if let Err(e) = self.remove(old) {
            self.discard(&added, &new.name);
            return Err(e);
        }
        Ok(added)
    }

    /// Delete a stored credential; its directory goes too once empty.
    #[instrument(skip_all, fields(name = %credential.name, login = %credential.login))]
    pub fn remove(&self, credential: &Credential) -> Result<()> {
        credential.validate()?;

        let path = format::expand_path(&self.root, credential);
        if !path.is_file() {
            return Err(CredVaultError::CredentialNotFound(describe(
                &credential.name,
                &credential.login,
            )));
        }

        fs::remove_file(&path)?;
        let dir = self.group_dir(&credential.name);
        if storage::remove_dir_if_empty(&dir)? {
            debug!(dir = %dir.display(), "removed empty group directory");
        }
        debug!(path = %path.display(), "credential removed");
        Ok(())
    }

    /// Look up a credential.
    ///
    /// With a `login`, that exact slot is read. Without one, the lookup
    /// only succeeds if the directory for `name` holds a single
    /// credential; several fail with `AmbiguousCredential`.
    pub fn get(&self, name: &str, login: Option<&str>) -> Result<Credential> {
        validate_group(name)?;

        let path = match login {
            Some(login) => {
                validate_login(login)?;
                let path = format::credential_path(&self.root, name, login);
                if !path.is_file() {
                    return Err(CredVaultError::CredentialNotFound(describe(name, login)));
                }
                path
            }
            None => {
                let mut files = self.group_files(name)?;
                match files.len() {
                    0 => return Err(CredVaultError::CredentialNotFound(name.to_string())),
                    1 => files.remove(0),
                    n => return Err(CredVaultError::AmbiguousCredential(name.to_string(), n)),
                }
            }
        };

        self.load(&path).map_err(|e| e.source)
    }

    /// Check whether a `(name, login)` slot is taken. No decryption.
    pub fn contains(&self, name: &str, login: &str) -> bool {
        validate_group(name).is_ok()
            && validate_login(login).is_ok()
            && format::credential_path(&self.root, name, login).is_file()
    }

    /// Decrypt every credential in the vault.
    ///
    /// An entry that fails to read or decrypt is returned as an
    /// `EntryError` in its place; enumeration carries on. Order follows
    /// the directory walk and should not be relied upon.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn list(&self) -> Result<Vec<Entry>> {
        let entries: Vec<Entry> = self
            .credential_files()?
            .into_iter()
            .map(|path| self.load(&path))
            .collect();

        let failed = entries.iter().filter(|e| e.is_err()).count();
        debug!(total = entries.len(), failed, "listed credentials");
        Ok(entries)
    }

    /// Credentials whose `name` contains `needle` (case-sensitive).
    ///
    /// Same results as filtering [`Vault::list`], but only matching
    /// entries are decrypted. Entries whose name cannot be read at all
    /// might match, so they are reported as failures with `name: None`.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn search(&self, needle: &str) -> Result<Vec<Entry>> {
        let mut matches = Vec::new();

        for path in self.credential_files()? {
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable credential file");
                    matches.push(Err(EntryError {
                        path,
                        name: None,
                        source: e.into(),
                    }));
                    continue;
                }
            };
            let header = match format::read_header(&text) {
                Ok(header) => header,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed credential file");
                    matches.push(Err(EntryError {
                        path,
                        name: None,
                        source: e,
                    }));
                    continue;
                }
            };
            if !header.name.contains(needle) {
                continue;
            }

            let entry = format::decode_with(&text, &self.unlocked).map_err(|source| EntryError {
                path: path.clone(),
                name: Some(header.name.clone()),
                source,
            });
            matches.push(entry);
        }

        Ok(matches)
    }

    /// Check a passphrase against the vault key without changing state.
    pub fn verify_passphrase(&self, passphrase: &str) -> bool {
        self.key.unlock(passphrase).is_ok()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Returns the vault root directory.
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Returns `<root>/.keys`.
    pub fn key_store_path(&self) -> PathBuf {
        keyring::keys_path(&self.root)
    }

    /// Returns the vault key handle.
    pub fn key(&self) -> &KeyHandle {
        &self.key
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Best-effort removal of a file written earlier in a failed operation.
    fn discard(&self, path: &Path, name: &str) {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to roll back credential");
            return;
        }
        let dir = self.group_dir(name);
        if let Err(e) = storage::remove_dir_if_empty(&dir) {
            warn!(dir = %dir.display(), error = %e, "failed to remove group directory");
        }
    }

    fn group_dir(&self, name: &str) -> PathBuf {
        self.root.join(group_of(name))
    }

    /// `.cred` files directly inside the directory for `name`, sorted.
    fn group_files(&self, name: &str) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(self.group_dir(name)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && is_credential_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Every `.cred` file under the root, skipping the key store and
    /// other hidden directories.
    fn credential_files(&self) -> Result<Vec<PathBuf>> {
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                name != KEYS_DIR && !name.starts_with('.')
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_file() && is_credential_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn load(&self, path: &Path) -> std::result::Result<Credential, EntryError> {
        let fail = |name: Option<String>, source: CredVaultError| EntryError {
            path: path.to_path_buf(),
            name,
            source,
        };

        let text = fs::read_to_string(path).map_err(|e| fail(None, e.into()))?;
        let header = format::read_header(&text).map_err(|e| fail(None, e))?;
        format::decode_with(&text, &self.unlocked).map_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to decrypt credential");
            fail(Some(header.name), e)
        })
    }
}

fn is_credential_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |n| n.starts_with('.'));
    !hidden && path.extension().and_then(|e| e.to_str()) == Some(CREDENTIAL_EXTENSION)
}

fn describe(name: &str, login: &str) -> String {
    format!("{name} ({login})")
}
