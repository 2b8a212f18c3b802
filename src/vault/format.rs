//! Storable text format of a credential and its on-disk path.
//!
//! A `.cred` file is a fixed TOML record:
//!
//! ```toml
//! name = "emails/misc/example.com"
//! login = "john.doe"
//! comment = "personal"
//!
//! [password]
//! encoding = "armored-ciphertext"
//! data = """
//! -----BEGIN CREDVAULT MESSAGE-----
//! ...
//! -----END CREDVAULT MESSAGE-----
//! """
//! ```
//!
//! `name`, `login` and `comment` are plaintext; only the password is
//! encrypted. Unknown keys are rejected so a record always decodes to
//! exactly these four fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::credential::{group_of, Credential};
use crate::crypto::cipher::{decrypt_field, decrypt_with, encrypt_field};
use crate::errors::{CredVaultError, Result};
use crate::keyring::{KeyHandle, UnlockedKey};

/// File extension of credential records.
pub const CREDENTIAL_EXTENSION: &str = "cred";

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Record {
    name: String,
    login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    password: EncryptedField,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EncryptedField {
    encoding: FieldEncoding,
    data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum FieldEncoding {
    ArmoredCiphertext,
}

/// The plaintext part of a record, readable without any key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub name: String,
    pub login: String,
    pub comment: Option<String>,
}

/// Map a credential to `root / <last segment of name> / <login>.cred`.
pub fn expand_path(root: &Path, credential: &Credential) -> PathBuf {
    credential_path(root, &credential.name, &credential.login)
}

pub(crate) fn credential_path(root: &Path, name: &str, login: &str) -> PathBuf {
    root.join(group_of(name))
        .join(format!("{login}.{CREDENTIAL_EXTENSION}"))
}

/// Serialize a credential, encrypting its password to `key`.
pub fn to_storable_text(credential: &Credential, key: &KeyHandle) -> Result<String> {
    let record = Record {
        name: credential.name.clone(),
        login: credential.login.clone(),
        comment: credential.comment.clone(),
        password: EncryptedField {
            encoding: FieldEncoding::ArmoredCiphertext,
            data: encrypt_field(&credential.password, key)?,
        },
    };

    toml::to_string(&record)
        .map_err(|e| CredVaultError::SerializationError(format!("credential record: {e}")))
}

/// Parse a record and decrypt its password with `passphrase`.
pub fn from_storable_text(text: &str, key: &KeyHandle, passphrase: &str) -> Result<Credential> {
    let record = parse(text)?;
    let password = decrypt_field(&record.password.data, key, passphrase)?;
    Ok(assemble(record, password))
}

/// Parse a record and decrypt its password with an unlocked key.
pub fn decode_with(text: &str, key: &UnlockedKey) -> Result<Credential> {
    let record = parse(text)?;
    let password = decrypt_with(&record.password.data, key)?;
    Ok(assemble(record, password))
}

/// Parse only the plaintext fields of a record.
pub fn read_header(text: &str) -> Result<RecordHeader> {
    let record = parse(text)?;
    Ok(RecordHeader {
        name: record.name,
        login: record.login,
        comment: record.comment,
    })
}

fn parse(text: &str) -> Result<Record> {
    toml::from_str(text).map_err(|e| CredVaultError::MalformedCredential(e.message().to_string()))
}

fn assemble(record: Record, password: String) -> Credential {
    Credential {
        name: record.name,
        login: record.login,
        password,
        comment: record.comment,
    }
}
