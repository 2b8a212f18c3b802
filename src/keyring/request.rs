//! Key generation batch requests.
//!
//! Key generation is driven by a small line-oriented batch document:
//!
//! ```text
//! Key-Type: X25519
//! Key-Length: 256
//! Name-Real: credvault
//! Name-Comment: /home/john/.credvault
//! Expire-Date: 0
//! Protection-Memory: 65536
//! Protection-Iterations: 3
//! Protection-Parallelism: 4
//! Passphrase: correct horse battery staple
//! %commit
//! ```
//!
//! Building the batch is pure, and the generator only ever acts on what
//! [`KeyGenRequest::parse`] reads back, so the parameters can be checked
//! without paying for real key generation.

use std::path::Path;

use zeroize::Zeroizing;

use crate::crypto::kdf::Argon2Params;
use crate::errors::{CredVaultError, Result};

pub const KEY_TYPE: &str = "X25519";
pub const KEY_LENGTH: u32 = 256;
/// `0` means the key never expires.
pub const EXPIRE_NEVER: &str = "0";
pub const DEFAULT_USER_ID: &str = "credvault";

const COMMIT: &str = "%commit";

/// A parsed (or about to be rendered) key generation request.
#[derive(Clone)]
pub struct KeyGenRequest {
    pub key_type: String,
    pub key_length: u32,
    pub name_real: String,
    pub name_comment: Option<String>,
    pub expire_date: String,
    pub protection: Argon2Params,
    pub passphrase: Zeroizing<String>,
}

impl std::fmt::Debug for KeyGenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyGenRequest")
            .field("key_type", &self.key_type)
            .field("key_length", &self.key_length)
            .field("name_real", &self.name_real)
            .field("name_comment", &self.name_comment)
            .field("expire_date", &self.expire_date)
            .field("protection", &self.protection)
            .field("passphrase", &"***")
            .finish()
    }
}

impl KeyGenRequest {
    /// Request with the default key parameters for the vault at `path`.
    pub fn new(path: &Path, passphrase: &str) -> Self {
        Self {
            key_type: KEY_TYPE.to_string(),
            key_length: KEY_LENGTH,
            name_real: DEFAULT_USER_ID.to_string(),
            name_comment: Some(path.display().to_string()),
            expire_date: EXPIRE_NEVER.to_string(),
            protection: Argon2Params::default(),
            passphrase: Zeroizing::new(passphrase.to_string()),
        }
    }

    pub fn with_user_id(mut self, user_id: &str) -> Self {
        self.name_real = user_id.to_string();
        self
    }

    pub fn with_protection(mut self, params: Argon2Params) -> Self {
        self.protection = params;
        self
    }

    /// Render the batch document. The passphrase is written verbatim on
    /// its own `Passphrase:` line.
    pub fn to_batch(&self) -> String {
        let mut batch = String::new();
        push_line(&mut batch, "Key-Type", &self.key_type);
        push_line(&mut batch, "Key-Length", &self.key_length.to_string());
        push_line(&mut batch, "Name-Real", &self.name_real);
        if let Some(comment) = &self.name_comment {
            push_line(&mut batch, "Name-Comment", comment);
        }
        push_line(&mut batch, "Expire-Date", &self.expire_date);
        push_line(&mut batch, "Protection-Memory", &self.protection.memory_kib.to_string());
        push_line(&mut batch, "Protection-Iterations", &self.protection.iterations.to_string());
        push_line(&mut batch, "Protection-Parallelism", &self.protection.parallelism.to_string());
        push_line(&mut batch, "Passphrase", &self.passphrase);
        batch.push_str(COMMIT);
        batch.push('\n');
        batch
    }

    /// Parse and validate a batch document.
    ///
    /// Every failure, including a passphrase that broke the line
    /// structure, is a `KeyGeneration` error.
    pub fn parse(batch: &str) -> Result<Self> {
        let mut key_type = None;
        let mut key_length = None;
        let mut name_real = None;
        let mut name_comment = None;
        let mut expire_date = None;
        let mut memory = None;
        let mut iterations = None;
        let mut parallelism = None;
        let mut passphrase: Option<Zeroizing<String>> = None;
        let mut committed = false;

        // Split on LF only: a stray CR must stay visible, not be eaten as a
        // line ending.
        for (index, line) in batch.split('\n').enumerate() {
            let line_no = index + 1;
            if line.contains('\r') {
                return Err(invalid(format!("line {line_no}: carriage return is not allowed")));
            }
            if committed {
                if line.trim().is_empty() {
                    continue;
                }
                return Err(invalid(format!("line {line_no}: content after {COMMIT}")));
            }
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            if line.trim() == COMMIT {
                committed = true;
                continue;
            }

            let (key, rest) = line
                .split_once(':')
                .ok_or_else(|| invalid(format!("line {line_no}: expected `Key: value`")))?;
            // Exactly one separator space; the passphrase keeps any other whitespace.
            let value = rest.strip_prefix(' ').unwrap_or(rest);

            match key {
                "Key-Type" => set_once(&mut key_type, value.to_string(), key)?,
                "Key-Length" => set_once(&mut key_length, parse_number(value, key)?, key)?,
                "Name-Real" => set_once(&mut name_real, value.to_string(), key)?,
                "Name-Comment" => set_once(&mut name_comment, value.to_string(), key)?,
                "Expire-Date" => set_once(&mut expire_date, value.to_string(), key)?,
                "Protection-Memory" => set_once(&mut memory, parse_number(value, key)?, key)?,
                "Protection-Iterations" => {
                    set_once(&mut iterations, parse_number(value, key)?, key)?
                }
                "Protection-Parallelism" => {
                    set_once(&mut parallelism, parse_number(value, key)?, key)?
                }
                "Passphrase" => {
                    set_once(&mut passphrase, Zeroizing::new(value.to_string()), key)?
                }
                other => return Err(invalid(format!("line {line_no}: unknown parameter `{other}`"))),
            }
        }

        if !committed {
            return Err(invalid(format!("missing {COMMIT}")));
        }

        let defaults = Argon2Params::default();
        let request = Self {
            key_type: key_type.ok_or_else(|| invalid("missing Key-Type".into()))?,
            key_length: key_length.ok_or_else(|| invalid("missing Key-Length".into()))?,
            name_real: name_real.unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
            name_comment,
            expire_date: expire_date.unwrap_or_else(|| EXPIRE_NEVER.to_string()),
            protection: Argon2Params {
                memory_kib: memory.unwrap_or(defaults.memory_kib),
                iterations: iterations.unwrap_or(defaults.iterations),
                parallelism: parallelism.unwrap_or(defaults.parallelism),
            },
            passphrase: passphrase.ok_or_else(|| invalid("missing Passphrase".into()))?,
        };
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<()> {
        if self.key_type != KEY_TYPE {
            return Err(invalid(format!(
                "unsupported Key-Type `{}`, expected {KEY_TYPE}",
                self.key_type
            )));
        }
        if self.key_length != KEY_LENGTH {
            return Err(invalid(format!(
                "unsupported Key-Length {}, expected {KEY_LENGTH}",
                self.key_length
            )));
        }
        if self.expire_date != EXPIRE_NEVER {
            return Err(invalid(format!(
                "unsupported Expire-Date `{}`, keys never expire",
                self.expire_date
            )));
        }
        if self.passphrase.is_empty() {
            return Err(invalid("passphrase must not be empty".into()));
        }
        if self.passphrase.contains(|c: char| c == '\r' || c == '\n') {
            return Err(invalid("passphrase must not contain line breaks".into()));
        }
        self.protection
            .validate()
            .map_err(|e| invalid(e.to_string()))
    }
}

fn push_line(batch: &mut String, key: &str, value: &str) {
    batch.push_str(key);
    batch.push_str(": ");
    batch.push_str(value);
    batch.push('\n');
}

fn set_once<T>(slot: &mut Option<T>, value: T, key: &str) -> Result<()> {
    if slot.is_some() {
        return Err(invalid(format!("duplicate parameter `{key}`")));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_number(value: &str, key: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(format!("`{key}` must be a number, got `{value}`")))
}

fn invalid(reason: String) -> CredVaultError {
    CredVaultError::KeyGeneration(format!("invalid key generation request: {reason}"))
}
