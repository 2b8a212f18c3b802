//! The `Credential` entity.
//!
//! A credential is a `(name, login, password, comment)` record. `name` is
//! path-like (`emails/misc/example.com`); only its final segment is used
//! as the directory on disk, so differently prefixed names with the same
//! last segment share a directory. Uniqueness is per `(directory, login)`.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{CredVaultError, Result};

/// One stored secret.
///
/// Equality is structural over all four fields. The password is wiped
/// from memory when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    pub name: String,
    pub login: String,
    pub password: String,
    pub comment: Option<String>,
}

impl Credential {
    pub fn new(name: impl Into<String>, login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            login: login.into(),
            password: password.into(),
            comment: None,
        }
    }

    /// Build from four plain strings; an empty comment means none.
    pub fn from_fields(name: &str, login: &str, password: &str, comment: &str) -> Self {
        let credential = Self::new(name, login, password);
        if comment.is_empty() {
            credential
        } else {
            credential.with_comment(comment)
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// The directory this credential is filed under: the last segment of
    /// `name`.
    pub fn group(&self) -> &str {
        group_of(&self.name)
    }

    /// Check that `name` and `login` map to safe on-disk names.
    pub fn validate(&self) -> Result<()> {
        validate_group(&self.name)?;
        validate_login(&self.login)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("login", &self.login)
            .field("password", &"***")
            .field("comment", &self.comment)
            .finish()
    }
}

/// Final path segment of a credential name. Both `/` and `\` separate
/// segments; trailing separators are ignored.
pub fn group_of(name: &str) -> &str {
    let is_sep = |c: char| c == '/' || c == '\\';
    name.trim_end_matches(is_sep)
        .rsplit(is_sep)
        .next()
        .unwrap_or_default()
}

/// Validate the directory a credential name maps to.
pub(crate) fn validate_group(name: &str) -> Result<()> {
    let group = group_of(name);
    if group.is_empty() {
        return Err(CredVaultError::InvalidCredential(format!(
            "name '{name}' has an empty final segment"
        )));
    }
    if group.starts_with('.') {
        return Err(CredVaultError::InvalidCredential(format!(
            "name '{name}' must not end in a segment starting with '.'"
        )));
    }
    if group.contains('\0') {
        return Err(CredVaultError::InvalidCredential(
            "name must not contain NUL".into(),
        ));
    }
    Ok(())
}

/// Validate a login, which becomes a file stem.
pub(crate) fn validate_login(login: &str) -> Result<()> {
    if login.is_empty() {
        return Err(CredVaultError::InvalidCredential(
            "login cannot be empty".into(),
        ));
    }
    if login.starts_with('.') {
        return Err(CredVaultError::InvalidCredential(format!(
            "login '{login}' must not start with '.'"
        )));
    }
    if login.contains(|c: char| matches!(c, '/' | '\\' | '\0')) {
        return Err(CredVaultError::InvalidCredential(format!(
            "login '{login}' must not contain path separators or NUL"
        )));
    }
    Ok(())
}
