use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in credvault.
#[derive(Debug, Error)]
pub enum CredVaultError {
    // --- Keyring errors ---
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("No usable keyring at {0}: {1}")]
    KeyringNotFound(PathBuf, String),

    #[error("Invalid passphrase for keyring {0}")]
    InvalidPassphrase(String),

    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Vault errors ---
    #[error("Vault already exists at {0}")]
    VaultAlreadyExists(PathBuf),

    #[error("Credential already exists at {0}")]
    CredentialExists(PathBuf),

    #[error("Credential '{0}' not found")]
    CredentialNotFound(String),

    #[error("Credential '{0}' is ambiguous: {1} logins stored, specify one")]
    AmbiguousCredential(String, usize),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Malformed credential record: {0}")]
    MalformedCredential(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Convenience type alias for credvault results.
pub type Result<T> = std::result::Result<T, CredVaultError>;
