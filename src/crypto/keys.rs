//! Key derivation helpers using HKDF-SHA256.
//!
//! Every encrypted field gets its own AES-256 key, derived from the X25519
//! shared secret between a fresh ephemeral key and the vault's public key.
//! Both public keys go into the HKDF salt so the derived key is bound to
//! this exact sender/recipient pair.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};

use crate::errors::{CredVaultError, Result};

/// Length of derived sub-keys (256 bits).
const KEY_LEN: usize = 32;

/// Number of SHA-256 bytes kept in a key fingerprint.
const FINGERPRINT_LEN: usize = 20;

/// Context string binding derived keys to credvault field encryption.
const FIELD_KEY_INFO: &[u8] = b"credvault-field-v1";

/// Derive the per-message AES key from an X25519 shared secret.
pub fn derive_field_key(
    shared_secret: &[u8],
    ephemeral_public: &[u8],
    recipient_public: &[u8],
) -> Result<[u8; KEY_LEN]> {
    let mut salt = Vec::with_capacity(ephemeral_public.len() + recipient_public.len());
    salt.extend_from_slice(ephemeral_public);
    salt.extend_from_slice(recipient_public);
    hkdf_derive(shared_secret, &salt, FIELD_KEY_INFO)
}

/// Compute the fingerprint of a public key: upper-case hex of the first
/// 20 bytes of its SHA-256 digest.
pub fn fingerprint(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    digest[..FINGERPRINT_LEN]
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect()
}

fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);

    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| CredVaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}
