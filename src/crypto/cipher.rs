//! Field-level public-key encryption.
//!
//! A field is encrypted to the vault's X25519 public key:
//!
//! 1. Generate an ephemeral X25519 keypair.
//! 2. Agree on a shared secret with the recipient public key.
//! 3. HKDF the shared secret into a one-off AES-256 key.
//! 4. AES-256-GCM encrypt the plaintext with a random nonce.
//!
//! Binary message layout, wrapped in [`armor`](super::armor):
//!   [ 1-byte version | 32-byte ephemeral public | 12-byte nonce | ciphertext + tag ]
//!
//! Only the holder of the unlocked secret key can redo step 2, so
//! encryption needs just the [`KeyHandle`] while decryption needs the
//! passphrase (or an already [`UnlockedKey`]).

use aes_gcm::aead::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroize;

use super::armor::{armor, dearmor};
use super::encryption::{decrypt, encrypt, NONCE_LEN, TAG_LEN};
use super::keys::derive_field_key;
use crate::errors::{CredVaultError, Result};
use crate::keyring::{KeyHandle, UnlockedKey};

const MESSAGE_VERSION: u8 = 1;
const PUBLIC_KEY_LEN: usize = 32;
const HEADER_LEN: usize = 1 + PUBLIC_KEY_LEN;

/// Encrypt a single string field to the vault's public key.
///
/// Returns an armored block. Encrypting the same plaintext twice yields
/// different output because every call uses a fresh ephemeral key.
pub fn encrypt_field(plaintext: &str, key: &KeyHandle) -> Result<String> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(key.public_key());

    let mut field_key = derive_field_key(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        key.public_key().as_bytes(),
    )?;
    let sealed = encrypt(&field_key, plaintext.as_bytes());
    field_key.zeroize();
    let sealed = sealed?;

    let mut message = Vec::with_capacity(HEADER_LEN + sealed.len());
    message.push(MESSAGE_VERSION);
    message.extend_from_slice(ephemeral_public.as_bytes());
    message.extend_from_slice(&sealed);

    Ok(armor(key.fingerprint(), &message))
}

/// Decrypt an armored field, unlocking the secret key with `passphrase`.
///
/// A wrong passphrase is reported as `DecryptionFailed`, same as a
/// mismatched key or a damaged block.
pub fn decrypt_field(armored: &str, key: &KeyHandle, passphrase: &str) -> Result<String> {
    let unlocked = key.unlock(passphrase).map_err(|e| match e {
        CredVaultError::InvalidPassphrase(_) => {
            CredVaultError::DecryptionFailed("wrong passphrase".into())
        }
        other => other,
    })?;
    decrypt_with(armored, &unlocked)
}

/// Decrypt an armored field with an already unlocked key.
pub fn decrypt_with(armored: &str, key: &UnlockedKey) -> Result<String> {
    let block = dearmor(armored)?;

    if block.recipient != key.fingerprint() {
        return Err(CredVaultError::DecryptionFailed(format!(
            "encrypted to key {}, vault key is {}",
            block.recipient,
            key.fingerprint()
        )));
    }

    let message = block.payload;
    if message.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
        return Err(CredVaultError::DecryptionFailed(
            "message is truncated".into(),
        ));
    }
    if message[0] != MESSAGE_VERSION {
        return Err(CredVaultError::DecryptionFailed(format!(
            "unsupported message version {}",
            message[0]
        )));
    }

    let mut ephemeral_bytes = [0u8; PUBLIC_KEY_LEN];
    ephemeral_bytes.copy_from_slice(&message[1..HEADER_LEN]);
    let ephemeral_public = PublicKey::from(ephemeral_bytes);

    let shared = key.secret().diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(CredVaultError::DecryptionFailed(
            "invalid ephemeral key".into(),
        ));
    }

    let mut field_key = derive_field_key(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        key.public_key().as_bytes(),
    )?;
    let plaintext = decrypt(&field_key, &message[HEADER_LEN..]);
    field_key.zeroize();

    String::from_utf8(plaintext?).map_err(|e| {
        let mut bad_bytes = e.into_bytes();
        bad_bytes.zeroize();
        CredVaultError::DecryptionFailed("plaintext is not valid UTF-8".into())
    })
}
