//! Cryptographic primitives for credvault.
//!
//! This module provides:
//! - AES-256-GCM encryption and decryption (`encryption`)
//! - Argon2id passphrase-based key derivation (`kdf`)
//! - HKDF field-key derivation and key fingerprints (`keys`)
//! - ASCII armor for ciphertext blocks (`armor`)
//! - X25519 field encryption on top of the above (`cipher`)

pub mod armor;
pub mod cipher;
pub mod encryption;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use credvault::crypto::{encrypt_field, decrypt_field, ...};
pub use cipher::{decrypt_field, decrypt_with, encrypt_field};
pub use kdf::{derive_key, generate_salt, Argon2Params};
pub use keys::fingerprint;
