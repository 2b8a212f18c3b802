//! credvault: a local, file-based credential vault.
//!
//! Every credential lives in its own `<group>/<login>.cred` file under the
//! vault root. The password field is encrypted to the vault's X25519
//! keypair, whose secret half sits in `<root>/.keys` wrapped by a
//! passphrase.
//!
//! ```no_run
//! use credvault::{Credential, Vault};
//!
//! # fn main() -> credvault::Result<()> {
//! let vault = Vault::create("/tmp/my-vault".as_ref(), "correct horse")?;
//! vault.add(&Credential::new("emails/example.com", "john", "s3cret"))?;
//!
//! let found = vault.get("example.com", None)?;
//! assert_eq!(found.password, "s3cret");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod errors;
pub mod keyring;
pub mod vault;

mod storage;

pub use errors::{CredVaultError, Result};
pub use keyring::KeyHandle;
pub use vault::{Credential, EntryError, Vault};
