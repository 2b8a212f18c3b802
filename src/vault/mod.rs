//! Vault module: encrypted credential storage.
//!
//! This module provides:
//! - The `Credential` entity and naming rules (`credential`)
//! - The storable text format and on-disk path mapping (`format`)
//! - The `Vault` handle with create/open/add/remove/get/list/search (`store`)

pub mod credential;
pub mod format;
pub mod store;

// Re-export the most commonly used items.
pub use credential::Credential;
pub use format::{expand_path, from_storable_text, to_storable_text, RecordHeader};
pub use store::{Entry, EntryError, Vault};
