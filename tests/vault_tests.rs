//! Integration tests for the credvault vault module.

use std::fs;
use std::path::{Path, PathBuf};

use credvault::config::Settings;
use credvault::keyring::{self, KEYS_DIR};
use credvault::vault::{expand_path, Credential, Vault};
use credvault::CredVaultError;
use tempfile::TempDir;

const PASSPHRASE: &str = "dummy_passphrase";

/// Helper: fast (but valid) Argon2 params so tests don't crawl.
fn fast_settings() -> Settings {
    Settings {
        argon2_memory_kib: 8_192,
        argon2_iterations: 1,
        argon2_parallelism: 1,
        ..Settings::default()
    }
}

/// Helper: a fresh vault root inside a temp dir, plus the opened vault.
fn new_vault() -> (TempDir, PathBuf, Vault) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("database");
    let vault = Vault::create_with_settings(&path, PASSPHRASE, &fast_settings()).expect("create vault");
    (dir, path, vault)
}

fn some_credential(name: &str) -> Credential {
    Credential::new(name, "john.doe", "--BEGIN GPG-- X --END GPG--").with_comment("Some comments")
}

fn names(entries: &[credvault::vault::Entry]) -> Vec<String> {
    let mut names: Vec<String> = entries
        .iter()
        .map(|e| e.as_ref().expect("entry decrypts").name.clone())
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Create / open
// ---------------------------------------------------------------------------

#[test]
fn create_makes_dirs_at_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("creation");

    let vault = Vault::create_with_settings(&path, PASSPHRASE, &fast_settings()).unwrap();

    assert!(path.is_dir());
    assert_eq!(vault.root_path(), path);
    assert_eq!(vault.key_store_path(), path.join(KEYS_DIR));
}

#[test]
fn create_produces_exactly_one_keypair() {
    let (_dir, path, vault) = new_vault();

    let files = keyring::key_files(&path).unwrap();
    assert_eq!(files.len(), 1);

    let opened = keyring::open_keyring(&path).unwrap();
    assert_eq!(opened.fingerprint(), vault.key().fingerprint());
}

#[test]
fn create_twice_fails_without_second_key() {
    let (_dir, path, _vault) = new_vault();

    let result = Vault::create_with_settings(&path, PASSPHRASE, &fast_settings());
    assert!(matches!(result, Err(CredVaultError::VaultAlreadyExists(_))));
    assert_eq!(keyring::key_files(&path).unwrap().len(), 1);
}

#[test]
fn create_with_line_break_in_passphrase_leaves_no_key() {
    let dir = TempDir::new().unwrap();

    for passphrase in ["secret\r", "secret\n# comment"] {
        let result = Vault::create_with_settings(dir.path(), passphrase, &fast_settings());
        assert!(
            matches!(result, Err(CredVaultError::KeyGeneration(_))),
            "{passphrase:?} should be rejected"
        );
        assert!(keyring::key_files(dir.path()).unwrap().is_empty());
    }

    Vault::create_with_settings(dir.path(), "secret", &fast_settings()).unwrap();
    assert!(Vault::open(dir.path(), "secret").is_ok());
    assert!(matches!(
        Vault::open(dir.path(), "secret\r"),
        Err(CredVaultError::InvalidPassphrase(_))
    ));
}

#[test]
fn create_refuses_over_corrupt_key_material() {
    let dir = TempDir::new().unwrap();
    let keys = dir.path().join(KEYS_DIR);
    fs::create_dir_all(&keys).unwrap();
    fs::write(keys.join("DEADBEEF.key"), b"{ half written").unwrap();

    let result = Vault::create_with_settings(dir.path(), PASSPHRASE, &fast_settings());
    assert!(matches!(result, Err(CredVaultError::VaultAlreadyExists(_))));
}

#[test]
fn create_reads_settings_file_from_root() {
    let dir = TempDir::new().unwrap();
    let config = "key_user_id = \"john.doe\"\nargon2_memory_kib = 8192\nargon2_iterations = 1\nargon2_parallelism = 1\n";
    fs::write(dir.path().join(Settings::FILE_NAME), config).unwrap();

    let vault = Vault::create(dir.path(), PASSPHRASE).unwrap();
    assert_eq!(vault.key().user_id(), "john.doe");
}

#[test]
fn open_with_right_passphrase() {
    let (_dir, path, vault) = new_vault();
    vault.add(&some_credential("example.com")).unwrap();
    drop(vault);

    let reopened = Vault::open(&path, PASSPHRASE).unwrap();
    assert_eq!(reopened.get("example.com", None).unwrap(), some_credential("example.com"));
}

#[test]
fn open_with_wrong_passphrase_fails() {
    let (_dir, path, _vault) = new_vault();

    let result = Vault::open(&path, "not the passphrase");
    assert!(matches!(result, Err(CredVaultError::InvalidPassphrase(_))));
}

#[test]
fn open_missing_vault_fails() {
    let dir = TempDir::new().unwrap();

    let result = Vault::open(&dir.path().join("nothing here"), PASSPHRASE);
    assert!(matches!(result, Err(CredVaultError::KeyringNotFound(..))));
}

#[test]
fn verify_passphrase_checks_without_state_change() {
    let (_dir, _path, vault) = new_vault();
    assert!(vault.verify_passphrase(PASSPHRASE));
    assert!(!vault.verify_passphrase("nope"));
}

// ---------------------------------------------------------------------------
// Add
// ---------------------------------------------------------------------------

#[test]
fn add_creates_dir_named_after_credential() {
    let (_dir, path, vault) = new_vault();
    vault.add(&some_credential("example.com")).unwrap();

    assert!(path.join("example.com").is_dir());
}

#[test]
fn add_writes_cred_file_named_after_login() {
    let (_dir, path, vault) = new_vault();
    let credential = some_credential("example.com");

    let written = vault.add(&credential).unwrap();

    let expected = path.join("example.com").join("john.doe.cred");
    assert_eq!(written, expected);
    assert!(expected.is_file());
}

#[test]
fn add_uses_only_last_name_segment() {
    let (_dir, path, vault) = new_vault();
    let credential = some_credential("emails/misc/example.com");

    let written = vault.add(&credential).unwrap();

    assert_eq!(written, path.join("example.com").join("john.doe.cred"));
    assert_eq!(written, expand_path(&path, &credential));
    assert!(!path.join("emails").exists());
}

#[test]
fn add_does_not_store_password_in_plaintext() {
    let (_dir, _path, vault) = new_vault();
    let credential = Credential::new("example.com", "john", "hunter2-very-secret");

    let written = vault.add(&credential).unwrap();
    let text = fs::read_to_string(written).unwrap();

    assert!(!text.contains("hunter2-very-secret"));
    assert!(text.contains("name = \"example.com\""));
    assert!(text.contains("armored-ciphertext"));
}

#[test]
fn add_repeated_credential_fails_and_keeps_file() {
    let (_dir, _path, vault) = new_vault();
    let credential = some_credential("example.com");
    let written = vault.add(&credential).unwrap();
    let before = fs::read(&written).unwrap();

    let clash = Credential::new("example.com", "john.doe", "different password");
    let result = vault.add(&clash);

    assert!(matches!(result, Err(CredVaultError::CredentialExists(_))));
    assert_eq!(fs::read(&written).unwrap(), before);
    assert_eq!(vault.get("example.com", Some("john.doe")).unwrap(), credential);
}

#[test]
fn add_collides_across_prefixes_with_same_last_segment() {
    let (_dir, _path, vault) = new_vault();
    vault.add(&some_credential("emails/misc/example.com")).unwrap();

    let result = vault.add(&some_credential("example.com"));
    assert!(matches!(result, Err(CredVaultError::CredentialExists(_))));
}

#[test]
fn add_leaves_no_temp_files() {
    let (_dir, path, vault) = new_vault();
    vault.add(&some_credential("example.com")).unwrap();
    let _ = vault.add(&some_credential("example.com"));

    let names: Vec<_> = fs::read_dir(path.join("example.com"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["john.doe.cred".to_string()]);
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

#[test]
fn get_by_name_returns_expected_credential() {
    let (_dir, _path, vault) = new_vault();
    let credential = some_credential("example.com");
    vault.add(&credential).unwrap();

    let found = vault.get("example.com", None).unwrap();
    assert_eq!(found, credential);
}

#[test]
fn get_round_trips_credential_without_comment() {
    let (_dir, _path, vault) = new_vault();
    let credential = Credential::new("example.com", "jane", "multi\nline\npässwörd");
    vault.add(&credential).unwrap();

    assert_eq!(vault.get("example.com", Some("jane")).unwrap(), credential);
}

#[test]
fn get_by_name_is_ambiguous_with_several_logins() {
    let (_dir, _path, vault) = new_vault();
    vault.add(&Credential::new("example.com", "alice", "a")).unwrap();
    vault.add(&Credential::new("example.com", "bob", "b")).unwrap();

    let result = vault.get("example.com", None);
    assert!(matches!(
        result,
        Err(CredVaultError::AmbiguousCredential(_, 2))
    ));

    assert_eq!(vault.get("example.com", Some("bob")).unwrap().password, "b");
}

#[test]
fn get_missing_credential_fails() {
    let (_dir, _path, vault) = new_vault();
    vault.add(&some_credential("example.com")).unwrap();

    assert!(matches!(
        vault.get("github.com", None),
        Err(CredVaultError::CredentialNotFound(_))
    ));
    assert!(matches!(
        vault.get("example.com", Some("nobody")),
        Err(CredVaultError::CredentialNotFound(_))
    ));
}

#[test]
fn contains_checks_slot_only() {
    let (_dir, _path, vault) = new_vault();
    vault.add(&some_credential("emails/example.com")).unwrap();

    assert!(vault.contains("example.com", "john.doe"));
    assert!(vault.contains("emails/example.com", "john.doe"));
    assert!(!vault.contains("example.com", "someone.else"));
    assert!(!vault.contains("example.com", "../john.doe"));
}

// ---------------------------------------------------------------------------
// Remove
// ---------------------------------------------------------------------------

#[test]
fn remove_deletes_cred_file() {
    let (_dir, path, vault) = new_vault();
    let credential = some_credential("example.com");
    let credential_path = expand_path(&path, &credential);
    vault.add(&credential).unwrap();
    assert!(credential_path.is_file());

    vault.remove(&credential).unwrap();
    assert!(!credential_path.exists());
}

#[test]
fn remove_deletes_dir_if_empty_after_deletion() {
    let (_dir, path, vault) = new_vault();
    let credential = some_credential("example.com");
    vault.add(&credential).unwrap();

    vault.remove(&credential).unwrap();
    assert!(!path.join("example.com").exists());
    assert!(path.join(KEYS_DIR).is_dir());
}

#[test]
fn remove_keeps_dir_with_siblings() {
    let (_dir, path, vault) = new_vault();
    let alice = Credential::new("example.com", "alice", "a");
    let bob = Credential::new("example.com", "bob", "b");
    vault.add(&alice).unwrap();
    vault.add(&bob).unwrap();

    vault.remove(&alice).unwrap();
    assert!(path.join("example.com").is_dir());
    assert_eq!(vault.get("example.com", None).unwrap(), bob);
}

#[test]
fn remove_missing_credential_fails() {
    let (_dir, _path, vault) = new_vault();

    let result = vault.remove(&some_credential("example.com"));
    assert!(matches!(result, Err(CredVaultError::CredentialNotFound(_))));
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[test]
fn update_in_same_slot_replaces_record() {
    let (_dir, _path, vault) = new_vault();
    let old = some_credential("example.com");
    vault.add(&old).unwrap();

    let new = Credential::new("example.com", "john.doe", "rotated").with_comment("changed");
    vault.update(&old, &new).unwrap();

    assert_eq!(vault.get("example.com", None).unwrap(), new);
}

#[test]
fn update_to_new_slot_moves_credential() {
    let (_dir, path, vault) = new_vault();
    let old = some_credential("example.com");
    vault.add(&old).unwrap();

    let new = Credential::new("github.com", "octocat", "pw");
    let written = vault.update(&old, &new).unwrap();

    assert_eq!(written, path.join("github.com").join("octocat.cred"));
    assert!(!path.join("example.com").exists());
    assert_eq!(vault.get("github.com", None).unwrap(), new);
}

#[test]
fn update_into_taken_slot_fails_and_keeps_both() {
    let (_dir, _path, vault) = new_vault();
    let a = Credential::new("example.com", "alice", "a");
    let b = Credential::new("github.com", "alice", "b");
    vault.add(&a).unwrap();
    vault.add(&b).unwrap();

    let moved = Credential::new("github.com", "alice", "c");
    assert!(matches!(
        vault.update(&a, &moved),
        Err(CredVaultError::CredentialExists(_))
    ));
    assert_eq!(vault.get("example.com", None).unwrap(), a);
    assert_eq!(vault.get("github.com", None).unwrap(), b);
}

// ---------------------------------------------------------------------------
// List / search
// ---------------------------------------------------------------------------

#[test]
fn list_returns_all_added_credentials() {
    let (_dir, _path, vault) = new_vault();
    vault.add(&some_credential("example.com")).unwrap();
    vault.add(&some_credential("archive.org")).unwrap();

    let entries = vault.list().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(names(&entries), vec!["archive.org", "example.com"]);
}

#[test]
fn list_of_empty_vault_is_empty() {
    let (_dir, _path, vault) = new_vault();
    assert!(vault.list().unwrap().is_empty());
}

#[test]
fn list_ignores_key_store_and_foreign_files() {
    let (_dir, path, vault) = new_vault();
    vault.add(&some_credential("example.com")).unwrap();
    fs::write(path.join("example.com").join("notes.txt"), b"hello").unwrap();
    fs::write(path.join(Settings::FILE_NAME), b"").unwrap();

    assert_eq!(vault.list().unwrap().len(), 1);
}

#[test]
fn search_returns_matching_credentials() {
    let (_dir, _path, vault) = new_vault();
    vault.add(&some_credential("example.com")).unwrap();
    vault.add(&some_credential("github.com")).unwrap();
    vault.add(&some_credential("twitter.com")).unwrap();

    assert_eq!(names(&vault.search("it").unwrap()), vec!["github.com", "twitter.com"]);
    assert_eq!(vault.search("github").unwrap().len(), 1);
    assert_eq!(vault.search("not there").unwrap().len(), 0);
}

#[test]
fn search_is_case_sensitive_and_ignores_comment() {
    let (_dir, _path, vault) = new_vault();
    vault
        .add(&Credential::new("github.com", "octocat", "pw").with_comment("Work account"))
        .unwrap();

    assert_eq!(vault.search("GitHub").unwrap().len(), 0);
    assert_eq!(vault.search("Work").unwrap().len(), 0);
    assert_eq!(vault.search("hub").unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Per-entry failures
// ---------------------------------------------------------------------------

/// Copy a record encrypted to another vault's key into `path`.
fn plant_foreign_record(path: &Path) {
    let other_dir = TempDir::new().unwrap();
    let other = Vault::create_with_settings(other_dir.path(), "other passphrase", &fast_settings()).unwrap();
    let foreign = Credential::new("foreign.net", "mallory", "pw");
    let written = other.add(&foreign).unwrap();

    fs::create_dir_all(path.join("foreign.net")).unwrap();
    fs::copy(written, path.join("foreign.net").join("mallory.cred")).unwrap();
}

#[test]
fn list_reports_undecryptable_entry_and_continues() {
    let (_dir, path, vault) = new_vault();
    vault.add(&some_credential("example.com")).unwrap();
    vault.add(&some_credential("github.com")).unwrap();
    plant_foreign_record(&path);

    let entries = vault.list().unwrap();
    assert_eq!(entries.len(), 3);

    let ok: Vec<_> = entries.iter().filter_map(|e| e.as_ref().ok()).collect();
    let failed: Vec<_> = entries.iter().filter_map(|e| e.as_ref().err()).collect();
    assert_eq!(ok.len(), 2);
    assert_eq!(failed.len(), 1);

    let failure = failed[0];
    assert_eq!(failure.name.as_deref(), Some("foreign.net"));
    assert_eq!(failure.path, path.join("foreign.net").join("mallory.cred"));
    assert!(matches!(failure.source, CredVaultError::DecryptionFailed(_)));
}

#[test]
fn list_reports_malformed_entry_without_name() {
    let (_dir, path, vault) = new_vault();
    vault.add(&some_credential("example.com")).unwrap();
    fs::create_dir_all(path.join("broken.org")).unwrap();
    fs::write(path.join("broken.org").join("x.cred"), "login = \"x\"\n").unwrap();

    let entries = vault.list().unwrap();
    assert_eq!(entries.len(), 2);

    let failure = entries.iter().find_map(|e| e.as_ref().err()).unwrap();
    assert_eq!(failure.name, None);
    assert!(matches!(failure.source, CredVaultError::MalformedCredential(_)));
}

#[test]
fn search_reports_malformed_entry() {
    let (_dir, path, vault) = new_vault();
    vault.add(&some_credential("github.com")).unwrap();
    fs::create_dir_all(path.join("gitlab.com")).unwrap();
    fs::write(path.join("gitlab.com").join("b.cred"), "garbage").unwrap();

    let hits = vault.search("git").unwrap();
    assert_eq!(hits.len(), 2);

    let failure = hits.iter().find_map(|e| e.as_ref().err()).unwrap();
    assert_eq!(failure.name, None);
    assert_eq!(failure.path, path.join("gitlab.com").join("b.cred"));
    assert!(matches!(failure.source, CredVaultError::MalformedCredential(_)));

    // A record without a readable name cannot be ruled out by the needle.
    assert_eq!(vault.search("nothing like it").unwrap().len(), 1);
}

#[test]
fn search_reports_undecryptable_match() {
    let (_dir, path, vault) = new_vault();
    vault.add(&some_credential("example.com")).unwrap();
    plant_foreign_record(&path);

    let hits = vault.search("foreign").unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].is_err());

    let hits = vault.search("example").unwrap();
    assert_eq!(names(&hits), vec!["example.com"]);
}

#[test]
fn get_propagates_decryption_failure() {
    let (_dir, path, vault) = new_vault();
    plant_foreign_record(&path);

    assert!(matches!(
        vault.get("foreign.net", None),
        Err(CredVaultError::DecryptionFailed(_))
    ));
}
