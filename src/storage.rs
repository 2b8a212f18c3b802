//! Atomic file writes shared by the keyring and the vault.
//!
//! Content is written to a temp file in the target's own directory,
//! flushed to disk, then moved over the final name, so readers only ever
//! see a missing file or a complete one. Temp files are dot-prefixed and
//! created owner-only (`0600` on Unix).

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Write `contents` to `path`, failing with `AlreadyExists` if `path` is
/// already present. The final move never clobbers an existing file.
pub(crate) fn write_new(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = stage(path, contents)?;
    tmp.persist_noclobber(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write `contents` to `path`, atomically replacing whatever is there.
pub(crate) fn replace(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = stage(path, contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn stage(path: &Path, contents: &[u8]) -> io::Result<NamedTempFile> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(parent)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Remove `dir` if it exists and has no entries left.
///
/// Returns whether the directory was removed.
pub(crate) fn remove_dir_if_empty(dir: &Path) -> io::Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Ok(false);
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }
    fs::remove_dir(dir)?;
    Ok(true)
}
