// # Atomic file replacement
//
// Every file the engine owns (the hosts file, the history ledger) is replaced
// as a whole: the new bytes go to a temporary file in the same directory, are
// flushed to disk, and the temporary file is renamed over the target. Readers
// see either the old content or the new content, never a mix.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::trace;

use crate::error::{Error, Result};

/// Directory that holds `path`, `.` for bare file names
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Create `dir` (and its parents) if missing
pub fn ensure_dir(dir: &Path, operation: &str) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| Error::io(operation, dir, e))
}

/// Write `bytes` to a synced temporary file next to `target`
pub(crate) fn staged_copy(target: &Path, bytes: &[u8], operation: &str) -> Result<NamedTempFile> {
    let dir = parent_dir(target);
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| Error::io(operation, dir, e))?;
    temp.write_all(bytes)
        .map_err(|e| Error::io(operation, temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::io(operation, temp.path(), e))?;
    Ok(temp)
}

/// Replace `target` with `bytes`, all or nothing
///
/// The permissions of an existing target are carried over to the new file.
/// On failure the target is left untouched and the temporary file removed.
pub fn replace_file(target: &Path, bytes: &[u8], operation: &str) -> Result<()> {
    let temp = staged_copy(target, bytes, operation)?;

    if let Ok(metadata) = fs::metadata(target) {
        temp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(|e| Error::io(operation, temp.path(), e))?;
    }

    temp.persist(target)
        .map_err(|e| Error::io(operation, target, e.error))?;

    trace!("Replaced {} ({} bytes)", target.display(), bytes.len());
    Ok(())
}
