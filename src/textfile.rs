//! Plain-text state files
//!
//! Both the operator credential file and the membership ledger are small,
//! hand-editable text files. Rewrites go through a temp file in the same
//! directory followed by a rename, so a concurrent reader sees either the old
//! or the new contents and never a torn write.

use crate::error::{PanelError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Read a file, returning `None` when it does not exist
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PanelError::read(path, e)),
    }
}

/// Replace `path` with `contents` atomically, applying `mode` on unix
pub fn write_atomic(path: &Path, contents: &str, mode: u32) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| PanelError::write(path, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PanelError::write(path, e))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| PanelError::write(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| PanelError::write(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))
            .map_err(|e| PanelError::write(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    tmp.persist(path).map_err(|e| PanelError::write(path, e.error))?;
    Ok(())
}
