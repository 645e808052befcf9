//! Default download directory resolution.

use std::path::{Path, PathBuf};

use crate::error::{SyncError, SyncResult};

/// Name of the per-user data directory created under the home directory.
pub const DATA_DIR_NAME: &str = "polyglot_data";

/// System-wide locations checked, in order, before falling back to the
/// home directory.
pub const SYSTEM_DATA_DIRS: &[&str] = &[
    "/usr/share/polyglot_data",
    "/usr/local/share/polyglot_data",
    "/usr/lib/polyglot_data",
    "/usr/local/lib/polyglot_data",
];

/// The first existing, writable system location, else `<home>/polyglot_data`.
pub fn default_download_dir() -> SyncResult<PathBuf> {
    let candidates: Vec<PathBuf> = SYSTEM_DATA_DIRS.iter().map(PathBuf::from).collect();
    resolve_download_dir(&candidates, dirs::home_dir())
}

/// Pick a download directory from explicit candidates and a home directory.
pub fn resolve_download_dir(candidates: &[PathBuf], home: Option<PathBuf>) -> SyncResult<PathBuf> {
    if let Some(dir) = candidates.iter().find(|d| d.is_dir() && is_writable(d)) {
        return Ok(dir.clone());
    }
    home.map(|h| h.join(DATA_DIR_NAME)).ok_or_else(|| {
        SyncError::Configuration("could not find a default download directory".to_string())
    })
}

/// Whether the current user may create files in `path`.
#[cfg(unix)]
pub fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

/// Whether the current user may create files in `path`.
#[cfg(not(unix))]
pub fn is_writable(path: &Path) -> bool {
    path.metadata()
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
