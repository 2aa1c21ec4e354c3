use crate::error::{Result, SplitterError};
use std::{
    env,
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

/// Puts `dir` in front of a `PATH`-style list unless it is already there.
///
/// Repeated calls with the same directory return the same value, so the list
/// never grows past one copy of it.
pub fn prepend_search_dir(current: Option<&OsStr>, dir: &Path) -> Result<OsString> {
    let mut entries: Vec<PathBuf> = current
        .map(|c| env::split_paths(c).collect())
        .unwrap_or_default();

    if !entries.iter().any(|e| e == dir) {
        entries.insert(0, dir.to_path_buf());
    }

    env::join_paths(entries).map_err(|e| {
        SplitterError::Provisioning(format!(
            "cannot add {} to the search path: {e}",
            dir.display()
        ))
    })
}

/// The current process `PATH` with `dir` in front, for handing to a child process.
pub fn search_path_with(dir: &Path) -> Result<OsString> {
    prepend_search_dir(env::var_os("PATH").as_deref(), dir)
}
