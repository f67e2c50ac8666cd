//! Access to the /proc tree
//!
//! Every read made by this crate goes through [`ProcSource`], so the parsers
//! never touch the filesystem directly. [`ProcRoot`] is the real implementation;
//! tests point it at a fixture directory instead of the live kernel.

use crate::error::{ProcError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default mount point of procfs
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Read-only view of a /proc tree. Paths are relative to the root, e.g. `net/tcp`
/// or `1234/fd`.
pub trait ProcSource {
    /// Read the whole file into a string
    fn read_to_string(&self, path: &str) -> Result<String>;

    /// Entry names of a directory, in the order the directory yields them
    fn list_dir(&self, path: &str) -> Result<Vec<String>>;

    /// Target of a symbolic link, as text
    fn read_link(&self, path: &str) -> Result<String>;
}

/// A procfs tree rooted at a directory on disk
#[derive(Debug, Clone)]
pub struct ProcRoot {
    root: PathBuf,
}

impl ProcRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl Default for ProcRoot {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl ProcSource for ProcRoot {
    fn read_to_string(&self, path: &str) -> Result<String> {
        let full = self.resolve(path);
        fs::read_to_string(&full).map_err(|e| ProcError::io(full, e))
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let full = self.resolve(path);
        let mut names = Vec::new();
        for entry in fs::read_dir(&full).map_err(|e| ProcError::io(&full, e))? {
            let entry = entry.map_err(|e| ProcError::io(&full, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn read_link(&self, path: &str) -> Result<String> {
        let full = self.resolve(path);
        let target = fs::read_link(&full).map_err(|e| ProcError::io(&full, e))?;
        Ok(target.to_string_lossy().into_owned())
    }
}

/// The live procfs mount; other platforms have no /proc to read
pub fn live_root() -> Result<ProcRoot> {
    #[cfg(target_os = "linux")]
    return Ok(ProcRoot::default());

    #[cfg(not(target_os = "linux"))]
    Err(ProcError::NotSupported(
        "/proc is only available on Linux".to_string(),
    ))
}
