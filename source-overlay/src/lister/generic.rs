//! Recursive directory scan.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::FileLister;
use crate::error::{EnvironmentFailure, OverlayResult};

/// Lists files by walking the directory tree.
///
/// Symbolic links are reported but not followed. Entries that disappear
/// mid-walk are skipped; anything else that cannot be read is an error.
#[derive(Debug, Clone, Default)]
pub struct GenericLister;

impl GenericLister {
    /// Create a new generic lister.
    pub fn new() -> Self {
        Self
    }
}

impl FileLister for GenericLister {
    fn list(&self, root: &Path, suffix: &str) -> OverlayResult<Vec<PathBuf>> {
        let root = std::path::absolute(root).map_err(|_| {
            EnvironmentFailure::SourceDirectoryNotFound {
                path: root.to_path_buf(),
            }
        })?;

        if let Err(e) = std::fs::metadata(&root) {
            tracing::debug!(root = %root.display(), error = %e, "Cannot list root");
            return Err(EnvironmentFailure::SourceDirectoryNotFound { path: root });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => match EnvironmentFailure::from_walk_error(&root, e) {
                    Some(failure) => return Err(failure),
                    None => continue,
                },
            };

            if entry.file_type().is_dir() {
                continue;
            }

            if entry.file_name().to_string_lossy().ends_with(suffix) {
                files.push(entry.into_path());
            }
        }

        Ok(files)
    }
}
