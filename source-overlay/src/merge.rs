//! Merging several source trees into one relative-path mapping.
//!
//! # Precedence Rules
//!
//! Source directories are processed in [`SourceDirectorySet`] order
//! (lexicographic by path). For each relative path:
//!
//! 1. The first directory that provides an acceptable file wins.
//! 2. A file is acceptable when its fully resolved location is a regular
//!    file that still exists.
//! 3. An *empty* package initializer (`__init__.py`, `__init__.pyi`) is never
//!    acceptable, so it cannot shadow a non-empty initializer from another
//!    tree no matter which tree is processed first.
//!
//! ```text
//! a/pkg/__init__.py   (0 bytes)  ──skipped──┐
//! a/pkg/mod.py                   ──────────►│ pkg/__init__.py -> b/pkg/__init__.py
//! b/pkg/__init__.py   (10 bytes) ──────────►│ pkg/mod.py      -> a/pkg/mod.py
//! b/pkg/other.py                 ──────────►│ pkg/other.py    -> b/pkg/other.py
//! ```

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use walkdir::WalkDir;

use crate::error::{EnvironmentFailure, OverlayResult};
use crate::manifest::SourceDirectorySet;

/// Suffixes of source and stub files merged by default.
pub const DEFAULT_SOURCE_SUFFIXES: &[&str] = &[".py", ".pyi"];

/// File stem of package initializer files.
pub const DEFAULT_INITIALIZER_STEM: &str = "__init__";

/// Final mapping from overlay-relative path to the real file it stands for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMapping {
    entries: BTreeMap<PathBuf, PathBuf>,
}

impl PathMapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Real path for a relative path, if mapped.
    pub fn get(&self, relative: &Path) -> Option<&Path> {
        self.entries.get(relative).map(PathBuf::as_path)
    }

    /// Whether `relative` is mapped.
    pub fn contains(&self, relative: &Path) -> bool {
        self.entries.contains_key(relative)
    }

    /// Number of mapped files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(relative, absolute)` pairs in relative-path order.
    pub fn iter(&self) -> btree_map::Iter<'_, PathBuf, PathBuf> {
        self.entries.iter()
    }

    fn insert(&mut self, relative: PathBuf, absolute: PathBuf) {
        self.entries.insert(relative, absolute);
    }
}

impl<'a> IntoIterator for &'a PathMapping {
    type Item = (&'a PathBuf, &'a PathBuf);
    type IntoIter = btree_map::Iter<'a, PathBuf, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Computes a [`PathMapping`] for a set of source directories.
#[derive(Debug, Clone)]
pub struct PathMerger {
    suffixes: Vec<String>,
    initializer_stem: String,
}

impl Default for PathMerger {
    fn default() -> Self {
        Self::new(
            DEFAULT_SOURCE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_INITIALIZER_STEM,
        )
    }
}

impl PathMerger {
    /// Create a merger recognizing `suffixes`, with `initializer_stem` naming
    /// package initializer files.
    pub fn new(suffixes: Vec<String>, initializer_stem: impl Into<String>) -> Self {
        Self {
            suffixes,
            initializer_stem: initializer_stem.into(),
        }
    }

    /// Recognized file name suffixes.
    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Merge every directory in `source_directories`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentFailure::SourceDirectoryNotFound`] if a directory
    /// does not exist, or [`EnvironmentFailure::SourceDirectoryUnreadable`]
    /// if part of one cannot be read.
    pub fn merge(&self, source_directories: &SourceDirectorySet) -> OverlayResult<PathMapping> {
        let start = Instant::now();
        let mut mapping = PathMapping::new();

        for source_directory in source_directories {
            self.merge_source_directory(source_directory, &mut mapping)?;
        }

        tracing::debug!(
            directories = source_directories.len(),
            files = mapping.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Merged source directories"
        );

        Ok(mapping)
    }

    /// Add the files of one source directory to `mapping`.
    ///
    /// Relative paths already present in `mapping` are left untouched.
    pub fn merge_source_directory(
        &self,
        source_directory: &Path,
        mapping: &mut PathMapping,
    ) -> OverlayResult<()> {
        for path in self.find_source_files(source_directory)? {
            let relative = match path.strip_prefix(source_directory) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };

            // Don't bother resolving paths that are already claimed.
            if mapping.contains(&relative) {
                tracing::trace!(file = %relative.display(), "Already merged from another directory");
                continue;
            }

            let absolute = match resolve_regular_file(&path) {
                Ok(Some(absolute)) => absolute,
                Ok(None) => continue,
                Err(e) => {
                    tracing::trace!(path = %path.display(), error = %e, "Skipping unresolvable file");
                    continue;
                }
            };

            if self.is_initializer(&relative) && is_empty(&absolute) {
                tracing::trace!(
                    file = %relative.display(),
                    directory = %source_directory.display(),
                    "Skipping empty initializer"
                );
                continue;
            }

            mapping.insert(relative, absolute);
        }

        Ok(())
    }

    /// Find candidate files under `root`: regular files or symbolic links
    /// whose name ends in a recognized suffix.
    ///
    /// Entries that vanish mid-walk are skipped. Any other unreadable part
    /// of the tree fails the scan, since the overlay would silently miss it.
    pub fn find_source_files(&self, root: &Path) -> OverlayResult<Vec<PathBuf>> {
        if let Err(e) = std::fs::symlink_metadata(root) {
            tracing::debug!(root = %root.display(), error = %e, "Cannot scan source directory");
            return Err(EnvironmentFailure::SourceDirectoryNotFound {
                path: root.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => match EnvironmentFailure::from_walk_error(root, e) {
                    Some(failure) => return Err(failure),
                    None => continue,
                },
            };

            let file_type = entry.file_type();
            if !(file_type.is_file() || file_type.is_symlink()) {
                continue;
            }

            if self.has_recognized_suffix(&entry.file_name().to_string_lossy()) {
                files.push(entry.into_path());
            }
        }

        Ok(files)
    }

    fn has_recognized_suffix(&self, name: &str) -> bool {
        self.suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
    }

    fn is_initializer(&self, relative: &Path) -> bool {
        let Some(name) = relative.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        self.suffixes.iter().any(|suffix| {
            name.strip_suffix(suffix.as_str()) == Some(self.initializer_stem.as_str())
        })
    }
}

/// Resolve `path` to its canonical location.
///
/// Returns `Ok(None)` if the path vanished or does not resolve to a regular
/// file (for example a symlinked directory).
fn resolve_regular_file(path: &Path) -> io::Result<Option<PathBuf>> {
    let absolute = match path.canonicalize() {
        Ok(absolute) => absolute,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    match std::fs::metadata(&absolute) {
        Ok(metadata) if metadata.is_file() => Ok(Some(absolute)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_empty(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.len() == 0)
        .unwrap_or(false)
}
