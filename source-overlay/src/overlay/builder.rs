//! Materializing a [`PathMapping`] as symbolic links.
//!
//! Both operations are best-effort. Failures are collected into a report for
//! the caller to log or discard; they never abort the overall operation, as a
//! partial overlay is preferred to none.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::merge::PathMapping;

/// Top-level overlay entries starting with this prefix hold metadata and
/// survive [`OverlayBuilder::clear`].
pub const RESERVED_PREFIX: &str = ".pyre";

/// Outcome of clearing an overlay root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// Number of top-level entries removed.
    pub removed: usize,
    /// Entries that could not be removed.
    pub failed: Vec<PathBuf>,
}

/// Outcome of building links for a mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Links created on first attempt.
    pub created: usize,
    /// Links created after removing an existing entry at the link path.
    pub replaced: usize,
    /// Relative paths for which no link could be created.
    pub failed: Vec<PathBuf>,
}

impl BuildReport {
    /// Total links written.
    pub fn linked(&self) -> usize {
        self.created + self.replaced
    }

    /// Whether every mapped file got a link.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Writes and clears overlay content.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayBuilder;

impl OverlayBuilder {
    /// Whether a top-level entry name is reserved metadata.
    pub fn is_reserved(name: &str) -> bool {
        name.starts_with(RESERVED_PREFIX)
    }

    /// Remove every entry directly under `root` except reserved metadata.
    ///
    /// Files, links and whole directory trees are removed alike. A missing
    /// root clears nothing.
    pub fn clear(root: &Path) -> ClearReport {
        let mut report = ClearReport::default();

        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(root = %root.display(), error = %e, "Nothing to clear");
                return report;
            }
        };

        for entry in entries.flatten() {
            if Self::is_reserved(&entry.file_name().to_string_lossy()) {
                continue;
            }

            let path = entry.path();
            match remove_if_exists(&path) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to clear overlay entry");
                    report.failed.push(path);
                }
            }
        }

        report
    }

    /// Create `root/relative -> absolute` for every entry in `mapping`.
    ///
    /// Parent directories are created as needed. An existing entry at a link
    /// path is removed and the link retried once; any other failure is logged
    /// and the entry skipped.
    pub fn build(root: &Path, mapping: &PathMapping) -> BuildReport {
        let mut report = BuildReport::default();

        for (relative, absolute) in mapping {
            let link = root.join(relative);

            if let Some(parent) = link.parent() {
                // An existing directory is fine; anything else shows up below
                // as a failed link.
                let _ = fs::create_dir_all(parent);
            }

            match create_link(absolute, &link) {
                Ok(LinkOutcome::Created) => report.created += 1,
                Ok(LinkOutcome::Replaced) => report.replaced += 1,
                Err(e) => {
                    tracing::error!(
                        source = %absolute.display(),
                        target = %link.display(),
                        error = %e,
                        "Failed to create overlay link"
                    );
                    report.failed.push(relative.clone());
                }
            }
        }

        report
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkOutcome {
    Created,
    Replaced,
}

fn create_link(original: &Path, link: &Path) -> io::Result<LinkOutcome> {
    match symlink(original, link) {
        Ok(()) => Ok(LinkOutcome::Created),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            fs::remove_file(link)?;
            symlink(original, link)?;
            Ok(LinkOutcome::Replaced)
        }
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

/// Remove a file, link or directory tree. A path that is already gone counts
/// as removed.
fn remove_if_exists(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::manifest::SourceDirectorySet;
    use crate::merge::PathMerger;
    use std::os::unix::fs::symlink as unix_symlink;
    use tempfile::TempDir;

    fn mapping_for(source: &Path) -> PathMapping {
        let set: SourceDirectorySet = [source.to_path_buf()].into_iter().collect();
        PathMerger::default().merge(&set).unwrap()
    }

    #[test]
    fn test_clear_keeps_reserved_entries() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join(".pyre.lock"), "").unwrap();
        fs::write(root.path().join(".pyre.source_directories"), "[]").unwrap();
        fs::write(root.path().join("stale.py"), "").unwrap();
        fs::create_dir_all(root.path().join("pkg/nested")).unwrap();
        fs::write(root.path().join("pkg/nested/mod.py"), "").unwrap();
        unix_symlink("/nonexistent/target.py", root.path().join("dangling.py")).unwrap();

        let report = OverlayBuilder::clear(root.path());

        assert_eq!(report.removed, 3);
        assert!(report.failed.is_empty());
        let mut remaining: Vec<_> = fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec![".pyre.lock", ".pyre.source_directories"]);
    }

    #[test]
    fn test_clear_missing_root_is_noop() {
        let temp = TempDir::new().unwrap();

        let report = OverlayBuilder::clear(&temp.path().join("missing"));

        assert_eq!(report, ClearReport::default());
    }

    #[test]
    fn test_clear_does_not_follow_directory_links() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("keep.py"), "keep").unwrap();
        unix_symlink(outside.path(), root.path().join("linked_dir")).unwrap();

        OverlayBuilder::clear(root.path());

        assert!(!root.path().join("linked_dir").exists());
        assert!(outside.path().join("keep.py").exists());
    }

    #[test]
    fn test_build_creates_nested_links() {
        let source = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("pkg/sub")).unwrap();
        fs::write(source.path().join("pkg/sub/mod.py"), "x").unwrap();
        fs::write(source.path().join("top.pyi"), "y").unwrap();

        let mapping = mapping_for(source.path());
        let report = OverlayBuilder::build(root.path(), &mapping);

        assert_eq!(report.created, 2);
        assert!(report.is_complete());
        let link = root.path().join("pkg/sub/mod.py");
        assert!(link.is_symlink());
        assert_eq!(
            fs::read_link(&link).unwrap(),
            source.path().join("pkg/sub/mod.py").canonicalize().unwrap()
        );
        assert!(root.path().join("pkg/sub").is_dir());
        assert!(!root.path().join("pkg/sub").is_symlink());
    }

    #[test]
    fn test_build_replaces_existing_entry() {
        let source = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        fs::write(source.path().join("a.py"), "new").unwrap();
        fs::write(root.path().join("a.py"), "old regular file").unwrap();

        let report = OverlayBuilder::build(root.path(), &mapping_for(source.path()));

        assert_eq!(report.replaced, 1);
        assert_eq!(report.linked(), 1);
        assert_eq!(fs::read_to_string(root.path().join("a.py")).unwrap(), "new");
    }

    #[test]
    fn test_build_skips_unlinkable_entries() {
        let source = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        fs::write(source.path().join("ok.py"), "ok").unwrap();
        fs::create_dir_all(source.path().join("blocked")).unwrap();
        fs::write(source.path().join("blocked/mod.py"), "m").unwrap();
        // A regular file where a parent directory must go.
        fs::write(root.path().join("blocked"), "in the way").unwrap();

        let report = OverlayBuilder::build(root.path(), &mapping_for(source.path()));

        assert_eq!(report.created, 1);
        assert_eq!(report.failed, vec![PathBuf::from("blocked/mod.py")]);
        assert!(root.path().join("ok.py").is_symlink());
    }

    #[test]
    fn test_is_reserved() {
        assert!(OverlayBuilder::is_reserved(".pyre.lock"));
        assert!(OverlayBuilder::is_reserved(".pyre.source_directories"));
        assert!(!OverlayBuilder::is_reserved("pyre.py"));
        assert!(!OverlayBuilder::is_reserved(".hidden.py"));
    }
}
