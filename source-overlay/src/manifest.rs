//! Manifest caching for overlay roots.
//!
//! Rebuilding an overlay means scanning every source tree and recreating
//! every link, so the set of source directories that was last merged into a
//! root is persisted next to it. A later request is served from the existing
//! overlay when it asks for nothing the manifest does not already cover.
//!
//! # Format
//!
//! `<root>/.pyre.source_directories` holds a JSON array of absolute directory
//! paths, written in sorted order:
//!
//! ```text
//! ["/home/me/project/src", "/home/me/project/typeshed"]
//! ```
//!
//! The manifest is trusted as-is; on-disk overlay content is never
//! re-validated against it.

use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

/// File name of the manifest inside an overlay root.
pub const MANIFEST_FILE_NAME: &str = ".pyre.source_directories";

/// A set of absolute source directory paths.
///
/// Iteration is in lexicographic path order. The merge engine walks
/// directories in this order, which makes conflict resolution between
/// non-empty files deterministic: the lexicographically first directory wins.
///
/// Relative paths are made absolute against the current directory on the way
/// in, so a stored set never depends on where it is read back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SourceDirectorySet {
    directories: BTreeSet<PathBuf>,
}

impl SourceDirectorySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from paths, making relative paths absolute against the
    /// current directory.
    ///
    /// Paths are made absolute lexically; symlinks are not resolved, so the
    /// stored paths are the ones the caller asked for.
    pub fn from_paths<I, P>(paths: I) -> io::Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut set = Self::new();
        for path in paths {
            set.directories.insert(absolutize(path.as_ref())?);
        }
        Ok(set)
    }

    /// Insert a directory, made absolute first.
    ///
    /// Returns `false` if it was already present or cannot be made absolute.
    pub fn insert(&mut self, directory: impl Into<PathBuf>) -> bool {
        let directory = directory.into();
        match absolutize(&directory) {
            Ok(absolute) => self.directories.insert(absolute),
            Err(e) => {
                tracing::debug!(path = %directory.display(), error = %e, "Dropping unresolvable directory");
                false
            }
        }
    }

    /// Whether every directory in `self` is also in `other`.
    pub fn is_subset(&self, other: &SourceDirectorySet) -> bool {
        self.directories.is_subset(&other.directories)
    }

    /// Whether the set contains `directory`.
    pub fn contains(&self, directory: &Path) -> bool {
        self.directories.contains(directory)
    }

    /// Number of directories.
    pub fn len(&self) -> usize {
        self.directories.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    /// Iterate directories in merge order.
    pub fn iter(&self) -> btree_set::Iter<'_, PathBuf> {
        self.directories.iter()
    }
}

impl<'a> IntoIterator for &'a SourceDirectorySet {
    type Item = &'a PathBuf;
    type IntoIter = btree_set::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<PathBuf> for SourceDirectorySet {
    fn from_iter<T: IntoIterator<Item = PathBuf>>(iter: T) -> Self {
        let mut set = Self::new();
        for directory in iter {
            set.insert(directory);
        }
        set
    }
}

fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        std::path::absolute(path)
    }
}

/// Reads, compares and writes the manifest of an overlay root.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestCache;

impl ManifestCache {
    /// Path of the manifest file for `root`.
    pub fn path(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILE_NAME)
    }

    /// Load the manifest for `root`.
    ///
    /// A missing, unreadable or undecodable manifest is a cache miss and
    /// yields the empty set. So is one holding a relative path.
    pub fn load(root: &Path) -> SourceDirectorySet {
        let path = Self::path(root);
        match Self::read(&path) {
            Ok(set) => set,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(
                        path = %path.display(),
                        error = %e,
                        "Ignoring unreadable manifest"
                    );
                }
                SourceDirectorySet::new()
            }
        }
    }

    fn read(path: &Path) -> io::Result<SourceDirectorySet> {
        let reader = BufReader::new(File::open(path)?);
        let directories: BTreeSet<PathBuf> = serde_json::from_reader(reader).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to decode manifest: {}", e),
            )
        })?;

        // Relative entries would resolve against the reader's directory.
        if let Some(relative) = directories.iter().find(|p| !p.is_absolute()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("relative path in manifest: {}", relative.display()),
            ));
        }

        Ok(SourceDirectorySet { directories })
    }

    /// Whether an overlay built from `cached` can serve `requested`.
    ///
    /// This is a subset test, not equality: a root that already merged more
    /// directories than requested is still current.
    pub fn is_up_to_date(requested: &SourceDirectorySet, cached: &SourceDirectorySet) -> bool {
        requested.is_subset(cached)
    }

    /// Replace the manifest for `root` with exactly `set`.
    ///
    /// The new content is written to a temporary sibling and renamed over the
    /// manifest, so readers never observe a partially written file.
    pub fn save(root: &Path, set: &SourceDirectorySet) -> io::Result<()> {
        let path = Self::path(root);
        let temp_path = path.with_extension("tmp");

        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            serde_json::to_writer(&mut writer, set).map_err(|e| {
                io::Error::other(format!("failed to encode manifest: {}", e))
            })?;
            writer.flush()?;
        }

        std::fs::rename(&temp_path, &path)
    }

    /// Remove the manifest for `root` so the overlay reads as stale.
    ///
    /// An absent manifest is already invalid.
    pub fn invalidate(root: &Path) -> io::Result<()> {
        match std::fs::remove_file(Self::path(root)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(paths: &[&str]) -> SourceDirectorySet {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_load_missing_manifest_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(ManifestCache::load(temp.path()).is_empty());
    }

    #[test]
    fn test_load_corrupt_manifest_is_empty() {
        let temp = TempDir::new().unwrap();
        std::fs::write(ManifestCache::path(temp.path()), "{not json").unwrap();

        assert!(ManifestCache::load(temp.path()).is_empty());
    }

    #[test]
    fn test_load_wrong_shape_is_empty() {
        let temp = TempDir::new().unwrap();
        std::fs::write(ManifestCache::path(temp.path()), r#"{"a": 1}"#).unwrap();

        assert!(ManifestCache::load(temp.path()).is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let directories = set(&["/src/b", "/src/a"]);

        ManifestCache::save(temp.path(), &directories).unwrap();

        assert_eq!(ManifestCache::load(temp.path()), directories);
        assert!(!temp.path().join(".pyre.tmp").exists());
    }

    #[test]
    fn test_save_writes_sorted_json_array() {
        let temp = TempDir::new().unwrap();
        ManifestCache::save(temp.path(), &set(&["/src/b", "/src/a"])).unwrap();

        let raw = std::fs::read_to_string(ManifestCache::path(temp.path())).unwrap();
        assert_eq!(raw, r#"["/src/a","/src/b"]"#);
    }

    #[test]
    fn test_save_replaces_instead_of_union() {
        let temp = TempDir::new().unwrap();
        ManifestCache::save(temp.path(), &set(&["/src/a", "/src/b"])).unwrap();
        ManifestCache::save(temp.path(), &set(&["/src/c"])).unwrap();

        assert_eq!(ManifestCache::load(temp.path()), set(&["/src/c"]));
    }

    #[test]
    fn test_reads_manifest_written_by_other_clients() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            ManifestCache::path(temp.path()),
            r#"["/src/z", "/src/a", "/src/z"]"#,
        )
        .unwrap();

        assert_eq!(ManifestCache::load(temp.path()), set(&["/src/a", "/src/z"]));
    }

    #[test]
    fn test_invalidate_removes_manifest() {
        let temp = TempDir::new().unwrap();
        ManifestCache::save(temp.path(), &set(&["/src/a"])).unwrap();

        ManifestCache::invalidate(temp.path()).unwrap();

        assert!(ManifestCache::load(temp.path()).is_empty());
        // Invalidating twice is fine.
        ManifestCache::invalidate(temp.path()).unwrap();
    }

    #[test]
    fn test_is_up_to_date_subset() {
        let cached = set(&["/a", "/b", "/c"]);

        assert!(ManifestCache::is_up_to_date(&set(&["/a", "/c"]), &cached));
        assert!(ManifestCache::is_up_to_date(&cached, &cached));
        assert!(ManifestCache::is_up_to_date(&set(&[]), &cached));
    }

    #[test]
    fn test_is_up_to_date_superset_is_stale() {
        let cached = set(&["/a"]);

        assert!(!ManifestCache::is_up_to_date(&set(&["/a", "/b"]), &cached));
        assert!(!ManifestCache::is_up_to_date(&set(&["/b"]), &set(&[])));
    }

    #[test]
    fn test_from_paths_makes_absolute() {
        let directories = SourceDirectorySet::from_paths(["relative/dir", "/abs/dir"]).unwrap();

        assert_eq!(directories.len(), 2);
        assert!(directories.iter().all(|p| p.is_absolute()));
        assert!(directories.contains(Path::new("/abs/dir")));
    }

    #[test]
    fn test_collect_makes_relative_paths_absolute() {
        let directories: SourceDirectorySet =
            [PathBuf::from("relative/src"), PathBuf::from("/abs/src")]
                .into_iter()
                .collect();

        assert_eq!(directories.len(), 2);
        assert!(directories.iter().all(|p| p.is_absolute()));
        assert!(directories.contains(&std::env::current_dir().unwrap().join("relative/src")));
    }

    #[test]
    fn test_insert_makes_relative_paths_absolute() {
        let mut directories = SourceDirectorySet::new();

        assert!(directories.insert("relative/src"));
        assert!(!directories.insert(std::env::current_dir().unwrap().join("relative/src")));
        assert!(directories.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn test_saved_manifest_holds_only_absolute_paths() {
        let temp = TempDir::new().unwrap();
        let directories: SourceDirectorySet = [PathBuf::from("relative/src")].into_iter().collect();

        ManifestCache::save(temp.path(), &directories).unwrap();

        let raw = std::fs::read_to_string(ManifestCache::path(temp.path())).unwrap();
        let stored: Vec<PathBuf> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_absolute());
    }

    #[test]
    fn test_load_relative_entry_is_cache_miss() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            ManifestCache::path(temp.path()),
            r#"["/src/a", "relative/src"]"#,
        )
        .unwrap();

        assert!(ManifestCache::load(temp.path()).is_empty());
    }

    #[test]
    fn test_iteration_is_sorted() {
        let directories = set(&["/z", "/m", "/a"]);
        let ordered: Vec<_> = directories.iter().cloned().collect();

        assert_eq!(
            ordered,
            vec![PathBuf::from("/a"), PathBuf::from("/m"), PathBuf::from("/z")]
        );
    }
}
