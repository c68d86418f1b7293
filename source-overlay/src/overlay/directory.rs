//! The shared source directory facade.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::builder::{BuildReport, ClearReport, OverlayBuilder};
use crate::error::OverlayResult;
use crate::lock::{acquire_lock, LockMode};
use crate::manifest::{ManifestCache, SourceDirectorySet};
use crate::merge::PathMerger;

/// Directory name of overlay roots under the base directory.
pub const ROOT_DIRECTORY_NAME: &str = "shared_source_directory";

/// File name of the lock inside an overlay root.
pub const LOCK_FILE_NAME: &str = ".pyre.lock";

/// What [`OverlayDirectory::prepare`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// The manifest already covered the request; nothing was written.
    UpToDate,
    /// The overlay was cleared and rebuilt.
    Rebuilt {
        /// Result of clearing old content.
        clear: ClearReport,
        /// Result of linking the new mapping.
        build: BuildReport,
    },
}

impl PrepareOutcome {
    /// Whether a rebuild happened.
    pub fn is_rebuilt(&self) -> bool {
        matches!(self, PrepareOutcome::Rebuilt { .. })
    }
}

/// A merged view of several source directories on disk.
///
/// The view lives at [`root`](Self::root) and is shared between processes
/// unless isolation is enabled, in which case every process gets its own
/// root that [`cleanup`](Self::cleanup) removes again.
#[derive(Debug, Clone)]
pub struct OverlayDirectory {
    base: PathBuf,
    isolate: bool,
    merger: PathMerger,
}

impl OverlayDirectory {
    /// Create an overlay under `base` using the default merger.
    pub fn new(base: impl Into<PathBuf>, isolate: bool) -> Self {
        Self {
            base: base.into(),
            isolate,
            merger: PathMerger::default(),
        }
    }

    /// Use a specific merger.
    pub fn with_merger(mut self, merger: PathMerger) -> Self {
        self.merger = merger;
        self
    }

    /// Whether this overlay uses a per-process root.
    pub fn is_isolated(&self) -> bool {
        self.isolate
    }

    /// `<base>/shared_source_directory`, suffixed with `_<pid>` when isolated.
    pub fn root(&self) -> PathBuf {
        let name = if self.isolate {
            format!("{}_{}", ROOT_DIRECTORY_NAME, std::process::id())
        } else {
            ROOT_DIRECTORY_NAME.to_string()
        };
        self.base.join(name)
    }

    /// Path of the lock file guarding this overlay.
    pub fn lock_path(&self) -> PathBuf {
        self.root().join(LOCK_FILE_NAME)
    }

    /// Make the overlay reflect `requested`.
    ///
    /// Under the overlay lock: if the manifest already covers `requested`
    /// nothing happens; otherwise the root is cleared, the directories are
    /// merged and linked, and the manifest is replaced with `requested`.
    ///
    /// The manifest is dropped before clearing and written only after every
    /// link exists, so an interrupted rebuild always reads as stale.
    ///
    /// # Errors
    ///
    /// Returns an [`EnvironmentFailure`](crate::EnvironmentFailure) if the lock
    /// cannot be taken or a source directory cannot be scanned.
    pub fn prepare(&self, requested: &SourceDirectorySet) -> OverlayResult<PrepareOutcome> {
        let start = Instant::now();
        let root = self.root();
        tracing::info!(root = %root.display(), "Constructing shared directory");

        if let Err(e) = fs::create_dir_all(&root) {
            // Lock acquisition degrades if the root really is missing.
            tracing::debug!(root = %root.display(), error = %e, "Failed to create overlay root");
        }

        let _lock = acquire_lock(&root.join(LOCK_FILE_NAME), LockMode::Blocking)?;

        let cached = ManifestCache::load(&root);
        if ManifestCache::is_up_to_date(requested, &cached) {
            tracing::info!(root = %root.display(), "Shared source directory is up to date");
            return Ok(PrepareOutcome::UpToDate);
        }

        tracing::info!(
            root = %root.display(),
            requested = requested.len(),
            cached = cached.len(),
            "Shared source directory is stale, updating"
        );

        if let Err(e) = ManifestCache::invalidate(&root) {
            tracing::warn!(root = %root.display(), error = %e, "Failed to invalidate manifest");
        }

        let clear = OverlayBuilder::clear(&root);
        let mapping = self.merger.merge(requested)?;
        let build = OverlayBuilder::build(&root, &mapping);

        if let Err(e) = ManifestCache::save(&root, requested) {
            // The overlay is complete; the next call rebuilds it again.
            tracing::warn!(root = %root.display(), error = %e, "Failed to write manifest");
        }

        tracing::info!(
            root = %root.display(),
            files = build.linked(),
            failed = build.failed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Merged source directories"
        );

        Ok(PrepareOutcome::Rebuilt { clear, build })
    }

    /// Remove an isolated root.
    ///
    /// Returns `Ok(false)` without touching anything when not isolated.
    pub fn try_cleanup(&self) -> io::Result<bool> {
        if !self.isolate {
            return Ok(false);
        }
        remove_tree(&self.root())?;
        Ok(true)
    }

    /// Best-effort [`try_cleanup`](Self::try_cleanup); failures are logged
    /// and otherwise ignored.
    pub fn cleanup(&self) {
        if let Err(e) = self.try_cleanup() {
            tracing::debug!(root = %self.root().display(), error = %e, "Ignoring cleanup failure");
        }
    }
}

fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
