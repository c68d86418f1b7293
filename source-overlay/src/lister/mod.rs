//! Pluggable file discovery.
//!
//! A [`FileLister`] answers "which files under this root end in this suffix".
//! Two strategies exist:
//!
//! - [`GenericLister`]: walks the directory tree.
//! - [`MercurialLister`]: asks Mercurial for tracked files, which is much
//!   faster on large repositories and respects ignore rules.
//!
//! # Selection
//!
//! ```text
//! lister() ──first call──► detect(cwd) ──`hg status` ok──► Lister::Mercurial
//!    │                          └─────────otherwise─────► Lister::Generic
//!    └──later calls──► cached &'static Lister
//! ```
//!
//! The probe runs once per process; every later caller reuses the same
//! strategy value.

mod generic;
mod mercurial;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::OverlayResult;

pub use generic::GenericLister;
pub use mercurial::MercurialLister;

/// Lists files under a root whose names end in a suffix.
pub trait FileLister {
    /// Return absolute paths of files under `root` whose name ends in `suffix`.
    fn list(&self, root: &Path, suffix: &str) -> OverlayResult<Vec<PathBuf>>;
}

/// The listing strategy chosen for this process.
#[derive(Debug, Clone)]
pub enum Lister {
    /// Plain recursive directory scan.
    Generic(GenericLister),
    /// Tracked-file listing through Mercurial.
    Mercurial(MercurialLister),
}

impl Lister {
    /// Probe `directory` and choose a strategy.
    ///
    /// Mercurial is chosen when `hg status` succeeds there.
    pub fn detect(directory: &Path) -> Self {
        Self::detect_with(MercurialLister::new(), directory)
    }

    /// Probe `directory` using a specific Mercurial executable.
    pub fn detect_with(mercurial: MercurialLister, directory: &Path) -> Self {
        if mercurial.is_repository(directory) {
            tracing::debug!(directory = %directory.display(), "Using Mercurial file listing");
            Lister::Mercurial(mercurial)
        } else {
            tracing::debug!(directory = %directory.display(), "Using generic file listing");
            Lister::Generic(GenericLister::new())
        }
    }

    /// Short name of the strategy, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Lister::Generic(_) => "generic",
            Lister::Mercurial(_) => "mercurial",
        }
    }
}

impl FileLister for Lister {
    fn list(&self, root: &Path, suffix: &str) -> OverlayResult<Vec<PathBuf>> {
        match self {
            Lister::Generic(lister) => lister.list(root, suffix),
            Lister::Mercurial(lister) => lister.list(root, suffix),
        }
    }
}

/// The process-wide listing strategy.
///
/// Detection probes the current directory on first use. If the current
/// directory cannot be determined the generic strategy is used.
pub fn lister() -> &'static Lister {
    static LISTER: OnceLock<Lister> = OnceLock::new();
    LISTER.get_or_init(|| match std::env::current_dir() {
        Ok(cwd) => Lister::detect(&cwd),
        Err(e) => {
            tracing::debug!(error = %e, "Cannot determine current directory");
            Lister::Generic(GenericLister::new())
        }
    })
}
