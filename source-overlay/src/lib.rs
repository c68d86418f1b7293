//! Source Overlay - one consolidated view of several source trees
//!
//! This library merges independent source directories into a single overlay
//! directory of symbolic links, so analysis tools can treat them as one
//! project without copying files. Overlays are cached between runs and
//! rebuilt only when the requested set of directories grows, with an
//! advisory lock serializing concurrent rebuilds across processes.
//!
//! # Example
//!
//! ```no_run
//! use source_overlay::{OverlayDirectory, SourceDirectorySet};
//!
//! let requested = SourceDirectorySet::from_paths(["src", "stubs"])?;
//! let overlay = OverlayDirectory::new(".pyre", false);
//! overlay.prepare(&requested)?;
//! println!("merged view at {}", overlay.root().display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod lister;
pub mod lock;
pub mod manifest;
pub mod merge;
pub mod overlay;

pub use config::{ConfigError, OverlayConfig};
pub use error::{EnvironmentFailure, OverlayResult};
pub use lister::{lister, FileLister, GenericLister, Lister, MercurialLister};
pub use lock::{acquire_lock, LockError, LockGuard, LockMode};
pub use manifest::{ManifestCache, SourceDirectorySet};
pub use merge::{PathMapping, PathMerger};
pub use overlay::{OverlayBuilder, OverlayDirectory, PrepareOutcome};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
