//! The on-disk overlay: building it and keeping it current.
//!
//! # Layout
//!
//! ```text
//! <base>/shared_source_directory[_<pid>]/
//! ├── .pyre.lock                  # advisory lock, content unused
//! ├── .pyre.source_directories    # manifest: JSON array of merged directories
//! └── pkg/
//!     ├── __init__.py -> /src/b/pkg/__init__.py
//!     └── mod.py      -> /src/a/pkg/mod.py
//! ```
//!
//! Every non-reserved entry is a symbolic link to a regular file inside one
//! of the merged source directories. Directories are created, never linked.
//!
//! # Rebuild sequence
//!
//! ```text
//! prepare(requested)
//!   ├── create root
//!   ├── lock ─────────────────────────────── (blocks while another process rebuilds)
//!   ├── manifest ⊇ requested? ──yes──► UpToDate
//!   ├── invalidate manifest
//!   ├── OverlayBuilder::clear
//!   ├── PathMerger::merge
//!   ├── OverlayBuilder::build
//!   └── ManifestCache::save ──────────────► Rebuilt
//! ```

mod builder;
mod directory;

pub use builder::{BuildReport, ClearReport, OverlayBuilder, RESERVED_PREFIX};
pub use directory::{
    OverlayDirectory, PrepareOutcome, LOCK_FILE_NAME, ROOT_DIRECTORY_NAME,
};
