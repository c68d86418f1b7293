//! Error types surfaced by the overlay core.
//!
//! Only environment problems ever leave the core: a listing tool that is
//! missing or misbehaves, a source directory that cannot be located or read,
//! or a lock that cannot be taken. Everything else (vanished files, existing links,
//! best-effort clears) is absorbed where it happens.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::lock::LockError;

/// Result type for operations that can fail on the environment.
pub type OverlayResult<T> = Result<T, EnvironmentFailure>;

/// An unexpected failure of the surrounding environment.
///
/// Callers are expected to report the message to the user and abort the
/// current operation.
#[derive(Debug, Error)]
pub enum EnvironmentFailure {
    /// An external listing tool is not installed.
    #[error("{tool} executable not found")]
    ToolNotFound { tool: String },

    /// An external listing tool exited with a status we do not understand.
    #[error("unexpected return code {code} from call to `{tool}`")]
    UnexpectedExitCode { tool: String, code: i32 },

    /// An external listing tool could not be run or was killed.
    #[error("failed to run `{tool}`: {source}")]
    ToolFailed {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// A requested source directory could not be scanned.
    #[error(
        "unable to locate source directory {}; ensure that your project is built and re-run",
        path.display()
    )]
    SourceDirectoryNotFound { path: PathBuf },

    /// Part of a source directory could not be scanned.
    #[error("unable to scan source directory {}: {source}", path.display())]
    SourceDirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The overlay lock could not be acquired.
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl EnvironmentFailure {
    /// Create a [`EnvironmentFailure::ToolNotFound`] for the given tool.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Map a walk error under `root` to a failure.
    ///
    /// Returns `None` for entries that vanished mid-walk, which callers skip.
    pub(crate) fn from_walk_error(root: &Path, error: walkdir::Error) -> Option<Self> {
        let path = error.path().unwrap_or(root).to_path_buf();
        let source = io::Error::from(error);
        if source.kind() == io::ErrorKind::NotFound {
            return None;
        }
        Some(Self::SourceDirectoryUnreadable { path, source })
    }
}
