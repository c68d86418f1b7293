//! Tracked-file listing through Mercurial.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::FileLister;
use crate::error::{EnvironmentFailure, OverlayResult};

/// Default Mercurial executable, resolved through `PATH`.
const DEFAULT_EXECUTABLE: &str = "hg";

/// `hg files` exits with this code when nothing matched.
const NO_MATCHES_EXIT_CODE: i32 = 1;

/// Lists tracked files with `hg files --include '**<suffix>'`.
#[derive(Debug, Clone)]
pub struct MercurialLister {
    executable: PathBuf,
}

impl Default for MercurialLister {
    fn default() -> Self {
        Self::new()
    }
}

impl MercurialLister {
    /// Use `hg` from `PATH`.
    pub fn new() -> Self {
        Self::with_executable(DEFAULT_EXECUTABLE)
    }

    /// Use a specific Mercurial executable.
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// The executable this lister invokes.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Whether `directory` is inside a Mercurial working copy.
    ///
    /// Any failure to run `hg status` successfully, including a missing
    /// executable, counts as "not a repository".
    pub fn is_repository(&self, directory: &Path) -> bool {
        Command::new(&self.executable)
            .arg("status")
            .current_dir(directory)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl FileLister for MercurialLister {
    fn list(&self, root: &Path, suffix: &str) -> OverlayResult<Vec<PathBuf>> {
        let root = std::path::absolute(root).map_err(|_| {
            EnvironmentFailure::SourceDirectoryNotFound {
                path: root.to_path_buf(),
            }
        })?;

        let output = Command::new(&self.executable)
            .args(["files", "--include"])
            .arg(format!("**{}", suffix))
            .current_dir(&root)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => EnvironmentFailure::tool_not_found("hg"),
                _ => EnvironmentFailure::ToolFailed {
                    tool: "hg files".to_string(),
                    source: e,
                },
            })?;

        match output.status.code() {
            Some(0) => {}
            Some(NO_MATCHES_EXIT_CODE) => {
                tracing::trace!(root = %root.display(), suffix, "hg files found no matches");
                return Ok(Vec::new());
            }
            code => {
                return Err(EnvironmentFailure::UnexpectedExitCode {
                    tool: "hg files".to_string(),
                    code: code.unwrap_or(-1),
                })
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| root.join(line))
            .collect())
    }
}
