//! CLI error type.

use std::fmt;
use std::io;

use source_overlay::{ConfigError, EnvironmentFailure};

/// Errors reported to the user by the CLI.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config(ConfigError),

    /// The environment prevented the operation.
    Environment(EnvironmentFailure),

    /// A local I/O operation failed.
    Io { context: String, source: io::Error },

    /// The command line was inconsistent.
    Usage(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => 2,
            CliError::Config(_) => 3,
            CliError::Environment(_) => 4,
            CliError::Io { .. } => 5,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Environment(e) => write!(f, "Environment error: {}", e),
            CliError::Io { context, source } => write!(f, "{}: {}", context, source),
            CliError::Usage(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Environment(e) => Some(e),
            CliError::Io { source, .. } => Some(source),
            CliError::Usage(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<EnvironmentFailure> for CliError {
    fn from(e: EnvironmentFailure) -> Self {
        CliError::Environment(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_error_display() {
        let err: CliError = EnvironmentFailure::tool_not_found("hg").into();
        assert_eq!(err.to_string(), "Environment error: hg executable not found");
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_usage_error_exit_code() {
        let err = CliError::Usage("no source directories given".to_string());
        assert_eq!(err.exit_code(), 2);
        assert!(std::error::Error::source(&err).is_none());
    }
}
