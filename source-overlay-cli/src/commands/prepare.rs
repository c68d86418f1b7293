//! `prepare`: build the overlay and optionally run a command against it.

use std::path::PathBuf;
use std::process::{Command, ExitCode};

use clap::Args;
use source_overlay::{OverlayConfig, PrepareOutcome, SourceDirectorySet};

use crate::error::CliError;

/// Environment variable carrying the overlay root to a child command.
pub const OVERLAY_ROOT_ENV: &str = "SOURCE_OVERLAY_ROOT";

#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Source directories to merge (default: from configuration)
    #[arg(value_name = "DIR")]
    directories: Vec<PathBuf>,

    /// Use a per-process overlay removed after the command finishes
    #[arg(long)]
    isolate: bool,

    /// Command to run with the overlay root in SOURCE_OVERLAY_ROOT
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

pub fn run(args: PrepareArgs, config: OverlayConfig) -> Result<ExitCode, CliError> {
    let config = if args.isolate {
        config.with_isolate(true)
    } else {
        config
    };

    let directories = if args.directories.is_empty() {
        config.source_directories.clone()
    } else {
        args.directories
    };
    if directories.is_empty() {
        return Err(CliError::Usage(
            "no source directories given on the command line or in configuration".to_string(),
        ));
    }
    if config.isolate && args.command.is_empty() {
        return Err(CliError::Usage(
            "an isolated overlay is removed on exit; pass a command after `--`".to_string(),
        ));
    }

    let requested = SourceDirectorySet::from_paths(&directories).map_err(|e| CliError::Io {
        context: "failed to resolve source directories".to_string(),
        source: e,
    })?;

    let overlay = config.overlay_directory();
    let outcome = overlay.prepare(&requested);

    let result = outcome.map_err(CliError::from).and_then(|outcome| {
        if let PrepareOutcome::Rebuilt { build, .. } = &outcome {
            if !build.is_complete() {
                tracing::warn!(
                    failed = build.failed.len(),
                    "Overlay is missing some files"
                );
            }
        }

        let Some((program, program_args)) = args.command.split_first() else {
            println!("{}", overlay.root().display());
            return Ok(ExitCode::SUCCESS);
        };

        tracing::debug!(program = %program, "Running command against overlay");
        let status = Command::new(program)
            .args(program_args)
            .env(OVERLAY_ROOT_ENV, overlay.root())
            .status()
            .map_err(|e| CliError::Io {
                context: format!("failed to run {}", program),
                source: e,
            })?;

        Ok(status
            .code()
            .and_then(|code| u8::try_from(code).ok())
            .map(ExitCode::from)
            .unwrap_or(ExitCode::FAILURE))
    });

    // Best-effort: a no-op for shared overlays.
    overlay.cleanup();

    result
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(directories: Vec<PathBuf>, isolate: bool, command: &[&str]) -> PrepareArgs {
        PrepareArgs {
            directories,
            isolate,
            command: command.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn config_in(temp: &TempDir) -> OverlayConfig {
        OverlayConfig::default().with_base_directory(temp.path().join(".pyre"))
    }

    fn source(temp: &TempDir) -> PathBuf {
        let src = temp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.py"), "a").unwrap();
        src
    }

    #[test]
    fn test_requires_directories() {
        let temp = TempDir::new().unwrap();

        let result = run(args(Vec::new(), false, &[]), config_in(&temp));

        assert!(matches!(result, Err(CliError::Usage(_))));
    }

    #[test]
    fn test_isolate_requires_command() {
        let temp = TempDir::new().unwrap();
        let src = source(&temp);

        let result = run(args(vec![src], true, &[]), config_in(&temp));

        assert!(matches!(result, Err(CliError::Usage(_))));
    }

    #[test]
    fn test_uses_configured_directories() {
        let temp = TempDir::new().unwrap();
        let src = source(&temp);
        let config = config_in(&temp).with_source_directories(vec![src]);
        let overlay = config.overlay_directory();

        run(args(Vec::new(), false, &[]), config).unwrap();

        assert!(overlay.root().join("a.py").is_symlink());
    }

    #[test]
    fn test_isolated_command_sees_overlay_then_cleans_up() {
        let temp = TempDir::new().unwrap();
        let src = source(&temp);
        let config = config_in(&temp);
        let isolated_root = config.clone().with_isolate(true).overlay_directory().root();
        let marker = temp.path().join("saw-overlay");
        let script = format!(
            r#"test -L "$SOURCE_OVERLAY_ROOT/a.py" && touch "{}""#,
            marker.display()
        );

        run(args(vec![src], true, &["sh", "-c", &script]), config).unwrap();

        assert!(marker.exists());
        assert!(!isolated_root.exists());
    }

    #[test]
    fn test_missing_source_directory_is_environment_error() {
        let temp = TempDir::new().unwrap();

        let result = run(
            args(vec![temp.path().join("missing")], false, &[]),
            config_in(&temp),
        );

        assert!(matches!(result, Err(CliError::Environment(_))));
    }
}
