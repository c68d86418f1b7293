//! `info`: local diagnostics.

use std::process::ExitCode;

use clap::Args;
use source_overlay::{lister, Lister, ManifestCache, OverlayConfig};

use crate::error::CliError;

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Also print the source directories recorded in the overlay manifest
    #[arg(long)]
    manifest: bool,
}

pub fn run(args: InfoArgs, config: &OverlayConfig) -> Result<ExitCode, CliError> {
    let overlay = config.overlay_directory();
    let root = overlay.root();

    // Plain stdout; logging goes to stderr or the log file.
    println!("Client version: {}", source_overlay::VERSION);
    match lister() {
        Lister::Mercurial(hg) => println!(
            "Listing backend: {} ({})",
            lister().name(),
            hg.executable().display()
        ),
        other => println!("Listing backend: {}", other.name()),
    }
    println!("Source suffixes: {}", config.merger().suffixes().join(", "));
    println!("Overlay root: {}", root.display());

    if args.manifest {
        let cached = ManifestCache::load(&root);
        if cached.is_empty() {
            println!("Merged directories: none");
        } else {
            println!("Merged directories:");
            for directory in &cached {
                println!("  {}", directory.display());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
