//! `list`: list files through the process-wide listing backend.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use source_overlay::{lister, FileLister};

use crate::error::CliError;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// File name suffix to match (e.g. `.py`)
    suffix: String,

    /// Directory to list
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

pub fn run(args: ListArgs) -> Result<ExitCode, CliError> {
    let files = lister().list(&args.root, &args.suffix)?;
    for file in files {
        println!("{}", file.display());
    }
    Ok(ExitCode::SUCCESS)
}
