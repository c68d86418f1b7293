//! CLI subcommands.

pub mod info;
pub mod list;
pub mod prepare;

pub use info::InfoArgs;
pub use list::ListArgs;
pub use prepare::PrepareArgs;
