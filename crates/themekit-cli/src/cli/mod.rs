//! Command-line interface definition for ThemeKit.
//!
//! # Command Structure
//!
//! - `themekit dev [THEME_DIR]` - sync a local theme to a remote dev theme
//!   and keep it in step until interrupted

mod commands;
mod validation;

use clap::Parser;

pub use commands::{Command, DevArgs};
pub use validation::parse_host;

/// ThemeKit - live theme development against a remote storefront
#[derive(Parser, Debug)]
#[command(
    name = "themekit",
    version,
    about = "Live theme development against a remote storefront",
    long_about = "ThemeKit pushes a local theme directory to a storefront's dev theme,\n\
                  then watches the directory and syncs every change as you save it."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    ///
    /// Shows every watch event, push request and response from the sync engine.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}
