//! ThemeKit CLI.
//!
//! Command-line front end for live theme synchronization. The heavy lifting
//! lives in `themekit-sync`; this crate owns everything the developer sees:
//!
//! - [`cli`] - Argument definitions (clap derive)
//! - [`commands`] - Command implementations (`themekit dev`)
//! - [`credentials`] - Username/password from the environment or a prompt
//! - [`error`] - `CliError` with actionable hints, miette reporting
//! - [`logger`] - `tracing` subscriber setup
//! - [`preview`] - Local preview server with live reload
//! - [`ui`] - Status lines, spinner and the session summary
//!
//! # Example
//!
//! ```rust,no_run
//! use themekit_cli::{error::Result, logger};
//!
//! fn main() -> Result<()> {
//!     logger::init_logger(false, false, false);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod credentials;
pub mod error;
pub mod logger;
pub mod preview;
pub mod ui;

pub use error::{CliError, Result};
