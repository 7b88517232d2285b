//! Command implementations for the ThemeKit CLI.
//!
//! - [`dev`] - live theme sync with an optional local preview
//!
//! Each command provides an `execute` function that takes its parsed
//! arguments and returns a Result.

pub mod dev;

pub use dev::execute as dev_execute;
