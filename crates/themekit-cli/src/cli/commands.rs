use clap::{ArgAction, Args, Subcommand};
use std::path::PathBuf;

use super::validation::parse_host;

/// Available ThemeKit commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a live dev session for a theme
    ///
    /// Connects to the storefront, uploads every theme file, then watches
    /// the directory and pushes each change after a short quiet window.
    /// Press Ctrl+C to end the session.
    Dev(DevArgs),
}

/// Arguments for the dev command
#[derive(Args, Debug)]
pub struct DevArgs {
    /// Theme directory to sync
    #[arg(value_name = "THEME_DIR", default_value = ".")]
    pub theme_dir: PathBuf,

    /// Base URL of the remote storefront
    ///
    /// Falls back to THEMEKIT_HOST, then to `host` in themekit.toml.
    ///
    /// Examples:
    ///   themekit dev --host https://shop.example.com
    ///   themekit dev --host http://localhost:9292
    #[arg(long, value_name = "URL", value_parser = parse_host)]
    pub host: Option<String>,

    /// Serve a local preview page with live reload on this port
    #[arg(
        short,
        long,
        value_name = "PORT",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub port: Option<u16>,

    /// Do not open the preview in a browser once connected
    #[arg(long = "no-open", action = ArgAction::SetFalse)]
    pub open: bool,

    /// Theme name sent to the storefront
    ///
    /// Defaults to `name` in manifest.json, then to the directory name.
    #[arg(long, value_name = "NAME")]
    pub theme_name: Option<String>,

    /// Path to a config file (default: THEME_DIR/themekit.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}
