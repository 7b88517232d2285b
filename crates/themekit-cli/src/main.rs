//! ThemeKit CLI - live theme development against a remote storefront.
//!
//! Parses arguments, sets up logging, dispatches the command and turns any
//! failure into a miette report with a non-zero exit code.

use clap::Parser;
use miette::Result;
use themekit_cli::{cli, commands, error, logger, ui};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);

    let result = match args.command {
        cli::Command::Dev(dev_args) => commands::dev_execute(dev_args).await,
    };

    result.map_err(error::cli_error_to_miette)
}
