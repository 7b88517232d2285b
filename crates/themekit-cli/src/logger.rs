//! Logging setup for the ThemeKit CLI.
//!
//! User-facing progress lines go through [`crate::ui`]. Tracing carries the
//! diagnostic detail underneath them, so the default filter keeps the sync
//! engine quiet unless `--verbose` or `RUST_LOG` asks for more.
//!
//! # Example
//!
//! ```rust,no_run
//! use themekit_cli::logger::init_logger;
//! use tracing::debug;
//!
//! init_logger(true, false, false);
//! debug!(path = "assets/base.css", "pushing change");
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str = "themekit_cli=debug,themekit_sync=debug,themekit_config=debug";
const QUIET_FILTER: &str = "themekit_cli=error,themekit_sync=error,themekit_config=error";
const DEFAULT_FILTER: &str = "themekit_cli=info,themekit_sync=error,themekit_config=warn";

/// Initialize the tracing subscriber.
///
/// The level is chosen in this order:
/// 1. `--verbose`: debug for every themekit crate
/// 2. `--quiet`: errors only
/// 3. `RUST_LOG`, when set
/// 4. the default filter
///
/// Logs go to stderr so they never interleave with piped stdout.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(select_filter(verbose, quiet), no_color);
}

/// Initialize the subscriber with an explicit filter.
///
/// ```rust,no_run
/// use themekit_cli::logger::init_logger_with_filter;
/// use tracing_subscriber::EnvFilter;
///
/// init_logger_with_filter(EnvFilter::new("themekit_sync=trace,reqwest=off"), false);
/// ```
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color && should_use_colors())
        .compact();

    // A second init (e.g. from tests) is harmless; keep the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn select_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Whether stderr output should be colored.
///
/// `NO_COLOR` disables colors, `FORCE_COLOR` forces them, otherwise the
/// terminal decides.
pub fn should_use_colors() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }

    console::Term::stderr().features().colors_supported()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_should_use_colors_respects_force_color() {
        unsafe {
            std::env::remove_var("NO_COLOR");
            std::env::set_var("FORCE_COLOR", "1");
        }
        assert!(should_use_colors());
        unsafe {
            std::env::remove_var("FORCE_COLOR");
        }
    }

    #[test]
    #[serial]
    fn test_no_color_wins_over_force_color() {
        unsafe {
            std::env::set_var("NO_COLOR", "1");
            std::env::set_var("FORCE_COLOR", "1");
        }
        assert!(!should_use_colors());
        unsafe {
            std::env::remove_var("NO_COLOR");
            std::env::remove_var("FORCE_COLOR");
        }
    }

    #[test]
    fn test_verbose_filter_enables_engine_debug() {
        let filter = select_filter(true, false).to_string();
        assert!(filter.contains("themekit_sync=debug"));
    }

    #[test]
    fn test_verbose_overrides_quiet() {
        let filter = select_filter(true, true).to_string();
        assert!(!filter.contains("error"));
    }

    #[test]
    fn test_quiet_filter_is_errors_only() {
        let filter = select_filter(false, true).to_string();
        assert!(filter.contains("themekit_cli=error"));
        assert!(!filter.contains("info"));
    }
}
