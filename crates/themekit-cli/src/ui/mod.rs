//! Terminal output for the dev command.
//!
//! Status lines, the connect spinner and the end-of-session summary all
//! write to stderr. Color is decided once at startup by [`init_colors`].
//!
//! ```no_run
//! use themekit_cli::ui;
//!
//! ui::init_colors(false);
//!
//! let spinner = ui::Spinner::new("Connecting to https://shop.example.com");
//! spinner.finish("Connected");
//!
//! ui::success("Synced assets/base.css");
//! ui::warning("Skipped assets/huge.mp4: file is being written");
//! ```

mod format;
mod messages;
mod spinner;

use std::sync::atomic::{AtomicBool, Ordering};

pub use format::{format_count, format_duration, print_session_summary};
pub use messages::{error, info, success, warning};
pub use spinner::Spinner;

static COLOR_ENABLED: AtomicBool = AtomicBool::new(true);

/// Check if running in a CI environment.
pub fn is_ci() -> bool {
    ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "CIRCLECI", "TRAVIS"]
        .iter()
        .any(|var| std::env::var_os(var).is_some())
}

/// Check if color output should be enabled.
///
/// `NO_COLOR` wins over `FORCE_COLOR`; otherwise colors follow whether
/// stderr is a terminal.
pub fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }

    console::user_attended_stderr()
}

/// Decide color support for the rest of the process.
///
/// Call once from `main`, before anything is printed.
pub fn init_colors(no_color: bool) {
    let enabled = !no_color && should_use_color();
    COLOR_ENABLED.store(enabled, Ordering::Relaxed);
    console::set_colors_enabled_stderr(enabled);
}

pub(crate) fn colors_enabled() -> bool {
    COLOR_ENABLED.load(Ordering::Relaxed)
}
