//! Formatting helpers for durations, counts and the session summary.

use owo_colors::OwoColorize;
use std::time::Duration;
use themekit_sync::RunSummary;

use super::colors_enabled;

/// Format a duration using the most fitting unit.
///
/// ```
/// use std::time::Duration;
/// use themekit_cli::ui::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// `count` followed by `noun`, pluralized for anything but one.
///
/// ```
/// use themekit_cli::ui::format_count;
///
/// assert_eq!(format_count(1, "file"), "1 file");
/// assert_eq!(format_count(3, "file"), "3 files");
/// assert_eq!(format_count(2, "push"), "2 pushes");
/// ```
pub fn format_count(count: usize, noun: &str) -> String {
    if count == 1 {
        return format!("{} {}", count, noun);
    }
    let suffix = if ["s", "x", "sh", "ch"].iter().any(|end| noun.ends_with(end)) {
        "es"
    } else {
        "s"
    };
    format!("{} {}{}", count, noun, suffix)
}

/// Print the end-of-session summary to stderr.
pub fn print_session_summary(summary: &RunSummary, elapsed: Duration) {
    let line = summary.to_string();
    let pushes = format_count(summary.pushes, "push");
    let took = format_duration(elapsed);

    if colors_enabled() {
        eprintln!("\n{}", "Session Summary".bold().underline());
        eprintln!("  {} {}", "▸".blue(), line.bright_white().bold());
        if summary.files_skipped > 0 {
            let skipped = format_count(summary.files_skipped, "file");
            eprintln!("  {} {} skipped", "▸".blue(), skipped.yellow());
        }
        eprintln!("  {} {} in {}", "▸".blue(), pushes.dimmed(), took.green());
    } else {
        eprintln!("\nSession Summary");
        eprintln!("  ▸ {}", line);
        if summary.files_skipped > 0 {
            eprintln!("  ▸ {} skipped", format_count(summary.files_skipped, "file"));
        }
        eprintln!("  ▸ {} in {}", pushes, took);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_milliseconds() {
        assert_eq!(format_duration(Duration::from_millis(0)), "0ms");
        assert_eq!(format_duration(Duration::from_millis(999)), "999ms");
    }

    #[test]
    fn test_format_duration_seconds() {
        assert_eq!(format_duration(Duration::from_millis(1000)), "1.00s");
        assert_eq!(format_duration(Duration::from_millis(59_999)), "60.00s");
    }

    #[test]
    fn test_format_duration_minutes() {
        assert_eq!(format_duration(Duration::from_secs(60)), "1m 0s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "61m 1s");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0, "push"), "0 pushes");
        assert_eq!(format_count(1, "push"), "1 push");
        assert_eq!(format_count(2, "file"), "2 files");
    }

    #[test]
    fn test_print_session_summary() {
        let summary = RunSummary {
            files_synced: 4,
            files_failed: 1,
            files_deleted: 0,
            files_skipped: 2,
            pushes: 3,
        };
        print_session_summary(&summary, Duration::from_secs(75));
        print_session_summary(&RunSummary::default(), Duration::ZERO);
    }
}
