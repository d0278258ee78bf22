//! Status messages.

use owo_colors::OwoColorize;

fn tag(symbol: &str, paint: impl Fn(&str) -> String) -> String {
    if super::colors_enabled() {
        paint(symbol)
    } else {
        symbol.to_string()
    }
}

/// Print a success message to stderr.
///
/// ```no_run
/// use viewpack_cli::ui::success;
///
/// success("Built views/index.js");
/// ```
pub fn success(message: &str) {
    eprintln!("{} {}", tag("✓", |s| s.green().bold().to_string()), message);
}

/// Print an info message to stderr.
pub fn info(message: &str) {
    eprintln!("{} {}", tag("ℹ", |s| s.blue().bold().to_string()), message);
}

/// Print a warning message to stderr.
pub fn warning(message: &str) {
    eprintln!("{} {}", tag("⚠", |s| s.yellow().bold().to_string()), message);
}

/// Print an error message to stderr.
pub fn error(message: &str) {
    eprintln!("{} {}", tag("✗", |s| s.red().bold().to_string()), message);
}
