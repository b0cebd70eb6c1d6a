//! Operator-facing terminal messages.
//!
//! Colour distinguishes message classes: cyan for progress, green for
//! success, yellow for warnings and red for errors. Errors go to stderr.
//! These lines are for humans only; nothing parses them.

use crossterm::style::Stylize;
use std::path::Path;

/// Progress / informational line
pub fn info(msg: impl AsRef<str>) {
    println!("{}", msg.as_ref().cyan());
}

/// Completed action
pub fn success(msg: impl AsRef<str>) {
    println!("{}", msg.as_ref().green());
}

/// Non-fatal problem the operator should know about
pub fn warn(msg: impl AsRef<str>) {
    println!("{}", msg.as_ref().yellow());
}

/// Fatal or failed action (stderr)
pub fn error(msg: impl AsRef<str>) {
    eprintln!("{}", msg.as_ref().red());
}

/// Plain line (reminders, summaries)
pub fn plain(msg: impl AsRef<str>) {
    println!("{}", msg.as_ref());
}

/// Print a fatal error followed by the pointer to the install log.
pub fn fatal(msg: impl AsRef<str>, log: &Path) {
    error(msg);
    error(format!("See {} for details.", log.display()));
}
