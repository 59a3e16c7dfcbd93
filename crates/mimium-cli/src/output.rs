// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! CLI output formatting with colors and styling.
//!
//! Respects NO_COLOR and FORCE_COLOR environment variables.

use colored::{ColoredString, Colorize};

/// Initialize color support based on environment. Call once at startup.
pub fn init() {
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    } else if std::env::var("FORCE_COLOR").is_ok() {
        colored::control::set_override(true);
    }
}

pub fn error_label() -> ColoredString {
    "error".red().bold()
}

pub fn hint_label() -> ColoredString {
    "hint".cyan()
}

pub fn title(s: &str) -> ColoredString {
    s.bold()
}

pub fn version(s: &str) -> ColoredString {
    format!("v{s}").dimmed()
}

pub fn section_header(s: &str) -> ColoredString {
    s.yellow().bold()
}

pub fn command(s: &str) -> ColoredString {
    s.green()
}

pub fn arg(s: &str) -> ColoredString {
    s.cyan()
}

pub fn banner_ok(phase: &str) -> String {
    format!("{} {}", "===".dimmed(), format!("{phase} OK").green().bold())
}
