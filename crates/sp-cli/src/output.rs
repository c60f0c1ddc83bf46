//! Output formatting utilities.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable status lines.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Prints a success message.
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Prints an error message.
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Prints a warning message.
pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Prints an info message.
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Prints an aligned `key: value` line.
pub fn field(key: &str, value: impl std::fmt::Display) {
    println!("  {:<22} {}", format!("{key}:").bold(), value);
}

/// Prints `item` as JSON, or runs `text` for the text format.
pub fn emit<T: Serialize>(item: &T, format: OutputFormat, text: impl FnOnce(&T)) -> crate::CliResult<()> {
    match format {
        OutputFormat::Text => text(item),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(item)?),
    }
    Ok(())
}
