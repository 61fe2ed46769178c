//! Terminal rendering for appctl

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables and messages
    #[default]
    Table,
    Json,
    Yaml,
}

/// Serialize a document as JSON or YAML; tables fall back to YAML
pub fn print_document<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Table | OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Render rows, or `empty` in yellow when a table would have none
pub fn print_rows<T: Tabled + Serialize>(rows: &[T], format: OutputFormat, empty: &str) -> Result<()> {
    if format != OutputFormat::Table {
        return print_document(&rows, format);
    }
    if rows.is_empty() {
        println!("{}", empty.yellow());
    } else {
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color an application lifecycle status
pub fn color_status(status: &str) -> String {
    match status {
        "draft" => status.dimmed().to_string(),
        "valid" => status.blue().to_string(),
        "deploying" | "undeploying" => status.yellow().to_string(),
        "running" => status.green().to_string(),
        _ => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_status_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(color_status("running"), "running");
        assert_eq!(color_status("unknown"), "unknown");
    }
}
