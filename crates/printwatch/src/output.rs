//! Output formatting: table, JSON, YAML.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde.

use std::io::IsTerminal;

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use printwatch_core::PrintStatus;

use crate::cli::OutputFormat;

/// Whether color output should be enabled.
pub fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err()
}

/// Colorize a lifecycle status for table cells.
pub fn paint_status(status: PrintStatus) -> String {
    let text = status.to_string();
    if !use_color() {
        return text;
    }
    match status {
        PrintStatus::Running => text.green().to_string(),
        PrintStatus::Paused => text.yellow().to_string(),
        PrintStatus::Failed | PrintStatus::Cancelled => text.red().to_string(),
        PrintStatus::Complete => text.cyan().to_string(),
        _ => text,
    }
}

/// Render a list of serde-serializable items in the chosen format.
///
/// - `table`: maps each item through `to_row` and tabulates
/// - `json` / `yaml`: serializes the original data via serde
pub fn render_list<T, R>(format: OutputFormat, data: &[T], to_row: impl Fn(&T) -> R) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data),
        OutputFormat::Yaml => render_yaml(data),
    }
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn render_json<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("<serialization error: {e}>"))
}

pub fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("<serialization error: {e}>"))
}
