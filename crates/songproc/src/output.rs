use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A command result that renders in every [`OutputFormat`].
pub trait Report: Serialize {
    /// Heading for the pretty listing.
    fn title(&self) -> &'static str;
    /// Field/value rows for table and pretty output.
    fn rows(&self) -> Vec<(&'static str, String)>;
    /// Single-line summary for raw output.
    fn raw(&self) -> String;
}

pub fn print_report<R: Report>(report: &R, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in report.rows() {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{}:", report.title());
            for (field, value) in report.rows() {
                println!("  {:<12} {value}", format!("{field}:"));
            }
        }
        OutputFormat::Raw => println!("{}", report.raw()),
    }
}

pub fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}
