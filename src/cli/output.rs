use anyhow::{Context, Result};
use clap::ValueEnum;
use listing_model::FieldCommitResult;
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Prints `value` as JSON or YAML. Returns `false` for human output, which
/// each command renders itself.
pub fn print_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).context("Failed to encode JSON")?);
            Ok(true)
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value).context("Failed to encode YAML")?);
            Ok(true)
        }
        OutputFormat::Human => Ok(false),
    }
}

pub fn print_field_line(result: &FieldCommitResult) {
    let mark = if result.committed { "ok  " } else { "FAIL" };
    let detail = result.detail.as_deref().unwrap_or("");
    println!(
        "  {} {:<24} {:<13} {}",
        mark,
        result.field,
        result.method.name(),
        detail
    );
}
