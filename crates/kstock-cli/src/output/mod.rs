pub mod csv_out;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Write a command result to stdout. JSON carries the whole envelope; the
/// csv and minimal views drop the warnings, so those go to the log instead.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{}", s),
            Err(e) => tracing::error!(error = %e, "failed to render JSON output"),
        },
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => {
            log_warnings(value);
            csv_out::print_csv(value);
        }
        OutputFormat::Minimal => {
            log_warnings(value);
            minimal::print_minimal(value);
        }
    }
}

fn log_warnings(value: &Value) {
    for warning in envelope_warnings(value) {
        tracing::warn!("{}", warning);
    }
}

fn envelope_warnings(value: &Value) -> Vec<&str> {
    value
        .get("warnings")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
