use colored::Colorize;
use serde_json::Value;

use crate::cli::OutputFormat;

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            println!("{rendered}");
        }
        OutputFormat::Text => {
            for line in format_text(value) {
                println!("{line}");
            }
        }
    }
}

pub fn print_success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// One `key: value` line per top-level field; nested values stay JSON.
fn format_text(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{}: {}", k.cyan(), rendered)
            })
            .collect(),
        Value::String(s) => vec![s.clone()],
        other => vec![other.to_string()],
    }
}
