use std::io::IsTerminal;
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framelink_channel::{CatalogEntry, Direction, Message};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

/// One message observed during a simulation.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub at_ms: u64,
    pub direction: Direction,
    pub name: String,
    pub channel: String,
    pub payload: Value,
}

impl TranscriptEntry {
    pub fn record(at: Duration, direction: Direction, message: &Message) -> Self {
        Self {
            at_ms: at.as_millis() as u64,
            direction,
            name: message.name.clone(),
            channel: message.channel().to_string(),
            payload: redact(&message.payload),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub channel: String,
    pub state: String,
    pub host_path: String,
    pub title: Option<String>,
    pub elapsed_ms: u64,
    pub messages: Vec<TranscriptEntry>,
}

pub fn print_simulation(report: &SimulationReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["AT", "DIRECTION", "NAME", "PAYLOAD"]);
            for entry in &report.messages {
                table.add_row(vec![
                    format!("{}ms", entry.at_ms),
                    entry.direction.to_string(),
                    entry.name.clone(),
                    entry.payload.to_string(),
                ]);
            }
            println!("{table}");
            print_summary(report);
        }
        OutputFormat::Pretty => {
            for entry in &report.messages {
                println!(
                    "[{:>6}ms] {} {} {}",
                    entry.at_ms, entry.direction, entry.name, entry.payload
                );
            }
            print_summary(report);
        }
    }
}

fn print_summary(report: &SimulationReport) {
    println!(
        "channel={} state={} host_path={} title={} elapsed={}ms",
        report.channel,
        report.state,
        report.host_path,
        report.title.as_deref().unwrap_or("-"),
        report.elapsed_ms
    );
}

#[derive(Serialize)]
struct CatalogRow<'a> {
    #[serde(flatten)]
    entry: &'a CatalogEntry,
    schema: bool,
}

/// `has_schema` reports whether inbound validation covers the message.
pub fn print_catalog(entries: &[CatalogEntry], has_schema: impl Fn(&str) -> bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let rows: Vec<CatalogRow<'_>> = entries
                .iter()
                .map(|entry| CatalogRow {
                    entry,
                    schema: has_schema(entry.name),
                })
                .collect();
            print_json(&rows);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NAME", "DIRECTION", "SCHEMA", "PAYLOAD"]);
            for entry in entries {
                table.add_row(vec![
                    entry.name.to_string(),
                    entry.direction.to_string(),
                    yes_no(has_schema(entry.name)).to_string(),
                    entry.payload.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for entry in entries {
                println!("{:<22} {} {}", entry.name, entry.direction, entry.payload);
            }
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Replace auth tokens anywhere in a payload.
pub fn redact(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = match (key.as_str(), value) {
                        ("token", Value::String(_)) => Value::String("<redacted>".to_string()),
                        _ => redact(value),
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn redact_hides_nested_tokens() {
        let payload = json!({
            "token": "secret",
            "navigation": { "path": "/foo" },
            "nested": [{ "token": "other" }],
        });

        let redacted = redact(&payload);

        assert_eq!(redacted["token"], "<redacted>");
        assert_eq!(redacted["nested"][0]["token"], "<redacted>");
        assert_eq!(redacted["navigation"]["path"], "/foo");
    }

    #[test]
    fn redact_keeps_null_tokens() {
        let redacted = redact(&json!({ "token": null }));
        assert_eq!(redacted["token"], Value::Null);
    }
}
