use std::io::IsTerminal;

use bytes::Bytes;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

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

/// One response observed by the replay client.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub stream_id: u32,
    pub status: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    stream_id: u32,
    status: &'a str,
    headers: &'a [(String, String)],
    body_size: usize,
    body: String,
}

pub fn print_responses(records: &[ResponseRecord], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for record in records {
                println!("{}", response_json(record));
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STREAM", "STATUS", "HEADERS", "SIZE", "BODY"]);
            for record in records {
                table.add_row(vec![
                    record.stream_id.to_string(),
                    record.status.clone(),
                    header_lines(&record.headers),
                    record.body.len().to_string(),
                    body_preview(&record.body),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for record in records {
                println!(
                    "stream={} status={} headers={} size={} body={}",
                    record.stream_id,
                    record.status,
                    record.headers.len(),
                    record.body.len(),
                    body_preview(&record.body)
                );
            }
        }
    }
}

fn response_json(record: &ResponseRecord) -> String {
    let out = ResponseOutput {
        stream_id: record.stream_id,
        status: &record.status,
        headers: &record.headers,
        body_size: record.body.len(),
        body: body_preview(&record.body),
    };
    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
}

fn header_lines(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn body_preview(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}
