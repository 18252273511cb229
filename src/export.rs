use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::ApiError;
use crate::types::{ScanRecord, SubdomainInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Txt,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Txt => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Txt => "text/plain; charset=utf-8",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "txt" => Ok(ExportFormat::Txt),
            other => Err(ApiError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
    scan_id: &'a str,
    domain: &'a str,
    subdomain_count: usize,
    subdomains: &'a [SubdomainInfo],
}

#[derive(Serialize)]
struct CsvRow<'a> {
    subdomain: &'a str,
    ip_addresses: String,
    cname: &'a str,
    ports: String,
}

/// Render the result rows of `record` in `format`.
pub fn render(record: &ScanRecord, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => {
            let doc = JsonExport {
                scan_id: &record.scan_id,
                domain: &record.domain,
                subdomain_count: record.subdomain_count,
                subdomains: &record.subdomains,
            };
            serde_json::to_vec_pretty(&doc).context("serializing JSON export")
        }
        ExportFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(Vec::new());
            for s in &record.subdomains {
                let ports = s
                    .ports
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(u16::to_string)
                    .collect::<Vec<_>>()
                    .join(";");
                wtr.serialize(CsvRow {
                    subdomain: &s.subdomain,
                    ip_addresses: s.ip_addresses.join(";"),
                    cname: s.cname.as_deref().unwrap_or(""),
                    ports,
                })?;
            }
            // serialize() only writes the header alongside the first row.
            if record.subdomains.is_empty() {
                wtr.write_record(["subdomain", "ip_addresses", "cname", "ports"])?;
            }
            wtr.into_inner()
                .map_err(|e| anyhow::anyhow!("flushing CSV export: {}", e.error()))
        }
        ExportFormat::Txt => {
            let mut out = String::new();
            for s in &record.subdomains {
                out.push_str(&s.subdomain);
                out.push('\n');
            }
            Ok(out.into_bytes())
        }
    }
}

/// Download name, e.g. `example.com_scan_1700000000000_abcd1234.csv`.
pub fn file_name(record: &ScanRecord, format: ExportFormat) -> String {
    format!("{}_{}.{}", record.domain, record.scan_id, format.extension())
}
