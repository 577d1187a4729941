//! Output formats for proxy lists
//!
//! Pure conversions from records into the shapes other tools consume.

use csv::{Terminator, WriterBuilder};

use crate::error::{PoolError, Result};
use crate::models::{ProxyMapping, ProxyRecord};

/// CSV column order
pub const CSV_HEADER: [&str; 6] = [
    "address",
    "port",
    "protocol",
    "country",
    "timeout_ms",
    "is_working",
];

/// `address:port` per record
pub fn to_simple_list(records: &[ProxyRecord]) -> Vec<String> {
    records.iter().map(ProxyRecord::authority).collect()
}

/// `protocol://address:port` per record
pub fn to_url_list(records: &[ProxyRecord]) -> Vec<String> {
    records.iter().map(ProxyRecord::url).collect()
}

/// `curl -x protocol://address:port` per record
pub fn to_curl_format(records: &[ProxyRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| format!("curl -x {}", r.url()))
        .collect()
}

/// Per-scheme proxy mappings for HTTP client libraries
pub fn to_requests_format(records: &[ProxyRecord]) -> Vec<ProxyMapping> {
    records.iter().map(ProxyRecord::proxy_mapping).collect()
}

/// Render records as CSV
///
/// Absent optional fields become empty cells. No records yields an empty
/// string, with or without a header.
pub fn to_csv(records: &[ProxyRecord], include_headers: bool) -> Result<String> {
    if records.is_empty() {
        return Ok(String::new());
    }

    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    if include_headers {
        writer.write_record(CSV_HEADER)?;
    }

    for record in records {
        let port = record.port().to_string();
        let timeout_ms = record
            .timeout_ms()
            .map(|ms| ms.to_string())
            .unwrap_or_default();
        let is_working = record
            .is_working()
            .map(|w| w.to_string())
            .unwrap_or_default();

        writer.write_record([
            record.address(),
            port.as_str(),
            record.protocol().as_str(),
            record.country().unwrap_or(""),
            timeout_ms.as_str(),
            is_working.as_str(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| PoolError::Format(format!("failed to flush CSV output: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| PoolError::Format(format!("CSV output is not UTF-8: {}", e)))
}
