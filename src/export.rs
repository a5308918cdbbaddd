//! Alert log export.
//!
//! The exported table has exactly two columns, `Time` then `Alert`, in log
//! order. Downstream consumers rely on those names and that order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use crate::alert::AlertLog;

/// Export file format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Format implied by a file extension (`.json` vs anything else).
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ExportFormat::Json,
            _ => ExportFormat::Csv,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(anyhow!("unknown export format '{}' (expected csv|json)", other)),
        }
    }
}

#[derive(Serialize)]
struct AlertRow<'a> {
    #[serde(rename = "Time")]
    time: &'a str,
    #[serde(rename = "Alert")]
    alert: String,
}

fn rows(log: &AlertLog) -> Vec<AlertRow<'_>> {
    log.iter()
        .map(|a| AlertRow {
            time: &a.time,
            alert: a.message(),
        })
        .collect()
}

pub fn write_csv<W: Write>(log: &AlertLog, mut writer: W) -> Result<()> {
    writeln!(writer, "Time,Alert")?;
    for row in rows(log) {
        writeln!(writer, "{},{}", csv_field(row.time), csv_field(&row.alert))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(log: &AlertLog, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, &rows(log))?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Write the alert table to `path`, replacing any existing file.
pub fn export_to_path(log: &AlertLog, path: &Path, format: ExportFormat) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create alert export {}", path.display()))?;
    let writer = BufWriter::new(file);
    match format {
        ExportFormat::Csv => write_csv(log, writer),
        ExportFormat::Json => write_json(log, writer),
    }
    .with_context(|| format!("failed to write alert export {}", path.display()))
}

/// Quote a field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{Alert, AlertKind};

    fn sample_log() -> AlertLog {
        let mut log = AlertLog::new();
        log.push(Alert::new(51, "00:02", AlertKind::Loitering));
        log.push(Alert::new(
            81,
            "00:03",
            AlertKind::ObjectAbandonment {
                label: "bag, large".to_string(),
            },
        ));
        log.push(Alert::new(81, "00:03", AlertKind::UnusualActivity));
        log
    }

    #[test]
    fn csv_has_time_then_alert_columns() {
        let mut out = Vec::new();
        write_csv(&sample_log(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Time,Alert\n\
             00:02,Loitering detected\n\
             00:03,\"Object abandonment: bag, large\"\n\
             00:03,Unusual activity detected\n"
        );
    }

    #[test]
    fn json_rows_use_column_names() {
        let mut out = Vec::new();
        write_json(&sample_log(), &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["Time"], "00:02");
        assert_eq!(value[0]["Alert"], "Loitering detected");
        assert_eq!(value.as_array().unwrap().len(), 3);
    }

    #[test]
    fn empty_log_exports_header_only() {
        let mut out = Vec::new();
        write_csv(&AlertLog::new(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Time,Alert\n");
    }

    #[test]
    fn format_parsing_and_inference() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xlsx".parse::<ExportFormat>().is_err());
        assert_eq!(
            ExportFormat::from_path(Path::new("alerts.JSON")),
            ExportFormat::Json
        );
        assert_eq!(
            ExportFormat::from_path(Path::new("alerts_log.csv")),
            ExportFormat::Csv
        );
    }

    #[test]
    fn export_to_path_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts_log.csv");
        export_to_path(&sample_log(), &path, ExportFormat::Csv).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Time,Alert\n00:02,Loitering detected\n"));
    }
}
