//! Delivery-report export.

use std::path::Path;

use wablast_common::DeliveryRecord;

use crate::Result;

const HEADER: &str = "Number,Name,Status,Reason,Time";

/// Render a delivery report as CSV, one row per record.
pub fn to_csv(records: &[DeliveryRecord]) -> String {
    let mut out = String::with_capacity(64 * (records.len() + 1));
    out.push_str(HEADER);
    out.push('\n');
    for record in records {
        let row = [
            record.number.as_str(),
            record.name.as_str(),
            &record.status.to_string(),
            record.reason.as_str(),
            &record.time.format("%Y-%m-%d %H:%M:%S").to_string(),
        ];
        let mut first = true;
        for field in row {
            if !first {
                out.push(',');
            }
            first = false;
            out.push_str(&escape(field));
        }
        out.push('\n');
    }
    out
}

pub fn write_csv(path: &Path, records: &[DeliveryRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_csv(records))?;
    Ok(())
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn rows_match_records() {
        let records = vec![
            DeliveryRecord::succeeded("62811", "Alice"),
            DeliveryRecord::failed("62812", "", "not registered"),
        ];
        let csv = to_csv(&records);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Number,Name,Status,Reason,Time");
        assert!(lines[1].starts_with("62811,Alice,succeeded,delivered,"));
        assert!(lines[2].starts_with("62812,,failed,not registered,"));
    }

    #[test]
    fn write_csv_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports").join("report.csv");
        write_csv(&path, &[DeliveryRecord::succeeded("62811", "Alice")]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with(HEADER));
        assert!(contents.contains("62811,Alice,succeeded"));
    }

    #[test]
    fn fields_with_separators_are_quoted() {
        let records = vec![DeliveryRecord::failed(
            "62813",
            "Doe, John",
            "timeout: \"no ack\"",
        )];
        let csv = to_csv(&records);
        assert!(csv.contains("\"Doe, John\""));
        assert!(csv.contains("\"timeout: \"\"no ack\"\"\""));
    }
}
