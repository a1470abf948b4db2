//! CSV export of filtered record sets.

use chrono::{DateTime, Local};

use crate::{
    records::{SubmissionRecord, HEADERS},
    Error, Result,
};

/// Render records as UTF-8 CSV: canonical header row, then one row per
/// record in input order. Quoting is handled by the encoder.
///
/// Callers are expected to handle the empty set themselves (a notice, not a
/// file).
pub fn render_csv(records: &[SubmissionRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADERS)?;
    for record in records {
        writer.write_record(record.to_row())?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::External(format!("csv buffer error: {e}")))
}

/// Attachment name, stamped with the local wall clock.
pub fn file_name(now: DateTime<Local>) -> String {
    format!("request-submissions-{}.csv", now.format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_header_then_rows_in_input_order() {
        let records = vec![
            SubmissionRecord {
                timestamp: "2026-08-01 10:00:00".into(),
                requester: "alice".into(),
                brand_name: "ACME".into(),
                ..Default::default()
            },
            SubmissionRecord {
                timestamp: "2026-08-02 11:00:00".into(),
                requester: "bob".into(),
                brand_name: "Globex".into(),
                ..Default::default()
            },
        ];

        let bytes = render_csv(&records).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Timestamp,Requester Username,Brand Name"));
        assert!(lines[1].contains("alice"));
        assert!(lines[2].contains("Globex"));
    }

    #[test]
    fn quotes_cells_with_embedded_delimiters() {
        let records = vec![SubmissionRecord {
            brand_name: "ACME, Inc.".into(),
            camera_requirements: "two cams\nplus crane".into(),
            ..Default::default()
        }];

        let bytes = render_csv(&records).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"ACME, Inc.\""));
        assert!(text.contains("\"two cams\nplus crane\""));
    }

    #[test]
    fn file_name_uses_compact_local_timestamp() {
        let now = Local.with_ymd_and_hms(2026, 8, 6, 9, 30, 5).unwrap();
        assert_eq!(file_name(now), "request-submissions-20260806-093005.csv");
    }
}
