use chrono::NaiveDateTime;

/// Timestamp format used in the store's "Timestamp" column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical column set of the record store, in write order.
pub const HEADERS: [&str; 12] = [
    "Timestamp",
    "Requester Username",
    "Brand Name",
    "Creator Name",
    "Room No / Room Letter",
    "Date to be Aired",
    "Camera Requirements",
    "Stage Design",
    "Other Technical Requirements",
    "Platform Mode",
    "Platforms",
    "Other Platforms",
];

/// One completed submission, immutable once written.
///
/// The air-date stays free text; only `timestamp` (from the process clock) is
/// ever parsed back into a date.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub timestamp: String,
    pub requester: String,
    pub brand_name: String,
    pub creator_name: String,
    pub room_no: String,
    pub date_to_be_aired: String,
    pub camera_requirements: String,
    pub stage_design: String,
    pub other_technical: String,
    pub platform_mode: String,
    pub platforms: String,
    pub platforms_other: String,
}

impl SubmissionRecord {
    /// Cell values in canonical column order.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.requester.clone(),
            self.brand_name.clone(),
            self.creator_name.clone(),
            self.room_no.clone(),
            self.date_to_be_aired.clone(),
            self.camera_requirements.clone(),
            self.stage_design.clone(),
            self.other_technical.clone(),
            self.platform_mode.clone(),
            self.platforms.clone(),
            self.platforms_other.clone(),
        ]
    }

    /// Build a record from a sheet row, matching cells by header name.
    ///
    /// Unknown columns are ignored and missing cells stay empty, so the
    /// mapping survives external edits that reorder or extend the sheet.
    pub fn from_row(header: &[String], row: &[String]) -> Self {
        let mut rec = Self::default();
        for (idx, name) in header.iter().enumerate() {
            let value = row.get(idx).cloned().unwrap_or_default();
            match name.as_str() {
                "Timestamp" => rec.timestamp = value,
                "Requester Username" => rec.requester = value,
                "Brand Name" => rec.brand_name = value,
                "Creator Name" => rec.creator_name = value,
                "Room No / Room Letter" => rec.room_no = value,
                "Date to be Aired" => rec.date_to_be_aired = value,
                "Camera Requirements" => rec.camera_requirements = value,
                "Stage Design" => rec.stage_design = value,
                "Other Technical Requirements" => rec.other_technical = value,
                "Platform Mode" => rec.platform_mode = value,
                "Platforms" => rec.platforms = value,
                "Other Platforms" => rec.platforms_other = value,
                _ => {}
            }
        }
        rec
    }

    /// Parse the stored timestamp; `None` for rows written by hand in some
    /// other format. Callers skip those rows silently.
    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.timestamp.trim(), TIMESTAMP_FORMAT).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_round_trips_through_canonical_header() {
        let rec = SubmissionRecord {
            timestamp: "2026-08-01 10:00:00".into(),
            requester: "alice".into(),
            brand_name: "ACME".into(),
            creator_name: "Bob".into(),
            room_no: "3A".into(),
            date_to_be_aired: "2026-09-01".into(),
            camera_requirements: "2 cams".into(),
            stage_design: "minimal".into(),
            other_technical: "none".into(),
            platform_mode: "Single".into(),
            platforms: "Facebook".into(),
            platforms_other: String::new(),
        };
        let header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        assert_eq!(SubmissionRecord::from_row(&header, &rec.to_row()), rec);
    }

    #[test]
    fn from_row_tolerates_reordered_and_extra_columns() {
        let header = vec![
            "Extra".to_string(),
            "Brand Name".to_string(),
            "Timestamp".to_string(),
        ];
        let row = vec!["x".to_string(), "ACME".to_string(), "2026-01-01 00:00:00".to_string()];
        let rec = SubmissionRecord::from_row(&header, &row);
        assert_eq!(rec.brand_name, "ACME");
        assert_eq!(rec.timestamp, "2026-01-01 00:00:00");
        assert_eq!(rec.requester, "");
    }

    #[test]
    fn short_rows_leave_trailing_fields_empty() {
        let header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        let row = vec!["2026-01-01 00:00:00".to_string(), "alice".to_string()];
        let rec = SubmissionRecord::from_row(&header, &row);
        assert_eq!(rec.requester, "alice");
        assert_eq!(rec.platforms, "");
    }

    #[test]
    fn parses_only_the_canonical_timestamp_format() {
        let mut rec = SubmissionRecord {
            timestamp: "2026-08-01 10:20:30".into(),
            ..Default::default()
        };
        assert!(rec.parsed_timestamp().is_some());

        rec.timestamp = "01/08/2026".into();
        assert!(rec.parsed_timestamp().is_none());
    }
}
