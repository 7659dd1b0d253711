//! Minimal CSV reader for patient uploads.
//!
//! Splits on newlines and commas only. Quoted fields are not supported: a
//! comma inside quotes still splits the cell. Uploads come from exported
//! device/EHR sheets that never quote, so this stays deliberately small.

use std::collections::HashMap;

use crate::error::UploadError;

/// Error text shown when the upload has no data rows.
pub const INSUFFICIENT_ROWS: &str = "CSV file must contain headers and at least one data row";

/// Parsed CSV: a header row plus data rows of the same width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawCsvTable {
    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Zip the headers with row `index`.
    ///
    /// Duplicate header names resolve to the last column, matching how the
    /// row would be read into a keyed record.
    pub fn row_map(&self, index: usize) -> Option<HashMap<&str, &str>> {
        let row = self.rows.get(index)?;
        Some(
            self.headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.as_str(), v.as_str()))
                .collect(),
        )
    }

    /// Position of a header, exact match.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Check the uploaded file before reading it.
pub fn validate_upload(file_name: Option<&str>) -> Result<(), UploadError> {
    let Some(name) = file_name.filter(|n| !n.trim().is_empty()) else {
        return Err(UploadError::input("No file provided"));
    };
    if !name.ends_with(".csv") {
        return Err(UploadError::input("Please upload a CSV file"));
    }
    Ok(())
}

/// Parse raw CSV text into a [`RawCsvTable`].
///
/// Blank lines are dropped and every line is trimmed, so CRLF input works.
/// Rows shorter than the header are padded with empty cells; longer rows are
/// truncated.
pub fn parse_csv(text: &str) -> Result<RawCsvTable, UploadError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut lines = text
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty());

    let header_line = lines.next().ok_or_else(|| UploadError::input(INSUFFICIENT_ROWS))?;
    let headers = split_line(header_line);
    let width = headers.len();

    let rows: Vec<Vec<String>> = lines
        .map(|line| {
            let mut cells = split_line(line);
            cells.resize(width, String::new());
            cells
        })
        .collect();

    if rows.is_empty() {
        return Err(UploadError::input(INSUFFICIENT_ROWS));
    }

    Ok(RawCsvTable { headers, rows })
}

fn split_line(line: &str) -> Vec<String> {
    line.split(',').map(|cell| cell.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_rows() {
        let table = parse_csv("a,b,c\n1,2,3\n4,5,6\n").unwrap();
        assert_eq!(table.headers, vec!["a", "b", "c"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1], vec!["4", "5", "6"]);
    }

    #[test]
    fn trims_cells_and_skips_blank_lines() {
        let table = parse_csv("\n  a , b \r\n\r\n 1 ,2\r\n\n").unwrap();
        assert_eq!(table.headers, vec!["a", "b"]);
        assert_eq!(table.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }

    #[test]
    fn pads_short_rows_and_truncates_long_ones() {
        let table = parse_csv("a,b,c\n1\n1,2,3,4").unwrap();
        assert_eq!(table.rows[0], vec!["1", "", ""]);
        assert_eq!(table.rows[1], vec!["1", "2", "3"]);
        assert!(table.rows.iter().all(|r| r.len() == table.headers.len()));
    }

    #[test]
    fn header_only_is_rejected() {
        let err = parse_csv("a,b,c\n\n").unwrap_err();
        assert!(matches!(err, UploadError::Input(ref m) if m == INSUFFICIENT_ROWS));
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(parse_csv("").is_err());
        assert!(parse_csv("   \n \n").is_err());
    }

    #[test]
    fn strips_byte_order_mark() {
        let table = parse_csv("\u{feff}Age,BS\n30,90").unwrap();
        assert_eq!(table.headers[0], "Age");
    }

    #[test]
    fn quoted_commas_still_split() {
        let table = parse_csv("name,note\nAmy,\"a,b\"").unwrap();
        assert_eq!(table.rows[0], vec!["Amy", "\"a"]);
    }

    #[test]
    fn row_map_zips_headers() {
        let table = parse_csv("Age,BS\n30,90").unwrap();
        let row = table.row_map(0).unwrap();
        assert_eq!(row.get("Age"), Some(&"30"));
        assert!(table.row_map(1).is_none());
    }

    #[test]
    fn validate_upload_checks_presence_and_extension() {
        assert!(validate_upload(Some("vitals.csv")).is_ok());
        let missing = validate_upload(None).unwrap_err();
        assert_eq!(missing.to_string(), "No file provided");
        let wrong = validate_upload(Some("vitals.xlsx")).unwrap_err();
        assert_eq!(wrong.to_string(), "Please upload a CSV file");
    }
}
