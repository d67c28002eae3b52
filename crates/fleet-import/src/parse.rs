//! Stage 1: decode an opaque `{fileName, format, contentBase64}` payload
//! into headers and string rows (§4.3 stage 1).

use crate::error::ImportError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use calamine::Reader;
use serde::Serialize;
use std::io::Cursor;

/// Upper bound on decoded payload size (§6 data-hygiene rules); chosen to
/// comfortably fit a multi-thousand-row roster export while rejecting an
/// accidentally-attached multi-gigabyte file outright.
pub const MAX_DECODED_BYTES: usize = 25 * 1024 * 1024;

/// Which container the payload is encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    /// Comma-separated values, with the quoting rules in §4.3 stage 1.
    Csv,
    /// A spreadsheet workbook; the first sheet is used.
    Xlsx,
}

impl ImportFormat {
    /// Parse the wire-level `format` string.
    pub fn parse(s: &str) -> Result<Self, ImportError> {
        match s {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            other => Err(ImportError::ParseFailed {
                format: other.to_string(),
                reason: "unsupported format, expected csv or xlsx".to_string(),
            }),
        }
    }
}

/// The tabular result of stage 1: a header row and the data rows beneath
/// it, all as strings — typing happens later, in the translate/resolve
/// stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedImportData {
    /// Column headers, in file order.
    pub headers: Vec<String>,
    /// Data rows, each the same length as `headers`.
    pub rows: Vec<Vec<String>>,
}

/// Decode and parse `content_base64` as `format`, bounded by
/// [`MAX_DECODED_BYTES`].
pub fn parse(
    file_name: &str,
    format: ImportFormat,
    content_base64: &str,
) -> Result<ParsedImportData, ImportError> {
    let bytes = BASE64
        .decode(content_base64)
        .map_err(|e| ImportError::InvalidBase64(e.to_string()))?;
    if bytes.len() > MAX_DECODED_BYTES {
        return Err(ImportError::PayloadTooLarge(bytes.len()));
    }

    match format {
        ImportFormat::Csv => parse_csv(&bytes),
        ImportFormat::Xlsx => parse_xlsx(file_name, &bytes),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<ParsedImportData, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| ImportError::ParseFailed {
            format: "csv".to_string(),
            reason: e.to_string(),
        })?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ImportError::ParseFailed {
            format: "csv".to_string(),
            reason: e.to_string(),
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(ParsedImportData { headers, rows })
}

fn parse_xlsx(file_name: &str, bytes: &[u8]) -> Result<ParsedImportData, ImportError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook: calamine::Xlsx<_> =
        calamine::open_workbook_from_rs(cursor).map_err(|e| ImportError::ParseFailed {
            format: "xlsx".to_string(),
            reason: format!("{file_name}: {e}"),
        })?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ImportError::ParseFailed {
            format: "xlsx".to_string(),
            reason: "workbook has no sheets".to_string(),
        })?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ImportError::ParseFailed {
            format: "xlsx".to_string(),
            reason: e.to_string(),
        })?;

    let mut rows_iter = range.rows();
    let headers = rows_iter
        .next()
        .map(|row| row.iter().map(|c| c.to_string()).collect::<Vec<_>>())
        .unwrap_or_default();

    let rows = rows_iter
        .map(|row| row.iter().map(|c| c.to_string()).collect::<Vec<_>>())
        .collect();

    Ok(ParsedImportData { headers, rows })
}

/// Encode a CSV cell per §4.3 stage 1's quoting rule: wrap in double
/// quotes if the cell contains a comma, double quote, or newline; double
/// any inner quote. Used when the server round-trips a receipt's
/// changeset back out as a downloadable CSV, and by tests exercising the
/// parse stage's assumptions.
pub fn csv_quote(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_known_values() {
        assert_eq!(ImportFormat::parse("csv").unwrap(), ImportFormat::Csv);
        assert_eq!(ImportFormat::parse("xlsx").unwrap(), ImportFormat::Xlsx);
    }

    #[test]
    fn format_rejects_unknown_value() {
        assert!(ImportFormat::parse("json").is_err());
    }

    #[test]
    fn csv_quote_wraps_cell_with_comma() {
        assert_eq!(csv_quote("a,b"), "\"a,b\"");
    }

    #[test]
    fn csv_quote_doubles_inner_quotes() {
        assert_eq!(csv_quote("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn csv_quote_leaves_plain_cell_untouched() {
        assert_eq!(csv_quote("plain"), "plain");
    }

    #[test]
    fn parse_csv_splits_headers_and_rows() {
        let bytes = BASE64.encode("name,level\nKirk,5\nSpock,3\n");
        let parsed = parse("roster.csv", ImportFormat::Csv, &bytes).unwrap();
        assert_eq!(parsed.headers, vec!["name", "level"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0], vec!["Kirk", "5"]);
    }

    #[test]
    fn parse_rejects_invalid_base64() {
        assert!(parse("roster.csv", ImportFormat::Csv, "not base64!!").is_err());
    }

    #[test]
    fn parse_rejects_oversized_payload() {
        let huge = "a".repeat(MAX_DECODED_BYTES + 1);
        let bytes = BASE64.encode(huge);
        assert!(matches!(
            parse("roster.csv", ImportFormat::Csv, &bytes),
            Err(ImportError::PayloadTooLarge(_))
        ));
    }
}
