//! Markdown running-log tables.
//!
//! A log file holds one table: a header row starting with the date label, a
//! `|---|` separator, then one pipe-delimited row per run:
//!
//! ```text
//! | 日期 | 距离 | 时长 | 配速 | 平均心率 | 最大心率 | 体重 | 场地 | 感受 | 备注 |
//! |------|------|------|------|----------|----------|------|------|------|------|
//! | 2024-03-02 | 7.0 | 42.00 | 6:00 | 150 | 165 | 80.2 | 户外 | 8 | easy |
//! ```

use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use crate::{format_number, Record, Venue};

const HEADER_LABELS: [&str; 2] = ["日期", "date"];
const MIN_FIELDS: usize = 9;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("expected at least 9 fields, found {0}")]
    TooFewFields(usize),
    #[error("invalid {field}: '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("{field} out of range: '{value}'")]
    OutOfRange { field: &'static str, value: String },
}

pub(crate) fn is_header_label(text: &str) -> bool {
    let lower = text.to_lowercase();
    HEADER_LABELS.iter().any(|label| lower.starts_with(label))
}

fn is_header(line: &str) -> bool {
    line.strip_prefix('|')
        .map(|rest| is_header_label(rest.trim_start()))
        .unwrap_or(false)
}

fn is_separator(line: &str) -> bool {
    line.starts_with('|')
        && line.contains('-')
        && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
}

/// Fields between the outer pipes, trimmed. Text after the last pipe is dropped.
fn split_fields(line: &str) -> Vec<&str> {
    let segments: Vec<&str> = line.split('|').collect();
    if segments.len() < 2 {
        return Vec::new();
    }
    segments[1..segments.len() - 1]
        .iter()
        .map(|s| s.trim())
        .collect()
}

fn is_absent(text: &str) -> bool {
    text.is_empty() || text == "-"
}

fn parse_number<T: FromStr>(field: &'static str, text: &str) -> Result<T, RowError> {
    text.parse().map_err(|_| RowError::InvalidNumber {
        field,
        value: text.to_string(),
    })
}

fn parse_positive(field: &'static str, text: &str) -> Result<f64, RowError> {
    let value: f64 = parse_number(field, text)?;
    if !value.is_finite() {
        return Err(RowError::InvalidNumber {
            field,
            value: text.to_string(),
        });
    }
    if value <= 0.0 {
        return Err(RowError::OutOfRange {
            field,
            value: text.to_string(),
        });
    }
    Ok(value)
}

fn parse_optional_int<T>(field: &'static str, text: &str) -> Result<Option<T>, RowError>
where
    T: FromStr + PartialEq + Default,
{
    if is_absent(text) {
        return Ok(None);
    }
    let value: T = parse_number(field, text)?;
    // A zero reading means "not recorded".
    Ok(if value == T::default() { None } else { Some(value) })
}

fn parse_optional_weight(text: &str) -> Result<Option<f64>, RowError> {
    if is_absent(text) {
        return Ok(None);
    }
    let value: f64 = parse_number("weight", text)?;
    if !value.is_finite() || value < 0.0 {
        return Err(RowError::OutOfRange {
            field: "weight",
            value: text.to_string(),
        });
    }
    Ok(if value == 0.0 { None } else { Some(value) })
}

/// Parse one pipe-delimited line.
///
/// Returns `Ok(None)` for lines that are not data rows (empty first column or
/// a repeated header), and `Err` for data rows that cannot be converted.
pub fn parse_row(line: &str) -> Result<Option<Record>, RowError> {
    let fields = split_fields(line);
    if fields.len() < MIN_FIELDS {
        return Err(RowError::TooFewFields(fields.len()));
    }
    if fields[0].is_empty() || is_header_label(fields[0]) {
        return Ok(None);
    }

    let feeling = parse_optional_int::<u8>("feeling", fields[8])?;
    if let Some(score) = feeling {
        if score > 10 {
            return Err(RowError::OutOfRange {
                field: "feeling",
                value: fields[8].to_string(),
            });
        }
    }

    Ok(Some(Record {
        date: fields[0].to_string(),
        distance_km: parse_positive("distance", fields[1])?,
        duration_min: parse_positive("duration", fields[2])?,
        pace: fields[3].to_string(),
        avg_hr: parse_optional_int("avg_hr", fields[4])?,
        max_hr: parse_optional_int("max_hr", fields[5])?,
        weight_kg: parse_optional_weight(fields[6])?,
        venue: Venue::from_label(fields[7]),
        feeling,
        note: fields.get(9).map(|s| s.to_string()).unwrap_or_default(),
    }))
}

/// Parse every data row of the log table in `text`.
///
/// Malformed rows are reported and skipped; they never abort the parse.
pub fn parse_log(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut in_table = false;

    for (idx, line) in text.lines().enumerate() {
        if is_header(line) {
            in_table = true;
            continue;
        }
        if !in_table {
            continue;
        }
        if is_separator(line) {
            continue;
        }
        if line.starts_with('|') {
            match parse_row(line) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => {
                    warn!(line = idx + 1, "skipping malformed row ({}): {}", err, line);
                }
            }
        } else if !line.trim_start().starts_with('|') {
            in_table = false;
        }
    }

    records
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

/// Render a record as a log-table row that [`parse_row`] accepts.
pub fn format_row(record: &Record) -> String {
    format!(
        "| {} | {} | {:.2} | {} | {} | {} | {} | {} | {} | {} |",
        record.date,
        format_number(record.distance_km),
        record.duration_min,
        record.pace,
        optional(record.avg_hr),
        optional(record.max_hr),
        record
            .weight_kg
            .map(format_number)
            .unwrap_or_else(|| "-".into()),
        record.venue.label(),
        optional(record.feeling),
        record.note.replace('|', "/"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    const SAMPLE: &str = "\
# 2024-03

| 日期 | 距离 | 时长 | 配速 | 平均心率 | 最大心率 | 体重 | 场地 | 感受 | 备注 |
|------|------|------|------|----------|----------|------|------|------|------|
| 2024-03-02 | 7.0 | 42.00 | 6:00 | 150 | 165 | 80.2 | 户外 | 8 | easy |
| 2024-03-05 | 5 | 31.5 | 6:18 | - | - | - | 跑步机 | - |  |
| 2024-03-09 | 7.1 | 43.5 | 6:07 | 148 | 160 | 79.0 | track | 7 | intervals |

Notes after the table.
| 2024-03-30 | 9.0 | 50 | 5:33 | 150 | 170 | 79.0 | 户外 | 8 | outside table |
";

    #[test]
    fn test_parse_log_reads_table_rows() {
        let records = parse_log(SAMPLE);
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.date, "2024-03-02");
        assert_eq!(first.distance_km, 7.0);
        assert_eq!(first.duration_min, 42.0);
        assert_eq!(first.pace, "6:00");
        assert_eq!(first.avg_hr, Some(150));
        assert_eq!(first.max_hr, Some(165));
        assert_eq!(first.weight_kg, Some(80.2));
        assert_eq!(first.venue, Venue::Outdoor);
        assert_eq!(first.feeling, Some(8));
        assert_eq!(first.note, "easy");

        let second = &records[1];
        assert_eq!(second.avg_hr, None);
        assert_eq!(second.max_hr, None);
        assert_eq!(second.weight_kg, None);
        assert_eq!(second.feeling, None);
        assert_eq!(second.venue, Venue::Treadmill);
        assert_eq!(second.note, "");

        assert_eq!(records[2].venue, Venue::Track);
    }

    #[test]
    fn test_rows_outside_table_are_ignored() {
        let records = parse_log(SAMPLE);
        assert!(records.iter().all(|r| r.note != "outside table"));
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let text = "\
| Date | Distance | Duration | Pace | Avg HR | Max HR | Weight | Venue | Feeling | Note |
|---|---|---|---|---|---|---|---|---|---|
| 2024-04-01 | abc | 30 | 6:00 | 150 | 160 | 80 | outdoor | 7 | bad distance |
| 2024-04-02 | 5.0 | 30 | 6:00 |
| 2024-04-03 | 5.0 | x | 6:00 | 150 | 160 | 80 | outdoor | 7 | bad duration |
| 2024-04-04 | 5.0 | 30 | 6:00 | 150.5 | 160 | 80 | outdoor | 7 | fractional hr |
| 2024-04-05 | 5.0 | 30 | 6:00 | 150 | 160 | 80 | outdoor | 7 | good |
";
        let records = parse_log(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].note, "good");
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_short_rows_are_warned_about() {
        let text = "\
| 日期 | 距离 | 时长 | 配速 | 平均心率 | 最大心率 | 体重 | 场地 | 感受 | 备注 |
|---|---|---|---|---|---|---|---|---|---|
| 2024-03-02 | 7.0 | 42.00 |
| 2024-03-03 | 5.0 | 30.00 | 6:00 | 150 | 160 | - | 户外 | 7 | ok |
";
        let captured = CapturedLog::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let records = tracing::subscriber::with_default(subscriber, || parse_log(text));

        assert_eq!(records.len(), 1);
        let log = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(log.contains("WARN"));
        assert!(log.contains("expected at least 9 fields, found 3"));
    }

    #[test]
    fn test_parse_row_errors() {
        assert_eq!(
            parse_row("| 2024-04-02 | 5.0 | 30 | 6:00 |"),
            Err(RowError::TooFewFields(4))
        );
        assert_eq!(
            parse_row("| 2024-04-01 | abc | 30 | 6:00 | - | - | - | 户外 | - | |"),
            Err(RowError::InvalidNumber {
                field: "distance",
                value: "abc".into()
            })
        );
        assert_eq!(
            parse_row("| 2024-04-01 | 5 | 30 | 6:00 | - | - | - | 户外 | 11 | |"),
            Err(RowError::OutOfRange {
                field: "feeling",
                value: "11".into()
            })
        );
        assert_eq!(
            parse_row("| 日期 | 5 | 30 | 6:00 | - | - | - | 户外 | - | |"),
            Ok(None)
        );
        assert_eq!(parse_row("|  | 5 | 30 | 6:00 | - | - | - | 户外 | - | |"), Ok(None));
    }

    #[test]
    fn test_nine_fields_without_note() {
        let record = parse_row("| 2024-04-05 | 5.0 | 30 | 6:00 | 150 | 160 | 80 | outdoor | 7 |")
            .unwrap()
            .unwrap();
        assert_eq!(record.feeling, Some(7));
        assert_eq!(record.note, "");
    }

    #[test]
    fn test_zero_readings_are_absent() {
        let record = parse_row("| 2024-04-05 | 5.0 | 30 | 6:00 | 0 | 0 | 0 | outdoor | 0 | |")
            .unwrap()
            .unwrap();
        assert_eq!(record.avg_hr, None);
        assert_eq!(record.max_hr, None);
        assert_eq!(record.weight_kg, None);
        assert_eq!(record.feeling, None);
    }

    #[test]
    fn test_format_then_parse_reproduces_record() {
        let record = Record {
            date: "2024-05-01".into(),
            distance_km: 70.5,
            duration_min: 42.0,
            pace: "5:58".into(),
            avg_hr: Some(150),
            max_hr: Some(165),
            weight_kg: Some(80.2),
            venue: Venue::Outdoor,
            feeling: Some(8),
            note: "tempo".into(),
        };
        let row = format_row(&record);
        assert_eq!(
            row,
            "| 2024-05-01 | 70.5 | 42.00 | 5:58 | 150 | 165 | 80.2 | 户外 | 8 | tempo |"
        );
        assert_eq!(parse_row(&row), Ok(Some(record)));
    }

    #[test]
    fn test_format_row_absent_fields_and_pipes() {
        let record = Record {
            date: "2024-05-02".into(),
            distance_km: 5.0,
            duration_min: 31.25,
            pace: "6:15".into(),
            avg_hr: None,
            max_hr: None,
            weight_kg: None,
            venue: Venue::Custom("park".into()),
            feeling: None,
            note: "a|b".into(),
        };
        let row = format_row(&record);
        assert_eq!(row, "| 2024-05-02 | 5.0 | 31.25 | 6:15 | - | - | - | park | - | a/b |");
        let parsed = parse_row(&row).unwrap().unwrap();
        assert_eq!(parsed.note, "a/b");
        assert_eq!(parsed.venue, Venue::Custom("park".into()));
    }
}
