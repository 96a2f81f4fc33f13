//! Batch record sources.
//!
//! `.json` files hold an array of records; anything else (including `-` for
//! stdin) is read as JSON lines. Rows that cannot be decoded become
//! per-record schema errors so one bad line never sinks the batch.

use crate::error::ScoringError;
use crate::types::applicant::RawApplicantRecord;
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::info;

/// A decoded row, or the reason it could not be decoded
pub type SourceRecord = Result<RawApplicantRecord, ScoringError>;

/// Read records from `path`, or stdin when `path` is `-`.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<SourceRecord>> {
    let path = path.as_ref();

    let records = if path == Path::new("-") {
        parse_json_lines(std::io::stdin().lock())?
    } else {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open input {}", path.display()))?;
        if path.extension().is_some_and(|ext| ext == "json") {
            parse_json_array(file)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            parse_json_lines(BufReader::new(file))?
        }
    };

    info!(
        source = %path.display(),
        records = records.len(),
        invalid = records.iter().filter(|r| r.is_err()).count(),
        "Input records read"
    );

    Ok(records)
}

/// One JSON object per line; blank lines are skipped.
pub fn parse_json_lines<R: BufRead>(reader: R) -> Result<Vec<SourceRecord>> {
    let mut records = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", number + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(RawApplicantRecord::from_json_str(&line));
    }
    Ok(records)
}

/// A top-level JSON array of objects.
pub fn parse_json_array<R: Read>(reader: R) -> Result<Vec<SourceRecord>> {
    let rows: Vec<serde_json::Value> =
        serde_json::from_reader(reader).context("Expected a JSON array of records")?;
    Ok(rows
        .into_iter()
        .map(RawApplicantRecord::from_json_value)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lines_keep_bad_rows_in_place() {
        let input = "{\"person_age\": 30}\n\n{\"person_age\": \"old\"}\nnot json\n{\"person_age\": 45}\n";
        let records = parse_json_lines(input.as_bytes()).unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].as_ref().unwrap().person_age, Some(30));
        assert!(records[1].is_err());
        assert!(records[2].is_err());
        assert_eq!(records[3].as_ref().unwrap().person_age, Some(45));
    }

    #[test]
    fn test_json_array() {
        let input = r#"[{"loan_grade": "A"}, 3, {"loan_grade": "C"}]"#;
        let records = parse_json_array(input.as_bytes()).unwrap();

        assert_eq!(records.len(), 3);
        assert!(records[1].is_err());
        assert_eq!(
            records[2].as_ref().unwrap().loan_grade.as_deref(),
            Some("C")
        );
    }

    #[test]
    fn test_json_array_requires_array() {
        assert!(parse_json_array(r#"{"loan_grade": "A"}"#.as_bytes()).is_err());
    }

    #[test]
    fn test_read_records_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.jsonl");
        std::fs::write(&path, "{\"person_age\": 22}\n{\"person_age\": 23}\n").unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
    }
}
