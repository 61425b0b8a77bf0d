//! CSV export of the record collection.
//!
//! The file is UTF-8 with a byte-order mark so spreadsheet tools pick the
//! right encoding, and carries a fixed 12-column header. Challenge labels
//! are joined with `|`, so a label containing `|` does not survive a
//! round trip.

use crate::models::SurveyRecord;
#[cfg(test)]
use crate::models::{Department, InjectionSite, NeedleSize, PatientAgeGroup, Rating};
use chrono::{NaiveDate, SecondsFormat};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Column headers, in export order.
pub const EXPORT_HEADERS: [&str; 12] = [
    "ID", "時間", "單位", "年資", "推薦人", "病患族群", "部位", "針頭", "自信度", "成功率", "困難", "回饋",
];

/// Written in the recommender column when there is none.
pub const NO_RECOMMENDER: &str = "無";

const BOM: &str = "\u{feff}";
const CHALLENGE_SEPARATOR: &str = "|";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(test)]
    #[error("row {row}: invalid {column} '{value}'")]
    InvalidField {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[cfg(test)]
    #[error("row {row}: expected {expected} columns, found {found}")]
    ColumnCount {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Name of the export file for `date`.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("IV_Care_Feedback_{}.csv", date.format("%Y-%m-%d"))
}

fn record_row(record: &SurveyRecord) -> [String; 12] {
    [
        record.id.clone(),
        record
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        record.department.to_string(),
        record.experience_years.to_string(),
        record
            .recommender
            .clone()
            .unwrap_or_else(|| NO_RECOMMENDER.to_string()),
        record.patient_age_group.to_string(),
        record.injection_site.to_string(),
        record.needle_size.to_string(),
        record.confidence_level.to_string(),
        record.technique_rating.to_string(),
        record.top_challenges.join(CHALLENGE_SEPARATOR),
        record.feedback_text.replace("\r\n", " ").replace('\n', " "),
    ]
}

/// Render the export file contents, BOM included.
pub fn export_csv(records: &[SurveyRecord]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(BOM.as_bytes().to_vec());

    writer.write_record(EXPORT_HEADERS)?;
    for record in records {
        writer.write_record(record_row(record))?;
    }

    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

/// Write the export for `date` into `dir`, returning the file path.
pub fn write_export(
    records: &[SurveyRecord],
    dir: &Path,
    date: NaiveDate,
) -> Result<PathBuf, ExportError> {
    let bytes = export_csv(records)?;

    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(date));
    std::fs::write(&path, bytes)?;

    info!("Exported {} records to {}", records.len(), path.display());
    Ok(path)
}

/// One row read back from an export file.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub id: String,
    pub timestamp: String,
    pub department: Department,
    pub experience_years: u32,
    pub recommender: Option<String>,
    pub patient_age_group: PatientAgeGroup,
    pub injection_site: InjectionSite,
    pub needle_size: NeedleSize,
    pub confidence_level: Rating,
    pub technique_rating: Rating,
    pub top_challenges: Vec<String>,
    pub feedback_text: String,
}

/// Read an export file back. The BOM and header row are skipped.
#[cfg(test)]
pub fn parse_export(bytes: &[u8]) -> Result<Vec<ExportRow>, ExportError> {
    let bytes = bytes.strip_prefix(BOM.as_bytes()).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let row = i + 1;

        if record.len() != EXPORT_HEADERS.len() {
            return Err(ExportError::ColumnCount {
                row,
                expected: EXPORT_HEADERS.len(),
                found: record.len(),
            });
        }

        let field = |index: usize| record.get(index).unwrap_or_default();
        let invalid = |column: &'static str, value: &str| ExportError::InvalidField {
            row,
            column,
            value: value.to_string(),
        };
        let rating = |index: usize, column: &'static str| {
            field(index)
                .parse::<u8>()
                .ok()
                .and_then(Rating::new)
                .ok_or_else(|| invalid(column, field(index)))
        };

        let recommender = field(4);
        let challenges = field(10);

        rows.push(ExportRow {
            id: field(0).to_string(),
            timestamp: field(1).to_string(),
            department: field(2).parse().map_err(|_| invalid("department", field(2)))?,
            experience_years: field(3)
                .parse()
                .map_err(|_| invalid("experience", field(3)))?,
            recommender: (recommender != NO_RECOMMENDER && !recommender.is_empty())
                .then(|| recommender.to_string()),
            patient_age_group: field(5)
                .parse()
                .map_err(|_| invalid("patient age group", field(5)))?,
            injection_site: field(6).parse().map_err(|_| invalid("site", field(6)))?,
            needle_size: field(7).parse().map_err(|_| invalid("needle", field(7)))?,
            confidence_level: rating(8, "confidence")?,
            technique_rating: rating(9, "technique")?,
            top_challenges: challenges
                .split(CHALLENGE_SEPARATOR)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
            feedback_text: field(11).to_string(),
        });
    }

    Ok(rows)
}
