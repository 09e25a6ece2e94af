//! CSV export of normalized records.

use std::io::Write;

use survey_map_codec::fields::CANONICAL_COLUMNS;
use survey_map_survey_models::SurveyRecord;

use crate::SurveyError;

/// File name offered for downloads.
pub const EXPORT_FILE_NAME: &str = "encuestas_pavas.csv";

/// Writes `records` as CSV with the canonical columns as header.
///
/// Coordinates appear only through the map-link column.
///
/// # Errors
///
/// Returns [`SurveyError::Csv`] if writing fails.
pub fn write_csv<W: Write>(records: &[SurveyRecord], writer: W) -> Result<(), SurveyError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CANONICAL_COLUMNS)?;
    for record in records {
        csv.write_record([
            record.submitted_at.as_str(),
            record.neighborhood.as_str(),
            record.risk_factors.join("; ").as_str(),
            record.related_crimes.as_str(),
            record.linked_to_structure.as_str(),
            record.structure_name.as_str(),
            record.notes.as_str(),
            record.map_link.as_str(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Renders `records` as CSV bytes.
///
/// # Errors
///
/// Returns [`SurveyError::Csv`] if serialization fails.
pub fn to_csv_bytes(records: &[SurveyRecord]) -> Result<Vec<u8>, SurveyError> {
    let mut out = Vec::new();
    write_csv(records, &mut out)?;
    Ok(out)
}
