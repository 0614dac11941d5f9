//! CSV export of a patient's treatment history.

use crate::{PatientRecord, Result, SessionRecord};
use std::fs::OpenOptions;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    session_id: String,
    medical_record_number: &'a str,
    patient_name: &'a str,
    created_at: String,
    head: u32,
    trunk: u32,
    left_arm: u32,
    right_arm: u32,
    left_leg: u32,
    right_leg: u32,
    total_needles: u32,
    needle_removal_time: Option<String>,
}

impl<'a> CsvRow<'a> {
    fn new(patient: &'a PatientRecord, session: &SessionRecord) -> Self {
        let c = &session.counts;
        CsvRow {
            session_id: session.id.to_string(),
            medical_record_number: &patient.medical_record_number,
            patient_name: &patient.name,
            created_at: session.created_at.to_rfc3339(),
            head: c.head,
            trunk: c.trunk,
            left_arm: c.left_arm,
            right_arm: c.right_arm,
            left_leg: c.left_leg,
            right_leg: c.right_leg,
            total_needles: c.total(),
            needle_removal_time: session.needle_removal_time.map(|t| t.to_rfc3339()),
        }
    }
}

/// Append a patient's sessions to a CSV file.
///
/// Headers are written only when the file is new or empty. The file is
/// synced before returning. Returns the number of rows written.
pub fn export_sessions_csv(
    patient: &PatientRecord,
    sessions: &[SessionRecord],
    csv_path: &Path,
) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for session in sessions.iter().filter(|s| s.patient_id == patient.id) {
        writer.serialize(CsvRow::new(patient, session))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    let written = sessions.iter().filter(|s| s.patient_id == patient.id).count();
    tracing::info!(
        "Exported {} sessions of patient {} to {:?}",
        written,
        patient.id,
        csv_path
    );
    Ok(written)
}
