//! Treatment workflow on top of the patient and session stores.
//!
//! These functions are what a shell calls: they validate input before any
//! store call, sequence multi-step operations, and log store failures. No
//! retries happen here; a failed call leaves the caller's state intact so
//! the user can trigger it again.

use crate::counter::{CounterState, SessionCounter};
use crate::store::{PatientStore, SessionStore};
use crate::{
    Error, NewPatient, PatientPatch, PatientRecord, PatientSummary, Result, SessionRecord,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn register_patient<S: PatientStore>(
    store: &mut S,
    fields: NewPatient,
) -> Result<PatientRecord> {
    let fields = fields.normalized();
    fields.validate()?;
    store.insert_patient(fields).map_err(|e| {
        tracing::warn!("Failed to register patient: {}", e);
        e
    })
}

pub fn edit_patient<S: PatientStore>(
    store: &mut S,
    id: Uuid,
    patch: PatientPatch,
) -> Result<PatientRecord> {
    patch.validate()?;
    if patch.is_empty() {
        return store.get_patient(id);
    }
    store.update_patient(id, patch).map_err(|e| {
        tracing::warn!("Failed to update patient {}: {}", id, e);
        e
    })
}

/// Find a patient by id or, failing that, by medical record number
pub fn resolve_patient<S: PatientStore>(store: &S, key: &str) -> Result<PatientRecord> {
    let key = key.trim();
    if let Ok(id) = Uuid::parse_str(key) {
        return store.get_patient(id);
    }
    store
        .list_patients()?
        .into_iter()
        .find(|p| p.medical_record_number == key)
        .ok_or_else(|| Error::patient_not_found(key))
}

/// Patients (newest first) with session statistics, optionally filtered by
/// a case-insensitive match on name or medical record number
pub fn list_patients<S: PatientStore + SessionStore>(
    store: &S,
    search: Option<&str>,
) -> Result<Vec<PatientSummary>> {
    let needle = search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut summaries = Vec::new();
    for patient in store.list_patients()? {
        if let Some(needle) = &needle {
            let matches = patient.name.to_lowercase().contains(needle)
                || patient.medical_record_number.to_lowercase().contains(needle);
            if !matches {
                continue;
            }
        }
        let sessions = store.list_sessions(patient.id)?;
        summaries.push(PatientSummary {
            session_count: sessions.len(),
            last_session: sessions.first().map(|s| s.created_at),
            patient,
        });
    }
    Ok(summaries)
}

/// Persist the counter's current counts.
///
/// A draft is inserted for `patient_id` and the counter is zeroed; an
/// amended record is updated in place and the counter keeps its counts,
/// provided it belongs to `patient_id`. A zero total is rejected before the
/// store is touched. On store failure the counter is left as it was.
pub fn save_session<S: PatientStore + SessionStore>(
    store: &mut S,
    counter: &mut SessionCounter,
    patient_id: Uuid,
) -> Result<SessionRecord> {
    match counter.state() {
        CounterState::Amending { session_id } => {
            let patch = counter.to_patch()?;
            let existing = store.get_session(session_id)?;
            if existing.patient_id != patient_id {
                return Err(Error::Validation(format!(
                    "session {} belongs to patient {}, not {}",
                    session_id, existing.patient_id, patient_id
                )));
            }
            let session = store.update_session(session_id, patch).map_err(|e| {
                tracing::warn!("Failed to update session {}: {}", session_id, e);
                e
            })?;
            tracing::info!(
                "Updated session {} to {} needles",
                session.id,
                session.total_needles
            );
            Ok(session)
        }
        CounterState::Drafting | CounterState::Saved { .. } => {
            let payload = counter.to_record(patient_id)?;
            let session = store.insert_session(payload).map_err(|e| {
                tracing::warn!("Failed to save session for patient {}: {}", patient_id, e);
                e
            })?;
            counter.mark_saved(session.id);
            Ok(session)
        }
    }
}

/// Open an existing session for editing
pub fn load_session<S: SessionStore>(store: &S, session_id: Uuid) -> Result<SessionCounter> {
    let session = store.get_session(session_id)?;
    Ok(SessionCounter::from_record(&session))
}

/// Record that the needles of a session were removed at `now`.
///
/// Rejected when removal was already recorded.
pub fn complete_needle_removal<S: SessionStore>(
    store: &mut S,
    session_id: Uuid,
    now: DateTime<Utc>,
) -> Result<SessionRecord> {
    let session = store.get_session(session_id)?;
    let patch = SessionCounter::complete_needle_removal(&session, now)?;
    let updated = store.update_session(session_id, patch)?;
    tracing::info!("Needles removed for session {}", session_id);
    Ok(updated)
}

/// Delete a patient and all of their sessions.
///
/// Sessions go first so no session is left pointing at a missing patient.
/// The two steps are not atomic: if deleting the patient fails afterwards,
/// `Error::PartialDelete` reports the half-finished state.
pub fn delete_patient<S: PatientStore + SessionStore>(store: &mut S, id: Uuid) -> Result<()> {
    store.get_patient(id)?;
    store.delete_sessions(id)?;
    store.delete_patient(id).map_err(|e| {
        tracing::error!(
            "Deleted sessions of patient {} but failed to delete the patient: {}",
            id,
            e
        );
        Error::PartialDelete {
            patient_id: id,
            reason: e.to_string(),
        }
    })
}
