//! Persistence contracts for patients and sessions.
//!
//! `PatientStore` and `SessionStore` are the seams the treatment flow talks
//! to. `MemoryStore` keeps everything in process; `JsonStore` (see
//! `json_store`) persists to a locked JSON document on disk.

use crate::{
    Error, NewPatient, NewSession, PatientPatch, PatientRecord, Result, SessionPatch,
    SessionRecord,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// CRUD over patient records with a unique medical record number
pub trait PatientStore {
    fn get_patient(&self, id: Uuid) -> Result<PatientRecord>;
    /// All patients, newest first
    fn list_patients(&self) -> Result<Vec<PatientRecord>>;
    fn insert_patient(&mut self, fields: NewPatient) -> Result<PatientRecord>;
    fn update_patient(&mut self, id: Uuid, patch: PatientPatch) -> Result<PatientRecord>;
    fn delete_patient(&mut self, id: Uuid) -> Result<()>;
}

/// CRUD over session records referencing a patient
pub trait SessionStore {
    /// Sessions of one patient, newest first
    fn list_sessions(&self, patient_id: Uuid) -> Result<Vec<SessionRecord>>;
    fn get_session(&self, id: Uuid) -> Result<SessionRecord>;
    fn insert_session(&mut self, fields: NewSession) -> Result<SessionRecord>;
    fn update_session(&mut self, id: Uuid, patch: SessionPatch) -> Result<SessionRecord>;
    fn delete_sessions(&mut self, patient_id: Uuid) -> Result<()>;
}

/// Plain data held by every store implementation
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreData {
    #[serde(default)]
    pub patients: Vec<PatientRecord>,
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
}

impl StoreData {
    pub(crate) fn get_patient(&self, id: Uuid) -> Result<PatientRecord> {
        self.patients
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| Error::patient_not_found(id))
    }

    pub(crate) fn list_patients(&self) -> Vec<PatientRecord> {
        let mut patients = self.patients.clone();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        patients
    }

    fn ensure_unique_mrn(&self, mrn: &str, except: Option<Uuid>) -> Result<()> {
        let taken = self
            .patients
            .iter()
            .any(|p| p.medical_record_number == mrn && Some(p.id) != except);
        if taken {
            return Err(Error::Conflict(mrn.to_string()));
        }
        Ok(())
    }

    pub(crate) fn insert_patient(&mut self, fields: NewPatient) -> Result<PatientRecord> {
        let fields = fields.normalized();
        fields.validate()?;
        self.ensure_unique_mrn(&fields.medical_record_number, None)?;

        let patient = PatientRecord {
            id: Uuid::new_v4(),
            medical_record_number: fields.medical_record_number,
            name: fields.name,
            gender: fields.gender,
            patient_group: fields.patient_group,
            bed_number: fields.bed_number,
            created_at: Utc::now(),
        };
        self.patients.push(patient.clone());
        Ok(patient)
    }

    pub(crate) fn update_patient(
        &mut self,
        id: Uuid,
        patch: PatientPatch,
    ) -> Result<PatientRecord> {
        patch.validate()?;
        let index = self
            .patients
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::patient_not_found(id))?;
        if let Some(mrn) = &patch.medical_record_number {
            self.ensure_unique_mrn(mrn.trim(), Some(id))?;
        }
        let patient = &mut self.patients[index];
        patch.apply(patient);
        Ok(patient.clone())
    }

    pub(crate) fn delete_patient(&mut self, id: Uuid) -> Result<()> {
        if self.sessions.iter().any(|s| s.patient_id == id) {
            return Err(Error::TransientStore(format!(
                "patient {} still has sessions",
                id
            )));
        }
        let before = self.patients.len();
        self.patients.retain(|p| p.id != id);
        if self.patients.len() == before {
            return Err(Error::patient_not_found(id));
        }
        Ok(())
    }

    pub(crate) fn list_sessions(&self, patient_id: Uuid) -> Vec<SessionRecord> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .filter(|s| s.patient_id == patient_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    pub(crate) fn get_session(&self, id: Uuid) -> Result<SessionRecord> {
        self.sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::session_not_found(id))
    }

    pub(crate) fn insert_session(&mut self, fields: NewSession) -> Result<SessionRecord> {
        // Foreign key on patient_id
        if !self.patients.iter().any(|p| p.id == fields.patient_id) {
            return Err(Error::patient_not_found(fields.patient_id));
        }
        let mut session = SessionRecord {
            id: Uuid::new_v4(),
            patient_id: fields.patient_id,
            counts: fields.counts,
            total_needles: fields.total_needles,
            created_at: Utc::now(),
            needle_removal_time: None,
        };
        session.normalize_total();
        self.sessions.push(session.clone());
        Ok(session)
    }

    pub(crate) fn update_session(
        &mut self,
        id: Uuid,
        patch: SessionPatch,
    ) -> Result<SessionRecord> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::session_not_found(id))?;
        patch.apply(session)?;
        Ok(session.clone())
    }

    pub(crate) fn delete_sessions(&mut self, patient_id: Uuid) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.patient_id != patient_id);
        before - self.sessions.len()
    }
}

/// In-process store, used by tests and embedding shells
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    data: StoreData,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PatientStore for MemoryStore {
    fn get_patient(&self, id: Uuid) -> Result<PatientRecord> {
        self.data.get_patient(id)
    }

    fn list_patients(&self) -> Result<Vec<PatientRecord>> {
        Ok(self.data.list_patients())
    }

    fn insert_patient(&mut self, fields: NewPatient) -> Result<PatientRecord> {
        self.data.insert_patient(fields)
    }

    fn update_patient(&mut self, id: Uuid, patch: PatientPatch) -> Result<PatientRecord> {
        self.data.update_patient(id, patch)
    }

    fn delete_patient(&mut self, id: Uuid) -> Result<()> {
        self.data.delete_patient(id)
    }
}

impl SessionStore for MemoryStore {
    fn list_sessions(&self, patient_id: Uuid) -> Result<Vec<SessionRecord>> {
        Ok(self.data.list_sessions(patient_id))
    }

    fn get_session(&self, id: Uuid) -> Result<SessionRecord> {
        self.data.get_session(id)
    }

    fn insert_session(&mut self, fields: NewSession) -> Result<SessionRecord> {
        self.data.insert_session(fields)
    }

    fn update_session(&mut self, id: Uuid, patch: SessionPatch) -> Result<SessionRecord> {
        self.data.update_session(id, patch)
    }

    fn delete_sessions(&mut self, patient_id: Uuid) -> Result<()> {
        self.data.delete_sessions(patient_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Gender, RegionCounts};

    fn counts(head: u32) -> RegionCounts {
        RegionCounts {
            head,
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicate_mrn_conflicts() {
        let mut store = MemoryStore::new();
        store
            .insert_patient(NewPatient::new("A001", "Chen", Gender::Male))
            .unwrap();
        let dup = store.insert_patient(NewPatient::new("A001", "Lin", Gender::Female));
        assert!(matches!(dup, Err(Error::Conflict(mrn)) if mrn == "A001"));
    }

    #[test]
    fn test_update_to_taken_mrn_conflicts() {
        let mut store = MemoryStore::new();
        store
            .insert_patient(NewPatient::new("A001", "Chen", Gender::Male))
            .unwrap();
        let lin = store
            .insert_patient(NewPatient::new("A002", "Lin", Gender::Female))
            .unwrap();

        let patch = PatientPatch {
            medical_record_number: Some("A001".into()),
            ..Default::default()
        };
        assert!(matches!(
            store.update_patient(lin.id, patch),
            Err(Error::Conflict(_))
        ));

        // Keeping one's own MRN is fine
        let patch = PatientPatch {
            medical_record_number: Some("A002".into()),
            bed_number: Some("12".into()),
            ..Default::default()
        };
        let updated = store.update_patient(lin.id, patch).unwrap();
        assert_eq!(updated.bed_number.as_deref(), Some("12"));
    }

    #[test]
    fn test_sessions_listed_newest_first() {
        let mut store = MemoryStore::new();
        let patient = store
            .insert_patient(NewPatient::new("A001", "Chen", Gender::Male))
            .unwrap();
        let first = store
            .insert_session(NewSession::new(patient.id, counts(1)))
            .unwrap();
        let second = store
            .insert_session(NewSession::new(patient.id, counts(2)))
            .unwrap();
        // Force distinct timestamps regardless of clock resolution
        store.data.sessions[0].created_at = second.created_at - chrono::Duration::seconds(1);

        let listed = store.list_sessions(patient.id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[test]
    fn test_session_requires_existing_patient() {
        let mut store = MemoryStore::new();
        let result = store.insert_session(NewSession::new(Uuid::new_v4(), counts(1)));
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_patient_with_sessions_cannot_be_deleted_directly() {
        let mut store = MemoryStore::new();
        let patient = store
            .insert_patient(NewPatient::new("A001", "Chen", Gender::Male))
            .unwrap();
        store
            .insert_session(NewSession::new(patient.id, counts(1)))
            .unwrap();

        assert!(store.delete_patient(patient.id).is_err());
        store.delete_sessions(patient.id).unwrap();
        store.delete_patient(patient.id).unwrap();
        assert!(matches!(
            store.get_patient(patient.id),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_update_missing_patient_is_not_found_before_conflict() {
        let mut store = MemoryStore::new();
        store
            .insert_patient(NewPatient::new("A001", "Chen", Gender::Male))
            .unwrap();
        let patch = PatientPatch {
            medical_record_number: Some("A001".into()),
            ..Default::default()
        };
        assert!(matches!(
            store.update_patient(Uuid::new_v4(), patch),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_second_removal_time_rejected_by_store() {
        let mut store = MemoryStore::new();
        let patient = store
            .insert_patient(NewPatient::new("A001", "Chen", Gender::Male))
            .unwrap();
        let session = store
            .insert_session(NewSession::new(patient.id, counts(2)))
            .unwrap();
        let first = session.created_at + chrono::Duration::minutes(20);
        let removal = |at| SessionPatch {
            counts: None,
            needle_removal_time: Some(at),
        };

        store.update_session(session.id, removal(first)).unwrap();
        let again = store.update_session(session.id, removal(first + chrono::Duration::minutes(5)));
        assert!(matches!(again, Err(Error::InvalidTransition(_))));
        assert_eq!(
            store.get_session(session.id).unwrap().needle_removal_time,
            Some(first)
        );
    }

    #[test]
    fn test_update_missing_session() {
        let mut store = MemoryStore::new();
        let result = store.update_session(Uuid::new_v4(), SessionPatch::counts(counts(1)));
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }
}
