//! File-backed store holding patients and sessions in one JSON document.
//!
//! Every operation takes a lock on a sidecar `.lock` file: shared for reads,
//! exclusive for the whole load-modify-save cycle of a write. Writes go to a
//! temp file that is synced and renamed over the document, so a reader never
//! sees a half-written store. Deleting sessions and the patient share a
//! document, but remain two separate commits.

use crate::store::{PatientStore, SessionStore, StoreData};
use crate::{
    Error, NewPatient, NewSession, PatientPatch, PatientRecord, Result, SessionPatch,
    SessionRecord,
};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Open (creating if needed) the sidecar lock of a document, e.g.
/// `store.lock` for `store.json`. Saves rename over the document, so the
/// lock must live beside it.
pub(crate) fn open_lock_file(document: &Path) -> Result<File> {
    if let Some(parent) = document.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(document.with_extension("lock"))?;
    Ok(file)
}

/// Store document living at `<data_dir>/store.json`
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store inside a data directory using the standard file name
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("store.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_lock(&self) -> Result<File> {
        open_lock_file(&self.path)
    }

    /// Run `f` against a consistent snapshot of the store
    fn read<T>(&self, f: impl FnOnce(&StoreData) -> Result<T>) -> Result<T> {
        let lock = self.open_lock()?;
        lock.lock_shared()?;
        let result = self.load_unlocked().and_then(|data| f(&data));
        lock.unlock()?;
        result
    }

    /// Load, modify and save the store under an exclusive lock.
    ///
    /// Nothing is written when `f` fails.
    fn write<T>(&self, f: impl FnOnce(&mut StoreData) -> Result<T>) -> Result<T> {
        let lock = self.open_lock()?;
        lock.lock_exclusive()?;
        let result = self.load_unlocked().and_then(|mut data| {
            let value = f(&mut data)?;
            self.save_unlocked(&data)?;
            Ok(value)
        });
        lock.unlock()?;
        result
    }

    fn load_unlocked(&self) -> Result<StoreData> {
        if !self.path.exists() {
            tracing::debug!("No store file at {:?}, starting empty", self.path);
            return Ok(StoreData::default());
        }

        let mut contents = String::new();
        File::open(&self.path)?.read_to_string(&mut contents)?;

        let mut data: StoreData = serde_json::from_str(&contents).map_err(|e| {
            tracing::error!("Store file {:?} is unreadable: {}", self.path, e);
            Error::TransientStore(format!("store file {:?} is unreadable: {}", self.path, e))
        })?;

        for session in &mut data.sessions {
            if session.normalize_total() {
                tracing::warn!(
                    "Session {} had a stale total, recomputed to {}",
                    session.id,
                    session.total_needles
                );
            }
        }
        Ok(data)
    }

    fn save_unlocked(&self, data: &StoreData) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "store path missing parent")
        })?;
        let temp = NamedTempFile::new_in(parent)?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, data)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(
            "Saved store to {:?} ({} patients, {} sessions)",
            self.path,
            data.patients.len(),
            data.sessions.len()
        );
        Ok(())
    }
}

impl PatientStore for JsonStore {
    fn get_patient(&self, id: Uuid) -> Result<PatientRecord> {
        self.read(|data| data.get_patient(id))
    }

    fn list_patients(&self) -> Result<Vec<PatientRecord>> {
        self.read(|data| Ok(data.list_patients()))
    }

    fn insert_patient(&mut self, fields: NewPatient) -> Result<PatientRecord> {
        let patient = self.write(|data| data.insert_patient(fields))?;
        tracing::info!("Inserted patient {}", patient.id);
        Ok(patient)
    }

    fn update_patient(&mut self, id: Uuid, patch: PatientPatch) -> Result<PatientRecord> {
        self.write(|data| data.update_patient(id, patch))
    }

    fn delete_patient(&mut self, id: Uuid) -> Result<()> {
        self.write(|data| data.delete_patient(id))?;
        tracing::info!("Deleted patient {}", id);
        Ok(())
    }
}

impl SessionStore for JsonStore {
    fn list_sessions(&self, patient_id: Uuid) -> Result<Vec<SessionRecord>> {
        self.read(|data| Ok(data.list_sessions(patient_id)))
    }

    fn get_session(&self, id: Uuid) -> Result<SessionRecord> {
        self.read(|data| data.get_session(id))
    }

    fn insert_session(&mut self, fields: NewSession) -> Result<SessionRecord> {
        let session = self.write(|data| data.insert_session(fields))?;
        tracing::info!(
            "Inserted session {} for patient {} ({} needles)",
            session.id,
            session.patient_id,
            session.total_needles
        );
        Ok(session)
    }

    fn update_session(&mut self, id: Uuid, patch: SessionPatch) -> Result<SessionRecord> {
        self.write(|data| data.update_session(id, patch))
    }

    fn delete_sessions(&mut self, patient_id: Uuid) -> Result<()> {
        let removed = self.write(|data| Ok(data.delete_sessions(patient_id)))?;
        tracing::info!("Deleted {} sessions of patient {}", removed, patient_id);
        Ok(())
    }
}
