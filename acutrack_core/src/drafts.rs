//! Persistence of in-progress counters between shell invocations.
//!
//! A command-line shell exits after every command, so the counter of the
//! session being built for each patient is parked in a drafts file. Drafts
//! are scratch state: an unreadable file is logged and treated as empty.

use crate::json_store::open_lock_file;
use crate::{Error, Result, SessionCounter};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Open counters keyed by patient id
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct DraftBook {
    pub drafts: HashMap<Uuid, SessionCounter>,
}

impl DraftBook {
    /// The patient's draft, creating an empty one if needed
    pub fn counter_mut(&mut self, patient_id: Uuid) -> &mut SessionCounter {
        self.drafts.entry(patient_id).or_default()
    }

    pub fn counter(&self, patient_id: Uuid) -> Option<&SessionCounter> {
        self.drafts.get(&patient_id)
    }

    /// Drop the patient's draft, returning it
    pub fn discard(&mut self, patient_id: Uuid) -> Option<SessionCounter> {
        self.drafts.remove(&patient_id)
    }

    /// Load drafts with a shared lock; missing or corrupt files yield no drafts
    pub fn load(path: &Path) -> Result<Self> {
        let lock = open_lock_file(path)?;
        lock.lock_shared()?;
        let book = Self::load_unlocked(path);
        lock.unlock()?;
        Ok(book)
    }

    /// Load drafts, modify them, and atomically save them back.
    ///
    /// The exclusive lock is held for the whole cycle, so concurrent
    /// updates are applied one after the other. Nothing is written when
    /// `f` fails.
    pub fn update<F, T>(path: &Path, f: F) -> Result<T>
    where
        F: FnOnce(&mut DraftBook) -> Result<T>,
    {
        let lock = open_lock_file(path)?;
        lock.lock_exclusive()?;
        let mut book = Self::load_unlocked(path);
        let result = f(&mut book).and_then(|value| {
            book.save_unlocked(path)?;
            Ok(value)
        });
        lock.unlock()?;
        result
    }

    fn load_unlocked(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!("No drafts file found, starting without drafts");
            return Self::default();
        }

        let mut contents = String::new();
        let read = File::open(path).and_then(|file| {
            std::io::BufReader::new(file).read_to_string(&mut contents)
        });
        if let Err(e) = read {
            tracing::warn!("Failed to read drafts file {:?}: {}. Ignoring drafts.", path, e);
            return Self::default();
        }

        match serde_json::from_str::<DraftBook>(&contents) {
            Ok(book) => book,
            Err(e) => {
                tracing::warn!("Failed to parse drafts file {:?}: {}. Ignoring drafts.", path, e);
                Self::default()
            }
        }
    }

    fn save_unlocked(&self, path: &Path) -> Result<()> {
        let temp = NamedTempFile::new_in(path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "drafts path missing parent")
        })?)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;
        tracing::debug!("Saved {} drafts to {:?}", self.drafts.len(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BodyRegion;

    #[test]
    fn test_drafts_survive_reload() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("drafts.json");
        let patient = Uuid::new_v4();

        DraftBook::update(&path, |book| {
            let counter = book.counter_mut(patient);
            counter.increment(BodyRegion::Head);
            counter.increment(BodyRegion::Head);
            counter.increment(BodyRegion::RightArm);
            Ok(())
        })
        .unwrap();

        let loaded = DraftBook::load(&path).unwrap();
        let counter = loaded.counter(patient).unwrap();
        assert_eq!(counter.count(BodyRegion::Head), 2);
        assert_eq!(counter.total(), 3);
    }

    #[test]
    fn test_discard() {
        let mut book = DraftBook::default();
        let patient = Uuid::new_v4();
        book.counter_mut(patient).increment(BodyRegion::Trunk);
        assert!(book.discard(patient).is_some());
        assert!(book.counter(patient).is_none());
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("drafts.json");
        let patient = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    DraftBook::update(&path, |book| {
                        book.counter_mut(patient).increment(BodyRegion::Head);
                        Ok(())
                    })
                    .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let book = DraftBook::load(&path).unwrap();
        assert_eq!(book.counter(patient).unwrap().count(BodyRegion::Head), 8);
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("drafts.json");
        let result: Result<()> = DraftBook::update(&path, |book| {
            book.counter_mut(Uuid::new_v4()).increment(BodyRegion::Head);
            Err(Error::Validation("nope".into()))
        });
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupted_drafts_are_ignored() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("drafts.json");
        std::fs::write(&path, "[[[").unwrap();

        let book = DraftBook::load(&path).unwrap();
        assert!(book.drafts.is_empty());
    }
}
