//! In-memory needle counter for the session currently being edited.
//!
//! The counter tracks per-region counts and an explicit lifecycle state:
//! a fresh draft, an existing record being amended, or idle after a save.
//! It never talks to a store; see `treatment` for the persistence flow.

use crate::{BodyRegion, Error, NewSession, RegionCounts, Result, SessionPatch, SessionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where the counter sits in the session lifecycle
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CounterState {
    /// Building a new session that has not been inserted yet
    #[default]
    Drafting,
    /// Editing the counts of an already persisted session
    Amending { session_id: Uuid },
    /// Idle after inserting `session_id`; counts are zero
    Saved { session_id: Uuid },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionCounter {
    counts: RegionCounts,
    state: CounterState,
}

impl SessionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the counts of an existing record for editing.
    ///
    /// The needle removal time is not part of the editable state and is
    /// left on the record.
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            counts: record.counts,
            state: CounterState::Amending {
                session_id: record.id,
            },
        }
    }

    pub fn state(&self) -> CounterState {
        self.state
    }

    pub fn counts(&self) -> &RegionCounts {
        &self.counts
    }

    pub fn count(&self, region: BodyRegion) -> u32 {
        self.counts.get(region)
    }

    pub fn increment(&mut self, region: BodyRegion) {
        self.add(region, 1);
    }

    /// Decrement one region; a no-op at zero
    pub fn decrement(&mut self, region: BodyRegion) {
        self.remove(region, 1);
    }

    /// Add `n` needles to a region, saturating at `u32::MAX`
    pub fn add(&mut self, region: BodyRegion, n: u32) {
        let slot = self.counts.get_mut(region);
        *slot = slot.saturating_add(n);
        if n > 0 {
            if let CounterState::Saved { .. } = self.state {
                self.state = CounterState::Drafting;
            }
        }
    }

    /// Remove up to `n` needles from a region, stopping at zero
    pub fn remove(&mut self, region: BodyRegion, n: u32) {
        let slot = self.counts.get_mut(region);
        *slot = slot.saturating_sub(n);
    }

    /// Overwrite one region's count
    pub fn set_count(&mut self, region: BodyRegion, n: u32) {
        self.reset_one(region);
        self.add(region, n);
    }

    pub fn reset_one(&mut self, region: BodyRegion) {
        *self.counts.get_mut(region) = 0;
    }

    pub fn reset_all(&mut self) {
        self.counts = RegionCounts::default();
    }

    pub fn total(&self) -> u32 {
        self.counts.total()
    }

    pub fn active_region_count(&self) -> usize {
        self.counts.active_regions()
    }

    /// Build the insert payload for the current counts.
    ///
    /// Fails with a validation error when no needles have been counted.
    pub fn to_record(&self, patient_id: Uuid) -> Result<NewSession> {
        self.ensure_non_empty()?;
        Ok(NewSession::new(patient_id, self.counts))
    }

    /// Build the counts-only update payload used when amending a record
    pub fn to_patch(&self) -> Result<SessionPatch> {
        self.ensure_non_empty()?;
        Ok(SessionPatch::counts(self.counts))
    }

    /// Zero the counts after `session_id` was inserted
    pub fn mark_saved(&mut self, session_id: Uuid) {
        self.reset_all();
        self.state = CounterState::Saved { session_id };
    }

    /// Build the update payload that records needle removal.
    ///
    /// This is a one-way transition: a record whose needles were already
    /// removed is rejected. The timestamp never precedes the record's
    /// creation time.
    pub fn complete_needle_removal(
        record: &SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<SessionPatch> {
        if let Some(removed_at) = record.needle_removal_time {
            return Err(Error::InvalidTransition(format!(
                "needles for session {} were already removed at {}",
                record.id,
                removed_at.to_rfc3339()
            )));
        }
        Ok(SessionPatch {
            counts: None,
            needle_removal_time: Some(now.max(record.created_at)),
        })
    }

    fn ensure_non_empty(&self) -> Result<()> {
        if self.total() == 0 {
            return Err(Error::Validation(
                "cannot save a session with no needles".into(),
            ));
        }
        Ok(())
    }
}
