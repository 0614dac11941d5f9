//! Core domain types for the acupuncture tracker.
//!
//! This module defines the fundamental types used throughout the system:
//! - Body regions and per-region needle counts
//! - Patient records and their insert/update payloads
//! - Session records and their insert/update payloads

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Body Regions
// ============================================================================

/// One of the six fixed anatomical zones needles are counted against
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum BodyRegion {
    Head,
    Trunk,
    LeftArm,
    RightArm,
    LeftLeg,
    RightLeg,
}

impl BodyRegion {
    /// All regions in display order
    pub const ALL: [BodyRegion; 6] = [
        BodyRegion::Head,
        BodyRegion::Trunk,
        BodyRegion::LeftArm,
        BodyRegion::RightArm,
        BodyRegion::LeftLeg,
        BodyRegion::RightLeg,
    ];

    /// Stable identifier, e.g. `left-arm`
    pub fn id(self) -> &'static str {
        match self {
            BodyRegion::Head => "head",
            BodyRegion::Trunk => "trunk",
            BodyRegion::LeftArm => "left-arm",
            BodyRegion::RightArm => "right-arm",
            BodyRegion::LeftLeg => "left-leg",
            BodyRegion::RightLeg => "right-leg",
        }
    }

    /// Label shown to clinical staff
    pub fn label(self) -> &'static str {
        match self {
            BodyRegion::Head => "頭部",
            BodyRegion::Trunk => "軀幹",
            BodyRegion::LeftArm => "左上肢",
            BodyRegion::RightArm => "右上肢",
            BodyRegion::LeftLeg => "左下肢",
            BodyRegion::RightLeg => "右下肢",
        }
    }
}

impl fmt::Display for BodyRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for BodyRegion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "head" => Ok(BodyRegion::Head),
            "trunk" | "torso" => Ok(BodyRegion::Trunk),
            "left-arm" => Ok(BodyRegion::LeftArm),
            "right-arm" => Ok(BodyRegion::RightArm),
            "left-leg" => Ok(BodyRegion::LeftLeg),
            "right-leg" => Ok(BodyRegion::RightLeg),
            _ => Err(Error::Validation(format!("Unknown body region: {}", s))),
        }
    }
}

/// Needle count per body region. Counts are unsigned, so never negative.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionCounts {
    #[serde(rename = "head_count", default)]
    pub head: u32,
    #[serde(rename = "trunk_count", default)]
    pub trunk: u32,
    #[serde(rename = "left_arm_count", default)]
    pub left_arm: u32,
    #[serde(rename = "right_arm_count", default)]
    pub right_arm: u32,
    #[serde(rename = "left_leg_count", default)]
    pub left_leg: u32,
    #[serde(rename = "right_leg_count", default)]
    pub right_leg: u32,
}

impl RegionCounts {
    pub fn get(&self, region: BodyRegion) -> u32 {
        match region {
            BodyRegion::Head => self.head,
            BodyRegion::Trunk => self.trunk,
            BodyRegion::LeftArm => self.left_arm,
            BodyRegion::RightArm => self.right_arm,
            BodyRegion::LeftLeg => self.left_leg,
            BodyRegion::RightLeg => self.right_leg,
        }
    }

    pub fn get_mut(&mut self, region: BodyRegion) -> &mut u32 {
        match region {
            BodyRegion::Head => &mut self.head,
            BodyRegion::Trunk => &mut self.trunk,
            BodyRegion::LeftArm => &mut self.left_arm,
            BodyRegion::RightArm => &mut self.right_arm,
            BodyRegion::LeftLeg => &mut self.left_leg,
            BodyRegion::RightLeg => &mut self.right_leg,
        }
    }

    /// Sum over all six regions
    pub fn total(&self) -> u32 {
        BodyRegion::ALL
            .iter()
            .fold(0u32, |acc, r| acc.saturating_add(self.get(*r)))
    }

    /// Number of regions holding at least one needle
    pub fn active_regions(&self) -> usize {
        BodyRegion::ALL.iter().filter(|r| self.get(**r) > 0).count()
    }

    /// `(region, count)` pairs in display order
    pub fn iter(&self) -> impl Iterator<Item = (BodyRegion, u32)> + '_ {
        BodyRegion::ALL.iter().map(move |r| (*r, self.get(*r)))
    }
}

// ============================================================================
// Patient Types
// ============================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[serde(alias = "男")]
    Male,
    #[serde(alias = "女")]
    Female,
}

impl Gender {
    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "男",
            Gender::Female => "女",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Gender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" | "男" => Ok(Gender::Male),
            "female" | "f" | "女" => Ok(Gender::Female),
            _ => Err(Error::Validation(format!("Unknown gender: {}", s))),
        }
    }
}

/// A registered patient
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PatientRecord {
    pub id: Uuid,
    pub medical_record_number: String,
    pub name: String,
    pub gender: Gender,
    #[serde(default)]
    pub patient_group: Option<String>,
    #[serde(default)]
    pub bed_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when registering a patient
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NewPatient {
    pub medical_record_number: String,
    pub name: String,
    pub gender: Gender,
    pub patient_group: Option<String>,
    pub bed_number: Option<String>,
}

impl NewPatient {
    pub fn new(
        medical_record_number: impl Into<String>,
        name: impl Into<String>,
        gender: Gender,
    ) -> Self {
        Self {
            medical_record_number: medical_record_number.into(),
            name: name.into(),
            gender,
            patient_group: None,
            bed_number: None,
        }
    }

    /// Trim all text fields; blank optional fields become `None`
    pub fn normalized(self) -> Self {
        Self {
            medical_record_number: self.medical_record_number.trim().to_string(),
            name: self.name.trim().to_string(),
            gender: self.gender,
            patient_group: non_blank(self.patient_group),
            bed_number: non_blank(self.bed_number),
        }
    }

    /// Reject blank required fields
    pub fn validate(&self) -> Result<()> {
        require("medical record number", &self.medical_record_number)?;
        require("name", &self.name)
    }
}

/// Partial patient update. `None` leaves a field untouched; for the optional
/// group and bed fields a blank string clears the value.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientPatch {
    pub medical_record_number: Option<String>,
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub patient_group: Option<String>,
    pub bed_number: Option<String>,
}

impl PatientPatch {
    pub fn is_empty(&self) -> bool {
        self == &PatientPatch::default()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(mrn) = &self.medical_record_number {
            require("medical record number", mrn)?;
        }
        if let Some(name) = &self.name {
            require("name", name)?;
        }
        Ok(())
    }

    /// Apply this patch to a record in place
    pub fn apply(&self, patient: &mut PatientRecord) {
        if let Some(mrn) = &self.medical_record_number {
            patient.medical_record_number = mrn.trim().to_string();
        }
        if let Some(name) = &self.name {
            patient.name = name.trim().to_string();
        }
        if let Some(gender) = self.gender {
            patient.gender = gender;
        }
        if let Some(group) = &self.patient_group {
            patient.patient_group = non_blank(Some(group.clone()));
        }
        if let Some(bed) = &self.bed_number {
            patient.bed_number = non_blank(Some(bed.clone()));
        }
    }
}

/// A patient together with session statistics for listing views
#[derive(Clone, Debug, PartialEq)]
pub struct PatientSummary {
    pub patient: PatientRecord,
    pub session_count: usize,
    pub last_session: Option<DateTime<Utc>>,
}

// ============================================================================
// Session Types
// ============================================================================

/// One treatment encounter as persisted by a session store
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    #[serde(flatten)]
    pub counts: RegionCounts,
    pub total_needles: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub needle_removal_time: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Recompute `total_needles` from the counts. Returns true if it was stale.
    pub fn normalize_total(&mut self) -> bool {
        let total = self.counts.total();
        let stale = total != self.total_needles;
        self.total_needles = total;
        stale
    }
}

/// Insert payload for a new session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NewSession {
    pub patient_id: Uuid,
    #[serde(flatten)]
    pub counts: RegionCounts,
    pub total_needles: u32,
}

impl NewSession {
    pub fn new(patient_id: Uuid, counts: RegionCounts) -> Self {
        Self {
            patient_id,
            counts,
            total_needles: counts.total(),
        }
    }
}

/// Partial session update
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionPatch {
    pub counts: Option<RegionCounts>,
    pub needle_removal_time: Option<DateTime<Utc>>,
}

impl SessionPatch {
    pub fn counts(counts: RegionCounts) -> Self {
        Self {
            counts: Some(counts),
            needle_removal_time: None,
        }
    }

    /// Apply this patch to a record in place, keeping the total consistent.
    ///
    /// A removal time is written at most once; a patch carrying one for a
    /// record that already has it is rejected and the record is unchanged.
    pub fn apply(&self, session: &mut SessionRecord) -> Result<()> {
        if let (Some(_), Some(removed_at)) =
            (self.needle_removal_time, session.needle_removal_time)
        {
            return Err(Error::InvalidTransition(format!(
                "needles for session {} were already removed at {}",
                session.id,
                removed_at.to_rfc3339()
            )));
        }
        if let Some(counts) = self.counts {
            session.counts = counts;
        }
        if let Some(removed_at) = self.needle_removal_time {
            session.needle_removal_time = Some(removed_at);
        }
        session.normalize_total();
        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_parse() {
        assert_eq!("left-arm".parse::<BodyRegion>().unwrap(), BodyRegion::LeftArm);
        assert_eq!("RIGHT_LEG".parse::<BodyRegion>().unwrap(), BodyRegion::RightLeg);
        assert_eq!("torso".parse::<BodyRegion>().unwrap(), BodyRegion::Trunk);
        assert!("tail".parse::<BodyRegion>().is_err());
    }

    #[test]
    fn test_region_ids_parse_back() {
        for region in BodyRegion::ALL {
            assert_eq!(region.id().parse::<BodyRegion>().unwrap(), region);
        }
    }

    #[test]
    fn test_counts_serialize_with_column_names() {
        let mut counts = RegionCounts::default();
        *counts.get_mut(BodyRegion::LeftLeg) = 4;
        let json = serde_json::to_value(counts).unwrap();
        assert_eq!(json["left_leg_count"], 4);
        assert_eq!(json["head_count"], 0);
    }

    #[test]
    fn test_gender_accepts_labels() {
        assert_eq!("男".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!("F".parse::<Gender>().unwrap(), Gender::Female);
        let parsed: Gender = serde_json::from_str("\"女\"").unwrap();
        assert_eq!(parsed, Gender::Female);
    }

    #[test]
    fn test_new_patient_validation() {
        let blank = NewPatient::new("  ", "Chen", Gender::Male);
        assert!(matches!(blank.validate(), Err(Error::Validation(_))));

        let ok = NewPatient {
            patient_group: Some("   ".into()),
            ..NewPatient::new(" A001 ", " Chen ", Gender::Male)
        }
        .normalized();
        assert!(ok.validate().is_ok());
        assert_eq!(ok.medical_record_number, "A001");
        assert_eq!(ok.patient_group, None);
    }

    #[test]
    fn test_session_patch_recomputes_total() {
        let mut session = SessionRecord {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            counts: RegionCounts::default(),
            total_needles: 0,
            created_at: Utc::now(),
            needle_removal_time: None,
        };
        let counts = RegionCounts {
            head: 2,
            trunk: 3,
            ..Default::default()
        };
        SessionPatch::counts(counts).apply(&mut session).unwrap();
        assert_eq!(session.total_needles, 5);
    }

    #[test]
    fn test_removal_time_is_never_overwritten() {
        let first = Utc::now();
        let mut session = SessionRecord {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            counts: RegionCounts {
                head: 3,
                ..Default::default()
            },
            total_needles: 3,
            created_at: first,
            needle_removal_time: Some(first),
        };
        let patch = SessionPatch {
            counts: Some(RegionCounts {
                trunk: 1,
                ..Default::default()
            }),
            needle_removal_time: Some(first + chrono::Duration::minutes(10)),
        };
        assert!(matches!(
            patch.apply(&mut session),
            Err(Error::InvalidTransition(_))
        ));
        assert_eq!(session.needle_removal_time, Some(first));
        assert_eq!(session.counts.head, 3);

        // Counts can still be amended after removal
        SessionPatch::counts(RegionCounts {
            trunk: 1,
            ..Default::default()
        })
        .apply(&mut session)
        .unwrap();
        assert_eq!(session.total_needles, 1);
        assert_eq!(session.needle_removal_time, Some(first));
    }

    #[test]
    fn test_stale_total_detected() {
        let mut session = SessionRecord {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            counts: RegionCounts {
                head: 1,
                ..Default::default()
            },
            total_needles: 9,
            created_at: Utc::now(),
            needle_removal_time: None,
        };
        assert!(session.normalize_total());
        assert_eq!(session.total_needles, 1);
        assert!(!session.normalize_total());
    }
}
