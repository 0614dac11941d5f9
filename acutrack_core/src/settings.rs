//! Clinic-local settings: patient group names and the acupoint name list.
//!
//! Settings are read and written as a whole document through a
//! `SettingsStore`, so shells decide where they live.

use crate::json_store::open_lock_file;
use crate::{Error, Result};
use fs2::FileExt;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const MIN_ACUPOINTS: usize = 1;
pub const MAX_ACUPOINTS: usize = 200;
pub const DEFAULT_ACUPOINTS: usize = 40;

const DEFAULT_GROUP_NAMES: [&str; 10] = [
    "第一組", "第二組", "第三組", "第四組", "第五組", "第六組", "第七組", "第八組", "第九組",
    "第十組",
];

/// Built once; cloned whenever a store has nothing saved yet
static DEFAULT_SETTINGS: Lazy<LocalSettings> = Lazy::new(|| LocalSettings {
    groups: DEFAULT_GROUP_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| GroupSetting {
            id: (i + 1).to_string(),
            name: (*name).to_string(),
        })
        .collect(),
    acupoints: AcupointSettings::numbered(DEFAULT_ACUPOINTS),
});

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupSetting {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcupointSettings {
    pub count: usize,
    pub names: Vec<String>,
}

impl AcupointSettings {
    /// Acupoints named "1" through `count`
    pub fn numbered(count: usize) -> Self {
        Self {
            count,
            names: (1..=count).map(|i| i.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalSettings {
    #[serde(default = "default_groups")]
    pub groups: Vec<GroupSetting>,
    #[serde(default = "default_acupoints")]
    pub acupoints: AcupointSettings,
}

impl Default for LocalSettings {
    fn default() -> Self {
        DEFAULT_SETTINGS.clone()
    }
}

fn default_groups() -> Vec<GroupSetting> {
    DEFAULT_SETTINGS.groups.clone()
}

fn default_acupoints() -> AcupointSettings {
    DEFAULT_SETTINGS.acupoints.clone()
}

impl LocalSettings {
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    pub fn add_group(&mut self, name: &str) -> Result<&GroupSetting> {
        let name = required_name("group name", name)?;
        let next_id = self
            .groups
            .iter()
            .filter_map(|g| g.id.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        self.groups.push(GroupSetting {
            id: next_id.to_string(),
            name,
        });
        Ok(&self.groups[self.groups.len() - 1])
    }

    pub fn rename_group(&mut self, id: &str, name: &str) -> Result<()> {
        let name = required_name("group name", name)?;
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| group_not_found(id))?;
        group.name = name;
        Ok(())
    }

    pub fn delete_group(&mut self, id: &str) -> Result<GroupSetting> {
        let index = self
            .groups
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| group_not_found(id))?;
        Ok(self.groups.remove(index))
    }

    /// Change the number of acupoints, clamped to [1, 200].
    ///
    /// Growing pads with numeric names, shrinking truncates. Returns the
    /// count actually applied.
    pub fn resize_acupoints(&mut self, count: usize) -> usize {
        let clamped = count.clamp(MIN_ACUPOINTS, MAX_ACUPOINTS);
        if clamped != count {
            tracing::warn!(
                "Acupoint count {} out of range, clamped to {}",
                count,
                clamped
            );
        }
        let names = &mut self.acupoints.names;
        if clamped > names.len() {
            let start = names.len();
            names.extend((start + 1..=clamped).map(|i| i.to_string()));
        } else {
            names.truncate(clamped);
        }
        self.acupoints.count = clamped;
        clamped
    }

    /// Rename the acupoint at a zero-based index
    pub fn rename_acupoint(&mut self, index: usize, name: &str) -> Result<()> {
        let name = required_name("acupoint name", name)?;
        let len = self.acupoints.names.len();
        let slot = self.acupoints.names.get_mut(index).ok_or_else(|| {
            Error::Validation(format!(
                "acupoint index {} out of range (1-{})",
                index + 1,
                len
            ))
        })?;
        *slot = name;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let count = self.acupoints.count;
        if !(MIN_ACUPOINTS..=MAX_ACUPOINTS).contains(&count) {
            return Err(Error::Validation(format!(
                "acupoint count must be between {} and {}",
                MIN_ACUPOINTS, MAX_ACUPOINTS
            )));
        }
        if self.acupoints.names.len() != count {
            return Err(Error::Validation(format!(
                "expected {} acupoint names, found {}",
                count,
                self.acupoints.names.len()
            )));
        }
        if self.acupoints.names.iter().any(|n| n.trim().is_empty()) {
            return Err(Error::Validation("acupoint names cannot be empty".into()));
        }
        if self.groups.iter().any(|g| g.name.trim().is_empty()) {
            return Err(Error::Validation("group names cannot be empty".into()));
        }
        Ok(())
    }
}

fn required_name(field: &str, name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} cannot be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn group_not_found(id: &str) -> Error {
    Error::NotFound {
        entity: "Group",
        id: id.to_string(),
    }
}

// ============================================================================
// Settings Stores
// ============================================================================

/// Whole-document get/put of local settings
pub trait SettingsStore {
    fn load(&self) -> Result<LocalSettings>;
    fn save(&mut self, settings: &LocalSettings) -> Result<()>;

    /// Load settings, modify them, validate and save them back
    fn update<F>(&mut self, f: F) -> Result<LocalSettings>
    where
        F: FnOnce(&mut LocalSettings) -> Result<()>,
        Self: Sized,
    {
        let mut settings = self.load()?;
        f(&mut settings)?;
        self.save(&settings)?;
        Ok(settings)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemorySettingsStore {
    settings: Option<LocalSettings>,
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<LocalSettings> {
        Ok(self.settings.clone().unwrap_or_default())
    }

    fn save(&mut self, settings: &LocalSettings) -> Result<()> {
        settings.validate()?;
        self.settings = Some(settings.clone());
        Ok(())
    }
}

/// Settings kept in a JSON file next to the store
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JsonSettingsStore {
    /// Missing or unreadable settings fall back to defaults
    fn load_unlocked(&self) -> LocalSettings {
        if !self.path.exists() {
            tracing::info!("No settings file found, using default settings");
            return LocalSettings::default();
        }

        let mut contents = String::new();
        let read = File::open(&self.path).and_then(|file| {
            std::io::BufReader::new(file).read_to_string(&mut contents)
        });
        if let Err(e) = read {
            tracing::warn!(
                "Failed to read settings file {:?}: {}. Using defaults.",
                self.path,
                e
            );
            return LocalSettings::default();
        }

        match serde_json::from_str::<LocalSettings>(&contents) {
            Ok(settings) => {
                tracing::debug!("Loaded settings from {:?}", self.path);
                settings
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse settings file {:?}: {}. Using defaults.",
                    self.path,
                    e
                );
                LocalSettings::default()
            }
        }
    }

    fn save_unlocked(&self, settings: &LocalSettings) -> Result<()> {
        settings.validate()?;

        let temp = NamedTempFile::new_in(self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "settings path missing parent")
        })?)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, settings)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        tracing::debug!("Saved settings to {:?}", self.path);
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<LocalSettings> {
        let lock = open_lock_file(&self.path)?;
        lock.lock_shared()?;
        let settings = self.load_unlocked();
        lock.unlock()?;
        Ok(settings)
    }

    fn save(&mut self, settings: &LocalSettings) -> Result<()> {
        let lock = open_lock_file(&self.path)?;
        lock.lock_exclusive()?;
        let result = self.save_unlocked(settings);
        lock.unlock()?;
        result
    }

    /// Load, modify and save under one exclusive lock
    fn update<F>(&mut self, f: F) -> Result<LocalSettings>
    where
        F: FnOnce(&mut LocalSettings) -> Result<()>,
    {
        let lock = open_lock_file(&self.path)?;
        lock.lock_exclusive()?;
        let mut settings = self.load_unlocked();
        let result = f(&mut settings).and_then(|()| self.save_unlocked(&settings));
        lock.unlock()?;
        result.map(|()| settings)
    }
}
