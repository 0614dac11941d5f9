#![forbid(unsafe_code)]

//! Core domain model and business logic for acupuncture session tracking.
//!
//! This crate provides:
//! - Domain types (body regions, needle counts, patients, sessions)
//! - The in-memory session counter
//! - Store contracts with in-memory and JSON file implementations
//! - Treatment workflow (save, amend, needle removal, cascading delete)
//! - Local settings (groups, acupoints) and acupoint selection
//! - CSV export

pub mod types;
pub mod error;
pub mod counter;
pub mod store;
pub mod json_store;
pub mod settings;
pub mod acupoints;
pub mod drafts;
pub mod treatment;
pub mod export;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{Error, ErrorKind, Result};
pub use types::*;
pub use counter::{CounterState, SessionCounter};
pub use store::{MemoryStore, PatientStore, SessionStore};
pub use json_store::JsonStore;
pub use settings::{
    AcupointSettings, GroupSetting, JsonSettingsStore, LocalSettings, MemorySettingsStore,
    SettingsStore,
};
pub use acupoints::AcupointSelection;
pub use drafts::DraftBook;
pub use export::export_sessions_csv;
pub use config::Config;
