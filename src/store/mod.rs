//! Path-addressed document storage.
//!
//! The dashboard reads the same tree the controller writes, so the layout
//! under `patients/` is a public format:
//!
//! ```text
//! patients/{patientId}                          PatientRecord
//! patients/{patientId}/height                   number (meters)
//! patients/{patientId}/skeletal_data/{millis}   joint name -> {x, y, z, confidence}
//! ```

pub mod firebase;
pub mod gateway;
pub mod memory;
pub mod sqlite;
mod tree;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::settings::StoreBackend;

pub use firebase::FirebaseStore;
pub use gateway::{PersistenceGateway, RegistrationError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const PATIENTS_ROOT: &str = "patients";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid store path '{0}'")]
    InvalidPath(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Replaces the node at `path`. Missing parents are created; `null`
    /// deletes the node.
    async fn put(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Reads the node at `path`, including all of its children.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;
}

/// Characters the Firebase key grammar forbids inside a segment.
const FORBIDDEN_KEY_CHARS: [char; 5] = ['.', '$', '#', '[', ']'];

/// Whether `key` can stand as a single path segment, such as a patient id.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.contains('/')
        && !key.contains(&FORBIDDEN_KEY_CHARS[..])
        && !key.chars().any(char::is_control)
}

pub(crate) fn split_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = path.split('/').collect();
    if !path.is_empty() && segments.iter().all(|s| is_valid_key(s)) {
        Ok(segments)
    } else {
        Err(StoreError::InvalidPath(path.to_string()))
    }
}

pub fn patient_path(patient_id: &str) -> String {
    format!("{PATIENTS_ROOT}/{patient_id}")
}

pub fn height_path(patient_id: &str) -> String {
    format!("{PATIENTS_ROOT}/{patient_id}/height")
}

pub fn skeletal_path(patient_id: &str, key: i64) -> String {
    format!("{PATIENTS_ROOT}/{patient_id}/skeletal_data/{key}")
}

pub fn open(backend: &StoreBackend) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match backend {
        StoreBackend::Firebase { url } => Arc::new(
            FirebaseStore::new(url).with_context(|| format!("invalid Firebase URL {url}"))?,
        ),
        StoreBackend::Sqlite { path } => Arc::new(SqliteStore::open(path.into())?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    log::info!("Using {} document store", store.name());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_dashboard_layout() {
        assert_eq!(height_path("F30AL202403151042"), "patients/F30AL202403151042/height");
        assert_eq!(
            skeletal_path("P1", 1_700_000_000_000),
            "patients/P1/skeletal_data/1700000000000"
        );
    }

    #[test]
    fn split_rejects_empty_and_forbidden_segments() {
        assert_eq!(split_path("patients/M07J 2024").unwrap(), vec!["patients", "M07J 2024"]);
        assert!(split_path("").is_err());
        assert!(split_path("patients//height").is_err());
        assert!(split_path("patients/a.b").is_err());
        assert!(split_path("/patients").is_err());
    }

    #[test]
    fn keys_are_single_segments() {
        assert!(is_valid_key("F30AL202403151042"));
        assert!(is_valid_key("M07J 202403150805"));
        assert!(!is_valid_key("F30AL/x"));
        assert!(!is_valid_key("F30A$202403151042"));
        assert!(!is_valid_key("P1\n"));
        assert!(!is_valid_key(""));
    }

    #[test]
    fn retryable_errors_are_transient_ones() {
        assert!(StoreError::Unavailable("down".into()).is_retryable());
        assert!(StoreError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!StoreError::Rejected {
            status: 401,
            message: "denied".into()
        }
        .is_retryable());
        assert!(!StoreError::InvalidPath("x".into()).is_retryable());
    }
}
