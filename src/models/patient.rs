//! Patient records as the dashboard form writes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minute granularity: two registrations of the same person inside one
/// minute produce the same id.
const ID_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub name: String,
    pub age: u32,
    pub gender: String,
    /// Meters.
    pub height: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration input, before an id and timestamps are assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub height: f64,
}

impl NewPatient {
    pub fn new(name: impl Into<String>, age: u32, gender: impl Into<String>, height: f64) -> Self {
        Self {
            name: name.into(),
            age,
            gender: gender.into(),
            height,
        }
    }

    pub fn into_record(self, created_at: DateTime<Utc>) -> PatientRecord {
        PatientRecord {
            name: self.name.trim().to_string(),
            age: self.age,
            gender: self.gender.trim().to_string(),
            height: self.height,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Comparison key for the name-uniqueness rule.
pub fn normalized_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Builds the store key for a new patient:
/// gender initial, two-digit age, first two letters of the name and the
/// creation minute, e.g. `F30AL202403151042`.
pub fn generate_patient_id(name: &str, age: u32, gender: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}{}",
        patient_id_prefix(name, age, gender),
        at.format(ID_TIMESTAMP_FORMAT)
    )
}

/// The part of the id taken from the registration fields.
pub fn patient_id_prefix(name: &str, age: u32, gender: &str) -> String {
    let gender_code: String = gender
        .trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_default();

    let mut name_code: String = name.trim().chars().take(2).collect::<String>().to_uppercase();
    while name_code.chars().count() < 2 {
        name_code.push(' ');
    }

    format!("{gender_code}{age:02}{name_code}")
}
