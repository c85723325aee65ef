use std::{fs, net::SocketAddr, path::Path};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::is_valid_key;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Control surface (`/startHeight/` and friends).
    pub control_addr: SocketAddr,
    /// Push relay (`/ws`, `/notify`).
    pub relay_addr: SocketAddr,
    /// Patient the session writes under until a request names another.
    pub patient_id: String,
    pub capture_interval_ms: u64,
    pub calibration: CalibrationSettings,
    pub recovery: RecoverySettings,
    pub store: StoreSettings,
    pub sensor: SensorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            control_addr: SocketAddr::from(([127, 0, 0, 1], 5001)),
            relay_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            patient_id: "temp_patient".into(),
            capture_interval_ms: 500,
            calibration: CalibrationSettings::default(),
            recovery: RecoverySettings::default(),
            store: StoreSettings::default(),
            sensor: SensorSettings::default(),
        }
    }
}

impl Settings {
    /// Reads settings from a JSON file. A missing file means defaults; a
    /// file that exists but cannot be read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    /// Checks values the JSON shape alone cannot rule out.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_key(&self.patient_id) {
            bail!(
                "patient id '{}' cannot be used as a store key",
                self.patient_id
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightFormula {
    /// Head to the higher foot, vertical only.
    HeadFootSpan,
    /// Spine chain plus the mean leg chain.
    SegmentSum,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub formula: HeightFormula,
    /// Empirical: the head joint sits at mid-skull, not the crown, so the
    /// raw span under-reads standing height.
    pub factor: f64,
    pub min_height_m: f64,
    pub max_height_m: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            formula: HeightFormula::HeadFootSpan,
            factor: 1.15,
            min_height_m: 1.0,
            max_height_m: 2.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreBackend {
    /// Firebase Realtime Database REST endpoint.
    Firebase { url: String },
    Sqlite { path: String },
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub write_timeout_ms: u64,
    pub write_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite {
                path: "kinetrack.sqlite3".into(),
            },
            write_timeout_ms: 3000,
            write_retries: 1,
            retry_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    pub frame_queue_capacity: usize,
    pub simulated_fps: u32,
    /// Height of the synthetic subject, meters.
    pub simulated_subject_height_m: f32,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            frame_queue_capacity: 8,
            simulated_fps: 30,
            simulated_subject_height_m: 1.72,
        }
    }
}
