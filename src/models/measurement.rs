use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::skeleton::{Body, TrackingState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeightMeasurement {
    /// Meters, rounded to centimeters.
    pub value: f64,
    pub patient_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Stored shape of a single joint inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub confidence: TrackingState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkeletalSnapshot {
    pub patient_id: String,
    pub timestamp: DateTime<Utc>,
    /// Epoch milliseconds; the store key under `skeletal_data`.
    pub key: i64,
    pub joint_positions: BTreeMap<String, JointSample>,
}

impl SkeletalSnapshot {
    pub fn from_body(patient_id: &str, timestamp: DateTime<Utc>, key: i64, body: &Body) -> Self {
        let joint_positions = body
            .joints
            .iter()
            .map(|(joint_type, joint)| {
                (
                    joint_type.as_str().to_string(),
                    JointSample {
                        x: joint.position.x,
                        y: joint.position.y,
                        z: joint.position.z,
                        confidence: joint.state,
                    },
                )
            })
            .collect();

        Self {
            patient_id: patient_id.to_string(),
            timestamp,
            key,
            joint_positions,
        }
    }
}
