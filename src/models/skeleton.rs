//! Skeleton frame data delivered by the depth sensor.
//!
//! Positions are camera-space meters with Y pointing up, the convention of
//! Kinect-class body trackers.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    SpineBase,
    SpineMid,
    Neck,
    Head,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
    SpineShoulder,
    HandTipLeft,
    ThumbLeft,
    HandTipRight,
    ThumbRight,
}

impl JointType {
    pub const ALL: [JointType; 25] = [
        JointType::SpineBase,
        JointType::SpineMid,
        JointType::Neck,
        JointType::Head,
        JointType::ShoulderLeft,
        JointType::ElbowLeft,
        JointType::WristLeft,
        JointType::HandLeft,
        JointType::ShoulderRight,
        JointType::ElbowRight,
        JointType::WristRight,
        JointType::HandRight,
        JointType::HipLeft,
        JointType::KneeLeft,
        JointType::AnkleLeft,
        JointType::FootLeft,
        JointType::HipRight,
        JointType::KneeRight,
        JointType::AnkleRight,
        JointType::FootRight,
        JointType::SpineShoulder,
        JointType::HandTipLeft,
        JointType::ThumbLeft,
        JointType::HandTipRight,
        JointType::ThumbRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JointType::SpineBase => "SpineBase",
            JointType::SpineMid => "SpineMid",
            JointType::Neck => "Neck",
            JointType::Head => "Head",
            JointType::ShoulderLeft => "ShoulderLeft",
            JointType::ElbowLeft => "ElbowLeft",
            JointType::WristLeft => "WristLeft",
            JointType::HandLeft => "HandLeft",
            JointType::ShoulderRight => "ShoulderRight",
            JointType::ElbowRight => "ElbowRight",
            JointType::WristRight => "WristRight",
            JointType::HandRight => "HandRight",
            JointType::HipLeft => "HipLeft",
            JointType::KneeLeft => "KneeLeft",
            JointType::AnkleLeft => "AnkleLeft",
            JointType::FootLeft => "FootLeft",
            JointType::HipRight => "HipRight",
            JointType::KneeRight => "KneeRight",
            JointType::AnkleRight => "AnkleRight",
            JointType::FootRight => "FootRight",
            JointType::SpineShoulder => "SpineShoulder",
            JointType::HandTipLeft => "HandTipLeft",
            JointType::ThumbLeft => "ThumbLeft",
            JointType::HandTipRight => "HandTipRight",
            JointType::ThumbRight => "ThumbRight",
        }
    }
}

impl fmt::Display for JointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-joint confidence reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingState {
    NotTracked,
    Inferred,
    Tracked,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        let dz = f64::from(self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub position: Position,
    pub state: TrackingState,
}

impl Joint {
    pub fn tracked(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Position::new(x, y, z),
            state: TrackingState::Tracked,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.state != TrackingState::NotTracked
    }
}

/// One body slot of a frame. Sensors report a fixed number of slots and
/// flag the ones that currently hold a person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub tracking_id: u64,
    pub is_tracked: bool,
    pub joints: HashMap<JointType, Joint>,
}

impl Body {
    pub fn joint(&self, joint_type: JointType) -> Option<&Joint> {
        self.joints.get(&joint_type)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SkeletonFrame {
    pub bodies: Vec<Body>,
}

impl SkeletonFrame {
    pub fn new(bodies: Vec<Body>) -> Self {
        Self { bodies }
    }

    /// The single body this system processes per frame.
    pub fn first_tracked(&self) -> Option<&Body> {
        self.bodies.iter().find(|body| body.is_tracked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(id: u64, tracked: bool) -> Body {
        Body {
            tracking_id: id,
            is_tracked: tracked,
            joints: HashMap::new(),
        }
    }

    #[test]
    fn first_tracked_skips_empty_slots() {
        let frame = SkeletonFrame::new(vec![body(1, false), body(2, true), body(3, true)]);
        assert_eq!(frame.first_tracked().map(|b| b.tracking_id), Some(2));
    }

    #[test]
    fn frame_without_tracked_bodies_has_no_subject() {
        let frame = SkeletonFrame::new(vec![body(1, false)]);
        assert!(frame.first_tracked().is_none());
    }

    #[test]
    fn joint_names_match_serde_names() {
        for joint in JointType::ALL {
            let encoded = serde_json::to_value(joint).unwrap();
            assert_eq!(encoded, serde_json::Value::String(joint.as_str().into()));
        }
    }

    #[test]
    fn distance_is_euclidean() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 0.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-9);
    }
}
