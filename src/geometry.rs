//! Height estimation from a single skeleton.

use thiserror::Error;

use crate::models::{Body, JointType, Position};
use crate::settings::{CalibrationSettings, HeightFormula};

#[derive(Debug, Error, PartialEq)]
pub enum HeightError {
    #[error("joint {0} is missing or not tracked")]
    MissingJoint(JointType),

    /// Outside the plausible human range; almost always a tracking glitch.
    #[error("invalid measurement: {value:.2} m outside [{min:.2}, {max:.2}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct HeightCalculator {
    calibration: CalibrationSettings,
}

impl Default for HeightCalculator {
    fn default() -> Self {
        Self::new(CalibrationSettings::default())
    }
}

impl HeightCalculator {
    pub fn new(calibration: CalibrationSettings) -> Self {
        Self { calibration }
    }

    /// Calibrated height in meters, rounded to two decimals. Never returns a
    /// value outside the configured bounds.
    pub fn calculate_height(&self, body: &Body) -> Result<f64, HeightError> {
        let raw = match self.calibration.formula {
            HeightFormula::HeadFootSpan => head_foot_span(body)?,
            HeightFormula::SegmentSum => segment_sum(body)?,
        };

        let value = round_cm(raw * self.calibration.factor);
        let (min, max) = (self.calibration.min_height_m, self.calibration.max_height_m);
        if !value.is_finite() || value < min || value > max {
            return Err(HeightError::OutOfRange { value, min, max });
        }
        Ok(value)
    }
}

fn round_cm(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn usable(body: &Body, joint: JointType) -> Result<Position, HeightError> {
    body.joint(joint)
        .filter(|j| j.is_usable())
        .map(|j| j.position)
        .ok_or(HeightError::MissingJoint(joint))
}

fn head_foot_span(body: &Body) -> Result<f64, HeightError> {
    let head = usable(body, JointType::Head)?;
    let left = usable(body, JointType::FootLeft)?;
    let right = usable(body, JointType::FootRight)?;

    let foot_y = left.y.max(right.y);
    Ok(f64::from(head.y - foot_y))
}

fn chain_length(body: &Body, chain: &[JointType]) -> Result<f64, HeightError> {
    let mut total = 0.0;
    for pair in chain.windows(2) {
        let a = usable(body, pair[0])?;
        let b = usable(body, pair[1])?;
        total += a.distance_to(&b);
    }
    Ok(total)
}

fn segment_sum(body: &Body) -> Result<f64, HeightError> {
    use JointType::*;

    let torso = chain_length(body, &[SpineBase, SpineMid, Neck, Head])?;
    let left = chain_length(body, &[HipLeft, KneeLeft, AnkleLeft, FootLeft])?;
    let right = chain_length(body, &[HipRight, KneeRight, AnkleRight, FootRight])?;
    Ok(torso + (left + right) / 2.0)
}
