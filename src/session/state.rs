use serde::{Deserialize, Serialize};

use super::controller::CaptureTicker;
use crate::models::HeightMeasurement;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackingMode {
    #[default]
    Idle,
    MeasuringHeight,
    TrackingSkeletal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSession {
    pub mode: TrackingMode,
    pub patient_id: String,
    pub capture_interval_ms: u64,
}

impl TrackingSession {
    pub fn new(patient_id: impl Into<String>, capture_interval_ms: u64) -> Self {
        Self {
            mode: TrackingMode::Idle,
            patient_id: patient_id.into(),
            capture_interval_ms: capture_interval_ms.max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub mode: TrackingMode,
    pub patient_id: String,
    pub capture_interval_ms: u64,
    pub capture_ticks: u64,
    pub last_height: Option<HeightMeasurement>,
}

/// Everything guarded by the session lock.
pub struct SessionState {
    pub session: TrackingSession,
    /// Bumped on every mode change; ties in-flight work to the activation
    /// that started it.
    activation: u64,
    height_claimed: bool,
    capture_armed: bool,
    capture_ticks: u64,
    last_height: Option<HeightMeasurement>,
    pub(super) ticker: Option<CaptureTicker>,
}

impl SessionState {
    pub fn new(session: TrackingSession) -> Self {
        Self {
            session,
            activation: 0,
            height_claimed: false,
            capture_armed: false,
            capture_ticks: 0,
            last_height: None,
            ticker: None,
        }
    }

    pub fn mode(&self) -> TrackingMode {
        self.session.mode
    }

    pub fn activation(&self) -> u64 {
        self.activation
    }

    pub fn enter(&mut self, mode: TrackingMode) {
        self.session.mode = mode;
        self.activation = self.activation.wrapping_add(1);
        self.height_claimed = false;
        self.capture_armed = false;
        if mode == TrackingMode::TrackingSkeletal {
            self.capture_ticks = 0;
        }
    }

    /// First caller per height activation wins.
    pub fn claim_height(&mut self) -> Option<u64> {
        if self.session.mode != TrackingMode::MeasuringHeight || self.height_claimed {
            return None;
        }
        self.height_claimed = true;
        Some(self.activation)
    }

    /// Records a finished measurement attempt. Returns `true` when the
    /// session was still in that activation and went back to `Idle`.
    pub fn finish_height(&mut self, activation: u64, measurement: Option<HeightMeasurement>) -> bool {
        if let Some(measurement) = measurement {
            self.last_height = Some(measurement);
        }
        if activation != self.activation || self.session.mode != TrackingMode::MeasuringHeight {
            return false;
        }
        self.enter(TrackingMode::Idle);
        true
    }

    /// Called by the capture ticker. `false` tells a stale ticker to exit.
    pub fn arm_capture(&mut self, activation: u64) -> bool {
        if activation != self.activation || self.session.mode != TrackingMode::TrackingSkeletal {
            return false;
        }
        self.capture_armed = true;
        self.capture_ticks += 1;
        true
    }

    pub fn take_capture(&mut self) -> bool {
        if self.session.mode != TrackingMode::TrackingSkeletal || !self.capture_armed {
            return false;
        }
        self.capture_armed = false;
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            mode: self.session.mode,
            patient_id: self.session.patient_id.clone(),
            capture_interval_ms: self.session.capture_interval_ms,
            capture_ticks: self.capture_ticks,
            last_height: self.last_height.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn state() -> SessionState {
        SessionState::new(TrackingSession::new("P1", 500))
    }

    fn measurement(value: f64) -> HeightMeasurement {
        HeightMeasurement {
            value,
            patient_id: "P1".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn one_claim_per_activation() {
        let mut s = state();
        assert_eq!(s.claim_height(), None);

        s.enter(TrackingMode::MeasuringHeight);
        let claim = s.claim_height().unwrap();
        assert_eq!(s.claim_height(), None);

        assert!(s.finish_height(claim, Some(measurement(1.7))));
        assert_eq!(s.mode(), TrackingMode::Idle);
        assert_eq!(s.snapshot().last_height.unwrap().value, 1.7);
    }

    #[test]
    fn stale_height_result_does_not_clobber_a_newer_mode() {
        let mut s = state();
        s.enter(TrackingMode::MeasuringHeight);
        let claim = s.claim_height().unwrap();

        s.enter(TrackingMode::TrackingSkeletal);
        assert!(!s.finish_height(claim, Some(measurement(1.6))));
        assert_eq!(s.mode(), TrackingMode::TrackingSkeletal);
    }

    #[test]
    fn capture_is_armed_once_per_tick() {
        let mut s = state();
        s.enter(TrackingMode::TrackingSkeletal);
        let activation = s.activation();

        assert!(!s.take_capture());
        assert!(s.arm_capture(activation));
        assert!(s.take_capture());
        assert!(!s.take_capture());

        s.enter(TrackingMode::Idle);
        assert!(!s.arm_capture(activation));
        assert_eq!(s.snapshot().capture_ticks, 1);
    }
}
