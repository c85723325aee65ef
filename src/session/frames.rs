use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;

use super::controller::SessionController;
use super::state::{SessionState, TrackingMode};
use crate::geometry::HeightCalculator;
use crate::models::{HeightMeasurement, SkeletalSnapshot, SkeletonFrame};
use crate::notify::{Notifier, EVENT_HEIGHT, EVENT_SKELETAL};
use crate::store::PersistenceGateway;
use crate::utils::time::MonotonicMillis;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// What a single frame led to.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Idle,
    NoBody,
    /// Another frame already claimed this height activation.
    HeightInFlight,
    HeightRecorded(f64),
    HeightRejected,
    HeightFailed,
    AwaitingTick,
    Captured(i64),
    CaptureFailed,
}

enum Work {
    Height { activation: u64, patient_id: String },
    Capture { patient_id: String },
}

#[derive(Clone)]
pub struct FrameHandler {
    state: Arc<Mutex<SessionState>>,
    session: SessionController,
    calculator: HeightCalculator,
    gateway: Arc<PersistenceGateway>,
    notifier: Notifier,
    clock: Arc<MonotonicMillis>,
}

impl FrameHandler {
    pub fn new(
        session: SessionController,
        calculator: HeightCalculator,
        gateway: Arc<PersistenceGateway>,
        notifier: Notifier,
    ) -> Self {
        Self {
            state: session.shared_state(),
            session,
            calculator,
            gateway,
            notifier,
            clock: Arc::new(MonotonicMillis::new()),
        }
    }

    pub async fn handle_frame(&self, frame: SkeletonFrame) -> FrameOutcome {
        let work = {
            let mut guard = self.state.lock().await;
            let mode = guard.mode();
            if mode == TrackingMode::Idle {
                return FrameOutcome::Idle;
            }
            if frame.first_tracked().is_none() {
                log_debug!("No body tracked in frame");
                return FrameOutcome::NoBody;
            }

            let patient_id = guard.session.patient_id.clone();
            match mode {
                TrackingMode::MeasuringHeight => match guard.claim_height() {
                    Some(activation) => Work::Height {
                        activation,
                        patient_id,
                    },
                    None => return FrameOutcome::HeightInFlight,
                },
                TrackingMode::TrackingSkeletal if guard.take_capture() => {
                    Work::Capture { patient_id }
                }
                _ => return FrameOutcome::AwaitingTick,
            }
        };

        match work {
            Work::Height {
                activation,
                patient_id,
            } => self.measure_height(&frame, activation, &patient_id).await,
            Work::Capture { patient_id } => self.capture_skeleton(&frame, &patient_id).await,
        }
    }

    async fn measure_height(
        &self,
        frame: &SkeletonFrame,
        activation: u64,
        patient_id: &str,
    ) -> FrameOutcome {
        let Some(body) = frame.first_tracked() else {
            self.finish_height(activation, None).await;
            return FrameOutcome::NoBody;
        };

        let value = match self.calculator.calculate_height(body) {
            Ok(value) => value,
            Err(err) => {
                log_warn!("Height measurement rejected: {err}");
                self.finish_height(activation, None).await;
                return FrameOutcome::HeightRejected;
            }
        };

        if let Err(err) = self.gateway.write_height(patient_id, value).await {
            log_error!("Failed to store height for {patient_id}: {err}");
            self.finish_height(activation, None).await;
            return FrameOutcome::HeightFailed;
        }

        let measurement = HeightMeasurement {
            value,
            patient_id: patient_id.to_string(),
            timestamp: Utc::now(),
        };
        log_info!("Height for {patient_id}: {value:.2} m");
        self.notifier.publish(
            EVENT_HEIGHT,
            &json!({
                "patientId": measurement.patient_id,
                "height": value,
                "timestamp": measurement.timestamp,
            }),
        );
        self.finish_height(activation, Some(measurement)).await;
        FrameOutcome::HeightRecorded(value)
    }

    async fn finish_height(&self, activation: u64, measurement: Option<HeightMeasurement>) {
        let reverted = {
            let mut guard = self.state.lock().await;
            guard
                .finish_height(activation, measurement)
                .then(|| guard.snapshot())
        };
        if let Some(snapshot) = reverted {
            self.session.publish(&snapshot);
        }
    }

    async fn capture_skeleton(&self, frame: &SkeletonFrame, patient_id: &str) -> FrameOutcome {
        let Some(body) = frame.first_tracked() else {
            return FrameOutcome::NoBody;
        };

        let now = Utc::now();
        let key = self.clock.next_key(now);
        let snapshot = SkeletalSnapshot::from_body(patient_id, now, key, body);

        match self
            .gateway
            .write_skeletal_snapshot(patient_id, key, &snapshot.joint_positions)
            .await
        {
            Ok(()) => {
                log_debug!("Stored skeletal snapshot {key} for {patient_id}");
                self.notifier.publish(EVENT_SKELETAL, &snapshot);
                FrameOutcome::Captured(key)
            }
            Err(err) => {
                log_error!("Failed to store skeletal snapshot for {patient_id}: {err}");
                FrameOutcome::CaptureFailed
            }
        }
    }
}
