use std::{sync::Arc, time::Duration};

use log::{info, warn};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::state::{SessionSnapshot, SessionState, TrackingMode, TrackingSession};
use crate::notify::{Notifier, EVENT_SESSION_STATE};
use crate::sensing::RecoveryHandle;
use crate::store::{is_valid_key, patient_path, StoreError};

/// Recurring trigger that arms one skeletal capture per interval.
pub struct CaptureTicker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CaptureTicker {
    fn spawn(state: Arc<Mutex<SessionState>>, activation: u64, every: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let mut guard = state.lock().await;
                        if !guard.arm_capture(activation) {
                            break;
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });

        Self { cancel, handle }
    }

    /// Returns once the task is gone, so no tick can follow.
    async fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
        let _ = self.handle.await;
    }
}

#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    recovery: RecoveryHandle,
    notifier: Notifier,
}

impl SessionController {
    pub fn new(session: TrackingSession, recovery: RecoveryHandle, notifier: Notifier) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new(session))),
            recovery,
            notifier,
        }
    }

    pub(crate) fn shared_state(&self) -> Arc<Mutex<SessionState>> {
        self.state.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn mode(&self) -> TrackingMode {
        self.state.lock().await.mode()
    }

    /// Rejects ids that would not fit in one `patients/{id}` segment.
    pub async fn set_patient(&self, patient_id: impl Into<String>) -> Result<(), StoreError> {
        let patient_id = patient_id.into();
        if !is_valid_key(&patient_id) {
            return Err(StoreError::InvalidPath(patient_path(&patient_id)));
        }

        let mut guard = self.state.lock().await;
        if guard.session.patient_id != patient_id {
            info!("Session patient set to {patient_id}");
            guard.session.patient_id = patient_id;
        }
        Ok(())
    }

    pub async fn start_height_measurement(&self) -> SessionSnapshot {
        let snapshot = {
            let mut guard = self.state.lock().await;
            if guard.mode() == TrackingMode::MeasuringHeight {
                info!("Height measurement already active");
                return guard.snapshot();
            }

            stop_skeletal_locked(&mut guard).await;
            guard.enter(TrackingMode::MeasuringHeight);
            self.ensure_frames().await;
            guard.snapshot()
        };

        info!("Height measurement started for {}", snapshot.patient_id);
        self.publish(&snapshot);
        snapshot
    }

    pub async fn start_skeletal_tracking(&self) -> SessionSnapshot {
        let snapshot = {
            let mut guard = self.state.lock().await;
            if guard.mode() == TrackingMode::TrackingSkeletal {
                info!("Skeletal tracking already active");
                return guard.snapshot();
            }

            guard.enter(TrackingMode::TrackingSkeletal);
            self.ensure_frames().await;

            let every = Duration::from_millis(guard.session.capture_interval_ms);
            let ticker = CaptureTicker::spawn(self.state.clone(), guard.activation(), every);
            guard.ticker = Some(ticker);
            guard.snapshot()
        };

        info!(
            "Skeletal tracking started for {} every {} ms",
            snapshot.patient_id, snapshot.capture_interval_ms
        );
        self.publish(&snapshot);
        snapshot
    }

    pub async fn stop_skeletal_tracking(&self) -> SessionSnapshot {
        let (snapshot, stopped) = {
            let mut guard = self.state.lock().await;
            let stopped = stop_skeletal_locked(&mut guard).await;
            (guard.snapshot(), stopped)
        };

        if stopped {
            info!("Skeletal tracking stopped");
            self.publish(&snapshot);
        }
        snapshot
    }

    pub async fn stop_all(&self) -> SessionSnapshot {
        let (snapshot, changed) = {
            let mut guard = self.state.lock().await;
            let mut changed = false;
            if guard.mode() == TrackingMode::MeasuringHeight {
                guard.enter(TrackingMode::Idle);
                changed = true;
            }
            changed |= stop_skeletal_locked(&mut guard).await;
            (guard.snapshot(), changed)
        };

        if changed {
            info!("All tracking stopped");
            self.publish(&snapshot);
        }
        snapshot
    }

    pub(crate) fn publish(&self, snapshot: &SessionSnapshot) {
        self.notifier.publish(EVENT_SESSION_STATE, snapshot);
    }

    async fn ensure_frames(&self) {
        if let Err(err) = self.recovery.ensure_subscribed().await {
            warn!("Depth sensor not available yet: {err}");
        }
    }
}

async fn stop_skeletal_locked(state: &mut SessionState) -> bool {
    if state.mode() != TrackingMode::TrackingSkeletal {
        return false;
    }
    if let Some(ticker) = state.ticker.take() {
        ticker.stop().await;
    }
    state.enter(TrackingMode::Idle);
    true
}
