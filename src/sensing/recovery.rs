use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;

use super::device::DeviceError;
use super::link::SharedLink;
use crate::notify::{Notifier, EVENT_DEVICE_STATUS};
use crate::settings::RecoverySettings;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeviceStatus {
    Connected,
    Disconnected,
    Recovering { attempt: u32 },
    /// Automatic recovery gave up; only a manual reconnect retries.
    Failed,
}

#[derive(Debug)]
enum Trigger {
    DeviceLost(String),
    Manual,
}

/// Cloneable access to the sensor link and the device status signal.
#[derive(Clone)]
pub struct RecoveryHandle {
    link: SharedLink,
    status: Arc<watch::Sender<DeviceStatus>>,
    triggers: mpsc::UnboundedSender<Trigger>,
    notifier: Notifier,
}

impl RecoveryHandle {
    pub fn status(&self) -> DeviceStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<DeviceStatus> {
        self.status.subscribe()
    }

    pub fn report_device_lost(&self, reason: impl Into<String>) {
        let _ = self.triggers.send(Trigger::DeviceLost(reason.into()));
    }

    /// Operator-initiated retry; also clears `Failed`.
    pub fn request_reconnect(&self) {
        let _ = self.triggers.send(Trigger::Manual);
    }

    /// Makes sure frames are flowing, acquiring the device if nothing holds
    /// it yet. A failed acquisition is handed to the supervisor.
    pub async fn ensure_subscribed(&self) -> Result<(), DeviceError> {
        match self.status() {
            DeviceStatus::Recovering { attempt } => {
                return Err(DeviceError::Unavailable(format!(
                    "recovery in progress (attempt {attempt})"
                )));
            }
            DeviceStatus::Failed => {
                return Err(DeviceError::Unavailable(
                    "recovery exhausted, reconnect required".into(),
                ));
            }
            DeviceStatus::Connected | DeviceStatus::Disconnected => {}
        }

        let result = {
            let mut link = self.link.lock().await;
            if link.is_subscribed() {
                return Ok(());
            }
            link.acquire().await
        };

        match result {
            Ok(()) => {
                self.set_status(DeviceStatus::Connected);
                Ok(())
            }
            Err(err) => {
                self.report_device_lost(err.to_string());
                Err(err)
            }
        }
    }

    /// Releases the device for shutdown.
    pub async fn release(&self) {
        self.link.lock().await.release().await;
        self.set_status(DeviceStatus::Disconnected);
    }

    fn set_status(&self, next: DeviceStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            self.notifier.publish(EVENT_DEVICE_STATUS, &next);
        }
    }
}

/// Supervisor task that re-acquires the sensor after it goes away.
pub struct RecoveryController;

impl RecoveryController {
    pub fn spawn(
        link: SharedLink,
        settings: RecoverySettings,
        notifier: Notifier,
        cancel: CancellationToken,
    ) -> (RecoveryHandle, JoinHandle<()>) {
        let (status_tx, _) = watch::channel(DeviceStatus::Disconnected);
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        let handle = RecoveryHandle {
            link,
            status: Arc::new(status_tx),
            triggers: trigger_tx,
            notifier,
        };

        let task = tokio::spawn(supervise(handle.clone(), trigger_rx, settings, cancel));
        (handle, task)
    }
}

async fn supervise(
    handle: RecoveryHandle,
    mut triggers: mpsc::UnboundedReceiver<Trigger>,
    settings: RecoverySettings,
    cancel: CancellationToken,
) {
    loop {
        let trigger = tokio::select! {
            _ = cancel.cancelled() => break,
            trigger = triggers.recv() => match trigger {
                Some(trigger) => trigger,
                None => break,
            },
        };

        match trigger {
            Trigger::DeviceLost(reason) => {
                if handle.status() == DeviceStatus::Failed {
                    log_info!("Ignoring device loss ({reason}); recovery already exhausted");
                    continue;
                }
                log_warn!("Depth sensor lost: {reason}");
            }
            Trigger::Manual => log_info!("Manual sensor reconnect requested"),
        }

        recover(&handle, &settings, &cancel).await;

        // Anything reported while the cycle ran refers to the old handle.
        while triggers.try_recv().is_ok() {}
    }

    log_info!("Recovery supervisor shutting down");
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.checked_mul(factor).unwrap_or(Duration::MAX)
}

async fn recover(handle: &RecoveryHandle, settings: &RecoverySettings, cancel: &CancellationToken) {
    let base = Duration::from_millis(settings.base_delay_ms);

    for attempt in 1..=settings.max_attempts {
        handle.set_status(DeviceStatus::Recovering { attempt });
        handle.link.lock().await.release().await;

        let delay = backoff_delay(base, attempt);
        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = cancel.cancelled() => return,
        }

        let result = handle.link.lock().await.acquire().await;
        match result {
            Ok(()) => {
                log_info!("Depth sensor recovered on attempt {attempt}");
                handle.set_status(DeviceStatus::Connected);
                return;
            }
            Err(err) => {
                log_warn!(
                    "Recovery attempt {attempt}/{} failed: {err}",
                    settings.max_attempts
                );
            }
        }
    }

    log_error!(
        "Depth sensor recovery failed after {} attempts; waiting for manual reconnect",
        settings.max_attempts
    );
    handle.set_status(DeviceStatus::Failed);
}
