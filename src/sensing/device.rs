//! Sensor driver seam.
//!
//! A device pushes frames from its own delivery thread into a [`FrameSink`].
//! Frames go through a bounded queue and are dropped when it is full; loss
//! notifications use a separate unbounded lane so they are never dropped.

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::models::SkeletonFrame;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no depth sensor attached")]
    NotFound,

    #[error("depth sensor unavailable: {0}")]
    Unavailable(String),

    #[error("body frame reader unavailable: {0}")]
    ReaderUnavailable(String),
}

#[derive(Debug)]
pub enum SensorEvent {
    Frame(SkeletonFrame),
    /// A frame notification arrived but the frame could not be acquired.
    AcquisitionFailed,
    DeviceLost(String),
}

#[derive(Clone)]
pub struct FrameSink {
    frames: mpsc::Sender<SensorEvent>,
    losses: mpsc::UnboundedSender<String>,
}

pub struct FrameStream {
    frames: mpsc::Receiver<SensorEvent>,
    losses: mpsc::UnboundedReceiver<String>,
}

impl FrameSink {
    pub fn channel(capacity: usize) -> (FrameSink, FrameStream) {
        let (frames_tx, frames_rx) = mpsc::channel(capacity.max(1));
        let (losses_tx, losses_rx) = mpsc::unbounded_channel();
        (
            FrameSink {
                frames: frames_tx,
                losses: losses_tx,
            },
            FrameStream {
                frames: frames_rx,
                losses: losses_rx,
            },
        )
    }

    /// Never blocks. Returns `false` when the frame was dropped.
    pub fn push_frame(&self, frame: SkeletonFrame) -> bool {
        self.push(SensorEvent::Frame(frame))
    }

    pub fn acquisition_failed(&self) -> bool {
        self.push(SensorEvent::AcquisitionFailed)
    }

    pub fn device_lost(&self, reason: impl Into<String>) {
        let _ = self.losses.send(reason.into());
    }

    pub fn is_closed(&self) -> bool {
        self.frames.is_closed()
    }

    fn push(&self, event: SensorEvent) -> bool {
        match self.frames.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }
}

impl FrameStream {
    /// Next event, loss notifications first. `None` once every sink is gone.
    pub async fn next(&mut self) -> Option<SensorEvent> {
        tokio::select! {
            biased;
            Some(reason) = self.losses.recv() => Some(SensorEvent::DeviceLost(reason)),
            event = self.frames.recv() => event,
        }
    }
}

/// An opened sensor. `close` must be idempotent.
pub trait SensorDevice: Send {
    fn open(&mut self) -> Result<(), DeviceError>;
    fn subscribe(&mut self, sink: FrameSink) -> Result<(), DeviceError>;
    fn close(&mut self);
}

pub trait DeviceProvider: Send + Sync {
    fn default_device(&self) -> Result<Box<dyn SensorDevice>, DeviceError>;
}
