//! Synthetic sensor: one standing subject with a little positional noise.
//!
//! Availability can be flipped at runtime to exercise the recovery path.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use rand::Rng;

use super::device::{DeviceError, DeviceProvider, FrameSink, SensorDevice};
use crate::models::{Body, Joint, JointType, SkeletonFrame};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Camera-space Y of the floor for a sensor mounted about hip height.
const FLOOR_Y: f32 = -0.9;
const SUBJECT_DEPTH_M: f32 = 2.4;
const JITTER_M: f32 = 0.004;
/// Share of frame notifications whose frame cannot be acquired.
const NULL_FRAME_RATE: f64 = 0.01;

pub struct SimulatedProvider {
    fps: u32,
    subject_height_m: f32,
    available: Arc<AtomicBool>,
}

impl SimulatedProvider {
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            subject_height_m: 1.72,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_subject_height(mut self, meters: f32) -> Self {
        self.subject_height_m = meters;
        self
    }

    /// Shared switch; `false` unplugs the running device and makes
    /// acquisition fail until set back to `true`.
    pub fn availability(&self) -> Arc<AtomicBool> {
        self.available.clone()
    }
}

impl DeviceProvider for SimulatedProvider {
    fn default_device(&self) -> Result<Box<dyn SensorDevice>, DeviceError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(DeviceError::NotFound);
        }
        Ok(Box::new(SimulatedDevice {
            frame_period: Duration::from_secs(1) / self.fps,
            subject_height_m: self.subject_height_m,
            available: self.available.clone(),
            opened: false,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }))
    }
}

struct SimulatedDevice {
    frame_period: Duration,
    subject_height_m: f32,
    available: Arc<AtomicBool>,
    opened: bool,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SensorDevice for SimulatedDevice {
    fn open(&mut self) -> Result<(), DeviceError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(DeviceError::Unavailable("simulated sensor unplugged".into()));
        }
        self.opened = true;
        Ok(())
    }

    fn subscribe(&mut self, sink: FrameSink) -> Result<(), DeviceError> {
        if !self.opened {
            return Err(DeviceError::ReaderUnavailable("device is not open".into()));
        }
        if self.worker.is_some() {
            return Ok(());
        }

        let stop = self.stop.clone();
        let available = self.available.clone();
        let period = self.frame_period;
        let height = self.subject_height_m;

        let worker = thread::Builder::new()
            .name("kinetrack-sim-sensor".into())
            .spawn(move || deliver_frames(sink, stop, available, period, height))
            .map_err(|err| DeviceError::ReaderUnavailable(err.to_string()))?;

        self.worker = Some(worker);
        log_info!("Simulated sensor streaming every {:?}", self.frame_period);
        Ok(())
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log_warn!("Simulated sensor thread panicked");
            }
        }
        self.opened = false;
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.close();
    }
}

fn deliver_frames(
    sink: FrameSink,
    stop: Arc<AtomicBool>,
    available: Arc<AtomicBool>,
    period: Duration,
    height: f32,
) {
    let mut rng = rand::thread_rng();
    let mut dropped: u64 = 0;

    while !stop.load(Ordering::SeqCst) {
        if !available.load(Ordering::SeqCst) {
            sink.device_lost("simulated sensor unplugged");
            break;
        }
        if sink.is_closed() {
            break;
        }

        let delivered = if rng.gen_bool(NULL_FRAME_RATE) {
            sink.acquisition_failed()
        } else {
            sink.push_frame(standing_frame(height, &mut rng))
        };
        if !delivered {
            dropped += 1;
        }
        thread::sleep(period);
    }

    if dropped > 0 {
        log_info!("Simulated sensor dropped {dropped} frames on a full queue");
    }
}

/// Fraction of the head-to-floor span at which each joint sits, and its
/// lateral offset in meters.
fn joint_layout(joint: JointType) -> (f32, f32) {
    use JointType::*;
    match joint {
        Head => (1.0, 0.0),
        Neck => (0.91, 0.0),
        SpineShoulder => (0.87, 0.0),
        SpineMid => (0.70, 0.0),
        SpineBase => (0.53, 0.0),
        ShoulderLeft => (0.86, -0.19),
        ShoulderRight => (0.86, 0.19),
        ElbowLeft => (0.68, -0.24),
        ElbowRight => (0.68, 0.24),
        WristLeft => (0.52, -0.26),
        WristRight => (0.52, 0.26),
        HandLeft => (0.48, -0.26),
        HandRight => (0.48, 0.26),
        HandTipLeft => (0.43, -0.26),
        HandTipRight => (0.43, 0.26),
        ThumbLeft => (0.47, -0.23),
        ThumbRight => (0.47, 0.23),
        HipLeft => (0.52, -0.09),
        HipRight => (0.52, 0.09),
        KneeLeft => (0.28, -0.10),
        KneeRight => (0.28, 0.10),
        AnkleLeft => (0.05, -0.11),
        AnkleRight => (0.05, 0.11),
        FootLeft => (0.0, -0.12),
        FootRight => (0.0, 0.12),
    }
}

pub(crate) fn standing_frame(height_m: f32, rng: &mut impl Rng) -> SkeletonFrame {
    // The head joint sits below the crown; undo the calibration factor so
    // the measured height comes out near `height_m`.
    let span = height_m / 1.15;

    let joints: HashMap<JointType, Joint> = JointType::ALL
        .iter()
        .map(|&joint| {
            let (fraction, lateral) = joint_layout(joint);
            let mut noise = || rng.gen_range(-JITTER_M..=JITTER_M);
            let position = Joint::tracked(
                lateral + noise(),
                FLOOR_Y + span * fraction + noise(),
                SUBJECT_DEPTH_M + noise(),
            );
            (joint, position)
        })
        .collect();

    SkeletonFrame::new(vec![Body {
        tracking_id: 1,
        is_tracked: true,
        joints,
    }])
}
