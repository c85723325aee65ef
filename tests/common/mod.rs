#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;

use kinetrack_lib::models::{Body, Joint, JointType, SkeletonFrame};
use kinetrack_lib::sensing::{DeviceError, DeviceProvider, FrameSink, SensorDevice};
use kinetrack_lib::store::{DocumentStore, StoreError};

/// Provider whose acquisitions fail a set number of times. Frames are
/// pushed by the test through the sink of the current device.
#[derive(Default)]
pub struct ScriptedProvider {
    failures_left: AtomicU32,
    acquisitions: AtomicU32,
    driver_delay_ms: AtomicU64,
    sink: Arc<Mutex<Option<FrameSink>>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(times: u32) -> Arc<Self> {
        let provider = Self::default();
        provider.failures_left.store(times, Ordering::SeqCst);
        Arc::new(provider)
    }

    /// Makes every acquisition block the calling thread like a slow driver.
    pub fn slow(delay: Duration) -> Arc<Self> {
        let provider = Self::default();
        provider
            .driver_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        Arc::new(provider)
    }

    pub fn set_failures(&self, times: u32) {
        self.failures_left.store(times, Ordering::SeqCst);
    }

    pub fn acquisitions(&self) -> u32 {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn push(&self, frame: SkeletonFrame) -> bool {
        match self.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.push_frame(frame),
            None => false,
        }
    }

    pub fn fail_acquisition(&self) -> bool {
        match self.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.acquisition_failed(),
            None => false,
        }
    }

    pub fn unplug(&self, reason: &str) {
        if let Some(sink) = self.sink.lock().unwrap().take() {
            sink.device_lost(reason);
        }
    }
}

impl DeviceProvider for ScriptedProvider {
    fn default_device(&self) -> Result<Box<dyn SensorDevice>, DeviceError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        let delay = self.driver_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(DeviceError::NotFound);
        }
        Ok(Box::new(ScriptedDevice {
            sink: self.sink.clone(),
        }))
    }
}

struct ScriptedDevice {
    sink: Arc<Mutex<Option<FrameSink>>>,
}

impl SensorDevice for ScriptedDevice {
    fn open(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn subscribe(&mut self, sink: FrameSink) -> Result<(), DeviceError> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn close(&mut self) {
        self.sink.lock().unwrap().take();
    }
}

/// Store that refuses every write.
pub struct RejectingStore;

#[async_trait]
impl DocumentStore for RejectingStore {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    async fn put(&self, _path: &str, _value: Value) -> Result<(), StoreError> {
        Err(StoreError::Rejected {
            status: 401,
            message: "Permission denied".into(),
        })
    }

    async fn get(&self, _path: &str) -> Result<Option<Value>, StoreError> {
        Ok(None)
    }
}

/// One tracked subject whose head is `span` meters above the higher foot.
pub fn subject_frame(span: f32) -> SkeletonFrame {
    let mut joints = HashMap::new();
    joints.insert(JointType::Head, Joint::tracked(0.0, span - 0.9, 2.3));
    joints.insert(JointType::SpineMid, Joint::tracked(0.0, 0.1, 2.3));
    joints.insert(JointType::FootLeft, Joint::tracked(-0.1, -0.9, 2.3));
    joints.insert(JointType::FootRight, Joint::tracked(0.1, -0.9, 2.3));
    SkeletonFrame::new(vec![
        Body {
            tracking_id: 0,
            is_tracked: false,
            joints: HashMap::new(),
        },
        Body {
            tracking_id: 42,
            is_tracked: true,
            joints,
        },
    ])
}

pub fn empty_frame() -> SkeletonFrame {
    SkeletonFrame::new(Vec::new())
}
