use std::sync::Arc;

use tokio::{sync::Mutex, task};

use super::device::{DeviceError, DeviceProvider, FrameSink, SensorDevice};

pub type SharedLink = Arc<Mutex<SensorLink>>;

/// The currently held device and its frame subscription.
pub struct SensorLink {
    provider: Arc<dyn DeviceProvider>,
    sink: FrameSink,
    device: Option<Box<dyn SensorDevice>>,
}

impl SensorLink {
    pub fn new(provider: Arc<dyn DeviceProvider>, sink: FrameSink) -> Self {
        Self {
            provider,
            sink,
            device: None,
        }
    }

    pub fn shared(provider: Arc<dyn DeviceProvider>, sink: FrameSink) -> SharedLink {
        Arc::new(Mutex::new(Self::new(provider, sink)))
    }

    pub fn is_subscribed(&self) -> bool {
        self.device.is_some()
    }

    /// Opens the default device and subscribes its frames. No-op when a
    /// device is already held. Driver calls run on the blocking pool.
    pub async fn acquire(&mut self) -> Result<(), DeviceError> {
        if self.device.is_some() {
            return Ok(());
        }

        let provider = self.provider.clone();
        let sink = self.sink.clone();
        let device = task::spawn_blocking(move || {
            let mut device = provider.default_device()?;
            match device.open().and_then(|()| device.subscribe(sink)) {
                Ok(()) => Ok(device),
                Err(err) => {
                    device.close();
                    Err(err)
                }
            }
        })
        .await
        .map_err(|err| DeviceError::Unavailable(format!("driver call aborted: {err}")))??;

        self.device = Some(device);
        Ok(())
    }

    pub async fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            if let Err(err) = task::spawn_blocking(move || device.close()).await {
                log::warn!("Closing the depth sensor failed: {err}");
            }
        }
    }
}

impl Drop for SensorLink {
    fn drop(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.close();
        }
    }
}
