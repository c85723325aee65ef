pub mod device;
pub mod link;
pub mod pump;
pub mod recovery;
pub mod simulated;

pub use device::{DeviceError, DeviceProvider, FrameSink, FrameStream, SensorDevice, SensorEvent};
pub use link::{SensorLink, SharedLink};
pub use pump::frame_pump;
pub use recovery::{DeviceStatus, RecoveryController, RecoveryHandle};
pub use simulated::SimulatedProvider;
