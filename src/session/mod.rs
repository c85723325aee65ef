pub mod commands;
pub mod controller;
pub mod frames;
pub mod state;

pub use controller::SessionController;
pub use frames::{FrameHandler, FrameOutcome};
pub use state::{SessionSnapshot, TrackingMode, TrackingSession};
