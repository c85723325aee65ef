use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

use crate::settings::{Settings, StoreBackend};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "kinetrack",
    version,
    about = "Depth-sensor tracking controller with a live dashboard relay"
)]
pub struct Args {
    /// JSON settings file; missing means defaults
    #[arg(long, default_value = "kinetrack.json")]
    pub config: PathBuf,

    /// Control surface address
    #[arg(long)]
    pub control_addr: Option<SocketAddr>,

    /// Push relay address
    #[arg(long)]
    pub relay_addr: Option<SocketAddr>,

    /// Patient the session starts with
    #[arg(long)]
    pub patient_id: Option<String>,

    /// Skeletal capture interval in milliseconds
    #[arg(long)]
    pub capture_interval_ms: Option<u64>,

    /// Firebase Realtime Database URL
    #[arg(long, value_name = "URL", conflicts_with_all = ["sqlite", "memory_store"])]
    pub firebase_url: Option<String>,

    /// SQLite document store path
    #[arg(long, value_name = "PATH", conflicts_with = "memory_store")]
    pub sqlite: Option<String>,

    /// Keep everything in memory
    #[arg(long)]
    pub memory_store: bool,

    /// Frame rate of the simulated sensor
    #[arg(long)]
    pub fps: Option<u32>,

    /// Height in meters of the simulated subject
    #[arg(long, value_name = "METERS")]
    pub subject_height: Option<f32>,
}

impl Args {
    /// Command-line flags win over the settings file.
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(addr) = self.control_addr {
            settings.control_addr = addr;
        }
        if let Some(addr) = self.relay_addr {
            settings.relay_addr = addr;
        }
        if let Some(patient_id) = &self.patient_id {
            settings.patient_id = patient_id.clone();
        }
        if let Some(ms) = self.capture_interval_ms {
            settings.capture_interval_ms = ms;
        }
        if let Some(url) = &self.firebase_url {
            settings.store.backend = StoreBackend::Firebase { url: url.clone() };
        }
        if let Some(path) = &self.sqlite {
            settings.store.backend = StoreBackend::Sqlite { path: path.clone() };
        }
        if self.memory_store {
            settings.store.backend = StoreBackend::Memory;
        }
        if let Some(fps) = self.fps {
            settings.sensor.simulated_fps = fps;
        }
        if let Some(meters) = self.subject_height {
            settings.sensor.simulated_subject_height_m = meters;
        }
        settings
    }
}
