pub mod measurement;
pub mod patient;
pub mod skeleton;

pub use measurement::{HeightMeasurement, JointSample, SkeletalSnapshot};
pub use patient::{generate_patient_id, normalized_name, patient_id_prefix, NewPatient, PatientRecord};
pub use skeleton::{Body, Joint, JointType, Position, SkeletonFrame, TrackingState};
