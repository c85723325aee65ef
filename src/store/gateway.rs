use std::{collections::BTreeMap, future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde_json::Value;
use thiserror::Error;
use tokio::{sync::Mutex, time};

use super::{
    height_path, is_valid_key, patient_path, skeletal_path, DocumentStore, StoreError,
    PATIENTS_ROOT,
};
use crate::models::{
    generate_patient_id, normalized_name, patient_id_prefix, JointSample, NewPatient,
    PatientRecord,
};
use crate::settings::StoreSettings;

const MAX_AGE: u32 = 150;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid registration: {0}")]
    Invalid(String),

    #[error("a patient named '{name}' already exists ({existing_id})")]
    Duplicate { name: String, existing_id: String },

    #[error("patient id {0} is already taken")]
    IdCollision(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Typed writes and reads on top of a [`DocumentStore`], with a timeout on
/// every call and a bounded retry for transient failures.
pub struct PersistenceGateway {
    store: Arc<dyn DocumentStore>,
    write_timeout: Duration,
    write_retries: u32,
    retry_delay: Duration,
    registration: Mutex<()>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn DocumentStore>, settings: &StoreSettings) -> Self {
        Self {
            store,
            write_timeout: Duration::from_millis(settings.write_timeout_ms.max(1)),
            write_retries: settings.write_retries,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            registration: Mutex::new(()),
        }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    async fn bounded<T, F, Fut>(&self, what: &str, op: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            let result = match time::timeout(self.write_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(self.write_timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.write_retries => {
                    attempt += 1;
                    warn!(
                        "{what} failed ({err}), retrying ({attempt}/{})",
                        self.write_retries
                    );
                    time::sleep(self.retry_delay).await;
                }
                Err(err) => {
                    error!("{what} failed: {err}");
                    return Err(err);
                }
            }
        }
    }

    async fn put(&self, path: String, value: Value) -> Result<(), StoreError> {
        let what = format!("write to {path}");
        self.bounded(&what, || self.store.put(&path, value.clone()))
            .await
    }

    async fn get(&self, path: String) -> Result<Option<Value>, StoreError> {
        let what = format!("read of {path}");
        self.bounded(&what, || self.store.get(&path)).await
    }

    pub async fn write_height(&self, patient_id: &str, value: f64) -> Result<(), StoreError> {
        self.put(height_path(patient_id), Value::from(value)).await
    }

    pub async fn write_skeletal_snapshot(
        &self,
        patient_id: &str,
        key: i64,
        joints: &BTreeMap<String, JointSample>,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(joints)?;
        self.put(skeletal_path(patient_id, key), value).await
    }

    /// Every child of `patients` that parses as a record. Nodes holding
    /// only measurements (e.g. the default session patient) are skipped.
    pub async fn list_patients(&self) -> Result<Vec<(String, PatientRecord)>, StoreError> {
        let Some(Value::Object(children)) = self.get(PATIENTS_ROOT.to_string()).await? else {
            return Ok(Vec::new());
        };

        let mut patients: Vec<(String, PatientRecord)> = children
            .into_iter()
            .filter_map(|(id, node)| {
                serde_json::from_value::<PatientRecord>(node)
                    .ok()
                    .map(|record| (id, record))
            })
            .collect();
        patients.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(patients)
    }

    /// Case-insensitive match on the trimmed name, by full scan.
    pub async fn find_by_name(
        &self,
        name: &str,
    ) -> Result<Option<(String, PatientRecord)>, StoreError> {
        let wanted = normalized_name(name);
        Ok(self
            .list_patients()
            .await?
            .into_iter()
            .find(|(_, record)| normalized_name(&record.name) == wanted))
    }

    pub async fn create_patient(
        &self,
        patient: NewPatient,
    ) -> Result<(String, PatientRecord), RegistrationError> {
        self.create_patient_at(patient, Utc::now()).await
    }

    /// Registers a patient as of `at`. Registrations are serialized so the
    /// duplicate and collision checks cannot race a concurrent insert.
    pub async fn create_patient_at(
        &self,
        patient: NewPatient,
        at: DateTime<Utc>,
    ) -> Result<(String, PatientRecord), RegistrationError> {
        validate_registration(&patient)?;

        let _guard = self.registration.lock().await;

        if let Some((existing_id, existing)) = self.find_by_name(&patient.name).await? {
            info!("Rejected duplicate registration for '{}'", existing.name);
            return Err(RegistrationError::Duplicate {
                name: existing.name,
                existing_id,
            });
        }

        let id = generate_patient_id(&patient.name, patient.age, &patient.gender, at);
        if self.get(patient_path(&id)).await?.is_some() {
            return Err(RegistrationError::IdCollision(id));
        }

        let record = patient.into_record(at);
        self.put(patient_path(&id), serde_json::to_value(&record).map_err(StoreError::from)?)
            .await?;

        info!("Registered patient {id}");
        Ok((id, record))
    }
}

pub fn validate_registration(patient: &NewPatient) -> Result<(), RegistrationError> {
    if patient.name.trim().is_empty() {
        return Err(RegistrationError::Invalid("name must not be empty".into()));
    }
    if patient.gender.trim().is_empty() {
        return Err(RegistrationError::Invalid("gender must not be empty".into()));
    }
    if !(1..=MAX_AGE).contains(&patient.age) {
        return Err(RegistrationError::Invalid(format!(
            "age must be between 1 and {MAX_AGE}"
        )));
    }
    if !patient.height.is_finite() || patient.height <= 0.0 {
        return Err(RegistrationError::Invalid("height must be positive".into()));
    }
    // The id is a store key, so its name and gender letters must be too.
    if !is_valid_key(&patient_id_prefix(&patient.name, patient.age, &patient.gender)) {
        return Err(RegistrationError::Invalid(
            "name and gender must not start with '/', '.', '$', '#', '[' or ']'".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    fn gateway(store: Arc<dyn DocumentStore>) -> PersistenceGateway {
        PersistenceGateway::new(
            store,
            &StoreSettings {
                retry_delay_ms: 10,
                ..StoreSettings::default()
            },
        )
    }

    /// Fails the first `failures` puts with the given error.
    struct Flaky {
        inner: MemoryStore,
        failures: AtomicU32,
        retryable: bool,
        puts: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32, retryable: bool) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures: AtomicU32::new(failures),
                retryable,
                puts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn put(&self, path: &str, value: Value) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(if self.retryable {
                    StoreError::Unavailable("503".into())
                } else {
                    StoreError::Rejected {
                        status: 401,
                        message: "denied".into(),
                    }
                });
            }
            self.inner.put(path, value).await
        }

        async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(path).await
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let store = Arc::new(Flaky::new(1, true));
        let gw = gateway(store.clone());
        gw.write_height("P1", 1.72).await.unwrap();
        assert_eq!(store.puts.load(Ordering::SeqCst), 2);
        assert_eq!(store.get("patients/P1/height").await.unwrap(), Some(json!(1.72)));
    }

    #[tokio::test]
    async fn fatal_failure_is_not_retried() {
        let store = Arc::new(Flaky::new(1, false));
        let gw = gateway(store.clone());
        let err = gw.write_height("P1", 1.72).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 401, .. }));
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let store = Arc::new(Flaky::new(5, true));
        let gw = gateway(store.clone());
        assert!(gw.write_height("P1", 1.72).await.is_err());
        assert_eq!(store.puts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn snapshot_lands_under_skeletal_data() {
        let store = Arc::new(MemoryStore::new());
        let gw = gateway(store.clone());
        let mut joints = BTreeMap::new();
        joints.insert(
            "Head".to_string(),
            JointSample {
                x: 0.0,
                y: 1.5,
                z: 2.0,
                confidence: crate::models::TrackingState::Tracked,
            },
        );
        gw.write_skeletal_snapshot("P1", 1_700_000_000_123, &joints)
            .await
            .unwrap();

        let stored = store
            .get("patients/P1/skeletal_data/1700000000123/Head")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["confidence"], "Tracked");
    }

    #[tokio::test]
    async fn same_minute_registration_of_a_new_name_is_an_id_collision() {
        let store = Arc::new(MemoryStore::new());
        let gw = gateway(store.clone());
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 10, 42, 0).unwrap();

        // A measurement-only node already sits where the new id would go.
        store
            .put("patients/F30AL202403151042/height", json!(1.6))
            .await
            .unwrap();

        let err = gw
            .create_patient_at(NewPatient::new("Alma", 30, "Female", 1.6), at)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::IdCollision(id) if id == "F30AL202403151042"));
    }

    #[tokio::test]
    async fn listing_skips_measurement_only_nodes() {
        let store = Arc::new(MemoryStore::new());
        let gw = gateway(store.clone());
        store.put("patients/temp_patient/height", json!(1.7)).await.unwrap();
        let (id, _) = gw
            .create_patient(NewPatient::new("Bea", 41, "Female", 1.7))
            .await
            .unwrap();
        gw.write_height(&id, 1.71).await.unwrap();

        let listed = gw.list_patients().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, id);
        assert_eq!(listed[0].1.height, 1.71);
    }

    #[tokio::test]
    async fn slash_in_name_is_rejected_before_any_write() {
        let store = Arc::new(MemoryStore::new());
        let gw = gateway(store.clone());

        let err = gw
            .create_patient(NewPatient::new("A/lice", 30, "Female", 1.6))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Invalid(_)));
        assert_eq!(store.get(PATIENTS_ROOT).await.unwrap(), None);

        let (id, _) = gw
            .create_patient(NewPatient::new("Alice", 30, "Female", 1.6))
            .await
            .unwrap();
        assert!(id.starts_with("F30AL"));
        assert_eq!(gw.list_patients().await.unwrap().len(), 1);
    }

    #[test]
    fn validation_rules() {
        let ok = NewPatient::new("Ann", 30, "Female", 1.6);
        assert!(validate_registration(&ok).is_ok());
        let punctuated_later = NewPatient::new("Dr. Who", 30, "Male", 1.8);
        assert!(validate_registration(&punctuated_later).is_ok());

        for bad in [
            NewPatient::new("  ", 30, "Female", 1.6),
            NewPatient::new("Ann", 0, "Female", 1.6),
            NewPatient::new("Ann", 151, "Female", 1.6),
            NewPatient::new("Ann", 30, "", 1.6),
            NewPatient::new("Ann", 30, "Female", 0.0),
            NewPatient::new("A/lice", 30, "Female", 1.6),
            NewPatient::new("/Al", 30, "Female", 1.6),
            NewPatient::new("Ann", 30, "#F", 1.6),
            NewPatient::new("A.", 30, "Female", 1.6),
        ] {
            assert!(matches!(
                validate_registration(&bad),
                Err(RegistrationError::Invalid(_))
            ));
        }
    }
}
