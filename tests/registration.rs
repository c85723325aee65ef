use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use kinetrack_lib::models::NewPatient;
use kinetrack_lib::settings::StoreSettings;
use kinetrack_lib::store::{
    DocumentStore, MemoryStore, PersistenceGateway, RegistrationError, SqliteStore,
};

fn gateway(store: Arc<dyn DocumentStore>) -> PersistenceGateway {
    PersistenceGateway::new(store, &StoreSettings::default())
}

#[tokio::test]
async fn duplicate_names_are_rejected_case_insensitively() {
    let gw = gateway(Arc::new(MemoryStore::new()));

    let (id, record) = gw
        .create_patient(NewPatient::new("Alice", 30, "Female", 1.65))
        .await
        .unwrap();
    assert!(id.starts_with("F30AL"));
    assert_eq!(record.name, "Alice");

    let err = gw
        .create_patient(NewPatient::new("alice", 31, "Female", 1.60))
        .await
        .unwrap_err();
    match err {
        RegistrationError::Duplicate { existing_id, .. } => assert_eq!(existing_id, id),
        other => panic!("expected duplicate, got {other}"),
    }

    assert_eq!(gw.list_patients().await.unwrap().len(), 1);
}

#[tokio::test]
async fn registration_persists_across_sqlite_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("patients.sqlite3");
    let at = Utc.with_ymd_and_hms(2024, 3, 15, 10, 42, 17).unwrap();

    {
        let gw = gateway(Arc::new(SqliteStore::open(path.clone()).unwrap()));
        let (id, _) = gw
            .create_patient_at(NewPatient::new(" Bob ", 52, "Male", 1.8), at)
            .await
            .unwrap();
        assert_eq!(id, "M52BO202403151042");
    }

    let gw = gateway(Arc::new(SqliteStore::open(path).unwrap()));
    let found = gw.find_by_name("BOB").await.unwrap().unwrap();
    assert_eq!(found.0, "M52BO202403151042");
    assert_eq!(found.1.age, 52);
    assert_eq!(found.1.created_at, at);
}

#[tokio::test]
async fn invalid_input_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let gw = gateway(store.clone());

    let err = gw
        .create_patient(NewPatient::new("", 30, "Female", 1.6))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Invalid(_)));
    assert_eq!(store.get("patients").await.unwrap(), None);
}

#[tokio::test]
async fn concurrent_registrations_of_one_name_admit_one() {
    let gw = Arc::new(gateway(Arc::new(MemoryStore::new())));

    let a = tokio::spawn({
        let gw = gw.clone();
        async move { gw.create_patient(NewPatient::new("Cara", 25, "Female", 1.7)).await }
    });
    let b = tokio::spawn({
        let gw = gw.clone();
        async move { gw.create_patient(NewPatient::new("cara", 26, "Female", 1.7)).await }
    });

    let results = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(gw.list_patients().await.unwrap().len(), 1);
}
