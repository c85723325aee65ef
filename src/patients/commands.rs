use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::error::ApiError;
use crate::models::{NewPatient, PatientRecord};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PatientEntry {
    pub id: String,
    #[serde(flatten)]
    pub record: PatientRecord,
}

#[derive(Debug, Serialize)]
pub struct Registered {
    pub id: String,
    pub record: PatientRecord,
}

pub async fn create_patient(
    State(state): State<AppState>,
    Json(patient): Json<NewPatient>,
) -> Result<(StatusCode, Json<Registered>), ApiError> {
    let (id, record) = state.gateway.create_patient(patient).await?;
    Ok((StatusCode::CREATED, Json(Registered { id, record })))
}

pub async fn list_patients(
    State(state): State<AppState>,
) -> Result<Json<Vec<PatientEntry>>, ApiError> {
    let patients = state
        .gateway
        .list_patients()
        .await?
        .into_iter()
        .map(|(id, record)| PatientEntry { id, record })
        .collect();
    Ok(Json(patients))
}
