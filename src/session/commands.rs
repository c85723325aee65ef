use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::TrackingMode;
use crate::error::ApiError;
use crate::AppState;

/// Optional `?patientId=` accepted by the start routes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientQuery {
    pub patient_id: Option<String>,
}

async fn apply_patient(state: &AppState, query: PatientQuery) -> Result<(), ApiError> {
    if let Some(patient_id) = query.patient_id.filter(|id| !id.trim().is_empty()) {
        state.session.set_patient(patient_id.trim()).await?;
    }
    Ok(())
}

pub async fn start_height(
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
) -> Result<Json<Value>, ApiError> {
    apply_patient(&state, query).await?;
    state.session.start_height_measurement().await;
    Ok(Json(json!({ "status": "Height capturing started" })))
}

pub async fn stop_height(State(state): State<AppState>) -> Json<Value> {
    state.session.stop_all().await;
    Json(json!({ "status": "All tracking stopped" }))
}

pub async fn get_height(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.session.snapshot().await;
    let status = if snapshot.mode == TrackingMode::MeasuringHeight {
        "Measuring"
    } else {
        "Idle"
    };
    Json(json!({
        "status": status,
        "height": snapshot.last_height.map(|m| m.value),
    }))
}

pub async fn start_skeletal(
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
) -> Result<Json<Value>, ApiError> {
    apply_patient(&state, query).await?;
    state.session.start_skeletal_tracking().await;
    Ok(Json(json!({ "status": "Skeletal tracking started" })))
}

pub async fn stop_skeletal(State(state): State<AppState>) -> Json<Value> {
    state.session.stop_skeletal_tracking().await;
    Json(json!({ "status": "Skeletal tracking stopped" }))
}

pub async fn get_status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.session.snapshot().await;
    Json(json!({
        "session": snapshot,
        "device": state.recovery.status(),
        "store": state.gateway.store_name(),
    }))
}

pub async fn reconnect(State(state): State<AppState>) -> Json<Value> {
    state.recovery.request_reconnect();
    Json(json!({ "status": "Reconnect requested" }))
}
