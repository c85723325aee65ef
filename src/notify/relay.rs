use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::{Notifier, PushEvent, EVENT_HEIGHT};
use crate::error::ApiError;

pub fn relay_router(notifier: Notifier) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/notify", post(notify))
        .route("/heightUpdated", get(height_updated))
        .layer(CorsLayer::permissive())
        .with_state(notifier)
}

async fn ws_handler(ws: WebSocketUpgrade, State(notifier): State<Notifier>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client(socket, notifier))
}

async fn handle_client(mut socket: WebSocket, notifier: Notifier) {
    let client_id = Uuid::new_v4();
    let mut rx = notifier.subscribe();
    log::info!("Dashboard client {client_id} connected");

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Client {client_id} lagged, skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    log::info!("Dashboard client {client_id} disconnected");
}

/// Fans out an event posted by another process, byte for byte.
async fn notify(State(notifier): State<Notifier>, body: String) -> Result<Json<Value>, ApiError> {
    serde_json::from_str::<PushEvent>(&body)
        .map_err(|err| ApiError::bad_request(format!("expected {{type, data}}: {err}")))?;

    let delivered = notifier.subscriber_count();
    notifier.publish_raw(body);
    Ok(Json(json!({ "status": "ok", "subscribers": delivered })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeightUpdatedQuery {
    patient_id: Option<String>,
    height: Option<String>,
}

async fn height_updated(
    State(notifier): State<Notifier>,
    Query(query): Query<HeightUpdatedQuery>,
) -> Result<Json<Value>, ApiError> {
    let (Some(patient_id), Some(height)) = (query.patient_id, query.height) else {
        return Err(ApiError::bad_request("patientId and height are required"));
    };
    let height: f64 = height
        .parse()
        .map_err(|_| ApiError::bad_request(format!("height '{height}' is not a number")))?;

    notifier.publish(
        EVENT_HEIGHT,
        &json!({ "patientId": patient_id, "height": height }),
    );
    Ok(Json(json!({ "status": "ok" })))
}
