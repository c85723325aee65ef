pub mod cli;
pub mod error;
pub mod geometry;
pub mod models;
pub mod notify;
pub mod patients;
pub mod sensing;
pub mod session;
pub mod settings;
pub mod store;
pub mod utils;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    routing::{any, get, post, MethodRouter},
    Router,
};
use log::{info, warn};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use cli::Args;
use geometry::HeightCalculator;
use notify::{relay_router, Notifier};
use patients::commands::{create_patient, list_patients};
use sensing::{
    frame_pump, DeviceProvider, FrameSink, RecoveryController, RecoveryHandle, SensorLink,
    SimulatedProvider,
};
use session::{
    commands::{
        get_height, get_status, reconnect, start_height, start_skeletal, stop_height,
        stop_skeletal,
    },
    FrameHandler, SessionController, TrackingSession,
};
use settings::Settings;
use store::{DocumentStore, PersistenceGateway};

const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub session: SessionController,
    pub gateway: Arc<PersistenceGateway>,
    pub recovery: RecoveryHandle,
    pub notifier: Notifier,
}

/// Registers `path` with and without its trailing slash.
fn route_both(
    router: Router<AppState>,
    path: &str,
    handler: MethodRouter<AppState>,
) -> Router<AppState> {
    let bare = path.trim_end_matches('/');
    router
        .route(bare, handler.clone())
        .route(&format!("{bare}/"), handler)
}

pub fn control_router(state: AppState) -> Router {
    let router = Router::new();
    let router = route_both(router, "/startHeight", any(start_height));
    let router = route_both(router, "/stopHeight", any(stop_height));
    let router = route_both(router, "/getHeight", any(get_height));
    let router = route_both(router, "/startSkeletal", any(start_skeletal));
    let router = route_both(router, "/stopSkeletal", any(stop_skeletal));
    let router = route_both(router, "/status", get(get_status));
    let router = route_both(router, "/reconnect", post(reconnect));
    let router = route_both(router, "/patients", get(list_patients).post(create_patient));

    router.layer(CorsLayer::permissive()).with_state(state)
}

/// Background tasks behind the HTTP surfaces: the frame pump and the
/// recovery supervisor, plus the shared handles they run on.
pub struct Services {
    pub state: AppState,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Services {
    /// Must be called from inside a Tokio runtime.
    pub fn start(
        settings: &Settings,
        provider: Arc<dyn DeviceProvider>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let notifier = Notifier::new();
        let cancel = CancellationToken::new();

        let (sink, stream) = FrameSink::channel(settings.sensor.frame_queue_capacity);
        let link = SensorLink::shared(provider, sink);
        let (recovery, recovery_task) = RecoveryController::spawn(
            link,
            settings.recovery,
            notifier.clone(),
            cancel.child_token(),
        );

        let gateway = Arc::new(PersistenceGateway::new(store, &settings.store));
        let session = SessionController::new(
            TrackingSession::new(settings.patient_id.clone(), settings.capture_interval_ms),
            recovery.clone(),
            notifier.clone(),
        );
        let handler = FrameHandler::new(
            session.clone(),
            HeightCalculator::new(settings.calibration),
            gateway.clone(),
            notifier.clone(),
        );
        let pump_task = tokio::spawn(frame_pump(
            stream,
            handler,
            recovery.clone(),
            cancel.child_token(),
        ));

        Self {
            state: AppState {
                session,
                gateway,
                recovery,
                notifier,
            },
            cancel,
            tasks: vec![pump_task, recovery_task],
        }
    }

    /// Stops tracking, joins the background tasks and releases the sensor.
    pub async fn shutdown(self) {
        self.state.session.stop_all().await;
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!("Background task ended abnormally: {err}");
            }
        }
        self.state.recovery.release().await;
    }
}

pub async fn run(args: Args) -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("kinetrack starting up...");

    let settings = args.apply(Settings::load(&args.config)?);
    settings.validate()?;
    let store = store::open(&settings.store.backend)?;
    let provider = Arc::new(
        SimulatedProvider::new(settings.sensor.simulated_fps)
            .with_subject_height(settings.sensor.simulated_subject_height_m),
    );
    let services = Services::start(&settings, provider, store);

    if let Err(err) = services.state.recovery.ensure_subscribed().await {
        warn!("Depth sensor not available at startup: {err}");
    }

    let relay_listener = TcpListener::bind(settings.relay_addr)
        .await
        .with_context(|| format!("failed to bind relay on {}", settings.relay_addr))?;
    let control_listener = TcpListener::bind(settings.control_addr)
        .await
        .with_context(|| format!("failed to bind control surface on {}", settings.control_addr))?;

    info!("Push relay listening on ws://{}/ws", settings.relay_addr);
    info!("Control surface listening on http://{}", settings.control_addr);

    let shutdown = CancellationToken::new();

    let relay = axum::serve(relay_listener, relay_router(services.state.notifier.clone()))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let relay_task = tokio::spawn(async move {
        if let Err(err) = relay.await {
            log::error!("Push relay failed: {err}");
        }
    });

    let signal = shutdown.clone();
    axum::serve(control_listener, control_router(services.state.clone()))
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {err}");
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await
        .context("control surface failed")?;

    shutdown.cancel();
    if tokio::time::timeout(RELAY_DRAIN_TIMEOUT, relay_task).await.is_err() {
        warn!("Push relay did not drain within {RELAY_DRAIN_TIMEOUT:?}");
    }

    services.shutdown().await;
    info!("kinetrack stopped");
    Ok(())
}
