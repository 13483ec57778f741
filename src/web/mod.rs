use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc, oneshot},
};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{error, info, warn};

use crate::{
    alerts::{RiskAlert, RiskAlertMonitor},
    engine::{Engine, FeedMode},
    history::{DensityHistory, HistoryEntry, ZoneTrend},
    scenario::Scenario,
    scheduler::{EngineCommand, TickScheduler},
    snapshot::Snapshot,
    zones::ZoneRegistry,
};

const COMMAND_BUFFER: usize = 256;

/// One SSE payload: the published state plus any alerts it raised.
#[derive(Serialize)]
pub struct LiveFrame<'a> {
    pub snapshot: &'a Snapshot,
    pub alerts: Vec<RiskAlert>,
}

#[derive(Clone, Serialize)]
pub struct StateEnvelope {
    pub scenario: String,
    pub feed: FeedMode,
    pub snapshot: Option<Snapshot>,
}

#[derive(Clone, Serialize)]
pub struct HistoryResponse {
    pub scenario: String,
    pub capacity: usize,
    pub entries: Vec<HistoryEntry>,
    pub trends: Vec<ZoneTrend>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservationRequest {
    pub zone: String,
    pub people: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub struct AppState {
    broadcaster: broadcast::Sender<String>,
    latest: Mutex<Option<Arc<Snapshot>>>,
    history: Mutex<DensityHistory>,
    alerts: Mutex<RiskAlertMonitor>,
    commands: mpsc::Sender<EngineCommand>,
    registry: Arc<ZoneRegistry>,
    scenario_name: String,
    feed: FeedMode,
}

impl AppState {
    fn new(
        scenario: &Scenario,
        engine: &Engine,
        commands: mpsc::Sender<EngineCommand>,
    ) -> Self {
        let (broadcaster, _) = broadcast::channel::<String>(512);
        let mut history = DensityHistory::new(scenario.history_len);
        let latest = engine.snapshot();
        if let Some(snapshot) = &latest {
            history.record(snapshot);
        }
        Self {
            broadcaster,
            latest: Mutex::new(latest),
            history: Mutex::new(history),
            alerts: Mutex::new(RiskAlertMonitor::new(scenario.alert_cooldown())),
            commands,
            registry: engine.registry().clone(),
            scenario_name: scenario.name.clone(),
            feed: engine.feed(),
        }
    }

    /// Records a published snapshot and fans it out to SSE clients.
    fn publish(&self, snapshot: &Arc<Snapshot>) {
        *self.latest.lock().expect("latest snapshot lock poisoned") = Some(snapshot.clone());
        self.history
            .lock()
            .expect("history lock poisoned")
            .record(snapshot);
        let alerts = self
            .alerts
            .lock()
            .expect("alert monitor lock poisoned")
            .inspect(snapshot);

        let frame = LiveFrame {
            snapshot: snapshot.as_ref(),
            alerts,
        };
        match serde_json::to_string(&frame) {
            Ok(payload) => {
                // No receivers is fine; clients come and go.
                let _ = self.broadcaster.send(payload);
            }
            Err(err) => warn!("failed to encode live frame: {err}"),
        }
    }
}

/// Wires an engine to fresh shared state so every tick lands in it.
fn attach(scenario: &Scenario, engine: &mut Engine) -> (Arc<AppState>, mpsc::Receiver<EngineCommand>) {
    let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
    let state = Arc::new(AppState::new(scenario, engine, commands));
    let sink = state.clone();
    engine.subscribe(move |snapshot| sink.publish(snapshot));
    (state, receiver)
}

pub struct WebServerConfig {
    pub scenario: Scenario,
    pub host: String,
    pub port: u16,
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig {
        scenario,
        host,
        port,
    } = config;

    let mut engine = scenario.engine_builder().build()?;
    let (state, receiver) = attach(&scenario, &mut engine);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let cadence = scenario.cadence();

    let engine_handle = tokio::spawn(async move {
        let mut scheduler = TickScheduler::new(cadence);
        scheduler
            .run(&mut engine, receiver, async {
                let _ = stop_rx.await;
            })
            .await;
        if let Some(average) = scheduler.average_tick_time() {
            info!(?average, "average tick time");
        }
        engine.dispose();
    });

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    info!(
        scenario = %scenario.name,
        tick_ms = cadence.as_millis() as u64,
        "FlowTrack live at http://{addr} (Ctrl+C to stop)"
    );

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_tx.send(());
    if let Err(err) = engine_handle.await {
        error!("engine task failed: {err:?}");
    }
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/state", get(latest_state))
        .route("/api/history", get(density_history))
        .route("/api/alerts", get(recent_alerts))
        .route("/api/events", get(stream_events))
        .route("/api/observations", post(report_observation))
        .with_state(state)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down web server");
}

async fn latest_state(State(state): State<Arc<AppState>>) -> Json<StateEnvelope> {
    let snapshot = state
        .latest
        .lock()
        .expect("latest snapshot lock poisoned")
        .as_deref()
        .cloned();
    Json(StateEnvelope {
        scenario: state.scenario_name.clone(),
        feed: state.feed,
        snapshot,
    })
}

async fn density_history(State(state): State<Arc<AppState>>) -> Json<HistoryResponse> {
    let history = state.history.lock().expect("history lock poisoned");
    Json(HistoryResponse {
        scenario: state.scenario_name.clone(),
        capacity: history.capacity(),
        entries: history.entries().cloned().collect(),
        trends: history.trends(),
    })
}

async fn recent_alerts(State(state): State<Arc<AppState>>) -> Json<Vec<RiskAlert>> {
    let alerts = state.alerts.lock().expect("alert monitor lock poisoned");
    Json(alerts.recent().cloned().collect())
}

async fn report_observation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ObservationRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    let reject = |status: StatusCode, error: String| (status, Json(ErrorBody { error }));

    if state.feed != FeedMode::External {
        return Err(reject(
            StatusCode::CONFLICT,
            "engine runs a simulated feed".into(),
        ));
    }
    if let Err(err) = state.registry.get_zone(&request.zone) {
        return Err(reject(StatusCode::NOT_FOUND, err.to_string()));
    }

    state
        .commands
        .send(EngineCommand::Observe {
            zone: request.zone,
            people: request.people,
        })
        .await
        .map_err(|_| reject(StatusCode::SERVICE_UNAVAILABLE, "engine stopped".into()))?;
    Ok(StatusCode::ACCEPTED)
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok(Event::default().data(payload))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(2))
            .text("keep-alive"),
    )
}
