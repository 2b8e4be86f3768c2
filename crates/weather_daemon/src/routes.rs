use crate::state::AppState;
use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use weather_core::{EventEnvelope, MetricsSnapshot};

#[cfg(test)]
pub fn make_router(state: AppState) -> Router {
    make_router_with_cors(state, HeaderValue::from_static("http://localhost:5173"))
}

pub fn make_router_with_cors(state: AppState, cors_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/meta", get(meta_handler))
        .route("/api/v1/snapshot", get(snapshot_handler))
        .route("/api/v1/weather", get(weather_handler))
        .route("/api/v1/metrics", get(metrics_handler))
        .route("/api/v1/stream", get(stream_handler))
        .route("/api/v1/save", post(save_handler))
        .route("/api/v1/pause", post(pause_handler))
        .route("/api/v1/resume", post(resume_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn meta_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let sim = app_state.sim.lock();
    let ticks_per_sec = app_state.ticks_per_sec;
    let paused = app_state.paused.load(Ordering::Relaxed);
    Json(serde_json::json!({
        "tick": sim.weather.meta.tick,
        "seed": sim.weather.meta.seed,
        "sim_secs": sim.weather.meta.now.as_secs(),
        "content_version": sim.weather.meta.content_version,
        "regions": sim.weather.regions.len(),
        "schedulers": sim.registry.len(),
        "ticks_per_sec": ticks_per_sec,
        "paused": paused,
    }))
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.to_string() })))
}

/// The full `WeatherState`, in the same shape `--state` loads.
pub async fn snapshot_handler(State(app_state): State<AppState>) -> Result<Response, ApiError> {
    let json = serde_json::to_string(&app_state.sim.lock().weather).map_err(|err| {
        tracing::error!(%err, "snapshot serialization failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "serialization failed")
    })?;
    Ok(([(header::CONTENT_TYPE, "application/json")], json).into_response())
}

#[derive(Serialize)]
pub struct VisibleWeather {
    pub region: String,
    /// `None` is clear, including weather whose expiry has lapsed.
    pub weather: Option<String>,
    pub expires_at_secs: Option<u64>,
}

/// What each region is showing right now, according to the board.
pub async fn weather_handler(State(app_state): State<AppState>) -> Json<Vec<VisibleWeather>> {
    let sim = app_state.sim.lock();
    let now = sim.weather.meta.now;
    let rows = sim
        .board
        .visible_all(now)
        .into_iter()
        .map(|(region, weather)| VisibleWeather {
            expires_at_secs: sim.board.applied(&region).map(|a| a.expires_at.as_secs()),
            region: region.to_string(),
            weather: weather.map(|w| w.to_string()),
        })
        .collect();
    Json(rows)
}

pub async fn metrics_handler(State(app_state): State<AppState>) -> Json<VecDeque<MetricsSnapshot>> {
    let sim = app_state.sim.lock();
    Json(sim.metrics_history.clone())
}

/// Writes the current state to `<run_dir>/saves/tick_NNNNNNNN.json`.
pub async fn save_handler(
    State(app_state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let run_dir = app_state.run_dir.as_deref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "no run directory (started with --no-metrics?)",
        )
    })?;

    let (tick, body) = {
        let sim = app_state.sim.lock();
        let body = serde_json::to_string_pretty(&sim.weather).map_err(|err| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("serializing state: {err}"),
            )
        })?;
        (sim.weather.meta.tick, body)
    };

    let path = write_save(run_dir, tick, &body)
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")))?;
    tracing::info!(path = %path.display(), tick, "state saved");
    Ok(Json(serde_json::json!({ "path": path.display().to_string(), "tick": tick })))
}

fn write_save(run_dir: &Path, tick: u64, body: &str) -> anyhow::Result<PathBuf> {
    let saves_dir = run_dir.join("saves");
    std::fs::create_dir_all(&saves_dir)
        .with_context(|| format!("creating {}", saves_dir.display()))?;
    let path = saves_dir.join(format!("tick_{tick:08}.json"));
    std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn set_paused(app_state: &AppState, paused: bool) -> Json<serde_json::Value> {
    app_state.paused.store(paused, Ordering::Relaxed);
    tracing::info!(paused, "tick loop toggled");
    Json(serde_json::json!({ "paused": paused }))
}

pub async fn pause_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    set_paused(&app_state, true)
}

pub async fn resume_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    set_paused(&app_state, false)
}

/// Batches events every 50 ms and sends a heartbeat with the current tick
/// every 200 ms.
pub async fn stream_handler(
    State(app_state): State<AppState>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = app_state.event_tx.subscribe();
    let sim = app_state.sim.clone();

    let stream = async_stream::stream! {
        let mut heartbeat = tokio::time::interval(Duration::from_millis(200));
        heartbeat.tick().await; // discard the immediate first tick
        let mut flush = tokio::time::interval(Duration::from_millis(50));
        flush.tick().await; // discard the immediate first tick
        let mut pending: Vec<EventEnvelope> = Vec::new();
        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(events) => pending.extend(events),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "event stream subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = flush.tick() => {
                    if !pending.is_empty() {
                        let data = serde_json::to_string(&pending).unwrap_or_default();
                        pending.clear();
                        yield Ok(Event::default().data(data));
                    }
                }
                _ = heartbeat.tick() => {
                    let tick = sim.lock().weather.meta.tick;
                    let hb = serde_json::json!({"heartbeat": true, "tick": tick});
                    yield Ok(Event::default().data(hb.to_string()));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}
