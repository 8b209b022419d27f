// src/api.rs
//! Local HTTP surface over the monitor. Thin: every handler delegates to
//! [`Monitor`] and serializes what it gets back.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::config::{AgentConfig, ConfigPatch};
use crate::ingest::{ChangeRecord, Item, MonitoringStats};
use crate::monitor::{CycleOutcome, Monitor, PollCycleState, SourceHealth};
use crate::telemetry::Metrics;

#[derive(Clone)]
pub struct AppState {
    monitor: Monitor,
}

pub fn router(monitor: Monitor) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/news", get(list_news).delete(clear_news))
        .route("/news/{id}/read", post(mark_read))
        .route("/stats", get(stats))
        .route("/status", get(status))
        .route("/sources/health", get(source_health))
        .route("/changes", get(changes))
        .route("/monitor/start", post(start_monitoring))
        .route("/monitor/stop", post(stop_monitoring))
        .route("/fetch", post(fetch))
        .route("/fetch/cancel", post(cancel_fetch))
        .route("/config", get(get_config).patch(patch_config))
        .layer(CorsLayer::very_permissive())
        .with_state(AppState { monitor })
}

/// Full app: API routes plus `/metrics`.
pub fn app(monitor: Monitor, metrics: &Metrics) -> Router {
    router(monitor).merge(metrics.router())
}

#[derive(Debug, Default, Deserialize)]
struct NewsQuery {
    #[serde(default)]
    unread: bool,
    limit: Option<usize>,
}

async fn list_news(State(st): State<AppState>, Query(q): Query<NewsQuery>) -> Json<Vec<Item>> {
    let items = st
        .monitor
        .state()
        .items()
        .into_iter()
        .filter(|it| !q.unread || !it.is_read)
        .take(q.limit.unwrap_or(usize::MAX))
        .collect();
    Json(items)
}

async fn clear_news(State(st): State<AppState>) -> StatusCode {
    st.monitor.clear_all().await;
    StatusCode::NO_CONTENT
}

async fn mark_read(State(st): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if st.monitor.mark_as_read(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn stats(State(st): State<AppState>) -> Json<MonitoringStats> {
    Json(st.monitor.state().stats())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusOut {
    monitoring: bool,
    loading: bool,
    progress: f64,
    timer_armed: bool,
    cycle: Option<PollCycleState>,
}

fn status_of(m: &Monitor) -> StatusOut {
    let s = m.state();
    StatusOut {
        monitoring: s.is_monitoring(),
        loading: s.is_loading(),
        progress: s.progress(),
        timer_armed: m.timer_armed(),
        cycle: s.cycle(),
    }
}

async fn status(State(st): State<AppState>) -> Json<StatusOut> {
    Json(status_of(&st.monitor))
}

async fn source_health(State(st): State<AppState>) -> Json<Vec<SourceHealth>> {
    Json(st.monitor.source_health())
}

#[derive(Debug, Default, Deserialize)]
struct ChangesQuery {
    #[serde(default)]
    only_changed: bool,
}

async fn changes(State(st): State<AppState>, Query(q): Query<ChangesQuery>) -> Json<Vec<ChangeRecord>> {
    let detector = st.monitor.detector();
    let records = if q.only_changed {
        detector.changed().await
    } else {
        detector.monitored().await
    };
    Json(records)
}

async fn start_monitoring(State(st): State<AppState>) -> Json<StatusOut> {
    st.monitor.start();
    Json(status_of(&st.monitor))
}

async fn stop_monitoring(State(st): State<AppState>) -> Json<StatusOut> {
    st.monitor.stop();
    Json(status_of(&st.monitor))
}

#[derive(Debug, Default, Deserialize)]
struct FetchQuery {
    #[serde(default)]
    wait: bool,
}

/// Kicks off a cycle. With `?wait=true` the response carries its outcome.
async fn fetch(State(st): State<AppState>, Query(q): Query<FetchQuery>) -> (StatusCode, Json<Option<CycleOutcome>>) {
    if q.wait {
        let outcome = st.monitor.fetch_all().await;
        return (StatusCode::OK, Json(Some(outcome)));
    }
    let monitor = st.monitor.clone();
    tokio::spawn(async move {
        monitor.fetch_all().await;
    });
    (StatusCode::ACCEPTED, Json(None))
}

async fn cancel_fetch(State(st): State<AppState>) -> Json<StatusOut> {
    st.monitor.cancel_fetch();
    Json(status_of(&st.monitor))
}

async fn get_config(State(st): State<AppState>) -> Json<AgentConfig> {
    Json(st.monitor.config().current())
}

async fn patch_config(State(st): State<AppState>, Json(patch): Json<ConfigPatch>) -> Json<AgentConfig> {
    Json(st.monitor.config().update(patch).await)
}
