use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::routing::{get, post};
use axum::{Json, Router};
use bomana_core::{CanonicalManifest, ManifestResolver};
use bomana_stats::{ClientInfo, DailyStats, EventPayload, EventStore, now_utc_iso};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

const VERSION_CHECK_EVENT: &str = "version_check";

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<ManifestResolver>,
    pub store: EventStore,
}

impl AppState {
    pub fn new(resolver: ManifestResolver, store: EventStore) -> Self {
        Self {
            resolver: Arc::new(resolver),
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/version", get(version))
        .route("/api/v1/event", post(record_event))
        .route("/api/v1/stats/daily", get(daily_stats))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Ack {
    ok: bool,
    time_utc: String,
}

impl Ack {
    fn now() -> Json<Self> {
        Json(Self {
            ok: true,
            time_utc: now_utc_iso(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct VersionQuery {
    channel: String,
    #[serde(default)]
    launcher_version: String,
    #[serde(default)]
    local_version: String,
    #[serde(default)]
    device_id: String,
    #[serde(default)]
    install_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct StatsQuery {
    #[serde(default)]
    date: String,
    #[serde(default)]
    channel: String,
}

async fn healthz() -> Json<Ack> {
    Ack::now()
}

async fn version(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<VersionQuery>,
) -> Result<Json<CanonicalManifest>, ApiError> {
    let manifest = state.resolver.resolve(&query.channel).await?;

    let payload = EventPayload {
        event: VERSION_CHECK_EVENT.to_string(),
        event_time_utc: Some(now_utc_iso()),
        channel: Some(query.channel),
        launcher_version: Some(query.launcher_version),
        app_version: Some(manifest.app_version().to_string()),
        local_version: Some(query.local_version),
        device_id: Some(query.device_id),
        install_id: Some(query.install_id),
        ..EventPayload::default()
    };
    // A launcher still gets its manifest when telemetry cannot be written.
    if let Err(error) = state
        .store
        .insert(&payload, &client_info(&headers, peer.as_ref()))
        .await
    {
        log::error!("Failed to record version check: {error}");
    }

    Ok(Json(manifest))
}

async fn record_event(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<EventPayload>,
) -> Result<Json<Ack>, ApiError> {
    state
        .store
        .insert(&payload, &client_info(&headers, peer.as_ref()))
        .await?;
    Ok(Ack::now())
}

async fn daily_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<DailyStats>, ApiError> {
    let stats = state
        .store
        .daily_stats(Some(&query.date), Some(&query.channel))
        .await?;
    Ok(Json(stats))
}

fn client_info(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> ClientInfo {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    ClientInfo::new(client_ip(headers, peer), user_agent)
}

/// First `X-Forwarded-For` hop, else the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(ConnectInfo(addr))) => addr.ip().to_string(),
        (None, None) => String::new(),
    }
}
