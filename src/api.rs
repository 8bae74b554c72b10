// src/api.rs
//! Read API over the durable store plus the live websocket relay.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::error::StoreError;
use crate::metrics::Metrics;
use crate::model::{NewsItem, MAX_RELEVANCE};
use crate::sink::{BroadcastBus, NewsQuery, NewsRepository};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct ApiState {
    pub repo: Arc<dyn NewsRepository>,
    pub bus: Arc<dyn BroadcastBus>,
    pub channel: String,
    pub api_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("min_relevance must be between 0 and {MAX_RELEVANCE}")]
    BadRelevance,
    #[error("missing or invalid api key")]
    Unauthorized,
    #[error("store unavailable")]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRelevance => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Store(e) => {
                tracing::error!(target: "api", error = %e, "news query failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("api_requests_total", "Requests served by the health and metrics routes.");
    });
}

pub fn router(state: ApiState, metrics: Option<&Metrics>) -> Router {
    let app = Router::new()
        .route("/health", get(health))
        .route("/news", get(list_news))
        .route("/ws/news", get(ws_news))
        .layer(CorsLayer::very_permissive())
        .with_state(state);
    match metrics {
        Some(m) => app.merge(m.router()),
        None => app,
    }
}

async fn health() -> Json<serde_json::Value> {
    counter!("api_requests_total", "route" => "/health").increment(1);
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct NewsParams {
    category: Option<String>,
    source: Option<String>,
    min_relevance: Option<i64>,
}

impl NewsParams {
    fn into_query(self) -> Result<NewsQuery, ApiError> {
        let min_relevance = match self.min_relevance {
            None => None,
            Some(v) if (0..=MAX_RELEVANCE as i64).contains(&v) => Some(v as u8),
            Some(_) => return Err(ApiError::BadRelevance),
        };
        Ok(NewsQuery {
            category: self.category.filter(|c| !c.is_empty()),
            source: self.source.filter(|s| !s.is_empty()),
            min_relevance,
        })
    }
}

fn check_key(state: &ApiState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.api_key.as_deref() else {
        return Ok(());
    };
    match headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        Some(got) if got == expected => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

async fn list_news(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<NewsParams>,
) -> Result<Json<Vec<NewsItem>>, ApiError> {
    check_key(&state, &headers)?;
    let q = params.into_query()?;
    let items = state.repo.query(&q).await?;
    tracing::debug!(target: "api", n = items.len(), ?q, "news query");
    Ok(Json(items))
}

async fn ws_news(State(state): State<ApiState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay(socket, state))
}

/// Forwards every broadcast payload verbatim until either side goes away.
async fn relay(mut socket: WebSocket, state: ApiState) {
    let mut feed = match state.bus.subscribe(&state.channel).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(target: "api", error = %e, "ws relay subscribe failed");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    tracing::debug!(target: "api", channel = %state.channel, "ws client attached");

    loop {
        tokio::select! {
            payload = feed.next() => {
                let Some(payload) = payload else { break };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    tracing::debug!(target: "api", "ws client detached");
}
