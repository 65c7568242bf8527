//! HTTP and WebSocket handlers for the Herald server.

use crate::channels;
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::service::{MemoryService, ServiceError};
use anyhow::Result;
use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use herald_core::{Attributes, ConnectionId, EventContext, Hub};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Header naming the connection a request was made on behalf of.
pub const ORIGIN_HEADER: &str = "x-connection-id";

/// Shared server state.
pub struct AppState {
    /// The broadcast hub.
    pub hub: Arc<Hub>,
    /// Server configuration.
    pub config: Config,
    /// Services by name.
    pub services: HashMap<String, Arc<MemoryService>>,
}

impl AppState {
    /// Create the hub, install channel routing and the configured services.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured service name is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let hub = Arc::new(Hub::with_config(config.hub_config()));
        channels::install(&hub, &config.channels.default_channel);

        let mut services = HashMap::new();
        for name in &config.services {
            let service = MemoryService::new(hub.service(name)?);
            services.insert(name.clone(), Arc::new(service));
        }

        Ok(Self {
            hub,
            config,
            services,
        })
    }

    fn service(&self, name: &str) -> Result<&Arc<MemoryService>, ApiError> {
        self.services
            .get(name)
            .ok_or_else(|| ApiError::UnknownService(name.to_string()))
    }
}

/// Errors surfaced to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    /// No service has this name.
    UnknownService(String),
    /// The service rejected the request.
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::UnknownService(name) => {
                (StatusCode::NOT_FOUND, format!("Unknown service '{}'", name))
            }
            ApiError::Service(e @ ServiceError::NotFound(_)) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Service(e) => {
                metrics::record_error("bad_request");
                (StatusCode::BAD_REQUEST, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Build the HTTP router.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/channels", get(channels_handler))
        .route("/services/:service", get(find_handler).post(create_handler))
        .route(
            "/services/:service/:id",
            get(get_handler)
                .put(update_handler)
                .patch(patch_handler)
                .delete(remove_handler),
        )
        .route("/services/:service/events/:event", post(event_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config)?);
    let ws_path = state.config.transport.websocket_path.clone();
    let app = build_app(state);

    let listener = TcpListener::bind(addr).await?;

    info!("Herald server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, ws_path);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.hub.stats();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": stats.connections,
        "channels": stats.channels,
        "memberships": stats.memberships,
        "publishers": stats.publishers,
        "events": stats.dispatch.events,
        "delivered": stats.dispatch.delivered,
        "failed": stats.dispatch.failed,
    }))
}

/// Channel names with member counts.
async fn channels_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let channels = state.hub.channels();
    let mut names = channels.names();
    names.sort();
    let body: Vec<Value> = names
        .into_iter()
        .map(|name| {
            let members = channels.member_count(&name);
            json!({ "name": name, "members": members })
        })
        .collect();
    Json(Value::Array(body))
}

/// WebSocket upgrade handler. Query parameters become connection attributes.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let attributes: Attributes = query
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    let options = state.config.socket_options();
    let hub = Arc::clone(&state.hub);

    ws.on_upgrade(move |socket| async move {
        let _metrics_guard = ConnectionMetricsGuard::new();
        if let Err(e) = herald_transport::serve(socket, Arc::clone(&hub), attributes, options).await {
            debug!(error = %e, "WebSocket ended");
            metrics::record_error("websocket");
        }
        metrics::set_active_channels(hub.channels().stats().channel_count);
    })
}

fn context(headers: &HeaderMap, params: HashMap<String, String>) -> EventContext {
    let mut context = EventContext::new();
    if let Some(origin) = headers.get(ORIGIN_HEADER).and_then(|v| v.to_str().ok()) {
        context = context.with_origin(ConnectionId::from(origin));
    }
    for (key, value) in params {
        context = context.with_param(key, Value::String(value));
    }
    context
}

async fn find_handler(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(Value::Array(state.service(&service)?.find())))
}

async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path((service, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.service(&service)?.get(&id)?))
}

async fn create_handler(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(data): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let record = state
        .service(&service)?
        .create(data, context(&headers, params))
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_handler(
    State(state): State<Arc<AppState>>,
    Path((service, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(data): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .service(&service)?
        .update(&id, data, context(&headers, params))
        .await?;
    Ok(Json(record))
}

async fn patch_handler(
    State(state): State<Arc<AppState>>,
    Path((service, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(data): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .service(&service)?
        .patch(&id, data, context(&headers, params))
        .await?;
    Ok(Json(record))
}

async fn remove_handler(
    State(state): State<Arc<AppState>>,
    Path((service, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .service(&service)?
        .remove(&id, context(&headers, params))
        .await?;
    Ok(Json(record))
}

async fn event_handler(
    State(state): State<Arc<AppState>>,
    Path((service, event)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let report = state
        .service(&service)?
        .emit(&event, payload, context(&headers, params))
        .await?;
    Ok(Json(json!({
        "event": report.event,
        "recipients": report.recipients,
        "delivered": report.delivered,
        "failed": report.failed,
    })))
}
