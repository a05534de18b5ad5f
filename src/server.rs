use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tracing::warn;

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::core_client::{CoreClient, ForwardRequest, HttpCoreClient};
use crate::{invalidation, ws_gateway};

pub struct AppState {
    pub broadcaster: Broadcaster,
    pub core_client: Arc<dyn CoreClient>,
    pub ws_send_buffer: usize,
}

impl AppState {
    pub fn new(core_client: Arc<dyn CoreClient>, ws_send_buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            broadcaster: Broadcaster::new(),
            core_client,
            ws_send_buffer,
        })
    }

    pub fn initialize(config: &Config) -> anyhow::Result<Arc<Self>> {
        let core_client = Arc::new(HttpCoreClient::new(config)?);
        Ok(Self::new(core_client, config.ws_send_buffer))
    }
}

/// `/api/*` proxied to the API service with mutation broadcasts layered on,
/// plus the invalidation channel and a health probe.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/*rest", any(proxy_api))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            invalidation::broadcast_mutations,
        ));

    Router::new()
        .route("/ws", get(ws_gateway::ws_handler))
        .route("/healthz", get(|| async { "ok" }))
        .merge(api)
        .with_state(state)
}

async fn proxy_api(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());

    let request = ForwardRequest {
        method,
        path_and_query,
        headers,
        body,
    };

    match state.core_client.forward(request).await {
        Ok(upstream) => {
            let mut response = Response::new(Body::from(upstream.body));
            *response.status_mut() = upstream.status;
            *response.headers_mut() = upstream.headers;
            response
        }
        Err(e) => {
            warn!(path = %uri.path(), error = %e, "api service unreachable");
            (StatusCode::BAD_GATEWAY, "api service unavailable").into_response()
        }
    }
}
