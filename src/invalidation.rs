use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::routes;
use crate::server::AppState;

/// After a successful mutating `/api/*` request, tells every connected
/// client which collections went stale.
pub async fn broadcast_mutations(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    if is_mutating(&method) && path.starts_with("/api/") && is_success(response.status()) {
        for key in routes::collection_keys_for(&path) {
            let delivered = state.broadcaster.broadcast(&key);
            debug!(%method, %path, collection_key = %key, delivered, "mutation invalidated collection");
        }
    }

    response
}

fn is_mutating(method: &Method) -> bool {
    ![Method::GET, Method::HEAD, Method::OPTIONS].contains(method)
}

fn is_success(status: StatusCode) -> bool {
    status.is_success() || status.is_redirection()
}
