//! # auth — API key middleware
//!
//! Protects the client-facing surface with an `X-API-Key` header.
//!
//! ## Mode
//! - `API_KEY` unset or empty → **allow all** (dev mode)
//! - `API_KEY` set → every request must carry `X-API-Key: <key>`
//!
//! ## Exempt
//! - `/health` (liveness probes)
//! - `/api/bridge/*` (the EA bridge surface authenticates with its own
//!   shared secret, see `routes::bridge`)

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::state::SharedState;

pub async fn require_api_key(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let expected = match state.settings.api_key.as_deref() {
        None | Some("") => return next.run(request).await,
        Some(key) => key,
    };

    let path = request.uri().path();
    if path == "/health" || path.starts_with("/api/bridge/") {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == expected {
        next.run(request).await
    } else {
        warn!(path, "unauthorized request, invalid or missing X-API-Key");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok":    false,
                "error": "Unauthorized: invalid or missing X-API-Key header",
            })),
        )
            .into_response()
    }
}
