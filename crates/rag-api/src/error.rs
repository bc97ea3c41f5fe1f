use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use rag_core::error::{EngineError, ErrorKind};
use serde::Serialize;
use thiserror::Error;

/// Mirrors `rag-api-server/src/utils/error.rs`'s `ApiError`: a thin
/// HTTP-facing wrapper that classifies `EngineError` (and a few
/// request-level variants the engine doesn't know about) into the §6
/// error envelope and §7 status table.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: String,
    message: String,
    status: u16,
    timestamp: String,
    path: String,
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Engine(e) => match e.kind() {
                ErrorKind::Validation => (StatusCode::BAD_REQUEST, "VALIDATION"),
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                ErrorKind::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
                ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                ErrorKind::UpstreamRateLimit => (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_RATE_LIMIT"),
                ErrorKind::UpstreamFailure => (StatusCode::BAD_GATEWAY, "UPSTREAM_FAILURE"),
                ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
            },
        }
    }

    /// Renders the §6 error envelope with a request path, since axum's
    /// `IntoResponse` has no access to the original URI.
    pub fn into_response_with_path(self, path: &str) -> Response {
        let (status, kind) = self.status_and_kind();
        match status {
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::BAD_GATEWAY => {
                tracing::error!("{kind}: {self}");
            }
            StatusCode::SERVICE_UNAVAILABLE => tracing::warn!("{kind}: {self}"),
            _ => tracing::debug!("{kind}: {self}"),
        }
        let body = ErrorEnvelope {
            error: kind.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
            timestamp: Utc::now().to_rfc3339(),
            path: path.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_response_with_path("")
    }
}

/// Axum's `IntoResponse` has no access to the request URI, so every
/// `ApiError` response is built with an empty `path`. This outermost
/// middleware patches the JSON body's `path` field in place once the real
/// request path is known, rather than threading the URI through every
/// handler signature.
pub async fn stamp_error_path(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    if !response.status().is_client_error() && !response.status().is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, 1024 * 1024).await {
        Ok(b) => b,
        Err(_) => return Response::from_parts(parts, Body::empty()),
    };

    let patched = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|mut value| {
            value.get_mut("path").map(|p| *p = serde_json::Value::String(path.clone()))?;
            serde_json::to_vec(&value).ok()
        });

    let bytes = patched.unwrap_or_else(|| bytes.to_vec());
    if let Ok(len) = axum::http::HeaderValue::from_str(&bytes.len().to_string()) {
        parts.headers.insert(axum::http::header::CONTENT_LENGTH, len);
    }
    Response::from_parts(parts, Body::from(bytes))
}
