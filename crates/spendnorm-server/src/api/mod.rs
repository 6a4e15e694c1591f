//! Read-only status API: health plus normalization run history.

mod runs;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::middleware::{request_id, require_bearer_auth, AuthState, RequestId};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
}

#[derive(Debug, Serialize)]
struct Meta {
    request_id: String,
    timestamp: DateTime<Utc>,
}

impl Meta {
    fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_owned(),
            timestamp: Utc::now(),
        }
    }
}

/// `{ "data": ..., "meta": { "request_id", "timestamp" } }`
#[derive(Debug, Serialize)]
pub(crate) struct Envelope<T> {
    data: T,
    meta: Meta,
}

impl<T: Serialize> Envelope<T> {
    fn new(data: T, request_id: &RequestId) -> Self {
        Self {
            data,
            meta: Meta::new(&request_id.0),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// `{ "error": { "code", "message" }, "meta": ... }` with a matching status.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    request_id: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: &'static str, request_id: &str) -> Self {
        Self {
            status,
            code,
            message,
            request_id: request_id.to_owned(),
        }
    }

    pub(crate) fn unauthorized(request_id: &str) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
            request_id,
        )
    }

    fn from_db(request_id: &RequestId, error: &spendnorm_db::DbError) -> Self {
        if matches!(error, spendnorm_db::DbError::NotFound) {
            return Self::new(StatusCode::NOT_FOUND, "not_found", "record not found", &request_id.0);
        }
        tracing::error!(request_id = %request_id.0, error = %error, "database query failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "database query failed",
            &request_id.0,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "code": self.code, "message": self.message },
            "meta": Meta::new(&self.request_id),
        });
        (self.status, Json(body)).into_response()
    }
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Full application router. Everything except `/api/v1/health` requires a
/// bearer token when auth is enabled.
pub fn router(state: AppState, auth: AuthState) -> Router {
    let runs = Router::new()
        .route("/api/v1/runs", get(runs::list_runs))
        .route("/api/v1/runs/{run_id}", get(runs::get_run))
        .route_layer(axum::middleware::from_fn_with_state(auth, require_bearer_auth));

    Router::new()
        .route("/api/v1/health", get(health))
        .merge(runs)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(request_id))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-store"),
                )),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    database: &'static str,
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> (StatusCode, Envelope<Health>) {
    match spendnorm_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Envelope::new(
                Health {
                    status: "ok",
                    database: "ok",
                },
                &req_id,
            ),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Envelope::new(
                    Health {
                        status: "degraded",
                        database: "unavailable",
                    },
                    &req_id,
                ),
            )
        }
    }
}
