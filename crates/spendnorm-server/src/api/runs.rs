use axum::{
    extract::{Path, Query, State},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spendnorm_core::{ErrorSummary, RunRecord};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{clamp_limit, ApiError, AppState, Envelope};

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunItem {
    run_id: i64,
    public_id: Uuid,
    status: &'static str,
    trigger_source: String,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    row_count: i64,
    written_count: i64,
    failed_count: i64,
    error_summary: ErrorSummary,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<RunRecord> for RunItem {
    fn from(run: RunRecord) -> Self {
        Self {
            run_id: run.run_id,
            public_id: run.public_id,
            status: run.status.as_str(),
            trigger_source: run.trigger_source,
            window_start: run.window_start,
            window_end: run.window_end,
            row_count: run.row_count,
            written_count: run.written_count,
            failed_count: run.failed_count,
            error_summary: run.error_summary,
            started_at: run.started_at,
            completed_at: run.completed_at,
        }
    }
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunsQuery>,
) -> Result<Envelope<Vec<RunItem>>, ApiError> {
    let runs = spendnorm_db::list_runs(&state.pool, clamp_limit(query.limit))
        .await
        .map_err(|e| ApiError::from_db(&req_id, &e))?;

    Ok(Envelope::new(
        runs.into_iter().map(RunItem::from).collect(),
        &req_id,
    ))
}

pub(super) async fn get_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(run_id): Path<i64>,
) -> Result<Envelope<RunItem>, ApiError> {
    let run = spendnorm_db::get_run(&state.pool, run_id)
        .await
        .map_err(|e| ApiError::from_db(&req_id, &e))?;

    Ok(Envelope::new(RunItem::from(run), &req_id))
}
