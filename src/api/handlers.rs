use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::{ApiState, SERVICE_NAME, SERVICE_VERSION};
use crate::error::{ExecutionError, Result};
use crate::execution::{ExecutionRecord, ExecutionRequest, ExecutionStatus};

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 200;
pub const DEFAULT_LOG_LIMIT: usize = 200;
pub const MAX_LOG_LIMIT: usize = 1000;

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub execution_id: String,
    pub status: ExecutionStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub execution_id: String,
    pub lines: Vec<String>,
    pub next_offset: usize,
    pub eof: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MonitoringInfo {
    pub service: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub total_executions: usize,
    pub running_executions: usize,
    pub queued_executions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<ExecutionStatus>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    offset: Option<usize>,
    limit: Option<usize>,
}

fn bounded(name: &str, value: Option<usize>, default: usize, max: usize) -> Result<usize> {
    let value = value.unwrap_or(default);
    if !(1..=max).contains(&value) {
        return Err(ExecutionError::InvalidRequest(format!(
            "{} must be between 1 and {}, got {}",
            name, max, value
        )));
    }
    Ok(value)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "message": "Healthy" }))
}

pub async fn submit_execution(
    State(state): State<ApiState>,
    Json(payload): Json<ExecutionRequest>,
) -> Result<impl IntoResponse> {
    let record = state.service.submit(payload)?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            execution_id: record.execution_id,
            status: record.status,
        }),
    ))
}

pub async fn get_execution(
    State(state): State<ApiState>,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionRecord>> {
    state.service.get(&execution_id).map(Json)
}

pub async fn list_executions(
    State(state): State<ApiState>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<ExecutionRecord>>> {
    let Query(query) = query?;
    let limit = bounded("limit", query.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT)?;
    Ok(Json(state.service.list(limit, query.status)))
}

pub async fn get_execution_logs(
    State(state): State<ApiState>,
    Path(execution_id): Path<String>,
    query: std::result::Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<LogsResponse>> {
    let Query(query) = query?;
    let limit = bounded("limit", query.limit, DEFAULT_LOG_LIMIT, MAX_LOG_LIMIT)?;
    let offset = query.offset.unwrap_or(0);

    let page = state.service.logs(&execution_id, offset, limit)?;
    Ok(Json(LogsResponse {
        execution_id,
        lines: page.lines,
        next_offset: page.next_offset,
        eof: page.eof,
    }))
}

pub async fn cancel_execution(
    State(state): State<ApiState>,
    Path(execution_id): Path<String>,
) -> Result<impl IntoResponse> {
    let record = state.service.cancel(&execution_id)?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

pub async fn readiness() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}

pub async fn info(State(state): State<ApiState>) -> Json<MonitoringInfo> {
    let stats = state.service.stats();
    Json(MonitoringInfo {
        service: SERVICE_NAME.to_string(),
        version: SERVICE_VERSION.to_string(),
        uptime_seconds: state.service.uptime_seconds(),
        total_executions: stats.total,
        running_executions: stats.running,
        queued_executions: stats.queued,
    })
}

pub async fn websocket_docs() -> Json<Value> {
    Json(json!({
        "websocket": "planned",
        "note": "Logs are pull-only for now: poll GET /executions/{id}/logs with the \
                 next_offset of the previous response until eof is true.",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_applies_default_and_range() {
        assert_eq!(bounded("limit", None, 50, 200).unwrap(), 50);
        assert_eq!(bounded("limit", Some(200), 50, 200).unwrap(), 200);
        assert!(bounded("limit", Some(0), 50, 200).is_err());
        assert!(bounded("limit", Some(201), 50, 200).is_err());
    }
}
