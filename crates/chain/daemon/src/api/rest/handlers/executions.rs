//! Trigger ingestion and chain execution handlers

use super::parse_id;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::service::TriggerEvent;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chain_types::{ChainExecution, ChainExecutionId, ExecutionStatus, FamilyId};
use serde::Deserialize;

/// List executions query params
#[derive(Debug, Default, Deserialize)]
pub struct ListExecutionsQuery {
    pub definition_id: Option<String>,
    pub status: Option<String>,
}

fn parse_status(raw: &str) -> ApiResult<ExecutionStatus> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid status: {}", e)))
}

fn parse_path(family_id: &str, id: &str) -> ApiResult<(FamilyId, ChainExecutionId)> {
    Ok((parse_id("family", family_id)?, parse_id("chain execution", id)?))
}

/// Deliver a domain event; responds with the executions it started
pub async fn ingest_event(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
    Json(event): Json<TriggerEvent>,
) -> ApiResult<(StatusCode, Json<Vec<ChainExecution>>)> {
    let family_id = parse_id("family", &family_id)?;
    let executions = state.service.ingest_event(family_id, event).await?;
    Ok((StatusCode::ACCEPTED, Json(executions)))
}

/// List a family's executions, newest first
pub async fn list_executions(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
    Query(query): Query<ListExecutionsQuery>,
) -> ApiResult<Json<Vec<ChainExecution>>> {
    let family_id = parse_id("family", &family_id)?;
    let definition_id = query
        .definition_id
        .as_deref()
        .map(|raw| parse_id("chain definition", raw))
        .transpose()?;
    let status = query.status.as_deref().map(parse_status).transpose()?;

    let executions = state
        .service
        .list_executions(family_id, definition_id, status)
        .await?;
    Ok(Json(executions))
}

/// Get an execution with its step executions
pub async fn get_execution(
    State(state): State<AppState>,
    Path((family_id, id)): Path<(String, String)>,
) -> ApiResult<Json<ChainExecution>> {
    let (family_id, id) = parse_path(&family_id, &id)?;
    Ok(Json(state.service.get_execution(family_id, id).await?))
}

pub async fn cancel_execution(
    State(state): State<AppState>,
    Path((family_id, id)): Path<(String, String)>,
) -> ApiResult<(StatusCode, Json<ChainExecution>)> {
    let (family_id, id) = parse_path(&family_id, &id)?;
    let execution = state.service.cancel_execution(family_id, id).await?;
    Ok((StatusCode::ACCEPTED, Json(execution)))
}
