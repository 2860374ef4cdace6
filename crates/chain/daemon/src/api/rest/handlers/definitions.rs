//! Chain definition handlers

use super::parse_id;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::service::{CreateChainDefinition, UpdateChainDefinition};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chain_types::{ChainDefinition, ChainDefinitionId, ChainExecution, FamilyId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// List definitions query params
#[derive(Debug, Deserialize)]
pub struct ListDefinitionsQuery {
    pub enabled: Option<bool>,
}

/// Manual execution request
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteDefinitionRequest {
    #[serde(default)]
    pub payload: Value,
}

/// Delete definition response
#[derive(Debug, Serialize)]
pub struct DeleteDefinitionResponse {
    pub id: String,
    pub deleted: bool,
}

fn parse_path(family_id: &str, id: &str) -> ApiResult<(FamilyId, ChainDefinitionId)> {
    Ok((parse_id("family", family_id)?, parse_id("chain definition", id)?))
}

/// List a family's definitions
pub async fn list_definitions(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
    Query(query): Query<ListDefinitionsQuery>,
) -> ApiResult<Json<Vec<ChainDefinition>>> {
    let family_id = parse_id("family", &family_id)?;
    let definitions = state
        .service
        .list_definitions(family_id, query.enabled)
        .await?;
    Ok(Json(definitions))
}

/// Create a definition with its steps
pub async fn create_definition(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
    Json(request): Json<CreateChainDefinition>,
) -> ApiResult<(StatusCode, Json<ChainDefinition>)> {
    let family_id = parse_id("family", &family_id)?;
    let definition = state.service.create_definition(family_id, request).await?;
    Ok((StatusCode::CREATED, Json(definition)))
}

/// Get a definition with its steps
pub async fn get_definition(
    State(state): State<AppState>,
    Path((family_id, id)): Path<(String, String)>,
) -> ApiResult<Json<ChainDefinition>> {
    let (family_id, id) = parse_path(&family_id, &id)?;
    Ok(Json(state.service.get_definition(family_id, id).await?))
}

/// Replace scalar fields and optionally all steps
pub async fn update_definition(
    State(state): State<AppState>,
    Path((family_id, id)): Path<(String, String)>,
    Json(request): Json<UpdateChainDefinition>,
) -> ApiResult<Json<ChainDefinition>> {
    let (family_id, id) = parse_path(&family_id, &id)?;
    Ok(Json(
        state
            .service
            .update_definition(family_id, id, request)
            .await?,
    ))
}

/// Delete a definition
pub async fn delete_definition(
    State(state): State<AppState>,
    Path((family_id, id)): Path<(String, String)>,
) -> ApiResult<Json<DeleteDefinitionResponse>> {
    let (family_id, definition_id) = parse_path(&family_id, &id)?;
    state
        .service
        .delete_definition(family_id, definition_id)
        .await?;
    Ok(Json(DeleteDefinitionResponse { id, deleted: true }))
}

pub async fn enable_definition(
    State(state): State<AppState>,
    Path((family_id, id)): Path<(String, String)>,
) -> ApiResult<Json<ChainDefinition>> {
    let (family_id, id) = parse_path(&family_id, &id)?;
    Ok(Json(state.service.enable_definition(family_id, id).await?))
}

pub async fn disable_definition(
    State(state): State<AppState>,
    Path((family_id, id)): Path<(String, String)>,
) -> ApiResult<Json<ChainDefinition>> {
    let (family_id, id) = parse_path(&family_id, &id)?;
    Ok(Json(state.service.disable_definition(family_id, id).await?))
}

/// Start a definition by hand; responds before the execution runs
pub async fn execute_definition(
    State(state): State<AppState>,
    Path((family_id, id)): Path<(String, String)>,
    Json(request): Json<ExecuteDefinitionRequest>,
) -> ApiResult<(StatusCode, Json<ChainExecution>)> {
    let (family_id, id) = parse_path(&family_id, &id)?;
    let execution = state
        .service
        .execute_definition(family_id, id, request.payload)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(execution)))
}
