//! Health and catalog handlers

use crate::api::rest::state::AppState;
use axum::{extract::State, Json};
use chain_types::{ActionDescriptor, TriggerDescriptor};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
}

/// Registered triggers and actions
#[derive(Debug, Serialize)]
pub struct RegistryResponse {
    pub triggers: Vec<TriggerDescriptor>,
    pub actions: Vec<ActionDescriptor>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
    })
}

pub async fn get_registry(State(state): State<AppState>) -> Json<RegistryResponse> {
    let registry = state.service.registry();
    Json(RegistryResponse {
        triggers: registry.triggers().into_iter().cloned().collect(),
        actions: registry.actions().into_iter().cloned().collect(),
    })
}
