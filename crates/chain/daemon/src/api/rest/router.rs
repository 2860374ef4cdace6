//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // System
        .route("/health", get(handlers::health_check))
        .route("/registry", get(handlers::get_registry))
        // Definitions
        .route(
            "/families/:family_id/definitions",
            get(handlers::list_definitions).post(handlers::create_definition),
        )
        .route(
            "/families/:family_id/definitions/:id",
            get(handlers::get_definition)
                .put(handlers::update_definition)
                .delete(handlers::delete_definition),
        )
        .route(
            "/families/:family_id/definitions/:id/enable",
            post(handlers::enable_definition),
        )
        .route(
            "/families/:family_id/definitions/:id/disable",
            post(handlers::disable_definition),
        )
        .route(
            "/families/:family_id/definitions/:id/execute",
            post(handlers::execute_definition),
        )
        // Triggers
        .route("/families/:family_id/events", post(handlers::ingest_event))
        // Executions
        .route(
            "/families/:family_id/executions",
            get(handlers::list_executions),
        )
        .route(
            "/families/:family_id/executions/:id",
            get(handlers::get_execution),
        )
        .route(
            "/families/:family_id/executions/:id/cancel",
            post(handlers::cancel_execution),
        );

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::work_queue;
    use crate::outbox::BroadcastOutbox;
    use crate::service::ChainService;
    use crate::storage::InMemoryStorage;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chain_types::{ActionDescriptor, FamilyId, Registry, TriggerDescriptor, UserId};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let mut builder = Registry::builder();
        builder
            .add_trigger(TriggerDescriptor::new("chore.completed", "chores"))
            .unwrap()
            .add_action(ActionDescriptor::new("tasks.create", 1, "tasks"))
            .unwrap();
        let (dispatcher, _queue) = work_queue(64);
        let service = ChainService::new(
            Arc::new(builder.build()),
            Arc::new(InMemoryStorage::new()),
            dispatcher,
            Arc::new(BroadcastOutbox::default()),
        );
        create_router(AppState::new(service), true)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn definition_body() -> Value {
        json!({
            "name": "chore reward",
            "created_by_user_id": UserId::generate(),
            "trigger_event_type": "chore.completed",
            "steps": [{
                "alias": "task",
                "action_type": "tasks.create",
                "action_version": 1,
                "input_mappings": { "title": "trigger.chore" },
                "step_order": 1
            }]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_registry_lists_catalog() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/v1/registry", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["triggers"][0]["event_type"], "chore.completed");
        assert_eq!(body["actions"][0]["action_type"], "tasks.create");
    }

    #[tokio::test]
    async fn test_definition_lifecycle() {
        let app = app();
        let family = FamilyId::generate();
        let base = format!("/api/v1/families/{}/definitions", family);

        let (status, created) = send(&app, "POST", &base, Some(definition_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["steps"].as_array().unwrap().len(), 1);

        let (status, listed) = send(&app, "GET", &base, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, disabled) =
            send(&app, "POST", &format!("{}/{}/disable", base, id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(disabled["is_enabled"], false);

        let (status, listed) = send(&app, "GET", &format!("{}?enabled=true", base), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(listed.as_array().unwrap().is_empty());

        let (status, _) = send(&app, "DELETE", &format!("{}/{}", base, id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", &format!("{}/{}", base, id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_action_is_rejected() {
        let app = app();
        let mut body = definition_body();
        body["steps"][0]["action_type"] = json!("tasks.archive");

        let uri = format!("/api/v1/families/{}/definitions", FamilyId::generate());
        let (status, body) = send(&app, "POST", &uri, Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_runaway_condition_is_rejected() {
        let app = app();
        let uri = format!("/api/v1/families/{}/definitions", FamilyId::generate());

        let mut body = definition_body();
        body["steps"][0]["condition"] = json!(format!("{}true", "!".repeat(1_000_000)));
        let (status, body) = send(&app, "POST", &uri, Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let mut body = definition_body();
        body["steps"][0]["condition"] = json!(format!("{}trigger.chore", "(".repeat(500)));
        let (status, _) = send(&app, "POST", &uri, Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_other_family_sees_not_found() {
        let app = app();
        let uri = format!("/api/v1/families/{}/definitions", FamilyId::generate());
        let (_, created) = send(&app, "POST", &uri, Some(definition_body())).await;

        let other = format!(
            "/api/v1/families/{}/definitions/{}",
            FamilyId::generate(),
            created["id"].as_str().unwrap()
        );
        let (status, _) = send(&app, "GET", &other, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ingest_event_starts_pending_executions() {
        let app = app();
        let family = FamilyId::generate();
        send(
            &app,
            "POST",
            &format!("/api/v1/families/{}/definitions", family),
            Some(definition_body()),
        )
        .await;

        let (status, started) = send(
            &app,
            "POST",
            &format!("/api/v1/families/{}/events", family),
            Some(json!({ "event_type": "chore.completed", "payload": { "chore": "dishes" } })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(started.as_array().unwrap().len(), 1);
        assert_eq!(started[0]["status"], "pending");

        let id = started[0]["id"].as_str().unwrap();
        let (status, fetched) = send(
            &app,
            "GET",
            &format!("/api/v1/families/{}/executions/{}", family, id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["trigger_payload"]["chore"], "dishes");

        let (status, listed) = send(
            &app,
            "GET",
            &format!("/api/v1/families/{}/executions?status=pending", family),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_trigger_is_rejected() {
        let app = app();
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/v1/families/{}/events", FamilyId::generate()),
            Some(json!({ "event_type": "chore.exploded" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_bad_ids_and_filters() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/v1/families/nope/definitions", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");

        let uri = format!(
            "/api/v1/families/{}/executions?status=sleeping",
            FamilyId::generate()
        );
        let (status, _) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
