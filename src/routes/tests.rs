use axum::{Router, body::Body};
use chrono::{Duration, TimeZone, Utc};
use http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use super::*;
use crate::{
    clock::MockClock,
    config::{EngineConfig, RemovalTimeStrategy},
    db::tests::harness::create_test_db,
    models::{CreateDefinition, DefinitionKind, ProcessInstanceState},
    services::StartProcessInstance,
};

async fn test_app(
    configure: impl FnOnce(&mut EngineConfig),
) -> (Router, Engine, std::sync::Arc<MockClock>) {
    let clock = MockClock::at(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
    let mut config = EngineConfig::default();
    config.history.removal_time_strategy = RemovalTimeStrategy::End;
    configure(&mut config);
    let engine = Engine::new(config, create_test_db().await, clock.clone()).unwrap();
    (build_app(AppState::new(engine.clone())), engine, clock)
}

async fn finished_instance(engine: &Engine, key: &str) -> String {
    let definition = engine
        .repository()
        .deploy(
            CreateDefinition::new(DefinitionKind::Process, key, "deployment-1")
                .with_history_time_to_live(5),
        )
        .await
        .unwrap();
    let recorder = engine.recorder();
    let instance = recorder
        .start_process_instance(StartProcessInstance::new(&definition.id))
        .await
        .unwrap();
    recorder
        .end_process_instance(&instance.id, ProcessInstanceState::Completed)
        .await
        .unwrap();
    instance.id
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_reports_database() {
    let (app, _engine, _clock) = test_app(|_| {}).await;
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["healthy"], true);
    assert_eq!(body["history_cleanup_enabled"], true);
}

#[tokio::test]
async fn test_clean_up_history_schedules_job() {
    let (app, _engine, _clock) = test_app(|_| {}).await;

    let (status, body) = send(&app, "POST", "/history/cleanup", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["job"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/history/cleanup/jobs", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let jobs = body["data"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], job_id.as_str());
}

#[tokio::test]
async fn test_clean_up_history_disabled_is_conflict() {
    let (app, _engine, _clock) = test_app(|c| c.history_cleanup.enabled = false).await;
    let (status, body) = send(&app, "POST", "/history/cleanup", None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "not_configured");
    assert_eq!(
        body["error"]["message"],
        "History cleanup is disabled for this engine"
    );
}

#[tokio::test]
async fn test_clean_up_history_requires_admin() {
    let (app, _engine, _clock) = test_app(|c| {
        c.authorization.enabled = true;
        c.authorization.admin_users = vec!["admin".to_string()];
    })
    .await;

    let (status, body) = send(&app, "POST", "/history/cleanup", Some("jane"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");

    let (status, _) = send(&app, "POST", "/history/cleanup", Some("admin"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_sync_delete_rejects_empty_ids() {
    let (app, _engine, _clock) = test_app(|_| {}).await;
    let (status, body) = send(
        &app,
        "POST",
        "/history/process-instances/delete",
        None,
        Some(json!({ "process_instance_ids": [], "async": false })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "processInstanceIds is empty");
}

#[tokio::test]
async fn test_sync_delete_removes_instance() {
    let (app, engine, _clock) = test_app(|_| {}).await;
    let id = finished_instance(&engine, "order").await;

    let (status, body) = send(
        &app,
        "POST",
        "/history/process-instances/delete",
        None,
        Some(json!({ "process_instance_ids": [id], "async": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["batch"].is_null());

    let (status, _) = send(
        &app,
        "POST",
        "/history/process-instances/delete",
        None,
        Some(json!({ "process_instance_ids": [id], "async": false })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_async_delete_batch_endpoints() {
    let (app, engine, clock) = test_app(|_| {}).await;
    let id = finished_instance(&engine, "order").await;

    let (status, body) = send(
        &app,
        "POST",
        "/history/process-instances/delete",
        None,
        Some(json!({ "process_instance_ids": [id] })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let batch_id = body["batch"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/batches", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let seed_job = engine
        .context()
        .db
        .jobs()
        .list(&Default::default())
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    let uri = format!("/jobs/{}/execute", seed_job.id);
    let (status, _) = send(&app, "POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    engine.executor().run_due_jobs().await.unwrap();
    let uri = format!("/batches/{}/statistics", batch_id);
    let (status, body) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed_jobs"], 1);
    assert_eq!(body["remaining_jobs"], 0);

    clock.advance(Duration::seconds(31));
    engine.executor().run_due_jobs().await.unwrap();
    let (status, _) = send(&app, "GET", &format!("/batches/{}", batch_id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_batch_cascade() {
    let (app, _engine, _clock) = test_app(|_| {}).await;
    let (_, body) = send(
        &app,
        "POST",
        "/history/process-instances/delete",
        None,
        Some(json!({ "process_instance_ids": ["unknown"] })),
    )
    .await;
    let batch_id = body["batch"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/batches/{}?cascade=true", batch_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "GET", &format!("/batches/{}", batch_id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_execute_unknown_job_is_not_found() {
    let (app, _engine, _clock) = test_app(|_| {}).await;
    let (status, body) = send(&app, "POST", "/jobs/missing/execute", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "No job found with id 'missing'");
}

#[tokio::test]
async fn test_cleanable_process_report() {
    let (app, engine, clock) = test_app(|_| {}).await;
    finished_instance(&engine, "order").await;
    clock.advance(Duration::days(6));

    let (status, body) = send(
        &app,
        "GET",
        "/history/cleanable-reports/process?definition_key=order",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["definition_key"], "order");
    assert_eq!(rows[0]["finished_count"], 1);
    assert_eq!(rows[0]["cleanable_count"], 1);
}
