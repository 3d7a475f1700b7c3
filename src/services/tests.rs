use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use super::*;
use crate::{
    clock::MockClock,
    config::{EngineConfig, RemovalTimeStrategy},
    db::tests::harness::create_test_db,
    engine::Engine,
    error::EngineError,
    jobs,
    models::{
        Authentication, CleanableReportQuery, CreateAuthorization, CreateDefinition, Definition,
        DefinitionKind, HistoricCaseInstanceQuery, HistoricDecisionInstanceQuery,
        HistoricProcessInstance, HistoricProcessInstanceQuery, Job, JobQuery, Permission,
        ProcessInstanceState, Resource, UserOperationLogQuery, batch_types, metric_names,
        new_id, operation_types,
    },
    removal_time::RemovalTimeUpdate,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
}

async fn engine(configure: impl FnOnce(&mut EngineConfig)) -> (Engine, Arc<MockClock>) {
    let clock = MockClock::at(start());
    let mut config = EngineConfig::default();
    config.history.removal_time_strategy = RemovalTimeStrategy::End;
    configure(&mut config);
    let engine = Engine::new(config, create_test_db().await, clock.clone()).unwrap();
    (engine, clock)
}

fn with_authorization(config: &mut EngineConfig) {
    config.authorization.enabled = true;
    config.authorization.admin_users = vec!["admin".to_string()];
}

async fn deploy(engine: &Engine, kind: DefinitionKind, key: &str) -> Definition {
    deploy_in(engine, kind, key, "deployment-1").await
}

async fn deploy_in(engine: &Engine, kind: DefinitionKind, key: &str, deployment: &str) -> Definition {
    engine
        .repository()
        .deploy(CreateDefinition::new(kind, key, deployment).with_history_time_to_live(5))
        .await
        .unwrap()
}

async fn finished_instance(engine: &Engine, definition: &Definition) -> HistoricProcessInstance {
    let recorder = engine.recorder();
    let instance = recorder
        .start_process_instance(StartProcessInstance::new(&definition.id))
        .await
        .unwrap();
    recorder
        .end_process_instance(&instance.id, ProcessInstanceState::Completed)
        .await
        .unwrap()
}

async fn instance_count(engine: &Engine) -> i64 {
    engine
        .context()
        .db
        .process_history()
        .count_process_instances(&HistoricProcessInstanceQuery::default())
        .await
        .unwrap()
}

async fn grant(engine: &Engine, user: &str, resource: Resource, id: &str, permissions: &[Permission]) {
    engine
        .context()
        .db
        .authorizations()
        .create(CreateAuthorization::user(user, resource, id).with_permissions(permissions))
        .await
        .unwrap();
}

async fn operations(engine: &Engine, operation_type: &str) -> usize {
    engine
        .context()
        .db
        .operation_log()
        .list(&UserOperationLogQuery {
            operation_type: Some(operation_type.to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
        .len()
}

// ─────────────────────────────────────────────────────────────────────────────
// Synchronous deletes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_process_instances_validates_ids() {
    let (engine, _clock) = engine(|_| {}).await;
    let history = engine.history();

    let err = history.delete_historic_process_instances(None).await.unwrap_err();
    assert_eq!(err.to_string(), "processInstanceIds is null");

    let err = history.delete_historic_process_instances(Some(&[])).await.unwrap_err();
    assert_eq!(err.to_string(), "processInstanceIds is empty");

    let err = history
        .delete_historic_process_instances(Some(&["a".to_string(), "b".to_string()]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BadUserRequest(_)));
    assert_eq!(err.to_string(), "No historic process instance found with id: [a, b]");
}

#[tokio::test]
async fn test_delete_running_process_instance_fails() {
    let (engine, _clock) = engine(|_| {}).await;
    let definition = deploy(&engine, DefinitionKind::Process, "order").await;
    let running = engine
        .recorder()
        .start_process_instance(StartProcessInstance::new(&definition.id))
        .await
        .unwrap();

    let err = engine
        .history()
        .delete_historic_process_instance(Some(&running.id))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "Process instance is still running, cannot delete historic process instance: {}",
            running.id
        )
    );
    assert_eq!(instance_count(&engine).await, 1);
}

#[tokio::test]
async fn test_delete_process_instances_removes_history() {
    let (engine, _clock) = engine(|_| {}).await;
    let definition = deploy(&engine, DefinitionKind::Process, "order").await;
    let first = finished_instance(&engine, &definition).await;
    let second = finished_instance(&engine, &definition).await;
    engine
        .recorder()
        .set_variable(&first.id, "amount", json!(10))
        .await
        .unwrap();

    engine
        .history()
        .delete_historic_process_instances_bulk(Some(&[first.id.clone(), second.id.clone()]))
        .await
        .unwrap();

    assert_eq!(instance_count(&engine).await, 0);
    let variables = engine
        .context()
        .db
        .process_history()
        .list_variables(&first.id)
        .await
        .unwrap();
    assert!(variables.is_empty());
    assert_eq!(operations(&engine, operation_types::DELETE_HISTORY).await, 1);
}

#[tokio::test]
async fn test_delete_if_exists_skips_unknown_ids() {
    let (engine, _clock) = engine(|_| {}).await;
    let definition = deploy(&engine, DefinitionKind::Process, "order").await;
    let finished = finished_instance(&engine, &definition).await;

    engine
        .history()
        .delete_historic_process_instances_if_exists(Some(&[finished.id.clone(), "missing".to_string()]))
        .await
        .unwrap();
    assert_eq!(instance_count(&engine).await, 0);
}

#[tokio::test]
async fn test_delete_requires_delete_history_on_definition() {
    let (engine, _clock) = engine(with_authorization).await;
    let definition = deploy(&engine, DefinitionKind::Process, "order").await;
    let finished = finished_instance(&engine, &definition).await;
    grant(&engine, "jane", Resource::HistoricProcessInstance, &finished.id, &[Permission::Read]).await;

    let jane = engine.with_authentication(Authentication::new("jane"));
    let err = jane
        .history()
        .delete_historic_process_instance(Some(&finished.id))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
    assert!(err.to_string().contains("DELETE_HISTORY"));

    grant(&engine, "jane", Resource::ProcessDefinition, "order", &[Permission::DeleteHistory]).await;
    jane.history()
        .delete_historic_process_instance(Some(&finished.id))
        .await
        .unwrap();
    assert_eq!(instance_count(&engine).await, 0);

    // Grants on the deleted instance go with it.
    let grants = engine
        .context()
        .db
        .authorizations()
        .find_for("jane", &[], Resource::HistoricProcessInstance)
        .await
        .unwrap();
    assert!(grants.is_empty());
}

#[tokio::test]
async fn test_query_process_instances_filters_unreadable() {
    let (engine, _clock) = engine(with_authorization).await;
    let order = deploy(&engine, DefinitionKind::Process, "order").await;
    let invoice = deploy(&engine, DefinitionKind::Process, "invoice").await;
    finished_instance(&engine, &order).await;
    finished_instance(&engine, &invoice).await;
    grant(&engine, "jane", Resource::ProcessDefinition, "invoice", &[Permission::ReadHistory]).await;

    let jane = engine.with_authentication(Authentication::new("jane"));
    let visible = jane
        .history()
        .query_process_instances(&HistoricProcessInstanceQuery::default())
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].process_definition_key, "invoice");
}

#[tokio::test]
async fn test_query_tasks_with_historic_instance_permissions() {
    let (engine, _clock) = engine(|config| {
        with_authorization(config);
        config.authorization.enable_historic_instance_permissions = true;
    })
    .await;
    let order = deploy(&engine, DefinitionKind::Process, "order").await;
    let instance = engine
        .recorder()
        .start_process_instance(StartProcessInstance::new(&order.id))
        .await
        .unwrap();
    let recorder = engine.recorder();
    let visible_task = recorder.create_task(&instance.id, Some("approve"), Some("jane")).await.unwrap();
    recorder.create_task(&instance.id, Some("review"), None).await.unwrap();
    grant(&engine, "jane", Resource::HistoricTask, &visible_task.id, &[Permission::Read]).await;

    let jane = engine.with_authentication(Authentication::new("jane"));
    let tasks = jane.history().query_tasks(&instance.id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, visible_task.id);

    let admin = engine.with_authentication(Authentication::new("admin"));
    assert_eq!(admin.history().query_tasks(&instance.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_decision_instances_by_definition() {
    let (engine, _clock) = engine(|_| {}).await;
    let dish = deploy(&engine, DefinitionKind::Decision, "dish").await;
    let season = deploy(&engine, DefinitionKind::Decision, "season").await;
    let recorder = engine.recorder();
    for _ in 0..2 {
        recorder
            .evaluate_decision(EvaluateDecision::new(&dish.id), None)
            .await
            .unwrap();
    }
    recorder
        .evaluate_decision(EvaluateDecision::new(&season.id), None)
        .await
        .unwrap();

    let err = engine
        .history()
        .delete_historic_decision_instance_by_definition_id(None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "decisionDefinitionId is null");

    engine
        .history()
        .delete_historic_decision_instance_by_definition_id(Some(&dish.id))
        .await
        .unwrap();

    let remaining = engine
        .history()
        .query_decision_instances(&HistoricDecisionInstanceQuery::default())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].decision_definition_key, "season");
}

#[tokio::test]
async fn test_delete_open_case_instance_fails() {
    let (engine, _clock) = engine(|_| {}).await;
    let claim = deploy(&engine, DefinitionKind::Case, "claim").await;
    let recorder = engine.recorder();
    let open = recorder.create_case_instance(&claim.id).await.unwrap();
    let closed = recorder.create_case_instance(&claim.id).await.unwrap();
    recorder.close_case_instance(&closed.id).await.unwrap();

    let err = engine
        .history()
        .delete_historic_case_instances_bulk(Some(&[closed.id.clone(), open.id.clone()]))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "Case instance is still running, cannot delete historic case instance: {}",
            open.id
        )
    );

    engine
        .history()
        .delete_historic_case_instance(Some(&closed.id))
        .await
        .unwrap();
    let remaining = engine
        .history()
        .query_case_instances(&HistoricCaseInstanceQuery::default())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Batches
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_async_deletion_batch_lifecycle() {
    let (engine, clock) = engine(|_| {}).await;
    let definition = deploy(&engine, DefinitionKind::Process, "order").await;
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(finished_instance(&engine, &definition).await.id);
    }

    let batch = engine
        .history()
        .delete_historic_process_instances_async(Some(&ids), None)
        .await
        .unwrap();
    assert_eq!(batch.batch_type, batch_types::HISTORIC_PROCESS_INSTANCE_DELETION);
    assert_eq!(batch.total_jobs, 3);

    engine.executor().run_due_jobs().await.unwrap();
    assert_eq!(instance_count(&engine).await, 0);

    // The monitor job waits for the poll interval before completing.
    let statistics = engine.management().batch_statistics(&batch.id).await.unwrap();
    assert_eq!(statistics.remaining_jobs, 0);
    assert_eq!(statistics.completed_jobs, 3);

    clock.advance(Duration::seconds(31));
    engine.executor().run_due_jobs().await.unwrap();

    assert!(engine.management().list_batches().await.unwrap().is_empty());
    let historic = engine.management().get_historic_batch(&batch.id).await.unwrap();
    assert!(historic.execution_start_time.is_some());
    assert!(historic.end_time.is_some());
    assert_eq!(operations(&engine, operation_types::DELETE_HISTORY).await, 1);
}

async fn jobs_of_type(engine: &Engine, job_type: &str) -> Vec<Job> {
    engine
        .context()
        .db
        .jobs()
        .list(&JobQuery::by_type(job_type))
        .await
        .unwrap()
}

fn sorted_deployments(jobs: &[Job]) -> Vec<Option<String>> {
    let mut deployments: Vec<_> = jobs.iter().map(|j| j.deployment_id.clone()).collect();
    deployments.sort();
    deployments
}

async fn finished_in_two_deployments(engine: &Engine) -> Vec<String> {
    let first = deploy_in(engine, DefinitionKind::Process, "order", "deployment-1").await;
    let second = deploy_in(engine, DefinitionKind::Process, "invoice", "deployment-2").await;
    let mut ids = Vec::new();
    for definition in [&first, &first, &first, &second, &second, &second] {
        ids.push(finished_instance(engine, definition).await.id);
    }
    ids
}

#[tokio::test]
async fn test_deletion_jobs_by_ids_in_different_deployments() {
    let (engine, _clock) = engine(|c| c.batch.invocations_per_batch_job = 2).await;
    let ids = finished_in_two_deployments(&engine).await;

    let batch = engine
        .history()
        .delete_historic_process_instances_async(Some(&ids), None)
        .await
        .unwrap();
    assert_eq!(batch.total_jobs, 4);

    let seeds = jobs_of_type(&engine, jobs::job_types::BATCH_SEED).await;
    assert_eq!(seeds.len(), 1);
    assert_eq!(seeds[0].deployment_id.as_deref(), Some("deployment-1"));

    engine.executor().execute_job(&seeds[0].id).await.unwrap();

    let execution_jobs = jobs_of_type(&engine, &batch.batch_type).await;
    assert_eq!(execution_jobs.len(), 4);
    assert_eq!(
        sorted_deployments(&execution_jobs),
        vec![
            Some("deployment-1".to_string()),
            Some("deployment-1".to_string()),
            Some("deployment-2".to_string()),
            Some("deployment-2".to_string()),
        ]
    );
    assert!(jobs_of_type(&engine, jobs::job_types::BATCH_SEED).await.is_empty());

    engine.executor().run_due_jobs().await.unwrap();
    assert_eq!(instance_count(&engine).await, 0);
}

#[tokio::test]
async fn test_next_seed_job_takes_deployment_of_next_chunk() {
    let (engine, _clock) = engine(|c| {
        c.batch.invocations_per_batch_job = 2;
        c.batch.jobs_per_seed = 2;
    })
    .await;
    let ids = finished_in_two_deployments(&engine).await;

    engine
        .history()
        .delete_historic_process_instances_async(Some(&ids), None)
        .await
        .unwrap();
    let seed = jobs_of_type(&engine, jobs::job_types::BATCH_SEED).await.remove(0);
    engine.executor().execute_job(&seed.id).await.unwrap();

    // Both jobs of the first seed run cover deployment-1's three instances.
    let execution_jobs =
        jobs_of_type(&engine, batch_types::HISTORIC_PROCESS_INSTANCE_DELETION).await;
    assert_eq!(
        sorted_deployments(&execution_jobs),
        vec![Some("deployment-1".to_string()), Some("deployment-1".to_string())]
    );
    let seeds = jobs_of_type(&engine, jobs::job_types::BATCH_SEED).await;
    assert_eq!(seeds.len(), 1);
    assert_eq!(seeds[0].deployment_id.as_deref(), Some("deployment-2"));
}

#[tokio::test]
async fn test_deletion_jobs_for_instances_without_deployment() {
    let (engine, _clock) = engine(|c| c.batch.invocations_per_batch_job = 2).await;
    let definition = deploy(&engine, DefinitionKind::Process, "order").await;
    let deployed = finished_instance(&engine, &definition).await;

    // History left behind by a deployment that no longer exists.
    let mut orphaned = deployed.clone();
    orphaned.id = new_id();
    orphaned.root_process_instance_id = orphaned.id.clone();
    orphaned.process_definition_id = "removed-definition".to_string();
    orphaned.deployment_id = None;
    engine
        .context()
        .db
        .process_history()
        .insert_process_instance(&orphaned)
        .await
        .unwrap();

    let ids = vec![orphaned.id.clone(), deployed.id.clone()];
    let batch = engine
        .history()
        .delete_historic_process_instances_async(Some(&ids), None)
        .await
        .unwrap();
    assert_eq!(batch.total_jobs, 2);

    let seed = jobs_of_type(&engine, jobs::job_types::BATCH_SEED).await.remove(0);
    assert_eq!(seed.deployment_id.as_deref(), Some("deployment-1"));
    engine.executor().execute_job(&seed.id).await.unwrap();

    let execution_jobs = jobs_of_type(&engine, &batch.batch_type).await;
    assert_eq!(
        sorted_deployments(&execution_jobs),
        vec![None, Some("deployment-1".to_string())]
    );

    engine.executor().run_due_jobs().await.unwrap();
    assert_eq!(instance_count(&engine).await, 0);
}

#[tokio::test]
async fn test_async_deletion_validates_ids_and_permission() {
    let (engine, _clock) = engine(with_authorization).await;
    let history = engine.history();
    let err = history
        .delete_historic_decision_instances_async(None, None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "decisionInstanceIds is null");

    let jane = engine.with_authentication(Authentication::new("jane"));
    let err = jane
        .history()
        .delete_historic_process_instances_async(Some(&["a".to_string()]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    grant(&engine, "jane", Resource::Batch, "*", &[Permission::Create]).await;
    let batch = jane
        .history()
        .delete_historic_process_instances_async(Some(&["a".to_string()]), None)
        .await
        .unwrap();
    assert_eq!(batch.create_user_id.as_deref(), Some("jane"));
}

#[tokio::test]
async fn test_set_removal_time_batch_applies_absolute_time() {
    let (engine, clock) = engine(|_| {}).await;
    let definition = deploy(&engine, DefinitionKind::Process, "order").await;
    let finished = finished_instance(&engine, &definition).await;
    let removal = start() + Duration::days(100);

    engine
        .history()
        .set_removal_time_to_historic_process_instances_async(
            RemovalTimeUpdate::Absolute(removal),
            None,
            Some(&HistoricProcessInstanceQuery::by_definition_key("order")),
            true,
        )
        .await
        .unwrap();
    engine.executor().run_due_jobs().await.unwrap();
    clock.advance(Duration::seconds(31));
    engine.executor().run_due_jobs().await.unwrap();

    let instance = engine
        .context()
        .db
        .process_history()
        .get_process_instance(&finished.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(instance.removal_time, Some(removal));
    assert_eq!(operations(&engine, operation_types::SET_REMOVAL_TIME).await, 1);
}

#[tokio::test]
async fn test_suspend_and_delete_batch() {
    let (engine, _clock) = engine(|_| {}).await;
    let batch = engine
        .history()
        .delete_historic_process_instances_async(Some(&["a".to_string()]), None)
        .await
        .unwrap();
    let management = engine.management();

    management.suspend_batch(&batch.id).await.unwrap();
    assert!(management.get_batch(&batch.id).await.unwrap().suspended);
    assert_eq!(engine.executor().run_due_jobs().await.unwrap(), 0);

    management.activate_batch(&batch.id).await.unwrap();
    management.delete_batch(&batch.id, true).await.unwrap();

    let err = management.get_batch(&batch.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    let err = management.get_historic_batch(&batch.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    assert_eq!(operations(&engine, operation_types::SUSPEND_BATCH).await, 1);
    assert_eq!(operations(&engine, operation_types::ACTIVATE_BATCH).await, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// History cleanup and reports
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_clean_up_history_async_disabled() {
    let (engine, _clock) = engine(|config| config.history_cleanup.enabled = false).await;
    let err = engine.history().clean_up_history_async(true).await.unwrap_err();
    assert_eq!(err.to_string(), "History cleanup is disabled for this engine");
}

#[tokio::test]
async fn test_clean_up_history_async_requires_admin() {
    let (engine, _clock) = engine(with_authorization).await;

    let jane = engine.with_authentication(Authentication::new("jane"));
    let err = jane.history().clean_up_history_async(true).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let admin = engine.with_authentication(Authentication::new("admin"));
    let job = admin.history().clean_up_history_async(true).await.unwrap().unwrap();
    assert_eq!(job.due_date, Some(start()));
    assert_eq!(
        admin.history().find_history_cleanup_job().await.unwrap().map(|j| j.id),
        Some(job.id)
    );
    assert_eq!(operations(&engine, operation_types::CREATE_HISTORY_CLEANUP_JOBS).await, 1);
}

#[tokio::test]
async fn test_immediate_cleanup_removes_expired_history() {
    let (engine, clock) = engine(|_| {}).await;
    let definition = deploy(&engine, DefinitionKind::Process, "order").await;
    finished_instance(&engine, &definition).await;

    clock.advance(Duration::days(6));
    engine.history().clean_up_history_async(true).await.unwrap();
    engine.executor().run_due_jobs().await.unwrap();

    assert_eq!(instance_count(&engine).await, 0);
    let removed = engine
        .management()
        .metrics_sum(metric_names::HISTORY_CLEANUP_REMOVED_PROCESS_INSTANCES, None, None)
        .await
        .unwrap();
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn test_cleanable_process_report() {
    let (engine, clock) = engine(|_| {}).await;
    let order = deploy(&engine, DefinitionKind::Process, "order").await;
    deploy(&engine, DefinitionKind::Process, "invoice").await;
    finished_instance(&engine, &order).await;
    clock.advance(Duration::days(6));
    finished_instance(&engine, &order).await;

    let history = engine.history();
    let report = history
        .cleanable_process_instance_report(&CleanableReportQuery::default())
        .await
        .unwrap();
    assert_eq!(report.len(), 2);

    let compact = history
        .cleanable_process_instance_report(&CleanableReportQuery {
            compact: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(compact.len(), 1);
    assert_eq!(compact[0].definition_key, "order");
    assert_eq!(compact[0].finished_count, 2);
    assert_eq!(compact[0].cleanable_count, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Jobs and repository
// ─────────────────────────────────────────────────────────────────────────────

async fn orphan_job(engine: &Engine) -> Job {
    let ctx = engine.context();
    let job = Job::new(new_id(), "no-such-handler", 1, ctx.now());
    jobs::create_job(ctx, &job).await.unwrap();
    job
}

#[tokio::test]
async fn test_set_job_retries_resolves_incident() {
    let (engine, _clock) = engine(|_| {}).await;
    let job = orphan_job(&engine).await;
    let management = engine.management();

    assert!(management.execute_job(Some(&job.id)).await.is_err());
    let incidents = engine
        .context()
        .db
        .jobs()
        .list_incidents_for_job(&job.id)
        .await
        .unwrap();
    assert_eq!(incidents.len(), 1);
    let stacktrace = management.get_job_exception_stacktrace(&job.id).await.unwrap().unwrap();
    assert!(stacktrace.contains("No job handler registered"));

    let err = management.set_job_retries(&job.id, -1).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "The number of job retries must be a non-negative Integer, but '-1' has been provided."
    );

    management.set_job_retries(&job.id, 2).await.unwrap();
    assert_eq!(management.get_job(&job.id).await.unwrap().retries, 2);
    assert!(
        engine
            .context()
            .db
            .jobs()
            .list_incidents_for_job(&job.id)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(operations(&engine, operation_types::SET_JOB_RETRIES).await, 1);
    assert_eq!(
        management.metrics_sum(metric_names::JOB_FAILED, None, None).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_job_management_requires_admin() {
    let (engine, _clock) = engine(with_authorization).await;
    let job = orphan_job(&engine).await;
    let jane = engine.with_authentication(Authentication::new("jane"));

    let err = jane.management().set_job_retries(&job.id, 3).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
    let err = jane.management().list_jobs(&JobQuery::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
    let err = engine.management().execute_job(Some("missing")).await.unwrap_err();
    assert_eq!(err.to_string(), "No job found with id 'missing'");
}

#[tokio::test]
async fn test_deploy_applies_default_ttl_and_logs_ttl_update() {
    let (engine, _clock) = engine(|config| {
        config.history.history_time_to_live = Some("P30D".to_string());
    })
    .await;
    let repository = engine.repository();

    let definition = repository
        .deploy(CreateDefinition::new(DefinitionKind::Process, "order", "deployment-1"))
        .await
        .unwrap();
    assert_eq!(definition.history_time_to_live, Some(30));

    let err = repository
        .update_history_time_to_live(&definition.id, Some(-1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BadUserRequest(_)));

    repository
        .update_history_time_to_live(&definition.id, Some(7))
        .await
        .unwrap();
    assert_eq!(
        repository.get_definition(&definition.id).await.unwrap().history_time_to_live,
        Some(7)
    );
    assert_eq!(operations(&engine, operation_types::UPDATE_HISTORY_TIME_TO_LIVE).await, 1);
}
