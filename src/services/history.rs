//! History service: queries, deletes, removal time updates, cleanup
//! scheduling and cleanable reports.

use std::collections::HashSet;

use crate::{
    authz::PermissionCheck,
    batch::{self, BatchConfiguration},
    engine::EngineContext,
    error::{EngineError, EngineResult, ensure_not_empty, ensure_not_null},
    history_cleanup,
    models::{
        ANY_RESOURCE_ID, Authentication, Batch, CaseInstanceState, CleanableBatchReport,
        CleanableDefinitionReport, CleanableReportQuery, CreateUserOperation, DefinitionKind,
        HistoricCaseInstance, HistoricCaseInstanceQuery, HistoricDecisionInstance,
        HistoricDecisionInstanceQuery, HistoricProcessInstance, HistoricProcessInstanceQuery,
        HistoricTaskInstance, Job, OperationCategory, Permission, PropertyChange, Resource,
        UserOperationLogEntry, UserOperationLogQuery, batch_types, entity_types, operation_types,
    },
    removal_time::RemovalTimeUpdate,
};

/// Render ids the way error messages list them: `[a, b]`.
fn id_list(ids: &[String]) -> String {
    format!("[{}]", ids.join(", "))
}

fn delete_history_check(resource: Resource, definition_key: &str) -> PermissionCheck {
    PermissionCheck::new(Permission::DeleteHistory, resource, definition_key)
}

/// Ids in first-seen order without duplicates.
fn distinct(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Deletion without authorization checks, shared with batch execution jobs
// ─────────────────────────────────────────────────────────────────────────────

async fn load_process_instances(
    ctx: &EngineContext,
    ids: &[String],
    fail_if_not_exists: bool,
) -> EngineResult<Vec<HistoricProcessInstance>> {
    let ids = distinct(ids);
    let query = HistoricProcessInstanceQuery {
        ids: Some(ids.clone()),
        ..Default::default()
    };
    let instances = ctx.db.process_history().list_process_instances(&query).await?;

    if fail_if_not_exists && instances.len() < ids.len() {
        let found: HashSet<&str> = instances.iter().map(|i| i.id.as_str()).collect();
        let missing: Vec<String> = ids
            .into_iter()
            .filter(|id| !found.contains(id.as_str()))
            .collect();
        return Err(EngineError::bad_request(format!(
            "No historic process instance found with id: {}",
            id_list(&missing)
        )));
    }

    if let Some(running) = instances.iter().find(|i| i.end_time.is_none()) {
        return Err(EngineError::InvalidState(format!(
            "Process instance is still running, cannot delete historic process instance: {}",
            running.id
        )));
    }
    Ok(instances)
}

async fn delete_process_instances(
    ctx: &EngineContext,
    instances: &[HistoricProcessInstance],
) -> EngineResult<u64> {
    if instances.is_empty() {
        return Ok(0);
    }
    let ids: Vec<String> = instances.iter().map(|i| i.id.clone()).collect();

    let mut task_ids = Vec::new();
    for id in &ids {
        task_ids.extend(
            ctx.db
                .process_history()
                .list_task_instances(id)
                .await?
                .into_iter()
                .map(|task| task.id),
        );
    }

    let deleted = ctx.db.process_history().delete_cascade(&ids).await?;

    let authorizations = ctx.db.authorizations();
    authorizations
        .delete_by_resource(Resource::HistoricProcessInstance, &ids)
        .await?;
    if !task_ids.is_empty() {
        authorizations
            .delete_by_resource(Resource::HistoricTask, &task_ids)
            .await?;
    }

    tracing::debug!(deleted, "Historic process instances deleted");
    Ok(deleted)
}

/// Delete finished process instances with all their history.
pub(crate) async fn remove_process_instances(
    ctx: &EngineContext,
    ids: &[String],
    fail_if_not_exists: bool,
) -> EngineResult<u64> {
    let instances = load_process_instances(ctx, ids, fail_if_not_exists).await?;
    delete_process_instances(ctx, &instances).await
}

pub(crate) async fn remove_decision_instances(ctx: &EngineContext, ids: &[String]) -> EngineResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    Ok(ctx.db.decision_history().delete_cascade(&distinct(ids)).await?)
}

async fn load_case_instances(
    ctx: &EngineContext,
    ids: &[String],
    fail_if_not_exists: bool,
) -> EngineResult<Vec<HistoricCaseInstance>> {
    let ids = distinct(ids);
    let query = HistoricCaseInstanceQuery {
        ids: Some(ids.clone()),
        ..Default::default()
    };
    let instances = ctx.db.case_history().list_case_instances(&query).await?;

    if fail_if_not_exists && instances.len() < ids.len() {
        let found: HashSet<&str> = instances.iter().map(|i| i.id.as_str()).collect();
        let missing: Vec<String> = ids
            .into_iter()
            .filter(|id| !found.contains(id.as_str()))
            .collect();
        return Err(EngineError::bad_request(format!(
            "No historic case instance found with id: {}",
            id_list(&missing)
        )));
    }

    if let Some(open) = instances
        .iter()
        .find(|i| i.state != CaseInstanceState::Closed)
    {
        return Err(EngineError::InvalidState(format!(
            "Case instance is still running, cannot delete historic case instance: {}",
            open.id
        )));
    }
    Ok(instances)
}

pub(crate) async fn remove_case_instances(
    ctx: &EngineContext,
    ids: &[String],
    fail_if_not_exists: bool,
) -> EngineResult<u64> {
    let instances = load_case_instances(ctx, ids, fail_if_not_exists).await?;
    if instances.is_empty() {
        return Ok(0);
    }
    let ids: Vec<String> = instances.into_iter().map(|i| i.id).collect();
    Ok(ctx.db.case_history().delete_cascade(&ids).await?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// History operations performed on behalf of the caller.
pub struct HistoryService<'a> {
    ctx: &'a EngineContext,
    auth: Option<&'a Authentication>,
}

impl<'a> HistoryService<'a> {
    pub fn new(ctx: &'a EngineContext, auth: Option<&'a Authentication>) -> Self {
        Self { ctx, auth }
    }

    fn user_id(&self) -> Option<String> {
        self.auth.map(|a| a.user_id.clone())
    }

    async fn check_delete_history(
        &self,
        resource: Resource,
        definition_keys: impl IntoIterator<Item = &str>,
    ) -> EngineResult<()> {
        let keys: HashSet<&str> = definition_keys.into_iter().collect();
        for key in keys {
            self.ctx
                .authz
                .check(self.auth, delete_history_check(resource, key))
                .await?;
        }
        Ok(())
    }

    async fn log(&self, operation: CreateUserOperation) -> EngineResult<()> {
        self.ctx.log_operation(operation).await
    }

    fn operation(&self, operation_type: &str, entity_type: &str) -> CreateUserOperation {
        CreateUserOperation::new(
            operation_type,
            entity_type,
            OperationCategory::Operator,
            self.user_id(),
        )
    }

    async fn start_batch(
        &self,
        batch_type: &str,
        configuration: BatchConfiguration,
        operation: CreateUserOperation,
    ) -> EngineResult<Batch> {
        self.ctx
            .authz
            .check(
                self.auth,
                PermissionCheck::new(Permission::Create, Resource::Batch, ANY_RESOURCE_ID),
            )
            .await?;
        let instances = configuration.ids.len();
        let batch = batch::create_batch(self.ctx, batch_type, configuration, self.user_id()).await?;
        self.log(
            operation
                .with_batch(&batch.id)
                .with_change(PropertyChange::new(
                    "nrOfInstances",
                    None,
                    Some(instances.to_string()),
                ))
                .with_change(PropertyChange::new("async", None, Some("true".to_string()))),
        )
        .await?;
        Ok(batch)
    }

    // ── Process instances ────────────────────────────────────────────────

    /// Historic process instances the caller may read.
    pub async fn query_process_instances(
        &self,
        query: &HistoricProcessInstanceQuery,
    ) -> EngineResult<Vec<HistoricProcessInstance>> {
        let instances = self
            .ctx
            .db
            .process_history()
            .list_process_instances(query)
            .await?;
        let mut visible = Vec::with_capacity(instances.len());
        for instance in instances {
            let checks = self
                .ctx
                .authz
                .read_historic_process_instance(&instance.process_definition_key, &instance.id);
            if self.ctx.authz.is_granted_any(self.auth, &checks).await? {
                visible.push(instance);
            }
        }
        Ok(visible)
    }

    /// Historic tasks of a process instance the caller may read.
    pub async fn query_tasks(&self, process_instance_id: &str) -> EngineResult<Vec<HistoricTaskInstance>> {
        let Some(instance) = self
            .ctx
            .db
            .process_history()
            .get_process_instance(process_instance_id)
            .await?
        else {
            return Ok(Vec::new());
        };
        let tasks = self
            .ctx
            .db
            .process_history()
            .list_task_instances(process_instance_id)
            .await?;
        let mut visible = Vec::with_capacity(tasks.len());
        for task in tasks {
            let checks = self
                .ctx
                .authz
                .read_historic_task(&instance.process_definition_key, &task.id);
            if self.ctx.authz.is_granted_any(self.auth, &checks).await? {
                visible.push(task);
            }
        }
        Ok(visible)
    }

    pub async fn delete_historic_process_instance(&self, id: Option<&str>) -> EngineResult<()> {
        let id = ensure_not_null(id.as_ref(), "processInstanceId")?;
        self.delete_process_instances(&[id.to_string()], true).await
    }

    /// Delete finished process instances. Fails when any id is unknown.
    pub async fn delete_historic_process_instances(&self, ids: Option<&[String]>) -> EngineResult<()> {
        let ids = ensure_not_empty(ids, "processInstanceIds")?;
        self.delete_process_instances(ids, true).await
    }

    /// Delete finished process instances, skipping unknown ids.
    pub async fn delete_historic_process_instances_if_exists(
        &self,
        ids: Option<&[String]>,
    ) -> EngineResult<()> {
        let ids = ensure_not_empty(ids, "processInstanceIds")?;
        self.delete_process_instances(ids, false).await
    }

    /// Delete finished process instances in one statement batch. Every id
    /// must exist and be finished.
    pub async fn delete_historic_process_instances_bulk(
        &self,
        ids: Option<&[String]>,
    ) -> EngineResult<()> {
        let ids = ensure_not_empty(ids, "processInstanceIds")?;
        self.delete_process_instances(ids, true).await
    }

    async fn delete_process_instances(&self, ids: &[String], fail_if_not_exists: bool) -> EngineResult<()> {
        let instances = load_process_instances(self.ctx, ids, fail_if_not_exists).await?;
        self.check_delete_history(
            Resource::ProcessDefinition,
            instances.iter().map(|i| i.process_definition_key.as_str()),
        )
        .await?;

        delete_process_instances(self.ctx, &instances).await?;

        self.log(
            self.operation(operation_types::DELETE_HISTORY, entity_types::PROCESS_INSTANCE)
                .with_change(PropertyChange::new(
                    "nrOfInstances",
                    None,
                    Some(instances.len().to_string()),
                ))
                .with_change(PropertyChange::new("async", None, Some("false".to_string()))),
        )
        .await
    }

    /// Start a batch that deletes the given process instances plus those
    /// matched by `query`.
    pub async fn delete_historic_process_instances_async(
        &self,
        ids: Option<&[String]>,
        query: Option<&HistoricProcessInstanceQuery>,
    ) -> EngineResult<Batch> {
        let ids = self.collect_process_ids(ids, query).await?;
        let configuration = self.process_configuration(&ids).await?.with_fail_if_not_exists(false);
        self.start_batch(
            batch_types::HISTORIC_PROCESS_INSTANCE_DELETION,
            configuration,
            self.operation(operation_types::DELETE_HISTORY, entity_types::PROCESS_INSTANCE),
        )
        .await
    }

    async fn collect_process_ids(
        &self,
        ids: Option<&[String]>,
        query: Option<&HistoricProcessInstanceQuery>,
    ) -> EngineResult<Vec<String>> {
        let mut collected: Vec<String> = ids.map(<[String]>::to_vec).unwrap_or_default();
        if let Some(query) = query {
            collected.extend(
                self.ctx
                    .db
                    .process_history()
                    .list_process_instances(query)
                    .await?
                    .into_iter()
                    .map(|i| i.id),
            );
        }
        if ids.is_none() && query.is_none() {
            ensure_not_empty::<String>(None, "processInstanceIds")?;
        }
        let collected = distinct(&collected);
        ensure_not_empty(Some(collected.as_slice()), "processInstanceIds")?;
        Ok(collected)
    }

    async fn process_configuration(&self, ids: &[String]) -> EngineResult<BatchConfiguration> {
        let query = HistoricProcessInstanceQuery {
            ids: Some(ids.to_vec()),
            ..Default::default()
        };
        let deployments: std::collections::HashMap<String, Option<String>> = self
            .ctx
            .db
            .process_history()
            .list_process_instances(&query)
            .await?
            .into_iter()
            .map(|i| (i.id, i.deployment_id))
            .collect();
        Ok(BatchConfiguration::new(
            ids.iter()
                .map(|id| (id.clone(), deployments.get(id).cloned().flatten()))
                .collect(),
        ))
    }

    /// Start a batch that updates the removal time of process instances.
    pub async fn set_removal_time_to_historic_process_instances_async(
        &self,
        update: RemovalTimeUpdate,
        ids: Option<&[String]>,
        query: Option<&HistoricProcessInstanceQuery>,
        hierarchical: bool,
    ) -> EngineResult<Batch> {
        let ids = self.collect_process_ids(ids, query).await?;
        let configuration = self
            .process_configuration(&ids)
            .await?
            .with_removal_time(update, hierarchical);
        self.start_batch(
            batch_types::PROCESS_SET_REMOVAL_TIME,
            configuration,
            removal_time_operation(self, entity_types::PROCESS_INSTANCE, update, hierarchical),
        )
        .await
    }

    // ── Decision instances ───────────────────────────────────────────────

    /// Historic decision instances the caller may read.
    pub async fn query_decision_instances(
        &self,
        query: &HistoricDecisionInstanceQuery,
    ) -> EngineResult<Vec<HistoricDecisionInstance>> {
        let instances = self
            .ctx
            .db
            .decision_history()
            .list_decision_instances(query)
            .await?;
        let mut visible = Vec::with_capacity(instances.len());
        for instance in instances {
            let check = PermissionCheck::new(
                Permission::ReadHistory,
                Resource::DecisionDefinition,
                &instance.decision_definition_key,
            );
            if self.ctx.authz.is_granted_any(self.auth, &[check]).await? {
                visible.push(instance);
            }
        }
        Ok(visible)
    }

    /// Delete every historic decision instance of a decision definition.
    pub async fn delete_historic_decision_instance_by_definition_id(
        &self,
        definition_id: Option<&str>,
    ) -> EngineResult<()> {
        let definition_id = ensure_not_null(definition_id.as_ref(), "decisionDefinitionId")?;
        let definition = self
            .ctx
            .db
            .definitions()
            .get(definition_id)
            .await?
            .filter(|d| d.kind == DefinitionKind::Decision)
            .ok_or_else(|| {
                EngineError::not_found(format!(
                    "No decision definition found with id: {}",
                    definition_id
                ))
            })?;
        self.check_delete_history(Resource::DecisionDefinition, [definition.key.as_str()])
            .await?;

        let query = HistoricDecisionInstanceQuery {
            decision_definition_id: Some(definition.id.clone()),
            ..Default::default()
        };
        let ids: Vec<String> = self
            .ctx
            .db
            .decision_history()
            .list_decision_instances(&query)
            .await?
            .into_iter()
            .map(|i| i.id)
            .collect();
        let deleted = remove_decision_instances(self.ctx, &ids).await?;

        let mut operation =
            self.operation(operation_types::DELETE_HISTORY, entity_types::DECISION_DEFINITION);
        operation.changes.push(PropertyChange::new(
            "decisionDefinitionId",
            None,
            Some(definition.id),
        ));
        operation.changes.push(PropertyChange::new(
            "decisionDefinitionKey",
            None,
            Some(definition.key),
        ));
        self.log(operation).await?;
        tracing::debug!(deleted, "Historic decision instances deleted by definition");
        Ok(())
    }

    pub async fn delete_historic_decision_instance_by_instance_id(
        &self,
        id: Option<&str>,
    ) -> EngineResult<()> {
        let id = ensure_not_null(id.as_ref(), "decisionInstanceId")?;
        let instance = self
            .ctx
            .db
            .decision_history()
            .get_decision_instance(id)
            .await?
            .ok_or_else(|| {
                EngineError::bad_request(format!(
                    "No historic decision instance found with id: {}",
                    id
                ))
            })?;
        self.check_delete_history(
            Resource::DecisionDefinition,
            [instance.decision_definition_key.as_str()],
        )
        .await?;
        remove_decision_instances(self.ctx, std::slice::from_ref(&instance.id)).await?;
        self.log(
            self.operation(operation_types::DELETE_HISTORY, entity_types::DECISION_INSTANCE)
                .with_change(PropertyChange::new("nrOfInstances", None, Some("1".to_string())))
                .with_change(PropertyChange::new("async", None, Some("false".to_string()))),
        )
        .await
    }

    /// Delete decision instances; unknown ids are skipped.
    pub async fn delete_historic_decision_instances_bulk(
        &self,
        ids: Option<&[String]>,
    ) -> EngineResult<()> {
        let ids = ensure_not_empty(ids, "decisionInstanceIds")?;
        let query = HistoricDecisionInstanceQuery {
            ids: Some(distinct(ids)),
            ..Default::default()
        };
        let instances = self
            .ctx
            .db
            .decision_history()
            .list_decision_instances(&query)
            .await?;
        self.check_delete_history(
            Resource::DecisionDefinition,
            instances.iter().map(|i| i.decision_definition_key.as_str()),
        )
        .await?;

        let ids: Vec<String> = instances.iter().map(|i| i.id.clone()).collect();
        remove_decision_instances(self.ctx, &ids).await?;
        self.log(
            self.operation(operation_types::DELETE_HISTORY, entity_types::DECISION_INSTANCE)
                .with_change(PropertyChange::new(
                    "nrOfInstances",
                    None,
                    Some(ids.len().to_string()),
                ))
                .with_change(PropertyChange::new("async", None, Some("false".to_string()))),
        )
        .await
    }

    async fn collect_decision_ids(
        &self,
        ids: Option<&[String]>,
        query: Option<&HistoricDecisionInstanceQuery>,
    ) -> EngineResult<Vec<HistoricDecisionInstance>> {
        let mut collected: Vec<String> = ids.map(<[String]>::to_vec).unwrap_or_default();
        if let Some(query) = query {
            collected.extend(
                self.ctx
                    .db
                    .decision_history()
                    .list_decision_instances(query)
                    .await?
                    .into_iter()
                    .map(|i| i.id),
            );
        }
        if ids.is_none() && query.is_none() {
            ensure_not_empty::<String>(None, "decisionInstanceIds")?;
        }
        let collected = distinct(&collected);
        ensure_not_empty(Some(collected.as_slice()), "decisionInstanceIds")?;

        let query = HistoricDecisionInstanceQuery {
            ids: Some(collected),
            ..Default::default()
        };
        Ok(self
            .ctx
            .db
            .decision_history()
            .list_decision_instances(&query)
            .await?)
    }

    async fn decision_configuration(
        &self,
        instances: &[HistoricDecisionInstance],
    ) -> EngineResult<BatchConfiguration> {
        let mut pairs = Vec::with_capacity(instances.len());
        for instance in instances {
            let deployment = self
                .ctx
                .db
                .definitions()
                .get(&instance.decision_definition_id)
                .await?
                .map(|d| d.deployment_id);
            pairs.push((instance.id.clone(), deployment));
        }
        Ok(BatchConfiguration::new(pairs))
    }

    pub async fn delete_historic_decision_instances_async(
        &self,
        ids: Option<&[String]>,
        query: Option<&HistoricDecisionInstanceQuery>,
    ) -> EngineResult<Batch> {
        let instances = self.collect_decision_ids(ids, query).await?;
        if instances.is_empty() {
            return Err(EngineError::bad_request("decisionInstanceIds is empty"));
        }
        let configuration = self.decision_configuration(&instances).await?;
        self.start_batch(
            batch_types::HISTORIC_DECISION_INSTANCE_DELETION,
            configuration,
            self.operation(operation_types::DELETE_HISTORY, entity_types::DECISION_INSTANCE),
        )
        .await
    }

    pub async fn set_removal_time_to_historic_decision_instances_async(
        &self,
        update: RemovalTimeUpdate,
        ids: Option<&[String]>,
        query: Option<&HistoricDecisionInstanceQuery>,
        hierarchical: bool,
    ) -> EngineResult<Batch> {
        let instances = self.collect_decision_ids(ids, query).await?;
        if instances.is_empty() {
            return Err(EngineError::bad_request("decisionInstanceIds is empty"));
        }
        let configuration = self
            .decision_configuration(&instances)
            .await?
            .with_removal_time(update, hierarchical);
        self.start_batch(
            batch_types::DECISION_SET_REMOVAL_TIME,
            configuration,
            removal_time_operation(self, entity_types::DECISION_INSTANCE, update, hierarchical),
        )
        .await
    }

    // ── Case instances ───────────────────────────────────────────────────

    pub async fn query_case_instances(
        &self,
        query: &HistoricCaseInstanceQuery,
    ) -> EngineResult<Vec<HistoricCaseInstance>> {
        Ok(self.ctx.db.case_history().list_case_instances(query).await?)
    }

    pub async fn delete_historic_case_instance(&self, id: Option<&str>) -> EngineResult<()> {
        let id = ensure_not_null(id.as_ref(), "caseInstanceId")?;
        self.delete_case_instances(&[id.to_string()]).await
    }

    /// Delete closed case instances. Every id must exist and be closed.
    pub async fn delete_historic_case_instances_bulk(&self, ids: Option<&[String]>) -> EngineResult<()> {
        let ids = ensure_not_empty(ids, "caseInstanceIds")?;
        self.delete_case_instances(ids).await
    }

    async fn delete_case_instances(&self, ids: &[String]) -> EngineResult<()> {
        let instances = load_case_instances(self.ctx, ids, true).await?;
        self.check_delete_history(
            Resource::CaseDefinition,
            instances.iter().map(|i| i.case_definition_key.as_str()),
        )
        .await?;
        let ids: Vec<String> = instances.iter().map(|i| i.id.clone()).collect();
        self.ctx.db.case_history().delete_cascade(&ids).await?;
        self.log(
            self.operation(operation_types::DELETE_HISTORY, entity_types::CASE_INSTANCE)
                .with_change(PropertyChange::new(
                    "nrOfInstances",
                    None,
                    Some(ids.len().to_string()),
                ))
                .with_change(PropertyChange::new("async", None, Some("false".to_string()))),
        )
        .await
    }

    pub async fn delete_historic_case_instances_async(&self, ids: Option<&[String]>) -> EngineResult<Batch> {
        let ids = distinct(ensure_not_empty(ids, "caseInstanceIds")?);
        let query = HistoricCaseInstanceQuery {
            ids: Some(ids.clone()),
            ..Default::default()
        };
        let mut definitions = std::collections::HashMap::new();
        for instance in self.ctx.db.case_history().list_case_instances(&query).await? {
            let deployment = self
                .ctx
                .db
                .definitions()
                .get(&instance.case_definition_id)
                .await?
                .map(|d| d.deployment_id);
            definitions.insert(instance.id, deployment);
        }
        let configuration = BatchConfiguration::new(
            ids.into_iter()
                .map(|id| {
                    let deployment = definitions.get(&id).cloned().flatten();
                    (id, deployment)
                })
                .collect(),
        )
        .with_fail_if_not_exists(false);
        self.start_batch(
            batch_types::HISTORIC_CASE_INSTANCE_DELETION,
            configuration,
            self.operation(operation_types::DELETE_HISTORY, entity_types::CASE_INSTANCE),
        )
        .await
    }

    // ── Historic batches ─────────────────────────────────────────────────

    pub async fn set_removal_time_to_historic_batches_async(
        &self,
        update: RemovalTimeUpdate,
        ids: Option<&[String]>,
    ) -> EngineResult<Batch> {
        let ids = distinct(ensure_not_empty(ids, "historicBatchIds")?);
        let configuration = BatchConfiguration::new(ids.into_iter().map(|id| (id, None)).collect())
            .with_removal_time(update, false);
        self.start_batch(
            batch_types::BATCH_SET_REMOVAL_TIME,
            configuration,
            removal_time_operation(self, entity_types::BATCH, update, false),
        )
        .await
    }

    // ── History cleanup ──────────────────────────────────────────────────

    /// Schedule history cleanup jobs. Requires an admin.
    ///
    /// When `immediately_due` the jobs run at once, otherwise at the start of
    /// the next batch window. Returns the first cleanup job.
    pub async fn clean_up_history_async(&self, immediately_due: bool) -> EngineResult<Option<Job>> {
        if !self.ctx.config.history_cleanup.enabled {
            return Err(EngineError::Configuration(
                "History cleanup is disabled for this engine".to_string(),
            ));
        }
        self.ctx.authz.check_admin(self.auth)?;

        self.log(
            self.operation(operation_types::CREATE_HISTORY_CLEANUP_JOBS, entity_types::JOB)
                .with_change(PropertyChange::new(
                    "immediatelyDue",
                    None,
                    Some(immediately_due.to_string()),
                )),
        )
        .await?;
        history_cleanup::schedule(self.ctx, immediately_due).await
    }

    pub async fn find_history_cleanup_jobs(&self) -> EngineResult<Vec<Job>> {
        history_cleanup::find_jobs(self.ctx).await
    }

    pub async fn find_history_cleanup_job(&self) -> EngineResult<Option<Job>> {
        Ok(history_cleanup::find_jobs(self.ctx).await?.into_iter().next())
    }

    // ── Reports ──────────────────────────────────────────────────────────

    pub async fn cleanable_process_instance_report(
        &self,
        query: &CleanableReportQuery,
    ) -> EngineResult<Vec<CleanableDefinitionReport>> {
        history_cleanup::definition_report(self.ctx, self.auth, DefinitionKind::Process, query).await
    }

    pub async fn cleanable_decision_instance_report(
        &self,
        query: &CleanableReportQuery,
    ) -> EngineResult<Vec<CleanableDefinitionReport>> {
        history_cleanup::definition_report(self.ctx, self.auth, DefinitionKind::Decision, query).await
    }

    pub async fn cleanable_case_instance_report(
        &self,
        query: &CleanableReportQuery,
    ) -> EngineResult<Vec<CleanableDefinitionReport>> {
        history_cleanup::definition_report(self.ctx, self.auth, DefinitionKind::Case, query).await
    }

    pub async fn cleanable_batch_report(&self, compact: bool) -> EngineResult<Vec<CleanableBatchReport>> {
        history_cleanup::batch_report(self.ctx, self.auth, compact).await
    }

    // ── Operation log ────────────────────────────────────────────────────

    /// Entries of the user operation log. Requires an admin.
    pub async fn query_operation_log(
        &self,
        query: &UserOperationLogQuery,
    ) -> EngineResult<Vec<UserOperationLogEntry>> {
        self.ctx.authz.check_admin(self.auth)?;
        Ok(self.ctx.db.operation_log().list(query).await?)
    }
}

fn removal_time_operation(
    service: &HistoryService<'_>,
    entity_type: &str,
    update: RemovalTimeUpdate,
    hierarchical: bool,
) -> CreateUserOperation {
    let (mode, removal_time) = match update {
        RemovalTimeUpdate::Absolute(time) => ("ABSOLUTE_REMOVAL_TIME", Some(time.to_rfc3339())),
        RemovalTimeUpdate::Calculated => ("CALCULATED_REMOVAL_TIME", None),
        RemovalTimeUpdate::Cleared => ("CLEARED_REMOVAL_TIME", None),
    };
    service
        .operation(operation_types::SET_REMOVAL_TIME, entity_type)
        .with_change(PropertyChange::new("mode", None, Some(mode.to_string())))
        .with_change(PropertyChange::new("removalTime", None, removal_time))
        .with_change(PropertyChange::new(
            "hierarchical",
            None,
            Some(hierarchical.to_string()),
        ))
}
