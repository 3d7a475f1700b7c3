//! Records the history that executions leave behind.
//!
//! The engine does not execute processes, decisions or cases itself; the
//! recorder is the write side that produces their historic rows and assigns
//! removal times according to the configured strategy.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::{
    config::RemovalTimeStrategy,
    engine::EngineContext,
    error::{EngineError, EngineResult},
    models::{
        ByteArray, ByteArrayType, CaseInstanceState, Definition, DefinitionKind,
        DecisionValueDirection, HistoricActivityInstance, HistoricCaseInstance,
        HistoricDecisionInstance, HistoricDecisionValue, HistoricIncident, HistoricProcessInstance,
        HistoricTaskInstance, HistoricVariableInstance, ProcessInstanceState, new_id,
    },
    removal_time,
};

/// Serialized values longer than this are stored in a byte array.
const MAX_INLINE_VALUE_LEN: usize = 4000;

/// Input for starting a process instance.
#[derive(Debug, Clone, Default)]
pub struct StartProcessInstance {
    pub process_definition_id: String,
    pub business_key: Option<String>,
    /// Calling instance, for instances started by a call activity.
    pub super_process_instance_id: Option<String>,
    pub start_user_id: Option<String>,
}

impl StartProcessInstance {
    pub fn new(process_definition_id: impl Into<String>) -> Self {
        Self {
            process_definition_id: process_definition_id.into(),
            ..Default::default()
        }
    }

    pub fn called_by(mut self, super_process_instance_id: impl Into<String>) -> Self {
        self.super_process_instance_id = Some(super_process_instance_id.into());
        self
    }
}

/// One decision of an evaluation, with the decisions it required.
#[derive(Debug, Clone, Default)]
pub struct EvaluateDecision {
    pub decision_definition_id: String,
    pub inputs: Vec<(String, JsonValue)>,
    pub outputs: Vec<(String, JsonValue)>,
    pub required: Vec<EvaluateDecision>,
}

impl EvaluateDecision {
    pub fn new(decision_definition_id: impl Into<String>) -> Self {
        Self {
            decision_definition_id: decision_definition_id.into(),
            ..Default::default()
        }
    }

    pub fn input(mut self, clause_id: impl Into<String>, value: JsonValue) -> Self {
        self.inputs.push((clause_id.into(), value));
        self
    }

    pub fn output(mut self, clause_id: impl Into<String>, value: JsonValue) -> Self {
        self.outputs.push((clause_id.into(), value));
        self
    }

    pub fn requires(mut self, decision: EvaluateDecision) -> Self {
        self.required.push(decision);
        self
    }
}

/// Where the rows of one decision evaluation belong.
struct DecisionScope<'s> {
    root_decision_instance_id: &'s str,
    process_instance: Option<&'s HistoricProcessInstance>,
    removal_time: Option<DateTime<Utc>>,
}

pub struct HistoryRecorder<'a> {
    ctx: &'a EngineContext,
}

impl<'a> HistoryRecorder<'a> {
    pub fn new(ctx: &'a EngineContext) -> Self {
        Self { ctx }
    }

    async fn definition(&self, kind: DefinitionKind, id: &str) -> EngineResult<Definition> {
        self.ctx
            .db
            .definitions()
            .get(id)
            .await?
            .filter(|d| d.kind == kind)
            .ok_or_else(|| EngineError::not_found(format!("No {} definition found with id: {}", kind, id)))
    }

    async fn process_instance(&self, id: &str) -> EngineResult<HistoricProcessInstance> {
        self.ctx
            .db
            .process_history()
            .get_process_instance(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("No historic process instance found with id: {}", id)))
    }

    /// Store `value` inline, or in a variable byte array when it is large.
    async fn store_value(
        &self,
        name: &str,
        value: JsonValue,
        byte_array_type: ByteArrayType,
        root_process_instance_id: Option<&str>,
        removal_time: Option<DateTime<Utc>>,
    ) -> EngineResult<(Option<JsonValue>, Option<String>)> {
        let serialized = serde_json::to_vec(&value)?;
        if serialized.len() <= MAX_INLINE_VALUE_LEN {
            return Ok((Some(value), None));
        }
        let byte_array = ByteArray {
            id: new_id(),
            name: Some(name.to_string()),
            bytes: serialized,
            byte_array_type,
            root_process_instance_id: root_process_instance_id.map(str::to_string),
            batch_id: None,
            create_time: self.ctx.now(),
            removal_time,
        };
        self.ctx.db.byte_arrays().insert(&byte_array).await?;
        Ok((None, Some(byte_array.id)))
    }

    // ── Processes ────────────────────────────────────────────────────────

    /// Record the start of a process instance.
    ///
    /// Sub instances join the tree of their caller and share its removal
    /// time. With the `start` strategy a root gets its removal time now.
    pub async fn start_process_instance(
        &self,
        input: StartProcessInstance,
    ) -> EngineResult<HistoricProcessInstance> {
        let definition = self
            .definition(DefinitionKind::Process, &input.process_definition_id)
            .await?;
        let id = new_id();

        let (root_id, inherited_removal) = match &input.super_process_instance_id {
            Some(super_id) => {
                let caller = self.process_instance(super_id).await?;
                (caller.root_process_instance_id, caller.removal_time)
            }
            None => (id.clone(), None),
        };

        let mut instance = HistoricProcessInstance {
            id: id.clone(),
            process_definition_id: definition.id,
            process_definition_key: definition.key,
            deployment_id: Some(definition.deployment_id),
            business_key: input.business_key,
            root_process_instance_id: root_id,
            super_process_instance_id: input.super_process_instance_id,
            state: ProcessInstanceState::Active,
            start_user_id: input.start_user_id,
            start_time: self.ctx.now(),
            end_time: None,
            removal_time: inherited_removal,
        };
        if instance.super_process_instance_id.is_none()
            && self.ctx.config.history.removal_time_strategy == RemovalTimeStrategy::Start
        {
            instance.removal_time = removal_time::for_process(self.ctx, &instance).await?;
        }

        self.ctx
            .db
            .process_history()
            .insert_process_instance(&instance)
            .await?;
        tracing::debug!(process_instance_id = %instance.id, "Process instance started");
        Ok(instance)
    }

    /// Record the end of a process instance.
    ///
    /// Ending a root under the `end` strategy stamps the removal time onto
    /// every row of its tree.
    pub async fn end_process_instance(
        &self,
        id: &str,
        state: ProcessInstanceState,
    ) -> EngineResult<HistoricProcessInstance> {
        if !state.is_finished() {
            return Err(EngineError::bad_request(format!(
                "Cannot end process instance {} in state {}",
                id,
                state.as_str()
            )));
        }
        let mut instance = self.process_instance(id).await?;
        if instance.end_time.is_some() {
            return Err(EngineError::InvalidState(format!(
                "Process instance {} has already ended",
                id
            )));
        }

        let now = self.ctx.now();
        let repo = self.ctx.db.process_history();
        repo.end_process_instance(id, state, now).await?;
        instance.state = state;
        instance.end_time = Some(now);

        let is_root = instance.root_process_instance_id == instance.id;
        if is_root && self.ctx.config.history.removal_time_strategy == RemovalTimeStrategy::End {
            let removal = removal_time::for_process(self.ctx, &instance).await?;
            if removal.is_some() {
                repo.set_removal_time_for_root(&instance.id, removal).await?;
                instance.removal_time = removal;
            }
        }
        tracing::debug!(process_instance_id = %id, state = state.as_str(), "Process instance ended");
        Ok(instance)
    }

    pub async fn record_activity(
        &self,
        process_instance_id: &str,
        activity_id: &str,
        activity_type: &str,
    ) -> EngineResult<HistoricActivityInstance> {
        let instance = self.process_instance(process_instance_id).await?;
        let now = self.ctx.now();
        let activity = HistoricActivityInstance {
            id: new_id(),
            process_instance_id: instance.id,
            root_process_instance_id: instance.root_process_instance_id,
            activity_id: activity_id.to_string(),
            activity_type: activity_type.to_string(),
            start_time: now,
            end_time: Some(now),
            removal_time: instance.removal_time,
        };
        self.ctx
            .db
            .process_history()
            .insert_activity_instance(&activity)
            .await?;
        Ok(activity)
    }

    pub async fn create_task(
        &self,
        process_instance_id: &str,
        name: Option<&str>,
        assignee: Option<&str>,
    ) -> EngineResult<HistoricTaskInstance> {
        let instance = self.process_instance(process_instance_id).await?;
        let task = HistoricTaskInstance {
            id: new_id(),
            process_instance_id: instance.id,
            root_process_instance_id: instance.root_process_instance_id,
            name: name.map(str::to_string),
            assignee: assignee.map(str::to_string),
            start_time: self.ctx.now(),
            end_time: None,
            removal_time: instance.removal_time,
        };
        self.ctx
            .db
            .process_history()
            .insert_task_instance(&task)
            .await?;
        Ok(task)
    }

    /// Record a variable. Large values go to a byte array.
    pub async fn set_variable(
        &self,
        process_instance_id: &str,
        name: &str,
        value: JsonValue,
    ) -> EngineResult<HistoricVariableInstance> {
        let instance = self.process_instance(process_instance_id).await?;
        let (value, byte_array_id) = self
            .store_value(
                name,
                value,
                ByteArrayType::Variable,
                Some(&instance.root_process_instance_id),
                instance.removal_time,
            )
            .await?;
        let variable = HistoricVariableInstance {
            id: new_id(),
            process_instance_id: instance.id,
            root_process_instance_id: instance.root_process_instance_id,
            name: name.to_string(),
            value,
            byte_array_id,
            create_time: self.ctx.now(),
            removal_time: instance.removal_time,
        };
        self.ctx.db.process_history().insert_variable(&variable).await?;
        Ok(variable)
    }

    pub async fn record_incident(
        &self,
        process_instance_id: &str,
        incident_type: &str,
        message: Option<&str>,
    ) -> EngineResult<HistoricIncident> {
        let instance = self.process_instance(process_instance_id).await?;
        let incident = HistoricIncident {
            id: new_id(),
            incident_type: incident_type.to_string(),
            message: message.map(str::to_string),
            configuration: None,
            job_definition_id: None,
            process_instance_id: Some(instance.id),
            root_process_instance_id: Some(instance.root_process_instance_id),
            batch_id: None,
            create_time: self.ctx.now(),
            end_time: None,
            removal_time: instance.removal_time,
        };
        self.ctx.db.process_history().insert_incident(&incident).await?;
        Ok(incident)
    }

    // ── Decisions ────────────────────────────────────────────────────────

    /// Record a decision evaluation, standalone or inside a process.
    ///
    /// Returns the recorded instances, the evaluated decision first. Inside a
    /// process every instance shares the process tree's removal time;
    /// standalone evaluations measure from the evaluation time of the root.
    pub async fn evaluate_decision(
        &self,
        decision: EvaluateDecision,
        process_instance_id: Option<&str>,
    ) -> EngineResult<Vec<HistoricDecisionInstance>> {
        let process_instance = match process_instance_id {
            Some(id) => Some(self.process_instance(id).await?),
            None => None,
        };
        let definition = self
            .definition(DefinitionKind::Decision, &decision.decision_definition_id)
            .await?;

        let mut root = HistoricDecisionInstance {
            id: new_id(),
            decision_definition_id: definition.id.clone(),
            decision_definition_key: definition.key.clone(),
            process_instance_id: process_instance.as_ref().map(|p| p.id.clone()),
            root_process_instance_id: process_instance
                .as_ref()
                .map(|p| p.root_process_instance_id.clone()),
            root_decision_instance_id: None,
            evaluation_time: self.ctx.now(),
            removal_time: None,
        };
        root.removal_time = match &process_instance {
            Some(instance) => instance.removal_time,
            None => removal_time::for_decision(self.ctx, &root).await?,
        };

        let root_id = root.id.clone();
        let scope = DecisionScope {
            root_decision_instance_id: &root_id,
            process_instance: process_instance.as_ref(),
            removal_time: root.removal_time,
        };

        let mut recorded = Vec::new();
        self.insert_decision(root, &decision, &scope).await?;
        recorded.push(root_id.clone());

        let mut pending: Vec<EvaluateDecision> = decision.required;
        while let Some(required) = pending.pop() {
            let definition = self
                .definition(DefinitionKind::Decision, &required.decision_definition_id)
                .await?;
            let instance = HistoricDecisionInstance {
                id: new_id(),
                decision_definition_id: definition.id,
                decision_definition_key: definition.key,
                process_instance_id: scope.process_instance.map(|p| p.id.clone()),
                root_process_instance_id: scope
                    .process_instance
                    .map(|p| p.root_process_instance_id.clone()),
                root_decision_instance_id: Some(root_id.clone()),
                evaluation_time: self.ctx.now(),
                removal_time: scope.removal_time,
            };
            recorded.push(instance.id.clone());
            self.insert_decision(instance, &required, &scope).await?;
            pending.extend(required.required);
        }

        let repo = self.ctx.db.decision_history();
        let mut instances = Vec::with_capacity(recorded.len());
        for id in recorded {
            if let Some(instance) = repo.get_decision_instance(&id).await? {
                instances.push(instance);
            }
        }
        tracing::debug!(
            root_decision_instance_id = %root_id,
            decisions = instances.len(),
            "Decision evaluated"
        );
        Ok(instances)
    }

    async fn insert_decision(
        &self,
        mut instance: HistoricDecisionInstance,
        decision: &EvaluateDecision,
        scope: &DecisionScope<'_>,
    ) -> EngineResult<()> {
        if instance.id != scope.root_decision_instance_id {
            instance.root_decision_instance_id = Some(scope.root_decision_instance_id.to_string());
        }
        let repo = self.ctx.db.decision_history();
        repo.insert_decision_instance(&instance).await?;

        let values = decision
            .inputs
            .iter()
            .map(|value| (DecisionValueDirection::Input, value))
            .chain(
                decision
                    .outputs
                    .iter()
                    .map(|value| (DecisionValueDirection::Output, value)),
            );
        for (direction, (clause_id, value)) in values {
            let (value, byte_array_id) = self
                .store_value(
                    clause_id,
                    value.clone(),
                    ByteArrayType::DecisionValue,
                    instance.root_process_instance_id.as_deref(),
                    scope.removal_time,
                )
                .await?;
            repo.insert_decision_value(&HistoricDecisionValue {
                id: new_id(),
                decision_instance_id: instance.id.clone(),
                direction,
                clause_id: clause_id.clone(),
                value,
                byte_array_id,
                root_process_instance_id: instance.root_process_instance_id.clone(),
                removal_time: scope.removal_time,
            })
            .await?;
        }
        Ok(())
    }

    // ── Cases ────────────────────────────────────────────────────────────

    pub async fn create_case_instance(&self, case_definition_id: &str) -> EngineResult<HistoricCaseInstance> {
        let definition = self
            .definition(DefinitionKind::Case, case_definition_id)
            .await?;
        let now = self.ctx.now();
        let removal_time = match self.ctx.config.history.removal_time_strategy {
            RemovalTimeStrategy::Start => {
                removal_time::add_days(Some(now), definition.history_time_to_live)
            }
            _ => None,
        };
        let instance = HistoricCaseInstance {
            id: new_id(),
            case_definition_id: definition.id,
            case_definition_key: definition.key,
            state: CaseInstanceState::Active,
            create_time: now,
            close_time: None,
            removal_time,
        };
        self.ctx.db.case_history().insert_case_instance(&instance).await?;
        Ok(instance)
    }

    /// Close a case instance. Under the `end` strategy it gets its removal
    /// time now.
    pub async fn close_case_instance(&self, id: &str) -> EngineResult<HistoricCaseInstance> {
        let repo = self.ctx.db.case_history();
        let mut instance = repo.get_case_instance(id).await?.ok_or_else(|| {
            EngineError::not_found(format!("No historic case instance found with id: {}", id))
        })?;
        if instance.state == CaseInstanceState::Closed {
            return Ok(instance);
        }

        let now = self.ctx.now();
        repo.update_state(id, CaseInstanceState::Closed, Some(now)).await?;
        instance.state = CaseInstanceState::Closed;
        instance.close_time = Some(now);

        if self.ctx.config.history.removal_time_strategy == RemovalTimeStrategy::End {
            let ttl = self
                .definition(DefinitionKind::Case, &instance.case_definition_id)
                .await?
                .history_time_to_live;
            instance.removal_time = removal_time::add_days(Some(now), ttl);
            repo.set_removal_time(id, instance.removal_time).await?;
        }
        Ok(instance)
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::{
        clock::MockClock,
        config::EngineConfig,
        db::tests::harness::create_test_db,
        models::{CreateDefinition, HistoricDecisionInstanceQuery},
    };

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
    }

    async fn context(strategy: RemovalTimeStrategy) -> (EngineContext, Arc<MockClock>) {
        let clock = MockClock::at(start());
        let mut config = EngineConfig::default();
        config.history.removal_time_strategy = strategy;
        let ctx = EngineContext::new(config, create_test_db().await, clock.clone()).unwrap();
        (ctx, clock)
    }

    async fn deploy(ctx: &EngineContext, kind: DefinitionKind, key: &str, ttl: i32) -> Definition {
        ctx.db
            .definitions()
            .create(CreateDefinition::new(kind, key, "deployment-1").with_history_time_to_live(ttl))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_end_strategy_stamps_tree_when_root_ends() {
        let (ctx, clock) = context(RemovalTimeStrategy::End).await;
        let process = deploy(&ctx, DefinitionKind::Process, "order", 5).await;
        let recorder = HistoryRecorder::new(&ctx);

        let root = recorder
            .start_process_instance(StartProcessInstance::new(&process.id))
            .await
            .unwrap();
        let child = recorder
            .start_process_instance(StartProcessInstance::new(&process.id).called_by(&root.id))
            .await
            .unwrap();
        assert_eq!(child.root_process_instance_id, root.id);
        assert_eq!(root.removal_time, None);

        recorder.set_variable(&child.id, "amount", json!(42)).await.unwrap();
        recorder.create_task(&child.id, Some("approve"), None).await.unwrap();

        clock.advance(Duration::hours(2));
        recorder
            .end_process_instance(&child.id, ProcessInstanceState::Completed)
            .await
            .unwrap();
        let child_row = ctx.db.process_history().get_process_instance(&child.id).await.unwrap().unwrap();
        assert_eq!(child_row.removal_time, None);

        let ended = recorder
            .end_process_instance(&root.id, ProcessInstanceState::Completed)
            .await
            .unwrap();
        let expected = Some(start() + Duration::hours(2) + Duration::days(5));
        assert_eq!(ended.removal_time, expected);

        let history = ctx.db.process_history();
        assert_eq!(history.get_process_instance(&child.id).await.unwrap().unwrap().removal_time, expected);
        for variable in history.list_variables(&child.id).await.unwrap() {
            assert_eq!(variable.removal_time, expected);
        }
        for task in history.list_task_instances(&child.id).await.unwrap() {
            assert_eq!(task.removal_time, expected);
        }
    }

    #[tokio::test]
    async fn test_start_strategy_assigns_removal_time_at_start() {
        let (ctx, _clock) = context(RemovalTimeStrategy::Start).await;
        let process = deploy(&ctx, DefinitionKind::Process, "order", 3).await;
        let recorder = HistoryRecorder::new(&ctx);

        let root = recorder
            .start_process_instance(StartProcessInstance::new(&process.id))
            .await
            .unwrap();
        assert_eq!(root.removal_time, Some(start() + Duration::days(3)));

        let activity = recorder.record_activity(&root.id, "task-1", "userTask").await.unwrap();
        assert_eq!(activity.removal_time, root.removal_time);
    }

    #[tokio::test]
    async fn test_ending_twice_is_rejected() {
        let (ctx, _clock) = context(RemovalTimeStrategy::End).await;
        let process = deploy(&ctx, DefinitionKind::Process, "order", 3).await;
        let recorder = HistoryRecorder::new(&ctx);
        let root = recorder
            .start_process_instance(StartProcessInstance::new(&process.id))
            .await
            .unwrap();

        recorder
            .end_process_instance(&root.id, ProcessInstanceState::Completed)
            .await
            .unwrap();
        let err = recorder
            .end_process_instance(&root.id, ProcessInstanceState::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        let err = recorder
            .end_process_instance(&root.id, ProcessInstanceState::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadUserRequest(_)));
    }

    #[tokio::test]
    async fn test_large_variable_goes_to_byte_array() {
        let (ctx, _clock) = context(RemovalTimeStrategy::End).await;
        let process = deploy(&ctx, DefinitionKind::Process, "order", 3).await;
        let recorder = HistoryRecorder::new(&ctx);
        let root = recorder
            .start_process_instance(StartProcessInstance::new(&process.id))
            .await
            .unwrap();

        let small = recorder.set_variable(&root.id, "small", json!("x")).await.unwrap();
        assert!(small.byte_array_id.is_none());

        let large = recorder
            .set_variable(&root.id, "large", json!("x".repeat(MAX_INLINE_VALUE_LEN + 1)))
            .await
            .unwrap();
        assert!(large.value.is_none());
        let byte_array = ctx
            .db
            .byte_arrays()
            .get(large.byte_array_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(byte_array.byte_array_type, ByteArrayType::Variable);
        assert_eq!(byte_array.root_process_instance_id.as_deref(), Some(root.id.as_str()));
    }

    #[tokio::test]
    async fn test_standalone_decision_with_required_decisions() {
        let (ctx, _clock) = context(RemovalTimeStrategy::End).await;
        let dish = deploy(&ctx, DefinitionKind::Decision, "dish", 10).await;
        let season = deploy(&ctx, DefinitionKind::Decision, "season", 1).await;
        let recorder = HistoryRecorder::new(&ctx);

        let instances = recorder
            .evaluate_decision(
                EvaluateDecision::new(&dish.id)
                    .input("guests", json!(4))
                    .output("dish", json!("stew"))
                    .requires(EvaluateDecision::new(&season.id).output("season", json!("winter"))),
                None,
            )
            .await
            .unwrap();

        assert_eq!(instances.len(), 2);
        let root = &instances[0];
        assert_eq!(root.root_decision_instance_id, None);
        assert_eq!(root.removal_time, Some(start() + Duration::days(10)));
        let required = &instances[1];
        assert_eq!(required.root_decision_instance_id.as_deref(), Some(root.id.as_str()));
        assert_eq!(required.removal_time, root.removal_time);

        let values = ctx.db.decision_history().list_decision_values(&root.id).await.unwrap();
        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|v| v.removal_time == root.removal_time));
    }

    #[tokio::test]
    async fn test_decision_inside_process_follows_process_tree() {
        let (ctx, clock) = context(RemovalTimeStrategy::End).await;
        let process = deploy(&ctx, DefinitionKind::Process, "order", 5).await;
        let dish = deploy(&ctx, DefinitionKind::Decision, "dish", 10).await;
        let recorder = HistoryRecorder::new(&ctx);

        let root = recorder
            .start_process_instance(StartProcessInstance::new(&process.id))
            .await
            .unwrap();
        let instances = recorder
            .evaluate_decision(EvaluateDecision::new(&dish.id), Some(&root.id))
            .await
            .unwrap();
        assert_eq!(instances[0].removal_time, None);
        assert_eq!(instances[0].root_process_instance_id.as_deref(), Some(root.id.as_str()));

        clock.advance(Duration::hours(1));
        recorder
            .end_process_instance(&root.id, ProcessInstanceState::Completed)
            .await
            .unwrap();

        let decisions = ctx
            .db
            .decision_history()
            .list_decision_instances(&HistoricDecisionInstanceQuery::default())
            .await
            .unwrap();
        assert_eq!(
            decisions[0].removal_time,
            Some(start() + Duration::hours(1) + Duration::days(5))
        );
    }

    #[tokio::test]
    async fn test_case_removal_time_on_close() {
        let (ctx, clock) = context(RemovalTimeStrategy::End).await;
        let case = deploy(&ctx, DefinitionKind::Case, "claim", 7).await;
        let recorder = HistoryRecorder::new(&ctx);

        let instance = recorder.create_case_instance(&case.id).await.unwrap();
        assert_eq!(instance.removal_time, None);

        clock.advance(Duration::days(1));
        let closed = recorder.close_case_instance(&instance.id).await.unwrap();
        assert_eq!(closed.state, CaseInstanceState::Closed);
        assert_eq!(closed.removal_time, Some(start() + Duration::days(8)));

        let err = recorder.create_case_instance("missing").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
