use std::sync::Arc;

use async_trait::async_trait;

use super::{BatchConfiguration, batch_id_of, load_configuration};
use crate::{
    engine::EngineContext,
    error::{EngineError, EngineResult},
    jobs::{JobHandler, JobOutcome},
    models::{Job, batch_types},
    removal_time::{self, RemovalTimeUpdate},
    services::history as history_ops,
};

/// The work an execution job performs on its slice of ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    DeleteProcessInstances,
    DeleteDecisionInstances,
    DeleteCaseInstances,
    ProcessSetRemovalTime,
    DecisionSetRemovalTime,
    BatchSetRemovalTime,
}

impl BatchOperation {
    pub const ALL: [BatchOperation; 6] = [
        BatchOperation::DeleteProcessInstances,
        BatchOperation::DeleteDecisionInstances,
        BatchOperation::DeleteCaseInstances,
        BatchOperation::ProcessSetRemovalTime,
        BatchOperation::DecisionSetRemovalTime,
        BatchOperation::BatchSetRemovalTime,
    ];

    pub fn batch_type(&self) -> &'static str {
        match self {
            BatchOperation::DeleteProcessInstances => batch_types::HISTORIC_PROCESS_INSTANCE_DELETION,
            BatchOperation::DeleteDecisionInstances => {
                batch_types::HISTORIC_DECISION_INSTANCE_DELETION
            }
            BatchOperation::DeleteCaseInstances => batch_types::HISTORIC_CASE_INSTANCE_DELETION,
            BatchOperation::ProcessSetRemovalTime => batch_types::PROCESS_SET_REMOVAL_TIME,
            BatchOperation::DecisionSetRemovalTime => batch_types::DECISION_SET_REMOVAL_TIME,
            BatchOperation::BatchSetRemovalTime => batch_types::BATCH_SET_REMOVAL_TIME,
        }
    }

    pub fn from_batch_type(batch_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.batch_type() == batch_type)
    }

    async fn apply(&self, ctx: &EngineContext, configuration: &BatchConfiguration) -> EngineResult<()> {
        let ids = &configuration.ids;
        match self {
            BatchOperation::DeleteProcessInstances => {
                history_ops::remove_process_instances(ctx, ids, configuration.fail_if_not_exists)
                    .await?;
            }
            BatchOperation::DeleteDecisionInstances => {
                history_ops::remove_decision_instances(ctx, ids).await?;
            }
            BatchOperation::DeleteCaseInstances => {
                history_ops::remove_case_instances(ctx, ids, configuration.fail_if_not_exists)
                    .await?;
            }
            BatchOperation::ProcessSetRemovalTime => {
                let update = removal_update(configuration)?;
                for id in ids {
                    removal_time::set_for_process_instance(ctx, id, update, configuration.hierarchical)
                        .await?;
                }
            }
            BatchOperation::DecisionSetRemovalTime => {
                let update = removal_update(configuration)?;
                for id in ids {
                    removal_time::set_for_decision_instance(
                        ctx,
                        id,
                        update,
                        configuration.hierarchical,
                    )
                    .await?;
                }
            }
            BatchOperation::BatchSetRemovalTime => {
                let update = removal_update(configuration)?;
                for id in ids {
                    removal_time::set_for_batch(ctx, id, update).await?;
                }
            }
        }
        Ok(())
    }
}

fn removal_update(configuration: &BatchConfiguration) -> EngineResult<RemovalTimeUpdate> {
    configuration.removal_time.ok_or_else(|| {
        EngineError::InvalidState("Set removal time batch without a removal time mode".to_string())
    })
}

/// Executes the execution jobs of one batch type.
pub struct BatchJobHandler {
    operation: BatchOperation,
}

impl BatchJobHandler {
    pub fn new(operation: BatchOperation) -> Self {
        Self { operation }
    }
}

/// One handler per built-in batch type.
pub fn execution_handlers() -> Vec<Arc<dyn JobHandler>> {
    BatchOperation::ALL
        .into_iter()
        .map(|operation| Arc::new(BatchJobHandler::new(operation)) as Arc<dyn JobHandler>)
        .collect()
}

#[async_trait]
impl JobHandler for BatchJobHandler {
    fn job_type(&self) -> &'static str {
        self.operation.batch_type()
    }

    async fn execute(&self, ctx: &EngineContext, job: &Job) -> EngineResult<JobOutcome> {
        if let Some(batch_id) = batch_id_of(ctx, job).await?
            && let Some(mut batch) = ctx.db.batches().get(&batch_id).await?
            && batch.execution_start_time.is_none()
        {
            batch.execution_start_time = Some(ctx.now());
            ctx.db.batches().update(&batch).await?;
        }

        let Some(configuration_id) = job.handler_configuration.as_deref() else {
            return Ok(JobOutcome::Done);
        };
        let configuration = load_configuration(ctx, configuration_id).await?;
        self.operation.apply(ctx, &configuration).await?;
        ctx.db.byte_arrays().delete(configuration_id).await?;

        tracing::debug!(
            job_id = %job.id,
            batch_type = self.operation.batch_type(),
            ids = configuration.ids.len(),
            "Batch execution job executed"
        );
        Ok(JobOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_from_batch_type() {
        for operation in BatchOperation::ALL {
            assert_eq!(
                BatchOperation::from_batch_type(operation.batch_type()),
                Some(operation)
            );
        }
        assert_eq!(BatchOperation::from_batch_type("migration"), None);
    }
}
