use super::monitor::complete_batch;
use crate::{
    authz::PermissionCheck,
    engine::EngineContext,
    error::{EngineError, EngineResult},
    models::{
        Authentication, Batch, BatchStatistics, CreateUserOperation, HistoricBatch, JobQuery,
        OperationCategory, Permission, PropertyChange, Resource, entity_types, operation_types,
    },
};

fn batch_check(permission: Permission, batch_id: &str) -> PermissionCheck {
    PermissionCheck::new(permission, Resource::Batch, batch_id)
}

async fn find_batch(ctx: &EngineContext, batch_id: &str) -> EngineResult<Batch> {
    ctx.db
        .batches()
        .get(batch_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("Batch for id '{}' cannot be found", batch_id)))
}

pub async fn get_batch(
    ctx: &EngineContext,
    auth: Option<&Authentication>,
    batch_id: &str,
) -> EngineResult<Batch> {
    let batch = find_batch(ctx, batch_id).await?;
    ctx.authz
        .check(auth, batch_check(Permission::Read, batch_id))
        .await?;
    Ok(batch)
}

/// Running batches the caller may read.
pub async fn list_batches(
    ctx: &EngineContext,
    auth: Option<&Authentication>,
) -> EngineResult<Vec<Batch>> {
    let mut visible = Vec::new();
    for batch in ctx.db.batches().list().await? {
        if ctx
            .authz
            .is_granted_any(auth, &[batch_check(Permission::Read, &batch.id)])
            .await?
        {
            visible.push(batch);
        }
    }
    Ok(visible)
}

async fn statistics_of(ctx: &EngineContext, batch: Batch) -> EngineResult<BatchStatistics> {
    let (pending, failed) = match batch.batch_job_definition_id.as_deref() {
        Some(definition_id) => {
            let jobs = ctx.db.jobs();
            let pending = jobs.count(&JobQuery::by_definition(definition_id)).await?;
            let failed = jobs
                .count(&JobQuery {
                    no_retries_left: true,
                    ..JobQuery::by_definition(definition_id)
                })
                .await?;
            (pending, failed)
        }
        None => (0, 0),
    };
    let completed = (batch.jobs_created - pending).max(0);
    Ok(BatchStatistics {
        remaining_jobs: (batch.total_jobs - completed).max(0),
        completed_jobs: completed,
        failed_jobs: failed,
        batch,
    })
}

pub async fn batch_statistics(
    ctx: &EngineContext,
    auth: Option<&Authentication>,
    batch_id: &str,
) -> EngineResult<BatchStatistics> {
    let batch = get_batch(ctx, auth, batch_id).await?;
    statistics_of(ctx, batch).await
}

pub async fn list_batch_statistics(
    ctx: &EngineContext,
    auth: Option<&Authentication>,
) -> EngineResult<Vec<BatchStatistics>> {
    let mut statistics = Vec::new();
    for batch in list_batches(ctx, auth).await? {
        statistics.push(statistics_of(ctx, batch).await?);
    }
    Ok(statistics)
}

/// Suspend or activate a batch together with its job definitions and jobs.
pub async fn set_batch_suspended(
    ctx: &EngineContext,
    auth: Option<&Authentication>,
    batch_id: &str,
    suspended: bool,
) -> EngineResult<()> {
    let mut batch = find_batch(ctx, batch_id).await?;
    ctx.authz
        .check(auth, batch_check(Permission::Update, batch_id))
        .await?;
    if batch.suspended == suspended {
        return Ok(());
    }

    let jobs = ctx.db.jobs();
    let definitions = [
        batch.seed_job_definition_id.as_deref(),
        batch.monitor_job_definition_id.as_deref(),
        batch.batch_job_definition_id.as_deref(),
    ];
    for definition_id in definitions.into_iter().flatten() {
        jobs.set_definition_suspended(definition_id, suspended).await?;
        for mut job in jobs.list(&JobQuery::by_definition(definition_id)).await? {
            job.suspended = suspended;
            jobs.update(&job).await?;
        }
    }
    batch.suspended = suspended;
    ctx.db.batches().update(&batch).await?;

    let (operation, state) = if suspended {
        (operation_types::SUSPEND_BATCH, "suspended")
    } else {
        (operation_types::ACTIVATE_BATCH, "active")
    };
    ctx.log_operation(
        CreateUserOperation::new(
            operation,
            entity_types::BATCH,
            OperationCategory::Operator,
            auth.map(|a| a.user_id.clone()),
        )
        .with_batch(batch_id)
        .with_change(PropertyChange::new(
            "suspensionState",
            None,
            Some(state.to_string()),
        )),
    )
    .await?;

    tracing::info!(batch_id, suspended, "Batch suspension state changed");
    Ok(())
}

/// Delete a running batch. Without `cascade` its history is kept and
/// completed; with it the historic batch and its logs are removed too.
pub async fn delete_batch(
    ctx: &EngineContext,
    auth: Option<&Authentication>,
    batch_id: &str,
    cascade: bool,
) -> EngineResult<()> {
    let batch = find_batch(ctx, batch_id).await?;
    ctx.authz
        .check(auth, batch_check(Permission::Delete, batch_id))
        .await?;

    complete_batch(ctx, &batch, cascade, None).await?;

    ctx.log_operation(
        CreateUserOperation::new(
            operation_types::DELETE,
            entity_types::BATCH,
            OperationCategory::Operator,
            auth.map(|a| a.user_id.clone()),
        )
        .with_batch(batch_id)
        .with_change(PropertyChange::new(
            "cascadeToHistory",
            None,
            Some(cascade.to_string()),
        )),
    )
    .await?;
    Ok(())
}

pub async fn get_historic_batch(
    ctx: &EngineContext,
    auth: Option<&Authentication>,
    batch_id: &str,
) -> EngineResult<HistoricBatch> {
    let batch = ctx.db.batches().get_historic(batch_id).await?.ok_or_else(|| {
        EngineError::not_found(format!("Historic batch for id '{}' cannot be found", batch_id))
    })?;
    ctx.authz
        .check(auth, batch_check(Permission::ReadHistory, batch_id))
        .await?;
    Ok(batch)
}

pub async fn list_historic_batches(
    ctx: &EngineContext,
    auth: Option<&Authentication>,
) -> EngineResult<Vec<HistoricBatch>> {
    let mut visible = Vec::new();
    for batch in ctx.db.batches().list_historic().await? {
        if ctx
            .authz
            .is_granted_any(auth, &[batch_check(Permission::ReadHistory, &batch.id)])
            .await?
        {
            visible.push(batch);
        }
    }
    Ok(visible)
}
