//! Cleanable history reports: how much finished history each definition or
//! batch type holds and how much of it is already due for removal.

use std::collections::HashMap;

use crate::{
    db::{CleanupCriteria, LAST_MINUTE},
    engine::EngineContext,
    error::EngineResult,
    models::{
        ANY_RESOURCE_ID, Authentication, CleanableBatchReport, CleanableCounts,
        CleanableDefinitionReport, CleanableReportQuery, DefinitionKind, Permission, Resource,
    },
    authz::PermissionCheck,
};

fn report_criteria(ctx: &EngineContext) -> CleanupCriteria {
    CleanupCriteria {
        strategy: ctx.config.history_cleanup.strategy,
        now: ctx.now(),
        minute_from: 0,
        minute_to: LAST_MINUTE,
        batch_size: i64::MAX,
    }
}

/// One row per deployed definition of `kind`, restricted to the
/// definitions the caller may read the history of.
pub async fn definition_report(
    ctx: &EngineContext,
    auth: Option<&Authentication>,
    kind: DefinitionKind,
    query: &CleanableReportQuery,
) -> EngineResult<Vec<CleanableDefinitionReport>> {
    let criteria = report_criteria(ctx);
    let counts = match kind {
        DefinitionKind::Process => ctx.db.process_history().cleanable_counts(&criteria).await?,
        DefinitionKind::Decision => ctx.db.decision_history().cleanable_counts(&criteria).await?,
        DefinitionKind::Case => ctx.db.case_history().cleanable_counts(&criteria).await?,
    };
    let counts: HashMap<String, CleanableCounts> = counts.into_iter().collect();
    let resource = kind.resource();

    let mut report = Vec::new();
    for definition in ctx.db.definitions().list(kind).await? {
        if let Some(ids) = &query.definition_ids
            && !ids.contains(&definition.id)
        {
            continue;
        }
        if let Some(keys) = &query.definition_keys
            && !keys.contains(&definition.key)
        {
            continue;
        }

        let CleanableCounts {
            finished,
            cleanable,
        } = counts.get(&definition.id).cloned().unwrap_or_default();
        if query.compact && finished == 0 && cleanable == 0 {
            continue;
        }
        if !ctx
            .authz
            .can_read_definition_report(auth, resource, &definition.key)
            .await?
        {
            continue;
        }

        report.push(CleanableDefinitionReport {
            definition_id: definition.id,
            definition_key: definition.key,
            definition_name: definition.name,
            definition_version: definition.version,
            history_time_to_live: definition.history_time_to_live,
            finished_count: finished,
            cleanable_count: cleanable,
        });
    }
    Ok(report)
}

/// One row per batch type with finished history.
pub async fn batch_report(
    ctx: &EngineContext,
    auth: Option<&Authentication>,
    compact: bool,
) -> EngineResult<Vec<CleanableBatchReport>> {
    ctx.authz
        .check(
            auth,
            PermissionCheck::new(Permission::ReadHistory, Resource::Batch, ANY_RESOURCE_ID),
        )
        .await?;

    let criteria = report_criteria(ctx);
    let mut report: Vec<CleanableBatchReport> = ctx
        .db
        .batches()
        .cleanable_counts(&criteria, &ctx.batch_ttl)
        .await?
        .into_iter()
        .filter(|(_, counts)| !compact || counts.finished > 0 || counts.cleanable > 0)
        .map(|(batch_type, counts)| CleanableBatchReport {
            history_time_to_live: ctx.batch_ttl.for_type(&batch_type),
            batch_type,
            finished_count: counts.finished,
            cleanable_count: counts.cleanable,
        })
        .collect();
    report.sort_by(|a, b| a.batch_type.cmp(&b.batch_type));
    Ok(report)
}
