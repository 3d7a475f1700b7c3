//! Removal time calculation and propagation.
//!
//! The removal time of historic data is the moment from which history
//! cleanup may delete it. It is computed from a base time (the start or end
//! of the top-most instance, depending on the strategy) plus the time to live
//! of the definition, and copied onto every row that instance produced.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::RemovalTimeStrategy,
    engine::EngineContext,
    error::EngineResult,
    models::{HistoricBatch, HistoricDecisionInstance, HistoricProcessInstance},
};

/// How a set-removal-time operation picks the new removal time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "removalTime", rename_all = "camelCase")]
pub enum RemovalTimeUpdate {
    /// The same fixed time for every instance.
    Absolute(DateTime<Utc>),
    /// Recomputed from the configured strategy and TTLs.
    Calculated,
    /// No removal time; cleanup will not pick the data up.
    Cleared,
}

/// `base + ttl` days, when both are known.
pub fn add_days(base: Option<DateTime<Utc>>, ttl_days: Option<i32>) -> Option<DateTime<Utc>> {
    Some(base? + Duration::days(i64::from(ttl_days?)))
}

/// The instant the strategy measures from.
fn base_time(
    strategy: RemovalTimeStrategy,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match strategy {
        RemovalTimeStrategy::Start => Some(start),
        RemovalTimeStrategy::End => end,
        RemovalTimeStrategy::None => None,
    }
}

async fn definition_ttl(ctx: &EngineContext, definition_id: &str) -> EngineResult<Option<i32>> {
    Ok(ctx
        .db
        .definitions()
        .get(definition_id)
        .await?
        .and_then(|definition| definition.history_time_to_live))
}

/// Removal time of a process instance tree, derived from its root.
pub async fn for_process(
    ctx: &EngineContext,
    root: &HistoricProcessInstance,
) -> EngineResult<Option<DateTime<Utc>>> {
    let strategy = ctx.config.history.removal_time_strategy;
    let Some(base) = base_time(strategy, root.start_time, root.end_time) else {
        return Ok(None);
    };
    let ttl = definition_ttl(ctx, &root.process_definition_id).await?;
    Ok(add_days(Some(base), ttl))
}

/// Removal time of a standalone decision evaluation.
pub async fn for_decision(
    ctx: &EngineContext,
    instance: &HistoricDecisionInstance,
) -> EngineResult<Option<DateTime<Utc>>> {
    if ctx.config.history.removal_time_strategy == RemovalTimeStrategy::None {
        return Ok(None);
    }
    let ttl = definition_ttl(ctx, &instance.decision_definition_id).await?;
    Ok(add_days(Some(instance.evaluation_time), ttl))
}

pub fn for_batch(ctx: &EngineContext, batch: &HistoricBatch) -> Option<DateTime<Utc>> {
    let strategy = ctx.config.history.removal_time_strategy;
    let base = base_time(strategy, batch.start_time, batch.end_time);
    add_days(base, ctx.batch_ttl.for_type(&batch.batch_type))
}

/// Apply a removal time update to one historic process instance.
///
/// With `hierarchical` the whole tree under the instance's root receives the
/// root's removal time; otherwise only the instance and its own rows change.
/// Returns false when the instance does not exist.
pub async fn set_for_process_instance(
    ctx: &EngineContext,
    process_instance_id: &str,
    update: RemovalTimeUpdate,
    hierarchical: bool,
) -> EngineResult<bool> {
    let repo = ctx.db.process_history();
    let Some(instance) = repo.get_process_instance(process_instance_id).await? else {
        return Ok(false);
    };

    if hierarchical {
        let root = if instance.root_process_instance_id == instance.id {
            instance
        } else {
            match repo.get_process_instance(&instance.root_process_instance_id).await? {
                Some(root) => root,
                None => instance,
            }
        };
        let removal_time = resolve(update, || for_process(ctx, &root)).await?;
        repo.set_removal_time_for_root(&root.root_process_instance_id, removal_time)
            .await?;
    } else {
        let removal_time = resolve(update, || for_process(ctx, &instance)).await?;
        repo.set_removal_time_for_instance(&instance.id, removal_time)
            .await?;
    }
    Ok(true)
}

/// Apply a removal time update to one historic decision instance.
///
/// With `hierarchical` the update applies to the root decision instance and
/// every decision it required.
pub async fn set_for_decision_instance(
    ctx: &EngineContext,
    decision_instance_id: &str,
    update: RemovalTimeUpdate,
    hierarchical: bool,
) -> EngineResult<bool> {
    let repo = ctx.db.decision_history();
    let Some(instance) = repo.get_decision_instance(decision_instance_id).await? else {
        return Ok(false);
    };

    let root_id = instance
        .root_decision_instance_id
        .clone()
        .unwrap_or_else(|| instance.id.clone());
    if hierarchical && root_id != instance.id {
        let root = repo.get_decision_instance(&root_id).await?.unwrap_or(instance);
        let removal_time = resolve(update, || for_decision(ctx, &root)).await?;
        repo.set_removal_time_for_root(&root_id, removal_time).await?;
    } else if hierarchical {
        let removal_time = resolve(update, || for_decision(ctx, &instance)).await?;
        repo.set_removal_time_for_root(&instance.id, removal_time).await?;
    } else {
        let removal_time = resolve(update, || for_decision(ctx, &instance)).await?;
        repo.set_removal_time_for_instance(&instance.id, removal_time)
            .await?;
    }
    Ok(true)
}

/// Apply a removal time update to a historic batch and its logs.
pub async fn set_for_batch(
    ctx: &EngineContext,
    batch_id: &str,
    update: RemovalTimeUpdate,
) -> EngineResult<bool> {
    let repo = ctx.db.batches();
    let Some(batch) = repo.get_historic(batch_id).await? else {
        return Ok(false);
    };
    let removal_time = match update {
        RemovalTimeUpdate::Absolute(time) => Some(time),
        RemovalTimeUpdate::Cleared => None,
        RemovalTimeUpdate::Calculated => for_batch(ctx, &batch),
    };
    repo.set_removal_time(&batch.id, removal_time).await?;
    Ok(true)
}

async fn resolve<F, Fut>(update: RemovalTimeUpdate, calculate: F) -> EngineResult<Option<DateTime<Utc>>>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = EngineResult<Option<DateTime<Utc>>>>,
{
    match update {
        RemovalTimeUpdate::Absolute(time) => Ok(Some(time)),
        RemovalTimeUpdate::Cleared => Ok(None),
        RemovalTimeUpdate::Calculated => calculate().await,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 10, 0, 0).unwrap()
    }

    #[rstest]
    #[case(Some(at(1)), Some(5), Some(at(6)))]
    #[case(Some(at(1)), Some(0), Some(at(1)))]
    #[case(Some(at(1)), None, None)]
    #[case(None, Some(5), None)]
    fn test_add_days(
        #[case] base: Option<DateTime<Utc>>,
        #[case] ttl: Option<i32>,
        #[case] expected: Option<DateTime<Utc>>,
    ) {
        assert_eq!(add_days(base, ttl), expected);
    }

    #[rstest]
    #[case(RemovalTimeStrategy::Start, Some(at(2)), Some(at(1)))]
    #[case(RemovalTimeStrategy::End, Some(at(2)), Some(at(2)))]
    #[case(RemovalTimeStrategy::End, None, None)]
    #[case(RemovalTimeStrategy::None, Some(at(2)), None)]
    fn test_base_time(
        #[case] strategy: RemovalTimeStrategy,
        #[case] end: Option<DateTime<Utc>>,
        #[case] expected: Option<DateTime<Utc>>,
    ) {
        assert_eq!(base_time(strategy, at(1), end), expected);
    }

    #[test]
    fn test_update_serialization() {
        let json = serde_json::to_string(&RemovalTimeUpdate::Absolute(at(1))).unwrap();
        assert_eq!(json, r#"{"mode":"absolute","removalTime":"2024-01-01T10:00:00Z"}"#);
        let cleared: RemovalTimeUpdate = serde_json::from_str(r#"{"mode":"cleared"}"#).unwrap();
        assert_eq!(cleared, RemovalTimeUpdate::Cleared);
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod db_tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        clock::MockClock,
        config::EngineConfig,
        db::tests::harness::create_test_db,
        models::{
            CreateDefinition, DefinitionKind, HistoricActivityInstance, ProcessInstanceState,
        },
    };

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 10, 0, 0).unwrap()
    }

    async fn context(strategy: RemovalTimeStrategy) -> EngineContext {
        let mut config = EngineConfig::default();
        config.history.removal_time_strategy = strategy;
        EngineContext::new(config, create_test_db().await, MockClock::at(at(20))).unwrap()
    }

    async fn process_tree(ctx: &EngineContext) -> (HistoricProcessInstance, HistoricProcessInstance) {
        let definition = ctx
            .db
            .definitions()
            .create(CreateDefinition::new(DefinitionKind::Process, "order", "d1").with_history_time_to_live(5))
            .await
            .unwrap();
        let root = HistoricProcessInstance {
            id: "root".to_string(),
            process_definition_id: definition.id.clone(),
            process_definition_key: definition.key.clone(),
            deployment_id: None,
            business_key: None,
            root_process_instance_id: "root".to_string(),
            super_process_instance_id: None,
            state: ProcessInstanceState::Completed,
            start_user_id: None,
            start_time: at(1),
            end_time: Some(at(2)),
            removal_time: None,
        };
        let child = HistoricProcessInstance {
            id: "child".to_string(),
            super_process_instance_id: Some("root".to_string()),
            start_time: at(1),
            end_time: Some(at(1)),
            ..root.clone()
        };
        let repo = ctx.db.process_history();
        repo.insert_process_instance(&root).await.unwrap();
        repo.insert_process_instance(&child).await.unwrap();
        repo.insert_activity_instance(&HistoricActivityInstance {
            id: "activity".to_string(),
            process_instance_id: "child".to_string(),
            root_process_instance_id: "root".to_string(),
            activity_id: "task".to_string(),
            activity_type: "userTask".to_string(),
            start_time: at(1),
            end_time: Some(at(1)),
            removal_time: None,
        })
        .await
        .unwrap();
        (root, child)
    }

    async fn removal_time_of(ctx: &EngineContext, id: &str) -> Option<DateTime<Utc>> {
        ctx.db
            .process_history()
            .get_process_instance(id)
            .await
            .unwrap()
            .unwrap()
            .removal_time
    }

    #[tokio::test]
    async fn test_calculated_uses_root_end_and_definition_ttl() {
        let ctx = context(RemovalTimeStrategy::End).await;
        let (root, _) = process_tree(&ctx).await;
        assert_eq!(for_process(&ctx, &root).await.unwrap(), Some(at(7)));
    }

    #[tokio::test]
    async fn test_hierarchical_update_reaches_whole_tree() {
        let ctx = context(RemovalTimeStrategy::End).await;
        process_tree(&ctx).await;

        let found = set_for_process_instance(&ctx, "child", RemovalTimeUpdate::Calculated, true)
            .await
            .unwrap();
        assert!(found);
        assert_eq!(removal_time_of(&ctx, "root").await, Some(at(7)));
        assert_eq!(removal_time_of(&ctx, "child").await, Some(at(7)));
        let activities = ctx.db.process_history().list_activity_instances("child").await.unwrap();
        assert_eq!(activities[0].removal_time, Some(at(7)));
    }

    #[tokio::test]
    async fn test_non_hierarchical_update_changes_one_instance() {
        let ctx = context(RemovalTimeStrategy::Start).await;
        process_tree(&ctx).await;

        set_for_process_instance(&ctx, "child", RemovalTimeUpdate::Absolute(at(9)), false)
            .await
            .unwrap();
        assert_eq!(removal_time_of(&ctx, "child").await, Some(at(9)));
        assert_eq!(removal_time_of(&ctx, "root").await, None);
    }

    #[tokio::test]
    async fn test_cleared_and_missing_instances() {
        let ctx = context(RemovalTimeStrategy::End).await;
        process_tree(&ctx).await;

        set_for_process_instance(&ctx, "root", RemovalTimeUpdate::Absolute(at(3)), true)
            .await
            .unwrap();
        set_for_process_instance(&ctx, "root", RemovalTimeUpdate::Cleared, true)
            .await
            .unwrap();
        assert_eq!(removal_time_of(&ctx, "child").await, None);

        let found = set_for_process_instance(&ctx, "missing", RemovalTimeUpdate::Cleared, true)
            .await
            .unwrap();
        assert!(!found);
    }
}
