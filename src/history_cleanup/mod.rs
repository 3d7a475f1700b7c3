//! History cleanup.
//!
//! Finished history is removed by recurring `history-cleanup` jobs. Each job
//! owns a contiguous range of minutes of the hour and only deletes rows whose
//! removal time (or end time, depending on the strategy) falls into that
//! range, so that several jobs can clean up in parallel without contention.
//!
//! Jobs run inside the configured batch windows, or right away when cleanup
//! was requested as immediately due. After every run a job reschedules
//! itself: at once when it found a full batch, with an exponential back-off
//! while the window is still open, or at the start of the next window.

mod handler;
mod job;
mod report;
mod scheduler;
mod window;

pub use handler::{CleanupRunResult, HistoryCleanupHandler, run_cleanup};
pub use job::{HistoryCleanupJobConfig, minute_chunks};
pub use report::{batch_report, definition_report};
pub use scheduler::{bootstrap, find_jobs, schedule};
pub use window::{BatchWindow, BatchWindowManager};

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::{
        clock::MockClock,
        config::EngineConfig,
        db::tests::harness::create_test_db,
        engine::EngineContext,
        jobs::{JobHandler, JobOutcome},
        models::{
            CreateDefinition, DefinitionKind, HistoricProcessInstance, HistoricProcessInstanceQuery,
            Job, ProcessInstanceState, new_id,
        },
    };

    /// 2024-01-01 is a Monday.
    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    async fn context(
        now: DateTime<Utc>,
        configure: impl FnOnce(&mut EngineConfig),
    ) -> (EngineContext, Arc<MockClock>) {
        let clock = MockClock::at(now);
        let mut config = EngineConfig::default();
        configure(&mut config);
        let ctx = EngineContext::new(config, create_test_db().await, clock.clone()).unwrap();
        (ctx, clock)
    }

    fn with_window(start: &str, end: &str) -> impl FnOnce(&mut EngineConfig) {
        let (start, end) = (start.to_string(), end.to_string());
        move |config| {
            config.history_cleanup.batch_window_start_time = Some(start);
            config.history_cleanup.batch_window_end_time = Some(end);
        }
    }

    /// Finished process instances whose removal time has passed.
    async fn removable_instances(ctx: &EngineContext, count: usize, removal_time: DateTime<Utc>) {
        let definition = ctx
            .db
            .definitions()
            .create(CreateDefinition::new(DefinitionKind::Process, "invoice", "deployment-1").with_history_time_to_live(5))
            .await
            .unwrap();
        for _ in 0..count {
            let id = new_id();
            let instance = HistoricProcessInstance {
                id: id.clone(),
                process_definition_id: definition.id.clone(),
                process_definition_key: definition.key.clone(),
                deployment_id: Some(definition.deployment_id.clone()),
                business_key: None,
                root_process_instance_id: id,
                super_process_instance_id: None,
                state: ProcessInstanceState::Completed,
                start_user_id: None,
                start_time: removal_time - Duration::days(6),
                end_time: Some(removal_time - Duration::days(5)),
                removal_time: Some(removal_time),
            };
            ctx.db.process_history().insert_process_instance(&instance).await.unwrap();
        }
    }

    async fn remaining_instances(ctx: &EngineContext) -> i64 {
        ctx.db
            .process_history()
            .count_process_instances(&HistoricProcessInstanceQuery::default())
            .await
            .unwrap()
    }

    async fn run(ctx: &EngineContext, job: &Job) -> (Job, HistoryCleanupJobConfig) {
        match HistoryCleanupHandler.execute(ctx, job).await.unwrap() {
            JobOutcome::Rescheduled(next) => {
                let config =
                    HistoryCleanupJobConfig::parse(next.handler_configuration.as_deref()).unwrap();
                (next, config)
            }
            JobOutcome::Done => panic!("cleanup jobs are never done"),
        }
    }

    #[tokio::test]
    async fn test_schedule_immediately_creates_one_job_per_chunk() {
        let (ctx, _) = context(at(12, 0), |c| c.history_cleanup.degree_of_parallelism = 3).await;

        let first = schedule(&ctx, true).await.unwrap().unwrap();
        let jobs = find_jobs(&ctx).await.unwrap();

        assert_eq!(jobs.len(), 3);
        assert_eq!(first.id, jobs[0].id);
        let ranges: Vec<_> = jobs
            .iter()
            .map(|job| {
                let config = HistoryCleanupJobConfig::parse(job.handler_configuration.as_deref()).unwrap();
                assert!(config.immediately_due);
                (config.minute_from, config.minute_to)
            })
            .collect();
        assert_eq!(ranges, vec![(0, 19), (20, 39), (40, 59)]);
        assert!(jobs.iter().all(|job| job.due_date == Some(at(12, 0)) && !job.suspended));
    }

    #[tokio::test]
    async fn test_schedule_without_window_creates_nothing() {
        let (ctx, _) = context(at(12, 0), |_| {}).await;
        assert!(schedule(&ctx, false).await.unwrap().is_none());
        assert!(find_jobs(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_without_window_suspends_existing_jobs() {
        let (ctx, _) = context(at(12, 0), |_| {}).await;
        schedule(&ctx, true).await.unwrap();

        let job = schedule(&ctx, false).await.unwrap().unwrap();
        assert!(job.suspended);
        assert_eq!(job.due_date, None);
    }

    #[tokio::test]
    async fn test_schedule_in_window_is_due_at_window_start() {
        let (ctx, _) = context(at(12, 0), with_window("22:00", "23:00")).await;
        let job = schedule(&ctx, false).await.unwrap().unwrap();
        assert_eq!(job.due_date, Some(at(22, 0)));
    }

    #[tokio::test]
    async fn test_reschedule_reduces_job_count() {
        let (ctx, _) = context(at(12, 0), |c| c.history_cleanup.degree_of_parallelism = 4).await;
        schedule(&ctx, true).await.unwrap();
        assert_eq!(find_jobs(&ctx).await.unwrap().len(), 4);

        let mut config = ctx.config.clone();
        config.history_cleanup.degree_of_parallelism = 2;
        let ctx = EngineContext::new(config, ctx.db.clone(), ctx.clock.clone()).unwrap();
        schedule(&ctx, true).await.unwrap();

        let jobs = find_jobs(&ctx).await.unwrap();
        assert_eq!(jobs.len(), 2);
        let last = HistoryCleanupJobConfig::parse(jobs[1].handler_configuration.as_deref()).unwrap();
        assert_eq!((last.minute_from, last.minute_to), (30, 59));
    }

    #[tokio::test]
    async fn test_bootstrap_without_window_suspends() {
        let (ctx, _) = context(at(12, 0), |_| {}).await;
        schedule(&ctx, true).await.unwrap();

        bootstrap(&ctx).await.unwrap();
        assert!(find_jobs(&ctx).await.unwrap().iter().all(|job| job.suspended));
    }

    #[tokio::test]
    async fn test_immediate_run_removes_data_and_suspends_without_window() {
        let (ctx, _) = context(at(12, 0), |_| {}).await;
        removable_instances(&ctx, 3, at(11, 0)).await;
        let job = schedule(&ctx, true).await.unwrap().unwrap();

        let (next, config) = run(&ctx, &job).await;

        assert_eq!(remaining_instances(&ctx).await, 0);
        assert!(next.suspended);
        assert_eq!(next.due_date, None);
        assert!(!config.immediately_due);
    }

    #[tokio::test]
    async fn test_full_batch_is_due_again_at_once() {
        let (ctx, _) = context(at(12, 0), |c| {
            c.history_cleanup.batch_size = 2;
            c.history_cleanup.batch_threshold = 2;
        })
        .await;
        removable_instances(&ctx, 3, at(11, 0)).await;
        let job = schedule(&ctx, true).await.unwrap().unwrap();

        let (next, config) = run(&ctx, &job).await;
        assert_eq!(remaining_instances(&ctx).await, 1);
        assert_eq!(next.due_date, Some(at(12, 0)));
        assert_eq!(config.count_empty_runs, 0);
        assert!(config.immediately_due);

        let (next, _) = run(&ctx, &next).await;
        assert_eq!(remaining_instances(&ctx).await, 0);
        assert!(next.suspended);
    }

    #[tokio::test]
    async fn test_below_threshold_in_window_backs_off() {
        let (ctx, clock) = context(at(22, 0), with_window("22:00", "23:00")).await;
        let job = schedule(&ctx, false).await.unwrap().unwrap();

        let (next, config) = run(&ctx, &job).await;
        assert_eq!(next.due_date, Some(at(22, 0) + Duration::seconds(10)));
        assert_eq!(config.count_empty_runs, 1);

        clock.set(at(22, 0) + Duration::seconds(10));
        let (next, config) = run(&ctx, &next).await;
        assert_eq!(next.due_date, Some(at(22, 0) + Duration::seconds(30)));
        assert_eq!(config.count_empty_runs, 2);
    }

    #[tokio::test]
    async fn test_backoff_past_window_end_waits_for_next_window() {
        let (ctx, clock) = context(at(22, 0), with_window("22:00", "23:00")).await;
        let job = schedule(&ctx, false).await.unwrap().unwrap();

        clock.set(at(22, 59) + Duration::seconds(55));
        let (next, config) = run(&ctx, &job).await;

        assert_eq!(
            next.due_date,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 22, 0, 0).unwrap())
        );
        assert_eq!(config.count_empty_runs, 0);
    }

    #[tokio::test]
    async fn test_run_outside_window_leaves_data_alone() {
        let (ctx, clock) = context(at(12, 0), with_window("22:00", "23:00")).await;
        removable_instances(&ctx, 1, at(11, 0)).await;
        let job = schedule(&ctx, false).await.unwrap().unwrap();

        clock.set(at(13, 0));
        let (next, _) = run(&ctx, &job).await;

        assert_eq!(remaining_instances(&ctx).await, 1);
        assert_eq!(next.due_date, Some(at(22, 0)));
        assert!(!next.suspended);
    }

    #[tokio::test]
    async fn test_minute_range_limits_what_a_job_removes() {
        let (ctx, _) = context(at(12, 0), |c| c.history_cleanup.degree_of_parallelism = 2).await;
        // Removal at minute 5 falls into the first job's range.
        removable_instances(&ctx, 1, at(11, 5)).await;
        schedule(&ctx, true).await.unwrap();
        let jobs = find_jobs(&ctx).await.unwrap();

        run(&ctx, &jobs[1]).await;
        assert_eq!(remaining_instances(&ctx).await, 1);

        run(&ctx, &jobs[0]).await;
        assert_eq!(remaining_instances(&ctx).await, 0);
    }

    #[tokio::test]
    async fn test_future_removal_time_is_kept() {
        let (ctx, _) = context(at(12, 0), |_| {}).await;
        removable_instances(&ctx, 2, at(13, 0)).await;
        let job = schedule(&ctx, true).await.unwrap().unwrap();

        run(&ctx, &job).await;
        assert_eq!(remaining_instances(&ctx).await, 2);
    }

    #[tokio::test]
    async fn test_process_report_counts_cleanable_instances() {
        let (ctx, _) = context(at(12, 0), |_| {}).await;
        removable_instances(&ctx, 2, at(11, 0)).await;
        ctx.db
            .definitions()
            .create(CreateDefinition::new(DefinitionKind::Process, "unused", "deployment-1"))
            .await
            .unwrap();

        let query = crate::models::CleanableReportQuery::default();
        let report = definition_report(&ctx, None, DefinitionKind::Process, &query)
            .await
            .unwrap();
        assert_eq!(report.len(), 2);
        let invoice = report.iter().find(|r| r.definition_key == "invoice").unwrap();
        assert_eq!((invoice.finished_count, invoice.cleanable_count), (2, 2));

        let compact = crate::models::CleanableReportQuery {
            compact: true,
            ..Default::default()
        };
        let report = definition_report(&ctx, None, DefinitionKind::Process, &compact)
            .await
            .unwrap();
        assert_eq!(report.len(), 1);
    }
}
