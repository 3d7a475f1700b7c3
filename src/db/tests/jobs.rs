use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    db::tests::harness::create_test_db,
    models::{FAILED_JOB_INCIDENT, Incident, Job, JobDefinition, JobQuery, new_id},
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn due_job(job_type: &str, due_date: DateTime<Utc>) -> Job {
    Job {
        due_date: Some(due_date),
        ..Job::new(new_id(), job_type, 3, now())
    }
}

#[tokio::test]
async fn test_find_acquirable_skips_suspended_exhausted_and_future_jobs() {
    let db = create_test_db().await;
    let repo = db.jobs();

    let ready = due_job("ready", now() - Duration::minutes(1));
    let future = due_job("future", now() + Duration::minutes(1));
    let mut suspended = due_job("suspended", now() - Duration::minutes(1));
    suspended.suspended = true;
    let mut exhausted = due_job("exhausted", now() - Duration::minutes(1));
    exhausted.retries = 0;
    let unscheduled = Job::new(new_id(), "unscheduled", 3, now());

    for job in [&ready, &future, &suspended, &exhausted, &unscheduled] {
        repo.insert(job).await.unwrap();
    }

    let acquirable = repo.find_acquirable(now(), 10).await.unwrap();
    let ids: Vec<_> = acquirable.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec![unscheduled.id.as_str(), ready.id.as_str()]);
}

#[tokio::test]
async fn test_find_acquirable_skips_jobs_of_suspended_definitions() {
    let db = create_test_db().await;
    let repo = db.jobs();

    let definition = JobDefinition {
        id: new_id(),
        job_type: "batch-seed-job".to_string(),
        job_configuration: Some("batch-1".to_string()),
        suspended: false,
    };
    repo.insert_definition(&definition).await.unwrap();

    let mut job = due_job("batch-seed-job", now());
    job.job_definition_id = Some(definition.id.clone());
    repo.insert(&job).await.unwrap();

    assert_eq!(repo.find_acquirable(now(), 10).await.unwrap().len(), 1);

    repo.set_definition_suspended(&definition.id, true)
        .await
        .unwrap();
    assert!(repo.find_acquirable(now(), 10).await.unwrap().is_empty());
    assert!(repo.get_definition(&definition.id).await.unwrap().unwrap().suspended);
}

#[tokio::test]
async fn test_update_and_query_jobs() {
    let db = create_test_db().await;
    let repo = db.jobs();

    let mut job = due_job("history-cleanup", now());
    repo.insert(&job).await.unwrap();

    job.retries = 0;
    job.exception_message = Some("failed".to_string());
    job.handler_configuration = Some("{}".to_string());
    repo.update(&job).await.unwrap();

    let found = repo.get(&job.id).await.unwrap().unwrap();
    assert_eq!(found, job);

    let failed = JobQuery {
        no_retries_left: true,
        with_exception: true,
        ..JobQuery::by_type("history-cleanup")
    };
    assert_eq!(repo.count(&failed).await.unwrap(), 1);
    assert_eq!(repo.count(&JobQuery::by_type("other")).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_by_definition() {
    let db = create_test_db().await;
    let repo = db.jobs();

    let definition_id = new_id();
    for _ in 0..3 {
        let mut job = due_job("batch-job", now());
        job.job_definition_id = Some(definition_id.clone());
        repo.insert(&job).await.unwrap();
    }
    repo.insert(&due_job("other", now())).await.unwrap();

    assert_eq!(repo.delete_by_definition(&definition_id).await.unwrap(), 3);
    assert_eq!(repo.count(&JobQuery::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_incidents_for_job() {
    let db = create_test_db().await;
    let repo = db.jobs();

    let job = due_job("batch-job", now());
    repo.insert(&job).await.unwrap();
    repo.insert_incident(&Incident {
        id: new_id(),
        incident_type: FAILED_JOB_INCIDENT.to_string(),
        message: Some("boom".to_string()),
        configuration: job.id.clone(),
        job_definition_id: None,
        process_instance_id: None,
        create_time: now(),
    })
    .await
    .unwrap();

    let incidents = repo.list_incidents_for_job(&job.id).await.unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].incident_type, FAILED_JOB_INCIDENT);

    assert_eq!(repo.delete_incidents_for_job(&job.id).await.unwrap(), 1);
    assert!(repo.list_incidents_for_job(&job.id).await.unwrap().is_empty());
}
