use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    config::CleanupStrategy,
    db::{
        repos::{CleanupCriteria, ProcessHistoryRepo},
        sqlite::SqliteProcessHistoryRepo,
        tests::harness::{create_sqlite_pool, create_test_db, run_sqlite_migrations},
    },
    models::{
        ByteArray, ByteArrayType, CreateDefinition, Definition, DefinitionKind,
        HistoricActivityInstance, HistoricDecisionInstance, HistoricProcessInstance,
        HistoricProcessInstanceQuery, HistoricVariableInstance, ProcessInstanceState, new_id,
    },
};

// ============================================================================
// Test Input Helpers
// ============================================================================

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, hour, minute, 0).unwrap()
}

fn process_instance(
    id: &str,
    definition: &Definition,
    end_time: Option<DateTime<Utc>>,
    removal_time: Option<DateTime<Utc>>,
) -> HistoricProcessInstance {
    HistoricProcessInstance {
        id: id.to_string(),
        process_definition_id: definition.id.clone(),
        process_definition_key: definition.key.clone(),
        deployment_id: Some(definition.deployment_id.clone()),
        business_key: None,
        root_process_instance_id: id.to_string(),
        super_process_instance_id: None,
        state: if end_time.is_some() {
            ProcessInstanceState::Completed
        } else {
            ProcessInstanceState::Active
        },
        start_user_id: None,
        start_time: at(8, 0),
        end_time,
        removal_time,
    }
}

fn criteria(strategy: CleanupStrategy, now: DateTime<Utc>, from: u32, to: u32) -> CleanupCriteria {
    CleanupCriteria {
        strategy,
        now,
        minute_from: from,
        minute_to: to,
        batch_size: 500,
    }
}

async fn deploy(db: &crate::db::DbPool, key: &str, ttl: Option<i32>) -> Definition {
    let mut input = CreateDefinition::new(DefinitionKind::Process, key, "dep");
    input.history_time_to_live = ttl;
    db.definitions()
        .create(input)
        .await
        .expect("Failed to deploy definition")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_insert_and_query_process_instances() {
    let db = create_test_db().await;
    let repo = db.process_history();
    let definition = deploy(&db, "order", None).await;

    repo.insert_process_instance(&process_instance("p1", &definition, Some(at(9, 0)), None))
        .await
        .unwrap();
    repo.insert_process_instance(&process_instance("p2", &definition, None, None))
        .await
        .unwrap();

    let found = repo.get_process_instance("p1").await.unwrap().unwrap();
    assert_eq!(found.end_time, Some(at(9, 0)));
    assert_eq!(found.state, ProcessInstanceState::Completed);

    let finished = HistoricProcessInstanceQuery {
        finished: Some(true),
        ..HistoricProcessInstanceQuery::by_definition_key("order")
    };
    assert_eq!(repo.count_process_instances(&finished).await.unwrap(), 1);

    let by_ids = HistoricProcessInstanceQuery {
        ids: Some(vec!["p1".to_string(), "p2".to_string(), "p3".to_string()]),
        ..Default::default()
    };
    assert_eq!(repo.list_process_instances(&by_ids).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_end_process_instance() {
    let db = create_test_db().await;
    let repo = db.process_history();
    let definition = deploy(&db, "order", None).await;

    repo.insert_process_instance(&process_instance("p1", &definition, None, None))
        .await
        .unwrap();
    repo.end_process_instance("p1", ProcessInstanceState::ExternallyTerminated, at(9, 30))
        .await
        .unwrap();

    let ended = repo.get_process_instance("p1").await.unwrap().unwrap();
    assert_eq!(ended.state, ProcessInstanceState::ExternallyTerminated);
    assert_eq!(ended.end_time, Some(at(9, 30)));
}

#[tokio::test]
async fn test_set_removal_time_for_root_reaches_dependent_rows() {
    let db = create_test_db().await;
    let repo = db.process_history();
    let definition = deploy(&db, "order", None).await;

    repo.insert_process_instance(&process_instance("root", &definition, None, None))
        .await
        .unwrap();
    let mut child = process_instance("child", &definition, None, None);
    child.root_process_instance_id = "root".to_string();
    child.super_process_instance_id = Some("root".to_string());
    repo.insert_process_instance(&child).await.unwrap();

    repo.insert_activity_instance(&HistoricActivityInstance {
        id: new_id(),
        process_instance_id: "child".to_string(),
        root_process_instance_id: "root".to_string(),
        activity_id: "task".to_string(),
        activity_type: "userTask".to_string(),
        start_time: at(8, 0),
        end_time: None,
        removal_time: None,
    })
    .await
    .unwrap();

    let byte_array_id = new_id();
    db.byte_arrays()
        .insert(&ByteArray {
            id: byte_array_id.clone(),
            name: Some("payload".to_string()),
            bytes: vec![1, 2, 3],
            byte_array_type: ByteArrayType::Variable,
            root_process_instance_id: Some("root".to_string()),
            batch_id: None,
            create_time: at(8, 0),
            removal_time: None,
        })
        .await
        .unwrap();

    let removal = at(8, 0) + Duration::days(5);
    repo.set_removal_time_for_root("root", Some(removal))
        .await
        .unwrap();

    let child = repo.get_process_instance("child").await.unwrap().unwrap();
    assert_eq!(child.removal_time, Some(removal));
    let activities = repo.list_activity_instances("child").await.unwrap();
    assert_eq!(activities[0].removal_time, Some(removal));
    let byte_array = db.byte_arrays().get(&byte_array_id).await.unwrap().unwrap();
    assert_eq!(byte_array.removal_time, Some(removal));
}

#[tokio::test]
async fn test_delete_cascade_removes_dependent_rows() {
    let db = create_test_db().await;
    let repo = db.process_history();
    let definition = deploy(&db, "order", None).await;

    repo.insert_process_instance(&process_instance("p1", &definition, Some(at(9, 0)), None))
        .await
        .unwrap();

    let byte_array_id = new_id();
    db.byte_arrays()
        .insert(&ByteArray {
            id: byte_array_id.clone(),
            name: None,
            bytes: b"large".to_vec(),
            byte_array_type: ByteArrayType::Variable,
            root_process_instance_id: Some("p1".to_string()),
            batch_id: None,
            create_time: at(8, 0),
            removal_time: None,
        })
        .await
        .unwrap();
    repo.insert_variable(&HistoricVariableInstance {
        id: new_id(),
        process_instance_id: "p1".to_string(),
        root_process_instance_id: "p1".to_string(),
        name: "payload".to_string(),
        value: None,
        byte_array_id: Some(byte_array_id.clone()),
        create_time: at(8, 0),
        removal_time: None,
    })
    .await
    .unwrap();
    db.decision_history()
        .insert_decision_instance(&HistoricDecisionInstance {
            id: "d1".to_string(),
            decision_definition_id: "dd".to_string(),
            decision_definition_key: "dish".to_string(),
            process_instance_id: Some("p1".to_string()),
            root_process_instance_id: Some("p1".to_string()),
            root_decision_instance_id: None,
            evaluation_time: at(8, 30),
            removal_time: None,
        })
        .await
        .unwrap();

    let deleted = repo.delete_cascade(&["p1".to_string()]).await.unwrap();

    assert_eq!(deleted, 1);
    assert!(repo.get_process_instance("p1").await.unwrap().is_none());
    assert!(repo.list_variables("p1").await.unwrap().is_empty());
    assert!(db.byte_arrays().get(&byte_array_id).await.unwrap().is_none());
    assert!(
        db.decision_history()
            .get_decision_instance("d1")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_delete_cascade_with_no_ids() {
    let db = create_test_db().await;
    assert_eq!(db.process_history().delete_cascade(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_large_id_lists_are_split_across_statements() {
    let pool = create_sqlite_pool().await;
    run_sqlite_migrations(&pool).await;
    let db = crate::db::DbPool::from_sqlite(pool.clone());
    let repo = SqliteProcessHistoryRepo::new(pool).with_id_chunk_size(7);
    let definition = deploy(&db, "order", None).await;

    let mut ids: Vec<String> = (0..2500).map(|i| format!("p{:04}", i)).collect();
    for id in &ids {
        repo.insert_process_instance(&process_instance(id, &definition, Some(at(9, 0)), None))
            .await
            .unwrap();
    }
    ids.push("unknown".to_string());
    ids.push("p0001".to_string());

    let by_ids = HistoricProcessInstanceQuery {
        ids: Some(ids.clone()),
        ..Default::default()
    };
    let found = repo.list_process_instances(&by_ids).await.unwrap();
    assert_eq!(found.len(), 2500);
    assert_eq!(found[0].id, "p0000");
    assert_eq!(found[2499].id, "p2499");
    assert_eq!(repo.count_process_instances(&by_ids).await.unwrap(), 2500);

    let limited = HistoricProcessInstanceQuery {
        limit: Some(10),
        ..by_ids.clone()
    };
    let first_ten = repo.list_process_instances(&limited).await.unwrap();
    assert_eq!(first_ten.len(), 10);
    assert_eq!(first_ten[9].id, "p0009");

    assert_eq!(repo.delete_cascade(&ids).await.unwrap(), 2500);
    assert_eq!(
        repo.count_process_instances(&HistoricProcessInstanceQuery::default())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_find_ids_for_cleanup_by_removal_time_respects_minute_range() {
    let db = create_test_db().await;
    let repo = db.process_history();
    let definition = deploy(&db, "order", None).await;

    repo.insert_process_instance(&process_instance(
        "early",
        &definition,
        Some(at(7, 0)),
        Some(at(9, 10)),
    ))
    .await
    .unwrap();
    repo.insert_process_instance(&process_instance(
        "late",
        &definition,
        Some(at(7, 0)),
        Some(at(9, 40)),
    ))
    .await
    .unwrap();
    repo.insert_process_instance(&process_instance(
        "future",
        &definition,
        Some(at(7, 0)),
        Some(at(23, 10)),
    ))
    .await
    .unwrap();

    let now = at(12, 0);
    let all = repo
        .find_ids_for_cleanup(&criteria(CleanupStrategy::RemovalTimeBased, now, 0, 59))
        .await
        .unwrap();
    assert_eq!(all, vec!["early", "late"]);

    let first_half = repo
        .find_ids_for_cleanup(&criteria(CleanupStrategy::RemovalTimeBased, now, 0, 29))
        .await
        .unwrap();
    assert_eq!(first_half, vec!["early"]);

    let second_half = repo
        .find_ids_for_cleanup(&criteria(CleanupStrategy::RemovalTimeBased, now, 30, 59))
        .await
        .unwrap();
    assert_eq!(second_half, vec!["late"]);
}

#[tokio::test]
async fn test_find_ids_for_cleanup_by_end_time_uses_definition_ttl() {
    let db = create_test_db().await;
    let repo = db.process_history();
    let short = deploy(&db, "short", Some(1)).await;
    let long = deploy(&db, "long", Some(10)).await;
    let forever = deploy(&db, "forever", None).await;

    let end = at(9, 0);
    repo.insert_process_instance(&process_instance("s", &short, Some(end), None))
        .await
        .unwrap();
    repo.insert_process_instance(&process_instance("l", &long, Some(end), None))
        .await
        .unwrap();
    repo.insert_process_instance(&process_instance("f", &forever, Some(end), None))
        .await
        .unwrap();
    repo.insert_process_instance(&process_instance("running", &short, None, None))
        .await
        .unwrap();

    let now = end + Duration::days(2);
    let ids = repo
        .find_ids_for_cleanup(&criteria(CleanupStrategy::EndTimeBased, now, 0, 59))
        .await
        .unwrap();
    assert_eq!(ids, vec!["s"]);
}

#[tokio::test]
async fn test_find_ids_for_cleanup_honors_batch_size() {
    let db = create_test_db().await;
    let repo = db.process_history();
    let definition = deploy(&db, "order", None).await;

    for i in 0..5 {
        repo.insert_process_instance(&process_instance(
            &format!("p{i}"),
            &definition,
            Some(at(7, 0)),
            Some(at(8, i)),
        ))
        .await
        .unwrap();
    }

    let mut limited = criteria(CleanupStrategy::RemovalTimeBased, at(12, 0), 0, 59);
    limited.batch_size = 3;
    let ids = repo.find_ids_for_cleanup(&limited).await.unwrap();
    assert_eq!(ids, vec!["p0", "p1", "p2"]);
}

#[tokio::test]
async fn test_cleanable_counts() {
    let db = create_test_db().await;
    let repo = db.process_history();
    let definition = deploy(&db, "order", Some(1)).await;

    repo.insert_process_instance(&process_instance(
        "done",
        &definition,
        Some(at(7, 0)),
        Some(at(8, 0)),
    ))
    .await
    .unwrap();
    repo.insert_process_instance(&process_instance(
        "kept",
        &definition,
        Some(at(7, 0)),
        Some(at(20, 0)),
    ))
    .await
    .unwrap();
    repo.insert_process_instance(&process_instance("running", &definition, None, None))
        .await
        .unwrap();

    let counts = repo
        .cleanable_counts(&criteria(CleanupStrategy::RemovalTimeBased, at(12, 0), 0, 59))
        .await
        .unwrap();

    assert_eq!(counts.len(), 1);
    let (definition_id, counts) = &counts[0];
    assert_eq!(definition_id, &definition.id);
    assert_eq!(counts.finished, 2);
    assert_eq!(counts.cleanable, 1);
}
