//! Full adjustment flows: scanner task in, remote requests out, one outcome back.

use qos_adjuster::{FailureKind, STAGE_PIN_REQUEST_ID, single_copy_parameters};
use qos_integration_tests::{Outcome, TestEngine};
use qos_net::{CopyFinished, PinReply, RemoteError, RemoteErrorCode, ReplicaStateReply, StateChange};
use qos_types::events::{AdjustmentFailed, AdjustmentStarted};
use qos_types::{AdjustmentTask, FileAttributes, FileId, PoolInfo, QosAction};

fn task(file: &str, action: QosAction) -> AdjustmentTask {
    AdjustmentTask::new(FileAttributes::new(FileId::from(file), 1 << 20), action)
}

#[tokio::test]
async fn test_set_persisted_end_to_end() {
    let engine = TestEngine::new();

    let adjuster = engine.factory.for_action(QosAction::SetPersisted).build();
    adjuster
        .clone()
        .adjust_qos(task("F1", QosAction::SetPersisted).with_target(PoolInfo::named("P1")));

    let requests = engine.endpoints.state_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].pool, "P1");
    assert_eq!(requests[0].file_id, FileId::from("F1"));
    assert_eq!(requests[0].change, StateChange::SetSticky);
    assert_eq!(Some(requests[0].session), adjuster.session());

    engine
        .endpoints
        .next_state_reply()
        .reply(ReplicaStateReply { error: None });

    assert_eq!(
        engine.handler.wait_for(1).await,
        vec![Outcome::Completed {
            file_id: FileId::from("F1"),
            target: Some("P1".to_string()),
        }]
    );
}

#[tokio::test]
async fn test_wait_for_stage_end_to_end() {
    let engine = TestEngine::new();

    let adjuster = engine.factory.for_action(QosAction::WaitForStage).build();
    adjuster
        .clone()
        .adjust_qos(task("F2", QosAction::WaitForStage).with_pool_group("G1"));

    let pins = engine.endpoints.pin_requests();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].attributes.file_id, FileId::from("F2"));
    assert_eq!(pins[0].pool_group.as_deref(), Some("G1"));
    assert_eq!(pins[0].request_id, STAGE_PIN_REQUEST_ID);

    engine.endpoints.next_pin_reply().reply(PinReply {
        pool: Some("poolX".to_string()),
        error: None,
    });

    assert_eq!(
        engine.handler.wait_for(1).await,
        vec![Outcome::Completed {
            file_id: FileId::from("F2"),
            target: Some("poolX".to_string()),
        }]
    );
    assert!(engine.endpoints.unpin_requests().is_empty());
}

#[tokio::test]
async fn test_replicate_copy_end_to_end() {
    let engine = TestEngine::new();
    let mut started = engine.factory.events().subscribe::<AdjustmentStarted>();

    let adjuster = engine.factory.for_action(QosAction::ReplicateCopy).build();
    adjuster.clone().adjust_qos(
        task("F3", QosAction::ReplicateCopy)
            .with_source("P1")
            .with_target(PoolInfo::named("P2")),
    );

    let event = started.recv().await.unwrap();
    let copies = engine.endpoints.copy_requests();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].session, event.session);
    assert_eq!(copies[0].parameters, single_copy_parameters());

    // The pool's notice arrives through whoever receives pool messages.
    let delivered = engine.factory.copy_relay().copy_finished(CopyFinished {
        file_id: FileId::from("F3"),
        session: copies[0].session,
        target: "P2".to_string(),
        error: None,
    });
    assert!(delivered);

    assert_eq!(
        engine.handler.wait_for(1).await,
        vec![Outcome::Completed {
            file_id: FileId::from("F3"),
            target: Some("P2".to_string()),
        }]
    );
}

#[tokio::test]
async fn test_sessions_are_distinct_per_task() {
    let engine = TestEngine::new();

    for i in 0..10 {
        engine
            .factory
            .for_action(QosAction::SetCached)
            .build()
            .adjust_qos(task(&format!("F{i}"), QosAction::SetCached).with_source("P1"));
    }

    let mut sessions: Vec<_> = engine
        .endpoints
        .state_requests()
        .into_iter()
        .map(|r| r.session)
        .collect();
    sessions.sort();
    sessions.dedup();
    assert_eq!(sessions.len(), 10);
}

#[tokio::test]
async fn test_failures_are_classified() {
    let engine = TestEngine::new();
    let mut failed = engine.factory.events().subscribe::<AdjustmentFailed>();

    // Pin manager answers with an error payload.
    engine
        .factory
        .for_action(QosAction::WaitForStage)
        .build()
        .adjust_qos(task("F1", QosAction::WaitForStage));
    engine.endpoints.next_pin_reply().reply(PinReply {
        pool: None,
        error: Some(RemoteError::new(RemoteErrorCode::NoPoolOnline, "group empty")),
    });

    // Pool vanishes before answering.
    engine
        .factory
        .for_action(QosAction::UnsetPrecious)
        .build()
        .adjust_qos(task("F2", QosAction::UnsetPrecious).with_source("P1"));
    drop(engine.endpoints.next_state_reply());

    // Pin manager unreachable.
    engine.endpoints.set_pin_manager_offline(true);
    engine
        .factory
        .for_action(QosAction::WaitForStage)
        .build()
        .adjust_qos(task("F3", QosAction::WaitForStage));

    engine.handler.wait_for(3).await;

    let kind_of = |file: &str| match engine.handler.outcomes_for(&FileId::from(file)).as_slice() {
        [Outcome::Failed { error, .. }] => error.kind(),
        other => panic!("expected one failure for {file}, got {other:?}"),
    };
    assert_eq!(kind_of("F1"), FailureKind::Remote);
    assert_eq!(kind_of("F2"), FailureKind::SelectedPoolFailed);
    assert_eq!(kind_of("F3"), FailureKind::ServiceUnavailable);

    let first = failed.recv().await.unwrap();
    assert!(!first.reason.is_empty());
}

#[tokio::test]
async fn test_missing_replica_is_success_for_every_state_action() {
    let engine = TestEngine::new();

    let actions = [
        QosAction::SetCached,
        QosAction::SetPersisted,
        QosAction::UnsetPrecious,
    ];
    for (i, action) in actions.into_iter().enumerate() {
        engine
            .factory
            .for_action(action)
            .build()
            .adjust_qos(task(&format!("F{i}"), action).with_source("P1"));
        engine
            .endpoints
            .next_state_reply()
            .reply(ReplicaStateReply {
                error: Some(RemoteError::new(
                    RemoteErrorCode::FileNotInRepository,
                    "gone",
                )),
            });
    }

    let outcomes = engine.handler.wait_for(3).await;
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, Outcome::Completed { .. })),
        "{outcomes:?}"
    );
}
