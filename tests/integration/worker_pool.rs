//! Shared worker pool behavior under load.

use std::time::{Duration, Instant};

use qos_adjuster::{AdjusterConfig, FailureKind};
use qos_integration_tests::{Outcome, TestEngine};
use qos_net::{NetError, ReplicaStateReply};
use qos_types::{AdjustmentTask, FileAttributes, FileId, QosAction};

fn task(i: usize) -> AdjustmentTask {
    AdjustmentTask::new(
        FileAttributes::new(FileId::new(format!("F{i}")), 4096),
        QosAction::SetPersisted,
    )
    .with_source("P1")
}

#[tokio::test]
async fn test_adjust_qos_returns_without_waiting_for_replies() {
    let engine = TestEngine::new();

    let start = Instant::now();
    for i in 0..500 {
        engine
            .factory
            .for_action(QosAction::SetPersisted)
            .build()
            .adjust_qos(task(i));
    }
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(engine.endpoints.state_requests().len(), 500);
    assert!(engine.handler.outcomes().is_empty());

    for _ in 0..500 {
        engine
            .endpoints
            .next_state_reply()
            .reply(ReplicaStateReply::default());
    }
    engine.handler.wait_for(500).await;
}

#[tokio::test]
async fn test_waits_are_bounded_by_worker_permits() {
    let engine = TestEngine::with_config(AdjusterConfig {
        max_concurrent: 2,
        ..AdjusterConfig::default()
    });

    for i in 0..6 {
        engine
            .factory
            .for_action(QosAction::SetPersisted)
            .build()
            .adjust_qos(task(i));
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(engine.workers.max_concurrent(), 2);
    assert_eq!(engine.workers.available_permits(), 0);

    // Requests were all sent up front; only the waits queue.
    assert_eq!(engine.endpoints.state_requests().len(), 6);

    for _ in 0..6 {
        engine
            .endpoints
            .next_state_reply()
            .reply(ReplicaStateReply::default());
    }
    let outcomes = engine.handler.wait_for(6).await;
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, Outcome::Completed { .. }))
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(engine.workers.available_permits(), 2);
}

#[tokio::test]
async fn test_reply_wait_limit_fails_silent_pools() {
    let engine = TestEngine::with_config(AdjusterConfig {
        max_reply_wait: Some(Duration::from_millis(30)),
        ..AdjusterConfig::default()
    });

    engine
        .factory
        .for_action(QosAction::SetPersisted)
        .build()
        .adjust_qos(task(0));
    let _silent = engine.endpoints.next_state_reply();

    let outcomes = engine.handler.wait_for(1).await;
    match &outcomes[0] {
        Outcome::Failed { target, error, .. } => {
            assert_eq!(target.as_deref(), Some("P1"));
            assert_eq!(error.kind(), FailureKind::SelectedPoolFailed);
            assert!(error.is_retryable());
            let timeout = NetError::Timeout(Duration::from_millis(30));
            assert!(error.to_string().contains(&timeout.to_string()));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}
