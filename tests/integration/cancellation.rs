//! Cancellation against in-flight remote work, including races with replies.

use std::time::Duration;

use qos_adjuster::AdjusterState;
use qos_integration_tests::{OUTCOME_WAIT, Outcome, TestEngine};
use qos_net::{CopyFinished, PinReply, ReplicaStateReply};
use qos_types::{AdjustmentTask, FileAttributes, FileId, PoolInfo, QosAction};

fn task(file: &str, action: QosAction) -> AdjustmentTask {
    AdjustmentTask::new(FileAttributes::new(FileId::from(file), 1 << 20), action)
        .with_source("P1")
        .with_target(PoolInfo::named("P2"))
        .with_pool_group("G1")
}

#[tokio::test]
async fn test_stage_cancel_releases_pin() {
    let engine = TestEngine::new();
    let adjuster = engine.factory.for_action(QosAction::WaitForStage).build();
    adjuster.clone().adjust_qos(task("F1", QosAction::WaitForStage));
    let mut reply = engine.endpoints.next_pin_reply();

    adjuster.cancel("file deleted");
    adjuster.cancel("file deleted");

    tokio::time::timeout(OUTCOME_WAIT, reply.cancelled())
        .await
        .expect("pin wait still alive after cancel");

    let unpins = engine.endpoints.unpin_requests();
    assert_eq!(unpins.len(), 1);
    assert_eq!(unpins[0].file_id, FileId::from("F1"));
    assert_eq!(unpins[0].request_id, engine.endpoints.pin_requests()[0].request_id);

    // A late grant goes nowhere.
    assert!(!reply.reply(PinReply {
        pool: Some("poolX".into()),
        error: None,
    }));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        engine.handler.outcomes(),
        vec![Outcome::Cancelled {
            file_id: FileId::from("F1")
        }]
    );
}

#[tokio::test]
async fn test_copy_cancel_does_not_wait_for_pool() {
    let engine = TestEngine::new();
    let adjuster = engine.factory.for_action(QosAction::ReplicateCopy).build();
    adjuster.clone().adjust_qos(task("F2", QosAction::ReplicateCopy));
    let session = engine.endpoints.copy_requests()[0].session;

    adjuster.cancel("pool draining");

    // Delivered synchronously from cancel().
    assert_eq!(
        engine.handler.outcomes(),
        vec![Outcome::Cancelled {
            file_id: FileId::from("F2")
        }]
    );
    let cancels = engine.endpoints.copy_cancels();
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0].session, session);
    assert_eq!(cancels[0].target, "P2");

    // The pool finishes anyway; the notice is dropped.
    assert!(!engine.factory.copy_relay().copy_finished(CopyFinished {
        file_id: FileId::from("F2"),
        session,
        target: "P2".into(),
        error: None,
    }));
    assert_eq!(adjuster.state(), AdjusterState::Cancelled);
}

#[tokio::test]
async fn test_cancel_before_start_sends_nothing() {
    let engine = TestEngine::new();

    for (i, action) in [
        QosAction::ReplicateCopy,
        QosAction::WaitForStage,
        QosAction::SetPersisted,
    ]
    .into_iter()
    .enumerate()
    {
        let adjuster = engine.factory.for_action(action).build();
        adjuster.cancel("never mind");
        adjuster.adjust_qos(task(&format!("F{i}"), action));
    }

    let outcomes = engine.handler.outcomes();
    assert_eq!(outcomes.len(), 3);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, Outcome::Cancelled { .. }))
    );
    assert!(engine.endpoints.copy_requests().is_empty());
    assert!(engine.endpoints.pin_requests().is_empty());
    assert!(engine.endpoints.state_requests().is_empty());
}

/// Many adjusters, each with a cancel racing its reply. Every file must see
/// exactly one outcome.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replies_racing_cancels_yield_one_outcome_per_file() {
    const FILES: usize = 300;
    let engine = TestEngine::new();

    let mut racers = Vec::with_capacity(FILES * 2);
    for i in 0..FILES {
        let file = format!("F{i}");
        let action = match i % 3 {
            0 => QosAction::SetPersisted,
            1 => QosAction::WaitForStage,
            _ => QosAction::ReplicateCopy,
        };
        let adjuster = engine.factory.for_action(action).build();
        adjuster.clone().adjust_qos(task(&file, action));

        match action {
            QosAction::SetPersisted => {
                let reply = engine.endpoints.next_state_reply();
                racers.push(tokio::spawn(async move {
                    reply.reply(ReplicaStateReply::default());
                }));
            }
            QosAction::WaitForStage => {
                let reply = engine.endpoints.next_pin_reply();
                racers.push(tokio::spawn(async move {
                    reply.reply(PinReply {
                        pool: Some("poolX".into()),
                        error: None,
                    });
                }));
            }
            _ => {
                let relay = engine.factory.copy_relay();
                let session = engine.endpoints.copy_requests().last().unwrap().session;
                let file_id = FileId::from(file.as_str());
                racers.push(tokio::spawn(async move {
                    relay.copy_finished(CopyFinished {
                        file_id,
                        session,
                        target: "P2".into(),
                        error: None,
                    });
                }));
            }
        }

        racers.push(tokio::spawn(async move {
            adjuster.cancel("race");
        }));
    }

    for racer in racers {
        racer.await.unwrap();
    }
    engine.handler.wait_for(FILES).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcomes = engine.handler.outcomes();
    assert_eq!(outcomes.len(), FILES);
    for i in 0..FILES {
        let file_id = FileId::from(format!("F{i}").as_str());
        assert_eq!(
            engine.handler.outcomes_for(&file_id).len(),
            1,
            "{file_id} saw more than one outcome"
        );
    }

    // Every stage that lost to its cancel released its pin.
    let stages_cancelled = outcomes
        .iter()
        .filter(|o| {
            matches!(o, Outcome::Cancelled { file_id }
                if file_id.as_str()[1..].parse::<usize>().unwrap() % 3 == 1)
        })
        .count();
    assert_eq!(engine.endpoints.unpin_requests().len(), stages_cancelled);
}
