use std::sync::Arc;
use std::time::Duration;

use transfertool::{
    AppConfig, AttemptOutcome, ClientId, Destination, SessionState, SimulatedHost,
    SimulatedResponse, TransferError, TransferOrchestrator, TransferStatus, Trigger,
};

const LOBBY_SURVIVAL: &str = r#"
    [transfer]
    retry_ceiling = 2
    attempt_timeout_ms = 1000
    sweep_interval_ms = 10

    [targets]
    lobby = "h1:25565"
    survival = "h2:25566"
"#;

fn core(toml: &str, host: Arc<SimulatedHost>) -> TransferOrchestrator {
    let config = AppConfig::from_toml_str(toml).unwrap();
    let core = TransferOrchestrator::new(&config, host).unwrap();
    core.start();
    core
}

fn survival() -> Destination {
    Destination::new("h2", 25566).unwrap()
}

#[tokio::test]
async fn transfer_to_lobby_is_confirmed() {
    let host = Arc::new(SimulatedHost::new());
    let core = core(LOBBY_SURVIVAL, host.clone());
    let client = ClientId::from("C");
    core.open_session(&client, Some(survival())).await;

    let target = core
        .resolve(&client, Trigger::Command, Some("lobby"))
        .await
        .unwrap();
    assert_eq!(target.name, "lobby");

    let ticket = core
        .start_resolved(&client, target, Trigger::Command)
        .await
        .unwrap();
    assert_eq!(
        ticket.wait().await,
        TransferStatus::Confirmed {
            target: "lobby".into(),
            attempts: 1
        }
    );

    assert_eq!(
        host.calls().await,
        vec![(client.clone(), Destination::new("h1", 25565).unwrap())]
    );
    let session = core.tracker().session(&client).await.unwrap();
    assert_eq!(session.state, SessionState::Confirmed);
    assert!(session.current_attempt.is_none());
    assert_eq!(session.history.len(), 1);
    assert_eq!(session.history[0].outcome, AttemptOutcome::Confirmed);
}

#[tokio::test]
async fn transfer_to_current_server_is_denied() {
    let host = Arc::new(SimulatedHost::new());
    let core = core(LOBBY_SURVIVAL, host.clone());
    let client = ClientId::from("C");
    core.open_session(&client, Some(survival())).await;

    let err = core
        .request_transfer(&client, Some("survival"), Trigger::Command)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::SelfTransferDenied { ref target } if target == "survival"));

    let session = core.tracker().session(&client).await.unwrap();
    assert_eq!(session.state, SessionState::Idle);
    assert!(session.history.is_empty());
    assert_eq!(host.call_count().await, 0);
}

#[tokio::test]
async fn retry_ceiling_bounds_failed_attempts() {
    let host = Arc::new(SimulatedHost::with_default(SimulatedResponse::Unavailable(
        "unreachable".into(),
    )));
    let client = ClientId::from("C");
    host.script(
        &client,
        [
            SimulatedResponse::Reject("server full".into()),
            SimulatedResponse::Reject("server full".into()),
        ],
    )
    .await;
    let core = core(LOBBY_SURVIVAL, host.clone());
    core.open_session(&client, Some(survival())).await;

    let ticket = core
        .request_transfer(&client, Some("lobby"), Trigger::Command)
        .await
        .unwrap();
    let transfer_id = ticket.request.transfer_id;

    match ticket.wait().await {
        TransferStatus::Failed {
            target, attempts, ..
        } => {
            assert_eq!(target, "lobby");
            assert_eq!(attempts, 2);
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let session = core.tracker().session(&client).await.unwrap();
    assert_eq!(session.state, SessionState::Failed);
    let failures: Vec<(u32, bool)> = session
        .run_history(transfer_id)
        .map(|r| (r.attempt, r.outcome.is_success()))
        .collect();
    assert_eq!(failures, vec![(1, false), (2, false)]);
    // No third attempt past the ceiling
    assert_eq!(host.call_count().await, 2);
}

#[tokio::test]
async fn hanging_host_fails_by_timeout() {
    let host = Arc::new(SimulatedHost::with_default(SimulatedResponse::Hang));
    let toml = LOBBY_SURVIVAL.replace("attempt_timeout_ms = 1000", "attempt_timeout_ms = 30");
    let core = core(&toml, host.clone());
    let client = ClientId::from("C");

    let ticket = core
        .request_transfer(&client, Some("lobby"), Trigger::Command)
        .await
        .unwrap();
    let status = tokio::time::timeout(Duration::from_secs(5), ticket.wait())
        .await
        .unwrap();

    match status {
        TransferStatus::Failed { attempts, reason, .. } => {
            assert_eq!(attempts, 2);
            assert!(reason.starts_with("timed out"), "unexpected reason {}", reason);
        }
        other => panic!("expected timeout failure, got {:?}", other),
    }

    let session = core.tracker().session(&client).await.unwrap();
    assert!(session
        .history
        .iter()
        .all(|r| matches!(r.outcome, AttemptOutcome::TimedOut { .. })));
    core.shutdown();
}

#[tokio::test]
async fn attempt_numbers_keep_increasing_across_runs() {
    let host = Arc::new(SimulatedHost::new());
    let client = ClientId::from("C");
    host.script(&client, [SimulatedResponse::Reject("busy".into())])
        .await;
    let core = core(LOBBY_SURVIVAL, host);

    let first = core
        .request_transfer(&client, Some("lobby"), Trigger::Command)
        .await
        .unwrap();
    let first_id = first.request.transfer_id;
    assert_eq!(
        first.wait().await,
        TransferStatus::Confirmed {
            target: "lobby".into(),
            attempts: 2
        }
    );

    let second = core
        .request_transfer(&client, Some("survival"), Trigger::Command)
        .await
        .unwrap();
    assert_ne!(second.request.transfer_id, first_id);
    assert_eq!(second.request.attempt, 3);
    assert_eq!(second.request.run_attempt, 1);
    assert_eq!(
        second.wait().await,
        TransferStatus::Confirmed {
            target: "survival".into(),
            attempts: 1
        }
    );

    let session = core.tracker().session(&client).await.unwrap();
    let numbers: Vec<u32> = session.history.iter().map(|r| r.attempt).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(
        core.tracker().current_server(&client).await,
        Some(survival())
    );
}

#[tokio::test]
async fn dropped_ticket_does_not_orphan_pending_session() {
    let host = Arc::new(SimulatedHost::new().with_latency(Duration::from_millis(50)));
    let core = core(LOBBY_SURVIVAL, host.clone());
    let client = ClientId::from("C");
    core.open_session(&client, Some(survival())).await;

    // The caller walks away right after starting the run
    let ticket = core
        .request_transfer(&client, Some("lobby"), Trigger::Command)
        .await
        .unwrap();
    drop(ticket);
    assert_eq!(core.tracker().state(&client).await, Some(SessionState::Pending));

    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while core.tracker().state(&client).await == Some(SessionState::Pending) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "session stayed pending");
    assert_eq!(core.tracker().state(&client).await, Some(SessionState::Confirmed));
    assert_eq!(host.call_count().await, 1);

    // A cancelled waiter task behaves the same way
    let ticket = core
        .request_transfer(&client, Some("survival"), Trigger::Command)
        .await
        .unwrap();
    let waiter = tokio::spawn(ticket.wait());
    waiter.abort();
    assert!(waiter.await.unwrap_err().is_cancelled());

    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while core.tracker().state(&client).await == Some(SessionState::Pending) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "session stayed pending");
    assert_eq!(core.tracker().state(&client).await, Some(SessionState::Confirmed));
    assert_eq!(core.tracker().current_server(&client).await, Some(survival()));
}

#[tokio::test]
async fn disconnect_during_transfer_ends_run() {
    let host = Arc::new(SimulatedHost::with_default(SimulatedResponse::Ack).with_latency(Duration::from_millis(50)));
    let core = core(LOBBY_SURVIVAL, host);
    let client = ClientId::from("C");

    let ticket = core
        .request_transfer(&client, Some("lobby"), Trigger::Command)
        .await
        .unwrap();
    core.close_session(&client).await.unwrap();

    match ticket.wait().await {
        TransferStatus::Failed { reason, .. } => assert_eq!(reason, "client disconnected"),
        other => panic!("expected failure, got {:?}", other),
    }

    // The late acknowledgement must not resurrect the session
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(core.tracker().session(&client).await.is_none());
}
