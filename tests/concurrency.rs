use std::sync::Arc;
use std::time::Duration;

use transfertool::config::{TargetEntry, TargetsConfig};
use transfertool::{
    ClientId, Destination, SessionState, TargetRegistry, TrackerConfig, TransferError,
    TransferTarget, TransferTracker, Trigger,
};

fn lobby() -> TransferTarget {
    TransferTarget::new("lobby", Destination::new("h1", 25565).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_begin_allows_one_pending_transfer() {
    let tracker = Arc::new(TransferTracker::new(TrackerConfig::default()));
    let client = ClientId::from("C");

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let tracker = tracker.clone();
            let client = client.clone();
            tokio::spawn(async move { tracker.begin_transfer(&client, lobby(), Trigger::Command).await })
        })
        .collect();

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(TransferError::AlreadyPending { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(rejected, 31);
    assert_eq!(tracker.pending_count().await, 1);
    let session = tracker.session(&client).await.unwrap();
    assert_eq!(session.current_attempt.unwrap().attempt, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sessions_of_different_clients_are_independent() {
    let tracker = Arc::new(TransferTracker::new(TrackerConfig::default()));
    let a = ClientId::from("A");
    let b = ClientId::from("B");

    let ticket_a = tracker
        .begin_transfer(&a, lobby(), Trigger::Command)
        .await
        .unwrap();
    tracker
        .begin_transfer(&b, lobby(), Trigger::Command)
        .await
        .unwrap();

    // Failing A's run leaves B untouched
    tracker.abort(&a, "operator").await.unwrap();

    let session_a = tracker.session(&a).await.unwrap();
    let session_b = tracker.session(&b).await.unwrap();
    assert_eq!(session_a.state, SessionState::Failed);
    assert_eq!(session_a.history.len(), 1);
    assert_eq!(session_b.state, SessionState::Pending);
    assert!(session_b.history.is_empty());
    assert!(!ticket_a.wait().await.is_confirmed());

    tracker.close_session(&b).await;
    assert!(tracker.session(&a).await.is_some());
    assert_eq!(tracker.session_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn registry_reload_is_atomic_for_readers() {
    fn generation(host: &str) -> TargetsConfig {
        ["alpha", "beta", "gamma", "delta"]
            .iter()
            .fold(TargetsConfig::default(), |cfg, name| {
                cfg.with(*name, TargetEntry::address(format!("{}-{}", host, name)))
            })
    }

    let old = generation("old");
    let new = generation("new");
    let registry = Arc::new(TargetRegistry::from_config(&old).unwrap());

    let writer = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for round in 0..200 {
                let next = if round % 2 == 0 { &new } else { &old };
                registry.load(next).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    let set = registry.snapshot().await;
                    let prefixes: Vec<&str> = set
                        .all()
                        .iter()
                        .map(|t| t.host().split('-').next().unwrap_or_default())
                        .collect();
                    assert_eq!(prefixes.len(), 4);
                    assert!(
                        prefixes.iter().all(|p| *p == prefixes[0]),
                        "mixed target set observed: {:?}",
                        prefixes
                    );
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(registry.generation(), 201);
}

#[tokio::test]
async fn attempts_never_exceed_ceiling() {
    let tracker = TransferTracker::new(TrackerConfig {
        attempt_timeout: Duration::from_secs(5),
        ..TrackerConfig::default()
    });
    let client = ClientId::from("C");
    let ceiling = tracker.config().limits.retry_ceiling;

    let ticket = tracker
        .begin_transfer(&client, lobby(), Trigger::Command)
        .await
        .unwrap();
    let id = ticket.request.transfer_id;

    let mut attempt = 1;
    loop {
        let resolution = tracker
            .report_outcome(
                &client,
                id,
                attempt,
                transfertool::AttemptOutcome::Rejected("busy".into()),
                None,
            )
            .await
            .unwrap();
        match resolution {
            transfertool::Resolution::Retry(next) => {
                assert_eq!(next.attempt, attempt + 1);
                assert!(next.attempt <= ceiling);
                attempt = next.attempt;
            }
            transfertool::Resolution::Failed(last) => {
                assert_eq!(last.attempt, ceiling);
                break;
            }
            other => panic!("unexpected resolution {:?}", other),
        }
    }

    let attempts: Vec<u32> = tracker
        .session(&client)
        .await
        .unwrap()
        .run_history(id)
        .map(|r| r.attempt)
        .collect();
    assert_eq!(attempts, (1..=ceiling).collect::<Vec<_>>());
}
