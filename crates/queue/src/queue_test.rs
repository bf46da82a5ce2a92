//! Drain-loop engine tests

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::timeout;

use crate::queue::{ProcessFn, Queue, QueueEvent};
use crate::registry::QueueRegistry;
use crate::settings::{QueueBackend, QueueSettings, TaskCodec};
use crate::QueueError;

const TICK: Duration = Duration::from_millis(10);
const DEADLINE: Duration = Duration::from_secs(5);

fn fast_settings() -> QueueSettings {
    QueueSettings {
        drain_interval: TICK,
        ..Default::default()
    }
}

/// Processing function that appends each task to `log` and fails for any
/// task named in `failing`.
fn recording(log: Arc<Mutex<Vec<String>>>, failing: &[&str]) -> ProcessFn<String> {
    let failing: HashSet<String> = failing.iter().map(|s| (*s).to_owned()).collect();
    Arc::new(move |task: String| {
        let log = Arc::clone(&log);
        let failing = failing.clone();
        Box::pin(async move {
            log.lock().push(task.clone());
            !failing.contains(&task)
        })
    })
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(DEADLINE, async {
        while !condition() {
            tokio::time::sleep(TICK).await;
        }
    })
    .await
    .expect("condition not reached before deadline");
}

#[tokio::test]
async fn test_tasks_process_in_fifo_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let queue = Queue::new(
        "fifo",
        fast_settings(),
        TaskCodec::json(),
        None,
        recording(Arc::clone(&log), &[]),
    )
    .unwrap();

    for task in ["one", "two", "three"] {
        queue.push(Some(task.into()), task.to_owned()).await.unwrap();
    }

    wait_until(|| log.lock().len() == 3).await;
    assert_eq!(*log.lock(), ["one", "two", "three"]);
    assert!(queue.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_rotation_moves_failing_task_to_tail() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let settings = QueueSettings {
        rotate: true,
        ..fast_settings()
    };
    let queue = Queue::new(
        "rotate",
        settings,
        TaskCodec::json(),
        None,
        recording(Arc::clone(&log), &["A"]),
    )
    .unwrap();

    for task in ["A", "B", "C"] {
        queue.push(Some(task.into()), task.to_owned()).await.unwrap();
    }

    // A fails and rotates to the tail, so B and C each succeed once while
    // A keeps being retried.
    wait_until(|| {
        let log = log.lock();
        log.iter().filter(|t| *t == "A").count() >= 3
    })
    .await;

    let observed = log.lock().clone();
    assert_eq!(observed[..4], ["A", "B", "C", "A"]);
    assert_eq!(observed.iter().filter(|t| *t == "B").count(), 1);
    assert_eq!(observed.iter().filter(|t| *t == "C").count(), 1);
    assert_eq!(queue.pending_ids().await.unwrap(), ["A"]);

    queue.quit().await;
}

#[tokio::test]
async fn test_failing_head_is_retried_without_rotation() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let queue = Queue::new(
        "head-retry",
        fast_settings(),
        TaskCodec::json(),
        None,
        recording(Arc::clone(&log), &["A"]),
    )
    .unwrap();
    let mut events = queue.subscribe();

    queue.push(Some("A".into()), "A".to_owned()).await.unwrap();
    queue.push(Some("B".into()), "B".to_owned()).await.unwrap();

    wait_until(|| log.lock().iter().filter(|t| *t == "A").count() >= 3).await;

    // B never ran: the failing head blocks it.
    assert!(!log.lock().contains(&"B".to_owned()));

    // Retry events carry an increasing consecutive-failure count.
    let mut retries = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let QueueEvent::Retried { id, attempt } = event {
            retries.push((id, attempt));
        }
    }
    assert!(retries.len() >= 2);
    assert_eq!(retries[0], ("A".to_owned(), 1));
    assert_eq!(retries[1], ("A".to_owned(), 2));

    queue.quit().await;
}

#[tokio::test]
async fn test_retry_ceiling_drops_task() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let settings = QueueSettings {
        max_retries: Some(2),
        ..fast_settings()
    };
    let queue = Queue::new(
        "ceiling",
        settings,
        TaskCodec::json(),
        None,
        recording(Arc::clone(&log), &["A"]),
    )
    .unwrap();
    let mut events = queue.subscribe();

    queue.push(Some("A".into()), "A".to_owned()).await.unwrap();
    queue.push(Some("B".into()), "B".to_owned()).await.unwrap();

    // A is attempted 1 + max_retries times, then dropped; B then succeeds.
    wait_until(|| log.lock().contains(&"B".to_owned())).await;
    assert_eq!(log.lock().iter().filter(|t| *t == "A").count(), 3);
    assert!(queue.is_empty().await.unwrap());

    let mut dropped = None;
    while let Ok(event) = events.try_recv() {
        if let QueueEvent::Dropped { id, attempts } = event {
            dropped = Some((id, attempts));
        }
    }
    assert_eq!(dropped, Some(("A".to_owned(), 3)));
}

#[tokio::test]
async fn test_max_timeout_counts_as_failure() {
    let settings = QueueSettings {
        max_timeout: Duration::from_millis(20),
        max_retries: Some(0),
        ..fast_settings()
    };
    let queue = Queue::new(
        "timeout",
        settings,
        TaskCodec::json(),
        None,
        Arc::new(|_task: String| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                true
            })
        }),
    )
    .unwrap();
    let mut events = queue.subscribe();

    queue.push(Some("slow".into()), "slow".to_owned()).await.unwrap();

    let mut timed_out_failure = false;
    let deadline = tokio::time::Instant::now() + DEADLINE;
    while tokio::time::Instant::now() < deadline {
        match timeout(DEADLINE, events.recv()).await {
            Ok(Ok(QueueEvent::Failed { timed_out, .. })) => {
                timed_out_failure = timed_out;
                break;
            }
            Ok(Ok(_)) => continue,
            _ => break,
        }
    }
    assert!(timed_out_failure, "expected a timed-out failure event");

    queue.quit().await;
}

#[tokio::test]
async fn test_worker_stops_when_drained_and_restarts_on_push() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let queue = Queue::new(
        "restart",
        fast_settings(),
        TaskCodec::json(),
        None,
        recording(Arc::clone(&log), &[]),
    )
    .unwrap();
    let mut events = queue.subscribe();

    queue.push(Some("one".into()), "one".to_owned()).await.unwrap();
    wait_until(|| log.lock().len() == 1).await;

    // Worker announces the drain...
    let mut drained = false;
    let deadline = tokio::time::Instant::now() + DEADLINE;
    while !drained && tokio::time::Instant::now() < deadline {
        if let Ok(Ok(event)) = timeout(DEADLINE, events.recv()).await {
            drained = event == QueueEvent::Drained;
        } else {
            break;
        }
    }
    assert!(drained);

    // ...and a later push starts it again.
    queue.push(Some("two".into()), "two".to_owned()).await.unwrap();
    wait_until(|| log.lock().len() == 2).await;
    assert_eq!(*log.lock(), ["one", "two"]);
}

#[tokio::test]
async fn test_id_precedence_caller_then_extractor_then_generated() {
    let queue = Queue::new(
        "ids",
        QueueSettings {
            // Processing never succeeds so pushed ids stay observable.
            drain_interval: Duration::from_secs(60),
            ..Default::default()
        },
        TaskCodec::json(),
        Some(Arc::new(|task: &String| {
            task.strip_prefix("ctl:").map(str::to_owned)
        })),
        Arc::new(|_| Box::pin(async { false })),
    )
    .unwrap();

    let explicit = queue
        .push(Some("given".into()), "ctl:x".to_owned())
        .await
        .unwrap();
    assert_eq!(explicit, "given");

    let extracted = queue.push(None, "ctl:abc".to_owned()).await.unwrap();
    assert_eq!(extracted, "abc");

    let generated = queue.push(None, "no prefix".to_owned()).await.unwrap();
    assert!(uuid::Uuid::parse_str(&generated).is_ok());

    queue.quit().await;
}

#[tokio::test]
async fn test_durable_queue_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();

    // First incarnation persists tasks but its processing never succeeds.
    {
        let settings = QueueSettings {
            backend: QueueBackend::File { path: path.clone() },
            drain_interval: Duration::from_secs(60),
            ..Default::default()
        };
        let queue = Queue::new(
            "durable",
            settings,
            TaskCodec::json(),
            None,
            Arc::new(|_: String| Box::pin(async { false })),
        )
        .unwrap();
        queue.push(Some("t1".into()), "one".to_owned()).await.unwrap();
        queue.push(Some("t2".into()), "two".to_owned()).await.unwrap();
        queue.quit().await;
    }

    // Second incarnation reads the index back and drains without any push.
    let log = Arc::new(Mutex::new(Vec::new()));
    let settings = QueueSettings {
        backend: QueueBackend::File { path },
        ..fast_settings()
    };
    let queue = Queue::new(
        "durable",
        settings,
        TaskCodec::json(),
        None,
        recording(Arc::clone(&log), &[]),
    )
    .unwrap();

    assert_eq!(queue.pending_ids().await.unwrap(), ["t1", "t2"]);
    wait_until(|| log.lock().len() == 2).await;
    assert_eq!(*log.lock(), ["one", "two"]);
    assert!(queue.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_registry_declares_once_and_rejects_redeclaration() {
    let registry = QueueRegistry::<String>::new();
    let noop: ProcessFn<String> = Arc::new(|_| Box::pin(async { true }));

    registry
        .declare("ch1.route.r1", fast_settings(), TaskCodec::json(), None, Arc::clone(&noop))
        .unwrap();
    assert_eq!(registry.len(), 1);
    assert!(registry.get("ch1.route.r1").is_some());
    assert!(registry.get("ch1.route.r2").is_none());

    let err = registry
        .declare("ch1.route.r1", fast_settings(), TaskCodec::json(), None, noop)
        .unwrap_err();
    assert!(matches!(err, QueueError::AlreadyConfigured { .. }));

    registry.shutdown().await;
}
