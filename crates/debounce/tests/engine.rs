//! End-to-end debounce behavior
//!
//! Timing tests run on a paused tokio clock, so "t" below is virtual time.

use debounce::{
    Burst, DebounceError, Debouncer, DebouncerBuilder, Scheduler, TimerHandle, TimerTask,
    WaitOutcome,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const DELAY: Duration = Duration::from_secs(2);

/// Records every fired burst as (key, combined)
#[derive(Clone, Default)]
struct Recorder {
    fired: Arc<Mutex<Vec<(String, String)>>>,
}

impl Recorder {
    fn callback(
        &self,
    ) -> impl FnOnce(Burst<()>) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync + 'static
    {
        let fired = Arc::clone(&self.fired);
        move |burst: Burst<()>| -> BoxFuture<'static, anyhow::Result<String>> {
            Box::pin(async move {
                fired.lock().push((burst.key.clone(), burst.combined.clone()));
                Ok(burst.combined)
            })
        }
    }

    fn fired(&self) -> Vec<(String, String)> {
        self.fired.lock().clone()
    }
}

fn fired(key: &str, combined: &str) -> (String, String) {
    (key.to_string(), combined.to_string())
}

#[tokio::test(start_paused = true)]
async fn test_two_events_in_window_fire_once_in_order() {
    let debouncer: Debouncer<(), String> = Debouncer::new();
    let recorder = Recorder::default();

    debouncer.submit("k", "e1", (), DELAY, recorder.callback()).unwrap();
    debouncer.submit("k", "e2", (), DELAY, recorder.callback()).unwrap();

    sleep(Duration::from_secs(10)).await;
    assert_eq!(recorder.fired(), vec![fired("k", "e1 e2")]);
}

#[tokio::test(start_paused = true)]
async fn test_concrete_scenario_hello_there_then_bye() {
    let debouncer: Debouncer<(), String> = Debouncer::new();
    let recorder = Recorder::default();
    let start = Instant::now();

    // t=0
    debouncer.submit("+1555", "hello", (), DELAY, recorder.callback()).unwrap();
    assert!(debouncer.is_pending("+1555"));

    // t=1: extends the burst, timer restarts
    sleep(Duration::from_secs(1)).await;
    debouncer.submit("+1555", "there", (), DELAY, recorder.callback()).unwrap();

    // t=2.9: the original deadline (t=2) has passed without firing
    sleep_until(start, Duration::from_millis(2_900)).await;
    assert!(recorder.fired().is_empty());
    assert!(debouncer.is_pending("+1555"));

    // t=3.1: fired exactly once
    sleep_until(start, Duration::from_millis(3_100)).await;
    assert_eq!(recorder.fired(), vec![fired("+1555", "hello there")]);
    assert!(!debouncer.is_pending("+1555"));

    // t=5: a fresh burst
    sleep_until(start, Duration::from_secs(5)).await;
    debouncer.submit("+1555", "bye", (), DELAY, recorder.callback()).unwrap();

    sleep_until(start, Duration::from_millis(6_900)).await;
    assert_eq!(recorder.fired().len(), 1);

    sleep_until(start, Duration::from_millis(7_100)).await;
    assert_eq!(
        recorder.fired(),
        vec![fired("+1555", "hello there"), fired("+1555", "bye")]
    );
}

async fn sleep_until(start: Instant, offset: Duration) {
    tokio::time::sleep_until(start + offset).await;
}

#[tokio::test(start_paused = true)]
async fn test_event_after_fire_starts_independent_burst() {
    let debouncer: Debouncer<(), String> = Debouncer::new();
    let recorder = Recorder::default();

    debouncer.submit("k", "first", (), DELAY, recorder.callback()).unwrap();
    sleep(DELAY * 2).await;
    debouncer.submit("k", "second", (), DELAY, recorder.callback()).unwrap();
    sleep(DELAY * 2).await;

    assert_eq!(
        recorder.fired(),
        vec![fired("k", "first"), fired("k", "second")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_superseded_waiter_resolves_immediately() {
    let debouncer: Debouncer<(), String> = Debouncer::new();
    let recorder = Recorder::default();
    let start = Instant::now();

    let first = tokio::spawn({
        let debouncer = debouncer.clone();
        let callback = recorder.callback();
        async move { debouncer.submit_and_wait("k", "e1", (), DELAY, callback).await }
    });

    sleep(Duration::from_millis(500)).await;
    let second = tokio::spawn({
        let debouncer = debouncer.clone();
        let callback = recorder.callback();
        async move { debouncer.submit_and_wait("k", "e2", (), DELAY, callback).await }
    });

    assert_eq!(first.await.unwrap(), Ok(WaitOutcome::Superseded));
    assert!(start.elapsed() < DELAY);

    assert_eq!(
        second.await.unwrap(),
        Ok(WaitOutcome::Fired("e1 e2".to_string()))
    );
    assert_eq!(recorder.fired(), vec![fired("k", "e1 e2")]);
}

#[tokio::test(start_paused = true)]
async fn test_non_blocking_event_supersedes_waiter() {
    let debouncer: Debouncer<(), String> = Debouncer::new();
    let recorder = Recorder::default();

    let ticket = debouncer
        .submit_waiting("k", "wait for me", (), DELAY, recorder.callback())
        .unwrap();
    debouncer.submit("k", "fire and forget", (), DELAY, recorder.callback()).unwrap();

    assert_eq!(ticket.wait().await, Ok(WaitOutcome::Superseded));
    sleep(DELAY * 2).await;
    assert_eq!(
        recorder.fired(),
        vec![fired("k", "wait for me fire and forget")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_pending_count_tracks_distinct_keys() {
    let debouncer: Debouncer<(), String> = Debouncer::new();
    let recorder = Recorder::default();

    assert_eq!(debouncer.pending_count(), 0);
    debouncer.submit("a", "1", (), DELAY, recorder.callback()).unwrap();
    debouncer.submit("b", "1", (), DELAY, recorder.callback()).unwrap();
    debouncer.submit("a", "2", (), DELAY, recorder.callback()).unwrap();
    assert_eq!(debouncer.pending_count(), 2);

    let mut keys = debouncer.pending_keys();
    keys.sort();
    assert_eq!(keys, ["a", "b"]);

    sleep(DELAY * 2).await;
    assert_eq!(debouncer.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_keys_do_not_interfere() {
    let debouncer: Debouncer<(), String> = Debouncer::new();
    let recorder = Recorder::default();

    let mut tasks = Vec::new();
    for key in ["alice", "bob", "carol"] {
        let debouncer = debouncer.clone();
        let recorder = recorder.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..5 {
                debouncer
                    .submit(key, format!("{}-{}", key, i), (), DELAY, recorder.callback())
                    .unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(debouncer.pending_count(), 3);

    sleep(DELAY * 2).await;

    let mut bursts = recorder.fired();
    bursts.sort();
    assert_eq!(bursts.len(), 3);
    for (key, combined) in bursts {
        let expected: Vec<String> = (0..5).map(|i| format!("{}-{}", key, i)).collect();
        assert_eq!(combined, expected.join(" "));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_submitters_fire_each_key_once() {
    let debouncer: Debouncer<(), String> = Debouncer::new();
    let recorder = Recorder::default();
    let delay = Duration::from_millis(200);

    let mut tasks = Vec::new();
    for key in 0..8 {
        for event in 0..10 {
            let debouncer = debouncer.clone();
            let recorder = recorder.clone();
            tasks.push(tokio::spawn(async move {
                debouncer
                    .submit(
                        format!("key-{}", key),
                        format!("k{}e{}", key, event),
                        (),
                        delay,
                        recorder.callback(),
                    )
                    .unwrap();
            }));
        }
    }
    for task in tasks {
        task.await.unwrap();
    }

    sleep(Duration::from_secs(1)).await;

    let bursts = recorder.fired();
    assert_eq!(bursts.len(), 8);
    for (key, combined) in bursts {
        let index = key.trim_start_matches("key-");
        let events: Vec<&str> = combined.split(' ').collect();
        assert_eq!(events.len(), 10);
        assert!(events.iter().all(|e| e.starts_with(&format!("k{}e", index))));
    }
    assert_eq!(debouncer.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_prevents_fire_and_releases_waiters() {
    let debouncer: Debouncer<(), String> = Debouncer::new();
    let recorder = Recorder::default();

    let ticket = debouncer
        .submit_waiting("a", "pending", (), DELAY, recorder.callback())
        .unwrap();
    debouncer.submit("b", "pending", (), DELAY, recorder.callback()).unwrap();

    assert_eq!(debouncer.cancel_all(), 2);
    assert_eq!(ticket.wait().await, Ok(WaitOutcome::Cancelled));
    assert!(!debouncer.is_pending("a"));
    assert_eq!(debouncer.pending_count(), 0);

    sleep(DELAY * 3).await;
    assert!(recorder.fired().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_all_races_in_flight_submits() {
    let debouncer: Debouncer<(), String> = Debouncer::new();
    let recorder = Recorder::default();
    let delay = Duration::from_millis(5);

    let mut tasks = Vec::new();
    for task in 0..6 {
        let debouncer = debouncer.clone();
        let recorder = recorder.clone();
        tasks.push(tokio::spawn(async move {
            let key = format!("key-{}", task % 3);
            for round in 0u64.. {
                let outcome = tokio::time::timeout(
                    Duration::from_secs(5),
                    debouncer.submit_and_wait(
                        key.as_str(),
                        format!("t{}r{}", task, round),
                        (),
                        delay,
                        recorder.callback(),
                    ),
                )
                .await
                .expect("waiter hung");

                match outcome {
                    Ok(WaitOutcome::Fired(_))
                    | Ok(WaitOutcome::Superseded)
                    | Ok(WaitOutcome::Cancelled) => {}
                    Err(DebounceError::ShuttingDown) => return round,
                    Err(other) => panic!("unexpected error: {}", other),
                }
            }
            unreachable!()
        }));
    }

    sleep(Duration::from_millis(30)).await;
    debouncer.cancel_all();
    assert!(!debouncer.is_accepting());

    for task in tasks {
        tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("submitter hung")
            .unwrap();
    }

    // Callbacks that were already running when the gate closed may finish.
    sleep(Duration::from_millis(50)).await;
    let frozen = recorder.fired().len();
    sleep(Duration::from_millis(200)).await;

    assert_eq!(recorder.fired().len(), frozen);
    assert_eq!(debouncer.pending_count(), 0);
    assert_eq!(debouncer.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_submit_after_shutdown_is_rejected() {
    let debouncer: Debouncer<(), String> = Debouncer::new();
    let recorder = Recorder::default();

    debouncer.cancel_all();
    assert!(!debouncer.is_accepting());

    let result = debouncer.submit("k", "late", (), DELAY, recorder.callback());
    assert_eq!(result, Err(DebounceError::ShuttingDown));

    let result = debouncer
        .submit_and_wait("k", "late", (), DELAY, recorder.callback())
        .await;
    assert_eq!(result, Err(DebounceError::ShuttingDown));
    assert_eq!(debouncer.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_callback_error_reaches_waiter_and_other_keys_survive() {
    let debouncer: Debouncer<(), String> = Debouncer::new();
    let recorder = Recorder::default();

    debouncer.submit("healthy", "ok", (), DELAY, recorder.callback()).unwrap();
    let outcome = debouncer
        .submit_and_wait("broken", "boom", (), DELAY, |_burst: Burst<()>| async move {
            Err::<String, _>(anyhow::anyhow!("responder unavailable"))
        })
        .await;

    assert_eq!(
        outcome,
        Err(DebounceError::Processing("responder unavailable".to_string()))
    );
    assert!(!debouncer.is_pending("broken"));

    sleep(DELAY).await;
    assert_eq!(recorder.fired(), vec![fired("healthy", "ok")]);

    // The failed key accepts new bursts
    let outcome = debouncer
        .submit_and_wait("broken", "retry", (), DELAY, recorder.callback())
        .await;
    assert_eq!(outcome, Ok(WaitOutcome::Fired("retry".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_callback_panic_is_contained() {
    let debouncer: Debouncer<(), String> = Debouncer::new();

    let outcome = debouncer
        .submit_and_wait("k", "x", (), DELAY, |_burst: Burst<()>| async move {
            if true {
                panic!("callback exploded");
            }
            Ok::<String, anyhow::Error>(String::new())
        })
        .await;

    assert_eq!(
        outcome,
        Err(DebounceError::Panicked("callback exploded".to_string()))
    );
    assert_eq!(debouncer.pending_count(), 0);
}

/// Scheduler that refuses every timer after a number of successes
struct FlakyScheduler {
    remaining: AtomicUsize,
}

impl Scheduler for FlakyScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> debounce::Result<TimerHandle> {
        let allowed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(DebounceError::Schedule("timer capacity exhausted".into()));
        }
        let join = tokio::spawn(async move {
            sleep(delay).await;
            task.await;
        });
        Ok(TimerHandle::from_abort_handle(join.abort_handle()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_scheduling_failure_drops_burst_and_reports_error() {
    let debouncer: Debouncer<(), String> = DebouncerBuilder::new()
        .scheduler(FlakyScheduler {
            remaining: AtomicUsize::new(1),
        })
        .build();
    let recorder = Recorder::default();

    let ticket = debouncer
        .submit_waiting("k", "accepted", (), DELAY, recorder.callback())
        .unwrap();
    let result = debouncer.submit("k", "refused", (), DELAY, recorder.callback());

    assert!(matches!(result, Err(DebounceError::Schedule(_))));
    assert_eq!(ticket.wait().await, Ok(WaitOutcome::Cancelled));
    assert!(!debouncer.is_pending("k"));

    sleep(DELAY * 2).await;
    assert!(recorder.fired().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_burst_metadata() {
    let debouncer: Debouncer<&'static str, (u64, usize, &'static str)> = Debouncer::new();
    let start = Instant::now();

    debouncer
        .submit("k", "a", "first", DELAY, |_burst: Burst<&'static str>| async move {
            Ok::<_, anyhow::Error>((0, 0, ""))
        })
        .unwrap();
    sleep(Duration::from_secs(1)).await;
    debouncer
        .submit("k", "b", "second", DELAY, |_burst: Burst<&'static str>| async move {
            Ok::<_, anyhow::Error>((0, 0, ""))
        })
        .unwrap();

    let outcome = debouncer
        .submit_and_wait("k", "c", "third", DELAY, move |burst: Burst<&'static str>| async move {
            assert_eq!(burst.created_at, start);
            Ok::<_, anyhow::Error>((burst.generation, burst.events.len(), burst.context))
        })
        .await;

    assert_eq!(outcome, Ok(WaitOutcome::Fired((2, 3, "third"))));
}
