//! Job registry integration tests
//!
//! Covers the observable contract of the registry:
//! - progress accounting and the single completion callback
//! - failure isolation between units
//! - status queries, eviction and unknown ids
//! - idle sweeping with soft and hard timeouts

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use btecify_jobs::{
    completion, spawn_sweeper, JobError, JobRegistry, JobSnapshot, SweepPolicy, UnitError,
};
use btecify_test_utils::{delayed_err, delayed_ok, manual_unit, wait_for, CallCounter};
use rstest::rstest;
use tokio_util::sync::CancellationToken;

fn counting_callback(counter: &CallCounter) -> btecify_jobs::CompletionCallback {
    let counter = counter.clone();
    completion(move || async move {
        counter.hit();
        Ok(())
    })
}

fn test_policy() -> SweepPolicy {
    SweepPolicy::new(
        Duration::from_secs(30),
        Duration::from_secs(30),
        Duration::from_secs(180),
    )
}

// =============================================================================
// Progress and completion
// =============================================================================

#[tokio::test]
async fn test_progress_is_monotonic_and_bounded() {
    let registry = JobRegistry::new(test_policy());

    let (triggers, units): (Vec<_>, Vec<_>) = (0..5).map(|_| manual_unit()).unzip();
    let job_id = registry.submit(units, None).await;

    let mut observed = vec![registry.get(&job_id).unwrap().progress];
    for (done, trigger) in triggers.into_iter().enumerate() {
        trigger.succeed();

        let registry = registry.clone();
        let id = job_id.clone();
        assert!(
            wait_for(
                || {
                    let registry = registry.clone();
                    let id = id.clone();
                    async move { registry.peek(&id).unwrap().progress == done + 1 }
                },
                1_000,
                1,
            )
            .await
        );
        observed.push(registry.get(&job_id).unwrap().progress);
    }

    assert_eq!(observed, vec![0, 1, 2, 3, 4, 5]);
    assert!(observed.windows(2).all(|w| w[0] <= w[1]));

    let snapshot = registry.get(&job_id).unwrap();
    assert_eq!(snapshot.progress, snapshot.size);
    assert!(snapshot.status);
}

#[tokio::test]
async fn test_status_stays_false_until_last_unit() {
    let registry = JobRegistry::new(test_policy());

    let (first, unit_a) = manual_unit();
    let (second, unit_b) = manual_unit();
    let job_id = registry.submit(vec![unit_a, unit_b], None).await;

    first.succeed();
    let reg = registry.clone();
    let id = job_id.clone();
    assert!(
        wait_for(
            || {
                let reg = reg.clone();
                let id = id.clone();
                async move { reg.peek(&id).unwrap().progress == 1 }
            },
            1_000,
            1,
        )
        .await
    );

    let partial = registry.get(&job_id).unwrap();
    assert_eq!(partial.progress, 1);
    assert!(!partial.status);

    second.succeed();
    let reg = registry.clone();
    let id = job_id.clone();
    assert!(
        wait_for(
            || {
                let reg = reg.clone();
                let id = id.clone();
                async move { reg.peek(&id).unwrap().status }
            },
            1_000,
            1,
        )
        .await
    );
    assert_eq!(registry.get(&job_id).unwrap().progress, 2);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(7)]
#[case(32)]
#[tokio::test]
async fn test_callback_fires_exactly_once(#[case] size: usize) {
    let registry = JobRegistry::new(test_policy());
    let counter = CallCounter::new();

    let units = (0..size).map(|i| delayed_ok(Duration::from_millis((i % 4) as u64), i));
    let ticket = registry
        .submit_tracked(units, Some(counting_callback(&counter)))
        .await;
    let job_id = ticket.id().clone();

    let results = ticket.results().await;
    assert_eq!(results.len(), size);

    let c = counter.clone();
    assert!(wait_for(move || {
        let c = c.clone();
        async move { c.count() == 1 }
    }, 1_000, 1)
    .await);

    // Give any stray second invocation a chance to show up.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(counter.count(), 1);

    let snapshot = registry.get(&job_id).unwrap();
    assert_eq!(snapshot.progress, size);
    assert!(snapshot.status);
}

#[tokio::test]
async fn test_callback_observes_final_state() {
    let registry = JobRegistry::new(test_policy());
    let seen: Arc<Mutex<Vec<JobSnapshot>>> = Arc::default();

    let callback = {
        let registry = registry.clone();
        let seen = Arc::clone(&seen);
        completion(move || async move {
            seen.lock().unwrap().extend(registry.snapshots());
            Ok(())
        })
    };

    let units = (0..4).map(|i| delayed_ok(Duration::from_millis(4 - i), i));
    registry.submit(units, Some(callback)).await;

    let s = Arc::clone(&seen);
    assert!(wait_for(move || {
        let s = Arc::clone(&s);
        async move { !s.lock().unwrap().is_empty() }
    }, 1_000, 1)
    .await);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].progress, 4);
    assert!(seen[0].status);
}

#[tokio::test]
async fn test_zero_size_job_completes_immediately() {
    let registry = JobRegistry::new(test_policy());
    let counter = CallCounter::new();

    let units: Vec<std::future::Ready<Result<(), String>>> = Vec::new();
    let job_id = registry
        .submit(units, Some(counting_callback(&counter)))
        .await;

    assert_eq!(counter.count(), 1);

    let snapshot = registry.get(&job_id).unwrap();
    assert_eq!(snapshot.size, 0);
    assert_eq!(snapshot.progress, 0);
    assert!(snapshot.status);
}

#[tokio::test]
async fn test_zero_size_callback_runs_when_submit_future_is_dropped() {
    let registry = JobRegistry::new(test_policy());
    let counter = CallCounter::new();

    let units: Vec<std::future::Ready<Result<(), String>>> = Vec::new();
    drop(registry.submit(units, Some(counting_callback(&counter))));

    let c = counter.clone();
    assert!(wait_for(move || {
        let c = c.clone();
        async move { c.count() == 1 }
    }, 1_000, 1)
    .await);

    let snapshots = registry.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].status);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completion_race() {
    const UNITS: u64 = 50;

    let registry = JobRegistry::new(test_policy());
    let counter = CallCounter::new();

    // Unit i finishes after a delay proportional to (50 - i), so the last
    // submitted unit finishes first.
    let units = (0..UNITS).map(|i| delayed_ok(Duration::from_millis((UNITS - i) * 2), i));
    let ticket = registry
        .submit_tracked(units, Some(counting_callback(&counter)))
        .await;
    let job_id = ticket.id().clone();

    let results = ticket.results().await;
    let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(values, (0..UNITS).collect::<Vec<_>>());

    let c = counter.clone();
    assert!(wait_for(move || {
        let c = c.clone();
        async move { c.count() >= 1 }
    }, 2_000, 5)
    .await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = registry.get(&job_id).unwrap();
    assert_eq!(snapshot.progress, UNITS as usize);
    assert!(snapshot.status);
    assert_eq!(counter.count(), 1);
}

// =============================================================================
// Failure handling
// =============================================================================

#[test_log::test(tokio::test)]
async fn test_failing_unit_is_isolated() {
    let registry = JobRegistry::new(test_policy());
    let counter = CallCounter::new();

    let units = (1..=5).map(|n| {
        let delay = Duration::from_millis(n);
        async move {
            if n == 3 {
                delayed_err::<u64>(delay, "unit 3 failed").await
            } else {
                delayed_ok(delay, n * 10).await
            }
        }
    });

    let ticket = registry
        .submit_tracked(units, Some(counting_callback(&counter)))
        .await;
    let job_id = ticket.id().clone();
    let results = ticket.results().await;

    assert_eq!(results[0], Ok(10));
    assert_eq!(results[1], Ok(20));
    assert_eq!(
        results[2],
        Err(UnitError::Failed("unit 3 failed".to_string()))
    );
    assert_eq!(results[3], Ok(40));
    assert_eq!(results[4], Ok(50));

    let snapshot = registry.get(&job_id).unwrap();
    assert_eq!(snapshot.progress, 5);
    assert!(snapshot.status);

    let c = counter.clone();
    assert!(wait_for(move || {
        let c = c.clone();
        async move { c.count() == 1 }
    }, 1_000, 1)
    .await);
}

#[tokio::test]
async fn test_panicking_unit_counts_as_failure() {
    let registry = JobRegistry::new(test_policy());

    let units: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = Result<u8, String>> + Send>>> = vec![
        Box::pin(async { Ok(1) }),
        Box::pin(async {
            if true {
                panic!("decoder exploded");
            }
            Ok(2)
        }),
    ];

    let ticket = registry.submit_tracked(units, None).await;
    let job_id = ticket.id().clone();
    let results = ticket.results().await;

    assert_eq!(results[0], Ok(1));
    assert_matches!(&results[1], Err(UnitError::Panicked(msg)) if msg.contains("decoder exploded"));

    let snapshot = registry.get(&job_id).unwrap();
    assert_eq!(snapshot.progress, 2);
    assert!(snapshot.status);
}

#[tokio::test]
async fn test_failing_callback_does_not_corrupt_state() {
    let registry = JobRegistry::new(test_policy());
    let counter = CallCounter::new();

    let callback = {
        let counter = counter.clone();
        completion(move || async move {
            counter.hit();
            anyhow::bail!("database unavailable")
        })
    };

    let units = (0..3).map(|i| delayed_ok(Duration::from_millis(i), i));
    let ticket = registry.submit_tracked(units, Some(callback)).await;
    let job_id = ticket.id().clone();
    ticket.results().await;

    let c = counter.clone();
    assert!(wait_for(move || {
        let c = c.clone();
        async move { c.count() == 1 }
    }, 1_000, 1)
    .await);

    let snapshot = registry.get(&job_id).unwrap();
    assert_eq!(snapshot.progress, 3);
    assert!(snapshot.status);
}

// =============================================================================
// Queries and eviction
// =============================================================================

#[tokio::test]
async fn test_unknown_id() {
    let registry = JobRegistry::new(test_policy());
    let (_trigger, unit) = manual_unit();
    let existing = registry.submit(vec![unit], None).await;

    assert!(registry.get("not-a-real-id").is_none());
    assert!(!registry.evict("not-a-real-id"));
    assert_eq!(
        registry.require("not-a-real-id"),
        Err(JobError::NotFound("not-a-real-id".to_string()))
    );

    // No side effects on other jobs.
    assert_eq!(registry.len(), 1);
    assert!(registry.contains(&existing));
}

#[tokio::test]
async fn test_evict_removes_visibility_and_cancels_units() {
    let registry = JobRegistry::new(test_policy());
    let counter = CallCounter::new();

    let (_trigger, pending) = manual_unit();
    let (done_trigger, done) = manual_unit();
    let ticket = registry
        .submit_tracked(vec![pending, done], Some(counting_callback(&counter)))
        .await;
    let job_id = ticket.id().clone();

    done_trigger.succeed();
    let reg = registry.clone();
    let id = job_id.clone();
    assert!(wait_for(move || {
        let reg = reg.clone();
        let id = id.clone();
        async move { reg.peek(&id).map(|s| s.progress) == Some(1) }
    }, 1_000, 1)
    .await);

    assert!(registry.evict(&job_id));
    assert!(registry.get(&job_id).is_none());
    assert!(!registry.evict(&job_id));

    let results = ticket.results().await;
    assert_eq!(results[0], Err(UnitError::Cancelled));
    assert_eq!(results[1], Ok(()));
    assert_eq!(counter.count(), 0);
}

#[tokio::test]
async fn test_ids_are_unique() {
    let registry = JobRegistry::new(test_policy());
    let mut ids = std::collections::HashSet::new();

    for _ in 0..200 {
        let units: Vec<std::future::Ready<Result<(), String>>> = Vec::new();
        let id = registry.submit(units, None).await;
        registry.evict(&id);
        assert!(ids.insert(id));
    }
}

// =============================================================================
// Sweeping
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_query_keeps_unfinished_job_alive() {
    let registry = JobRegistry::new(test_policy());
    let (_trigger, unit) = manual_unit();
    let job_id = registry.submit(vec![unit], None).await;

    // Poll every 20s for well past the hard timeout.
    for _ in 0..15 {
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(registry.get(&job_id).is_some());
        assert!(registry.sweep().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn test_unfinished_job_survives_soft_timeout() {
    let registry = JobRegistry::new(test_policy());
    let (_trigger, unit) = manual_unit();
    let job_id = registry.submit(vec![unit], None).await;

    tokio::time::advance(Duration::from_secs(120)).await;
    assert!(registry.sweep().is_empty());
    assert!(registry.contains(&job_id));
}

#[tokio::test(start_paused = true)]
async fn test_hard_timeout_evicts_regardless_of_status() {
    let registry = JobRegistry::new(test_policy());
    let (_trigger, unit) = manual_unit();
    let job_id = registry.submit(vec![unit], None).await;

    tokio::time::advance(Duration::from_secs(181)).await;
    let report = registry.sweep();

    assert_eq!(report.abandoned.len(), 1);
    assert_eq!(report.abandoned[0].id, job_id);
    assert!(!report.abandoned[0].status);
    assert!(report.completed.is_empty());
    assert!(registry.get(&job_id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_soft_timeout_reclaims_completed_jobs() {
    let registry = JobRegistry::new(test_policy());
    let units: Vec<std::future::Ready<Result<(), String>>> = Vec::new();
    let job_id = registry.submit(units, None).await;

    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(registry.sweep().is_empty());

    // The final poll refreshes the timer.
    assert!(registry.get(&job_id).unwrap().status);
    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(registry.sweep().is_empty());

    tokio::time::advance(Duration::from_secs(2)).await;
    let report = registry.sweep();
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].id, job_id);
    assert!(registry.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_does_not_interfere_with_new_jobs() {
    let policy = SweepPolicy::new(
        Duration::from_secs(30),
        Duration::ZERO,
        Duration::from_secs(180),
    );
    let registry = JobRegistry::new(policy);

    for _ in 0..100 {
        let units: Vec<std::future::Ready<Result<(), String>>> = Vec::new();
        registry.submit(units, None).await;
    }

    let sweeping = {
        let registry = registry.clone();
        tokio::spawn(async move {
            let mut evicted = 0;
            for _ in 0..200 {
                evicted += registry.sweep().evicted();
                tokio::task::yield_now().await;
            }
            evicted
        })
    };

    let mut triggers = Vec::new();
    let mut new_ids = Vec::new();
    for _ in 0..100 {
        let (trigger, unit) = manual_unit();
        triggers.push(trigger);
        new_ids.push(registry.submit(vec![unit], None).await);
        tokio::task::yield_now().await;
    }

    let evicted = sweeping.await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    registry.sweep();

    assert!(evicted <= 100);
    for id in &new_ids {
        assert!(registry.contains(id), "new job {} was swept", id);
    }
    assert_eq!(registry.len(), new_ids.len());
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_task_evicts_and_stops() {
    let registry = JobRegistry::new(test_policy());
    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(registry.clone(), shutdown.clone());

    let units: Vec<std::future::Ready<Result<(), String>>> = Vec::new();
    let job_id = registry.submit(units, None).await;

    let reg = registry.clone();
    let id = job_id.clone();
    assert!(wait_for(move || {
        let reg = reg.clone();
        let id = id.clone();
        async move { !reg.contains(&id) }
    }, 120_000, 1_000)
    .await);

    shutdown.cancel();
    sweeper.await.unwrap();
}
