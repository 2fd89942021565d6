//! Queue-contract tests against the in-process backend: delivery, retry
//! with backoff, terminal-once, stable ids, and stats.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use surgemart::queue::{
    JobError, JobHandler, JobOptions, JobQueue, JobState, RetryPolicy, memory::MemoryQueue,
};
use uuid::Uuid;

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base: Duration::from_millis(5),
        cap: Duration::from_millis(20),
    }
}

fn handler_ok() -> JobHandler {
    Arc::new(|record| {
        Box::pin(async move { Ok(serde_json::json!({ "echo": record.payload })) })
    })
}

/// Poll until the job reaches a terminal state or the deadline passes.
async fn wait_terminal(queue: &MemoryQueue, job_id: Uuid) -> JobState {
    for _ in 0..200 {
        if let Some(job) = queue.get_job(job_id).await.unwrap() {
            if job.state == JobState::Completed || job.state == JobState::Failed {
                return job.state;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

#[tokio::test]
async fn job_completes_and_records_result() {
    let queue = MemoryQueue::new(fast_policy(3));
    queue.process("purchase", 2, handler_ok()).await.unwrap();

    let job_id = queue
        .add_job("purchase", serde_json::json!({"n": 1}), JobOptions::default())
        .await
        .unwrap();

    assert_eq!(wait_terminal(&queue, job_id).await, JobState::Completed);
    let job = queue.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 1);
    assert_eq!(job.result.unwrap()["echo"]["n"], 1);
    queue.close().await;
}

#[tokio::test]
async fn retriable_errors_are_retried_until_success() {
    let queue = MemoryQueue::new(fast_policy(5));
    let failures = Arc::new(AtomicU32::new(2));

    let failures_in_handler = Arc::clone(&failures);
    let handler: JobHandler = Arc::new(move |_record| {
        let failures = Arc::clone(&failures_in_handler);
        Box::pin(async move {
            if failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                Err(JobError::Retry("flaky dependency".into()))
            } else {
                Ok(serde_json::json!({ "ok": true }))
            }
        })
    });
    queue.process("purchase", 1, handler).await.unwrap();

    let job_id = queue
        .add_job("purchase", serde_json::json!({}), JobOptions::default())
        .await
        .unwrap();

    assert_eq!(wait_terminal(&queue, job_id).await, JobState::Completed);
    let job = queue.get_job(job_id).await.unwrap().unwrap();
    // Two failures then one success.
    assert_eq!(job.attempts, 3);
    queue.close().await;
}

#[tokio::test]
async fn retry_budget_exhaustion_fails_the_job() {
    let queue = MemoryQueue::new(fast_policy(3));
    let handler: JobHandler = Arc::new(|_record| {
        Box::pin(async move { Err(JobError::Retry("always down".into())) })
    });
    queue.process("purchase", 1, handler).await.unwrap();

    let job_id = queue
        .add_job("purchase", serde_json::json!({}), JobOptions::default())
        .await
        .unwrap();

    assert_eq!(wait_terminal(&queue, job_id).await, JobState::Failed);
    let job = queue.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 3);
    assert_eq!(job.last_error.as_deref(), Some("always down"));
    queue.close().await;
}

#[tokio::test]
async fn fatal_errors_do_not_retry() {
    let queue = MemoryQueue::new(fast_policy(5));
    let calls = Arc::new(AtomicU32::new(0));

    let calls_in_handler = Arc::clone(&calls);
    let handler: JobHandler = Arc::new(move |_record| {
        let calls = Arc::clone(&calls_in_handler);
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(JobError::Fail("malformed payload".into()))
        })
    });
    queue.process("purchase", 1, handler).await.unwrap();

    let job_id = queue
        .add_job("purchase", serde_json::json!({}), JobOptions::default())
        .await
        .unwrap();

    assert_eq!(wait_terminal(&queue, job_id).await, JobState::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    queue.close().await;
}

#[tokio::test]
async fn stable_job_id_survives_duplicate_adds() {
    let queue = MemoryQueue::new(fast_policy(3));
    let executions = Arc::new(AtomicU32::new(0));

    let executions_in_handler = Arc::clone(&executions);
    let handler: JobHandler = Arc::new(move |_record| {
        let executions = Arc::clone(&executions_in_handler);
        Box::pin(async move {
            executions.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({}))
        })
    });
    queue.process("purchase", 2, handler).await.unwrap();

    let id = Uuid::new_v4();
    let opts = || JobOptions {
        job_id: Some(id),
        ..JobOptions::default()
    };
    let first = queue
        .add_job("purchase", serde_json::json!({}), opts())
        .await
        .unwrap();
    let second = queue
        .add_job("purchase", serde_json::json!({}), opts())
        .await
        .unwrap();
    assert_eq!(first, id);
    assert_eq!(second, id);

    assert_eq!(wait_terminal(&queue, id).await, JobState::Completed);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    queue.close().await;
}

#[tokio::test]
async fn every_job_reaches_exactly_one_terminal_state_under_contention() {
    const JOBS: usize = 100;

    let queue = MemoryQueue::new(fast_policy(3));
    let executions = Arc::new(AtomicU32::new(0));

    let executions_in_handler = Arc::clone(&executions);
    let handler: JobHandler = Arc::new(move |_record| {
        let executions = Arc::clone(&executions_in_handler);
        Box::pin(async move {
            executions.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(serde_json::json!({}))
        })
    });
    queue.process("purchase", 8, handler).await.unwrap();

    let mut ids = Vec::with_capacity(JOBS);
    for _ in 0..JOBS {
        ids.push(
            queue
                .add_job("purchase", serde_json::json!({}), JobOptions::default())
                .await
                .unwrap(),
        );
    }

    for id in &ids {
        assert_eq!(wait_terminal(&queue, *id).await, JobState::Completed);
    }

    let stats = queue.get_stats().await.unwrap();
    assert_eq!(stats.completed, JOBS as u64);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(executions.load(Ordering::SeqCst), JOBS as u32);
    queue.close().await;
}

#[tokio::test]
async fn delayed_jobs_wait_for_their_delay() {
    let queue = MemoryQueue::new(fast_policy(3));
    queue.process("purchase", 1, handler_ok()).await.unwrap();

    let job_id = queue
        .add_job(
            "purchase",
            serde_json::json!({}),
            JobOptions {
                delay: Some(Duration::from_millis(80)),
                ..JobOptions::default()
            },
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    let job = queue.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Waiting);

    assert_eq!(wait_terminal(&queue, job_id).await, JobState::Completed);
    queue.close().await;
}

#[tokio::test]
async fn closed_queue_refuses_intake() {
    let queue = MemoryQueue::new(fast_policy(3));
    queue.close().await;
    let err = queue
        .add_job("purchase", serde_json::json!({}), JobOptions::default())
        .await;
    assert!(err.is_err());
}
