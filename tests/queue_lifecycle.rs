//! End-to-end queue lifecycle scenarios.
//!
//! Exercises the public contract the way an embedding application would:
//! enqueue with routing, dequeue, drive a backend, complete/fail, inspect
//! statistics, and round-trip a snapshot across a fresh instance.

use prompt_router::queue::BatchConfig;
use prompt_router::{
    Backend, CostModelConfig, EchoBackend, EnqueueOptions, PromptStatus, QueueConfig, WorkQueue,
};

fn queue() -> WorkQueue {
    WorkQueue::new(QueueConfig::default()).unwrap()
}

fn enqueue_with_priority(queue: &mut WorkQueue, text: &str, priority: u8) -> String {
    queue
        .enqueue(
            text,
            EnqueueOptions {
                priority: Some(priority),
                ..EnqueueOptions::default()
            },
        )
        .unwrap()
        .id
}

// ── Ordering ───────────────────────────────────────────────────────────

#[test]
fn priorities_5_1_3_dequeue_as_1_3_5() {
    let mut queue = queue();
    let p5 = enqueue_with_priority(&mut queue, "routine cleanup task", 5);
    let p1 = enqueue_with_priority(&mut queue, "production incident task", 1);
    let p3 = enqueue_with_priority(&mut queue, "scheduled report task", 3);

    assert_eq!(queue.dequeue().unwrap().id, p1);
    assert_eq!(queue.dequeue().unwrap().id, p3);
    assert_eq!(queue.dequeue().unwrap().id, p5);
    assert!(queue.dequeue().is_none());
}

// ── Routing ────────────────────────────────────────────────────────────

#[test]
fn simple_prompt_routes_to_local_backend_without_fallback() {
    let mut queue = queue();
    let receipt = queue
        .enqueue(
            "explain recursion",
            EnqueueOptions {
                priority: Some(10),
                ..EnqueueOptions::default()
            },
        )
        .unwrap();
    assert!(receipt.route.local, "simple prompts stay local: {receipt:?}");
    assert!(!receipt.route.fallback);
    assert_eq!(receipt.route.estimated_cost, 0.0);
}

#[test]
fn exhausted_budget_surfaces_fallback_flag_not_error() {
    let config = QueueConfig {
        cost: CostModelConfig {
            budget_ceiling: Some(0.0),
            ..CostModelConfig::default()
        },
        ..QueueConfig::default()
    };
    let mut queue = WorkQueue::new(config).unwrap();
    // Complex enough that no stock local model clears the quality floor
    let prompt = "Debug the distributed cache protocol:\n1. reproduce the failure\n2. analyze the logs\n3. design a fix";
    let receipt = queue.enqueue(prompt, EnqueueOptions::default()).unwrap();
    assert!(receipt.route.fallback, "expected fallback: {receipt:?}");
    assert!(receipt.route.local);
}

// ── Lifecycle and statistics ───────────────────────────────────────────

#[test]
fn complete_updates_counters_and_ledger() {
    let mut queue = queue();
    let id = enqueue_with_priority(&mut queue, "explain recursion", 5);
    let record = queue.dequeue().unwrap();
    assert_eq!(record.status, PromptStatus::Processing);

    assert!(queue.complete(&id, "a function that calls itself"));
    let status = queue.status();
    assert_eq!(status.pending_count, 0);
    assert_eq!(status.in_flight_count, 0);
    assert_eq!(status.completed_count, 1);
    assert_eq!(status.per_complexity.get("simple").copied(), Some(1));
    assert_eq!(status.ledger.history_len, 1);
}

#[test]
fn unknown_ids_return_false_and_leave_statistics_unchanged() {
    let mut queue = queue();
    enqueue_with_priority(&mut queue, "some pending work", 5);
    let before = queue.status();
    assert!(!queue.complete("ghost-id", "result"));
    assert!(!queue.fail("ghost-id", "error"));
    assert_eq!(queue.status(), before);
}

#[test]
fn failed_item_surfaces_caller_error_verbatim() {
    let mut queue = queue();
    let id = enqueue_with_priority(&mut queue, "doomed request", 5);
    queue.dequeue().unwrap();
    let error = "HTTP 529 overloaded: {\"retry_after\": 30}";
    assert!(queue.fail(&id, error));
    assert_eq!(queue.record(&id).unwrap().error.as_deref(), Some(error));
}

// ── Batching ───────────────────────────────────────────────────────────

#[test]
fn three_similar_prompts_form_a_ready_batch() {
    let mut queue = queue();
    let first = queue
        .enqueue(
            "summarize the quarterly sales report",
            EnqueueOptions::default(),
        )
        .unwrap();
    let batch_id = queue
        .record(&first.id)
        .unwrap()
        .batch_id
        .clone()
        .expect("non-urgent items should be batched");
    assert!(queue.ready_batch(&batch_id).is_none());

    queue
        .enqueue(
            "summarize the quarterly sales numbers",
            EnqueueOptions::default(),
        )
        .unwrap();
    assert!(queue.ready_batch(&batch_id).is_none());

    queue
        .enqueue(
            "summarize this quarterly sales report",
            EnqueueOptions::default(),
        )
        .unwrap();
    let batch = queue
        .ready_batch(&batch_id)
        .expect("third similar prompt should make the batch ready");
    assert_eq!(batch.len(), 3);
    // Members stay in the main queue; batching only groups
    assert_eq!(queue.pending_len(), 3);
}

#[test]
fn flush_batches_drains_open_groups() {
    let config = QueueConfig {
        batch: BatchConfig {
            min_ready_size: 3,
            ..BatchConfig::default()
        },
        ..QueueConfig::default()
    };
    let mut queue = WorkQueue::new(config).unwrap();
    queue
        .enqueue("enumerate open invoices", EnqueueOptions::default())
        .unwrap();
    queue
        .enqueue("compose a birthday greeting", EnqueueOptions::default())
        .unwrap();
    let flushed = queue.flush_batches();
    assert_eq!(flushed.len(), 2);
    assert_eq!(queue.open_batches(), 0);
}

// ── Similarity lookup ──────────────────────────────────────────────────

#[test]
fn find_similar_ranks_pending_items() {
    let mut queue = queue();
    let close = enqueue_with_priority(&mut queue, "restart the billing service", 5);
    enqueue_with_priority(&mut queue, "restart the billing service now", 5);
    enqueue_with_priority(&mut queue, "write release notes for tuesday", 5);

    let matches = queue.find_similar("restart the billing service", 0.5);
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, close, "exact text should rank first");
    assert!(matches[0].similarity >= matches[1].similarity);
}

// ── Snapshot round trip ────────────────────────────────────────────────

#[test]
fn export_import_reproduces_status_counts() {
    let mut queue = queue();
    enqueue_with_priority(&mut queue, "pending item one", 5);
    enqueue_with_priority(&mut queue, "pending item two", 2);
    let done = enqueue_with_priority(&mut queue, "finished item", 1);
    queue.dequeue().unwrap();
    queue.complete(&done, "done");
    let inflight = enqueue_with_priority(&mut queue, "processing item", 0);
    queue.dequeue().unwrap();

    let exported = queue.export().unwrap();
    let mut restored = WorkQueue::new(QueueConfig::default()).unwrap();
    restored.import(&exported).unwrap();

    assert_eq!(restored.status(), queue.status());
    // The restored instance keeps working: finish the in-flight record
    assert!(restored.complete(&inflight, "finished after restart"));
    assert_eq!(restored.status().completed_count, 2);
}

#[test]
fn import_rejects_garbage_and_preserves_state() {
    let mut queue = queue();
    enqueue_with_priority(&mut queue, "survives a bad import", 5);
    let before = queue.status();
    assert!(queue.import("{not json at all").is_err());
    assert_eq!(queue.status(), before);
}

// ── Backend drive ──────────────────────────────────────────────────────

#[tokio::test]
async fn dequeued_record_drives_a_backend_to_completion() {
    let mut queue = queue();
    let id = enqueue_with_priority(&mut queue, "explain recursion", 5);
    let record = queue.dequeue().unwrap();

    let backend = EchoBackend::with_delay(1);
    match backend.generate(&record.text, &record.route.model).await {
        Ok(generation) => {
            assert!(queue.complete(&record.id, &generation.text));
        }
        Err(e) => {
            assert!(queue.fail(&record.id, &e.to_string()));
        }
    }

    let stored = queue.record(&id).unwrap();
    assert_eq!(stored.status, PromptStatus::Completed);
    assert!(stored
        .result
        .as_deref()
        .unwrap()
        .contains("explain recursion"));
}

#[tokio::test]
async fn shared_queue_serializes_access_across_tasks() {
    let shared = WorkQueue::shared(QueueConfig::default()).unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let queue = shared.clone();
        handles.push(tokio::spawn(async move {
            let mut guard = queue.lock().await;
            guard
                .enqueue(
                    &format!("task number {i} from a spawned worker"),
                    EnqueueOptions::default(),
                )
                .map(|receipt| receipt.id)
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut guard = shared.lock().await;
    assert_eq!(guard.status().pending_count, 8);
    while let Some(record) = guard.dequeue() {
        guard.complete(&record.id, "done");
    }
    assert_eq!(guard.status().completed_count, 8);
}
