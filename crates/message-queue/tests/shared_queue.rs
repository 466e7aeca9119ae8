use std::sync::Arc;
use std::time::Duration;

use message_queue::{CompletionOutcome, PriorityQueue, QueueConfig, QueueError, SharedQueue};
use protocol::{ManualClock, Message, MessageMetadata, MessageType, Priority};

fn msg(id: &str) -> Arc<Message> {
    Arc::new(Message::new(
        MessageMetadata {
            message_id: id.to_string(),
            sender_id: "RSU_1".to_string(),
            message_type: MessageType::InfrastructureStatus,
            timestamp_ms: 0,
            priority_hint: 3,
            hop_count: 0,
            signature: None,
            previous_hop: None,
        },
        Default::default(),
    ))
}

fn shared(config: QueueConfig) -> (Arc<SharedQueue>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let queue = Arc::new(SharedQueue::new(PriorityQueue::new(config), clock.clone()));
    (queue, clock)
}

#[tokio::test]
async fn dequeue_timeout_returns_none_when_idle() {
    let (queue, _) = shared(QueueConfig::default());
    let result = queue
        .dequeue_timeout(Duration::from_millis(20))
        .await
        .expect("dequeue");
    assert!(result.is_none());
}

#[tokio::test]
async fn waiting_worker_wakes_on_enqueue() {
    let (queue, _) = shared(QueueConfig::default());
    let worker = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.dequeue_timeout(Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let id = queue.enqueue(msg("a"), Priority::High).expect("enqueue");

    let delivery = worker
        .await
        .expect("join")
        .expect("dequeue")
        .expect("delivery");
    assert_eq!(delivery.id(), id);
}

#[tokio::test]
async fn enqueue_timeout_applies_backpressure_then_proceeds_when_space_frees() {
    let (queue, clock) = shared(QueueConfig {
        capacity_per_priority: 1,
        ..QueueConfig::default()
    });
    queue.enqueue(msg("a"), Priority::Low).expect("first");

    let refused = queue
        .enqueue_timeout(msg("b"), Priority::Low, Duration::from_millis(10))
        .await;
    assert!(matches!(refused, Err(QueueError::Full { .. })));

    let producer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            queue
                .enqueue_timeout(msg("c"), Priority::Low, Duration::from_secs(5))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let delivery = queue.dequeue().expect("dequeue").expect("delivery");
    clock.advance(7);
    assert_eq!(
        queue.mark_completed(delivery.lease).expect("complete"),
        CompletionOutcome::Completed { duration_ms: 7 }
    );
    assert!(producer.await.expect("join").is_ok());
    assert_eq!(queue.snapshot().expect("snapshot").received, 2);
}

#[tokio::test]
async fn concurrent_workers_never_share_a_message() {
    let (queue, _) = shared(QueueConfig::default());
    for i in 0..200 {
        queue.enqueue(msg(&format!("m{i}")), Priority::Medium).expect("enqueue");
    }

    let mut workers = tokio::task::JoinSet::new();
    for _ in 0..4 {
        let queue = Arc::clone(&queue);
        workers.spawn(async move {
            let mut seen = Vec::new();
            while let Some(delivery) = queue
                .dequeue_timeout(Duration::from_millis(20))
                .await
                .expect("dequeue")
            {
                queue.mark_completed(delivery.lease).expect("complete");
                seen.push(delivery.id());
            }
            seen
        });
    }

    let mut all = Vec::new();
    while let Some(joined) = workers.join_next().await {
        all.extend(joined.expect("join"));
    }
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 200);
    let snapshot = queue.snapshot().expect("snapshot");
    assert_eq!(snapshot.processed, 200);
    assert_eq!(snapshot.in_flight, 0);
}

#[tokio::test]
async fn stuck_sweep_uses_the_shared_clock() {
    let (queue, clock) = shared(QueueConfig {
        processing_timeout_ms: 1_000,
        ..QueueConfig::default()
    });
    queue.enqueue(msg("a"), Priority::Critical).expect("enqueue");
    let stale = queue.dequeue().expect("dequeue").expect("delivery");

    clock.advance(1_001);
    let recovered = queue.sweep_stuck().expect("sweep");
    assert_eq!(recovered.len(), 1);
    assert!(matches!(
        queue.mark_completed(stale.lease),
        Err(QueueError::StaleLease { .. })
    ));
    let redelivered = queue.dequeue().expect("dequeue").expect("redelivery");
    assert_eq!(redelivered.retries, 1);
}

#[tokio::test]
async fn freed_slot_wakes_the_producer_of_its_own_class() {
    let (queue, _) = shared(QueueConfig {
        capacity_per_priority: 1,
        ..QueueConfig::default()
    });
    queue.enqueue(msg("crit-1"), Priority::Critical).expect("critical");
    queue.enqueue(msg("low-1"), Priority::Low).expect("low");

    let spawn_producer = |id: &'static str, priority: Priority| {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            queue
                .enqueue_timeout(msg(id), priority, Duration::from_secs(5))
                .await
        })
    };
    let critical_producer = spawn_producer("crit-2", Priority::Critical);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let low_producer = spawn_producer("low-2", Priority::Low);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let critical = queue.dequeue().expect("dequeue").expect("critical delivery");
    let low = queue.dequeue().expect("dequeue").expect("low delivery");
    assert_eq!(low.priority, Priority::Low);
    queue.mark_completed(low.lease).expect("complete low");

    let admitted = tokio::time::timeout(Duration::from_millis(500), low_producer)
        .await
        .expect("low producer woken by its own class")
        .expect("join");
    assert!(admitted.is_ok());
    assert!(!critical_producer.is_finished());

    queue.mark_completed(critical.lease).expect("complete critical");
    let admitted = tokio::time::timeout(Duration::from_millis(500), critical_producer)
        .await
        .expect("critical producer woken")
        .expect("join");
    assert!(admitted.is_ok());
}
