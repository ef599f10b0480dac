//! Import Queue Tests
//!
//! ## Test Scopes
//! - **Receive**: Batching, batching window and publish order.
//! - **Visibility**: Redelivery after the timeout, delivery counts, visibility extension.
//! - **Acknowledge**: Delete and dead-letter.
//! - **Ordering**: Redelivered messages keep their place; receive cost stays flat as the
//!   backlog grows.
//! - **Limits**: Maximum depth.
//! - **Journal**: Replay, compaction on reopen and compaction while running.

#[cfg(test)]
mod tests {
    use crate::queue::{ImportQueue, MessageId, MessagePublisher, QueueError, QueueSettings};
    use crate::test_support::{card, minutes_after_base};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn queue_with_timeout(secs: u64) -> ImportQueue {
        ImportQueue::in_memory(QueueSettings {
            visibility_timeout: Duration::from_secs(secs),
            max_depth: None,
            ..QueueSettings::default()
        })
    }

    fn publish_cards(queue: &ImportQueue, count: usize) -> Vec<MessageId> {
        (0..count)
            .map(|i| {
                let record = card(
                    &format!("card-{i}"),
                    &format!("Card {i:02}"),
                    "tst",
                    &format!("{i}"),
                    minutes_after_base(0),
                );
                queue.enqueue(record).unwrap()
            })
            .collect()
    }

    fn temp_journal_path() -> PathBuf {
        std::env::temp_dir().join(format!("card-catalog-queue-{}.jsonl", uuid::Uuid::new_v4()))
    }

    // ============================================================
    // RECEIVE
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_receive_batch_caps_at_max() {
        let queue = queue_with_timeout(30);
        publish_cards(&queue, 25);

        let batch = queue.receive_batch(10, Duration::from_secs(10)).await;

        assert_eq!(batch.len(), 10);
        assert_eq!(queue.stats().in_flight, 10);
        assert_eq!(queue.stats().visible, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_returns_partial_batch_when_window_closes() {
        let queue = queue_with_timeout(30);
        publish_cards(&queue, 3);

        let batch = queue.receive_batch(10, Duration::from_secs(10)).await;
        assert_eq!(batch.len(), 3);

        let empty = queue.receive_batch(10, Duration::from_millis(500)).await;
        assert!(empty.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_is_oldest_first() {
        let queue = queue_with_timeout(30);
        let ids = publish_cards(&queue, 5);

        let batch = queue.receive_batch(5, Duration::from_secs(1)).await;
        let received: Vec<MessageId> = batch.into_iter().map(|m| m.message_id).collect();

        assert_eq!(received, ids);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_receiver_sees_late_publish() {
        let queue = Arc::new(queue_with_timeout(30));

        let receiver = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive_batch(2, Duration::from_secs(10)).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        publish_cards(&queue, 2);

        let batch = receiver.await.unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn test_publisher_trait_enqueues() {
        let queue = queue_with_timeout(30);
        let record = card("c1", "Island", "lea", "288", minutes_after_base(0));

        let id = queue.publish(record.clone()).await.unwrap();

        let batch = queue.receive_batch(1, Duration::from_millis(10)).await;
        assert_eq!(batch[0].message_id, id);
        assert_eq!(batch[0].record, record);
    }

    // ============================================================
    // VISIBILITY
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_message_is_redelivered_after_timeout() {
        let queue = queue_with_timeout(30);
        let ids = publish_cards(&queue, 1);

        let first = queue.receive_batch(1, Duration::from_millis(10)).await;
        assert_eq!(first[0].delivery_count, 1);

        // Still invisible before the timeout
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(queue.receive_batch(1, Duration::ZERO).await.is_empty());

        tokio::time::advance(Duration::from_secs(2)).await;
        let second = queue.receive_batch(1, Duration::ZERO).await;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].message_id, ids[0]);
        assert_eq!(second[0].delivery_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_visibility_postpones_redelivery() {
        let queue = queue_with_timeout(30);
        publish_cards(&queue, 1);

        let batch = queue.receive_batch(1, Duration::ZERO).await;
        let id = batch[0].message_id.clone();

        tokio::time::advance(Duration::from_secs(20)).await;
        queue.extend_visibility(&id).unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        // 40s after receive, but only 20s after the extension
        assert!(queue.receive_batch(1, Duration::ZERO).await.is_empty());
        assert_eq!(queue.stats().in_flight, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extended_message_is_redelivered_exactly_once() {
        let queue = queue_with_timeout(30);
        publish_cards(&queue, 1);

        let batch = queue.receive_batch(1, Duration::ZERO).await;
        let id = batch[0].message_id.clone();
        tokio::time::advance(Duration::from_secs(20)).await;
        queue.extend_visibility(&id).unwrap();

        // The original deadline passes without a redelivery
        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(queue.receive_batch(1, Duration::ZERO).await.is_empty());

        tokio::time::advance(Duration::from_secs(16)).await;
        let redelivered = queue.receive_batch(5, Duration::ZERO).await;
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].message_id, id);
        assert_eq!(redelivered[0].delivery_count, 2);
        assert!(queue.receive_batch(5, Duration::ZERO).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_redelivered_message_keeps_its_place_in_line() {
        let queue = queue_with_timeout(30);
        let ids = publish_cards(&queue, 1);

        queue.receive_batch(1, Duration::ZERO).await;
        let newer = publish_cards(&queue, 2);
        tokio::time::advance(Duration::from_secs(31)).await;

        let batch = queue.receive_batch(3, Duration::ZERO).await;
        let received: Vec<MessageId> = batch.into_iter().map(|m| m.message_id).collect();
        assert_eq!(received, vec![ids[0].clone(), newer[0].clone(), newer[1].clone()]);
    }

    #[tokio::test]
    async fn test_extend_visibility_requires_in_flight_message() {
        let queue = queue_with_timeout(30);
        let ids = publish_cards(&queue, 1);

        assert!(matches!(
            queue.extend_visibility(&ids[0]),
            Err(QueueError::NotFound(_))
        ));
        assert!(matches!(
            queue.extend_visibility(&MessageId::new()),
            Err(QueueError::NotFound(_))
        ));
    }

    // ============================================================
    // ACKNOWLEDGE
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_deleted_messages_are_never_redelivered() {
        let queue = queue_with_timeout(30);
        publish_cards(&queue, 3);

        let batch = queue.receive_batch(3, Duration::ZERO).await;
        let ids: Vec<MessageId> = batch.iter().map(|m| m.message_id.clone()).collect();

        assert_eq!(queue.delete(&ids[..2]).unwrap(), 2);
        // Unknown and repeated ids are ignored
        assert_eq!(queue.delete(&[ids[0].clone(), MessageId::new()]).unwrap(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        let redelivered = queue.receive_batch(3, Duration::ZERO).await;
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].message_id, ids[2]);
    }

    #[tokio::test]
    async fn test_dead_letter_parks_message() {
        let queue = queue_with_timeout(30);
        publish_cards(&queue, 2);

        let batch = queue.receive_batch(2, Duration::ZERO).await;
        let doomed = batch[0].message_id.clone();

        queue.dead_letter(&doomed, "store unavailable").unwrap();

        let stats = queue.stats();
        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(stats.in_flight, 1);
        assert_eq!(queue.len(), 1);

        let letters = queue.dead_letters();
        assert_eq!(letters[0].message.message_id, doomed);
        assert_eq!(letters[0].message.delivery_count, 1);
        assert_eq!(letters[0].reason, "store unavailable");

        assert!(matches!(
            queue.dead_letter(&doomed, "again"),
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_cost_does_not_grow_with_backlog() {
        // ARRANGE
        let queue = queue_with_timeout(30);
        let ids = publish_cards(&queue, 20_000);

        // ACT
        let started = std::time::Instant::now();
        let mut received = Vec::new();
        for _ in 0..100 {
            let batch = queue.receive_batch(10, Duration::ZERO).await;
            let batch_ids: Vec<MessageId> = batch.into_iter().map(|m| m.message_id).collect();
            queue.delete(&batch_ids).unwrap();
            received.extend(batch_ids);
        }
        let elapsed = started.elapsed();

        // ASSERT
        assert_eq!(received, ids[..1_000].to_vec());
        assert_eq!(queue.len(), 19_000);
        assert!(
            elapsed < Duration::from_secs(2),
            "100 batches took {elapsed:?} with a 20k backlog"
        );
    }

    // ============================================================
    // LIMITS
    // ============================================================

    #[tokio::test]
    async fn test_max_depth_rejects_publish() {
        let queue = ImportQueue::in_memory(QueueSettings {
            visibility_timeout: Duration::from_secs(30),
            max_depth: Some(2),
            ..QueueSettings::default()
        });
        publish_cards(&queue, 2);

        let overflow = queue.enqueue(card("x", "Overflow", "tst", "1", minutes_after_base(0)));
        assert!(matches!(overflow, Err(QueueError::Full { max_depth: 2 })));

        // Draining makes room again
        let batch = queue.receive_batch(1, Duration::ZERO).await;
        queue.delete(&[batch[0].message_id.clone()]).unwrap();
        assert!(
            queue
                .enqueue(card("y", "Room", "tst", "2", minutes_after_base(0)))
                .is_ok()
        );
    }

    // ============================================================
    // JOURNAL
    // ============================================================

    #[tokio::test]
    async fn test_journal_restores_undeleted_messages() {
        let path = temp_journal_path();

        let (kept, dead) = {
            let queue = ImportQueue::open(QueueSettings::default(), &path).unwrap();
            let ids = publish_cards(&queue, 4);

            let batch = queue.receive_batch(4, Duration::ZERO).await;
            assert_eq!(batch.len(), 4);
            queue.delete(&ids[..2]).unwrap();
            queue.dead_letter(&ids[3], "poison").unwrap();
            (ids[2].clone(), ids[3].clone())
        };

        let reopened = ImportQueue::open(QueueSettings::default(), &path).unwrap();

        // The in-flight message came back visible
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.stats().visible, 1);
        assert_eq!(reopened.dead_letters()[0].message.message_id, dead);

        let batch = reopened.receive_batch(10, Duration::ZERO).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].message_id, kept);
        assert_eq!(batch[0].record.card_id, "card-2");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_journal_is_compacted_on_open() {
        let path = temp_journal_path();

        {
            let queue = ImportQueue::open(QueueSettings::default(), &path).unwrap();
            let ids = publish_cards(&queue, 5);
            queue.delete(&ids[..4]).unwrap();
        }
        let lines_before = std::fs::read_to_string(&path).unwrap().lines().count();
        assert_eq!(lines_before, 9);

        let reopened = ImportQueue::open(QueueSettings::default(), &path).unwrap();
        let lines_after = std::fs::read_to_string(&path).unwrap().lines().count();
        assert_eq!(lines_after, 1);

        // Publish order continues after the replayed sequence
        let later = reopened
            .enqueue(card("late", "Late Card", "tst", "9", minutes_after_base(5)))
            .unwrap();
        let batch = reopened.receive_batch(2, Duration::ZERO).await;
        assert_eq!(batch[0].record.card_id, "card-4");
        assert_eq!(batch[1].message_id, later);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_journal_is_compacted_while_running() {
        // ARRANGE
        let path = temp_journal_path();
        let settings = QueueSettings {
            journal_compaction_min_lines: 64,
            ..QueueSettings::default()
        };
        let queue = ImportQueue::open(settings.clone(), &path).unwrap();
        let kept = publish_cards(&queue, 20);

        // ACT: churn through many more messages than the threshold
        let mut max_lines = 0;
        for round in 0..500 {
            let id = queue
                .enqueue(card(
                    &format!("churn-{round}"),
                    "Churn",
                    "tst",
                    &format!("{round}"),
                    minutes_after_base(0),
                ))
                .unwrap();
            if round % 50 == 0 {
                queue.dead_letter(&id, "poison").unwrap();
            } else {
                queue.delete(&[id]).unwrap();
            }
            let lines = std::fs::read_to_string(&path).unwrap().lines().count();
            max_lines = max_lines.max(lines);
        }

        // ASSERT
        assert!(max_lines <= 64, "journal grew to {max_lines} lines");
        drop(queue);

        let reopened = ImportQueue::open(settings, &path).unwrap();
        assert_eq!(reopened.len(), 20);
        assert_eq!(reopened.dead_letters().len(), 10);
        let batch = reopened.receive_batch(20, Duration::ZERO).await;
        let received: Vec<MessageId> = batch.iter().map(|m| m.message_id.clone()).collect();
        assert_eq!(received, kept);
        assert!(batch.iter().all(|m| m.delivery_count == 1));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_journal_skips_torn_line() {
        let path = temp_journal_path();
        {
            let queue = ImportQueue::open(QueueSettings::default(), &path).unwrap();
            publish_cards(&queue, 2);
        }
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{\"op\":\"published\",\"seq\":");
        std::fs::write(&path, contents).unwrap();

        let reopened = ImportQueue::open(QueueSettings::default(), &path).unwrap();
        assert_eq!(reopened.len(), 2);

        let _ = std::fs::remove_file(&path);
    }
}
