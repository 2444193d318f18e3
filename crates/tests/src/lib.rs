//! # Integration Tests
//!
//! Scenario tests driving `MockBroker` + `Dispatcher` end to end: ownership
//! tracking, per-partition ordering, revocation and shutdown behaviour.

#[cfg(test)]
mod contract_tests {
    use contracts::{ContractError, PartitionSet};

    #[test]
    fn test_duplicate_assignment_error_names_partition() {
        let err = ContractError::duplicate_assignment("orders", 3);
        let message = err.to_string();
        assert!(message.contains("orders"), "got: {message}");
        assert!(message.contains('3'), "got: {message}");
    }

    #[test]
    fn test_partition_set_builder() {
        let set = PartitionSet::new().with("a", [0, 1]).with("b", [2]);
        assert_eq!(set.len(), 3);
        assert!(set.contains("a", 1));
        assert!(!set.contains("b", 0));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use broker::MockBroker;
    use contracts::{
        Batch, BrokerClient, ContractError, Fetches, PartitionSet, Record, RecordHandler,
        RecordMetadata, RecordPublisher, SharedHandler, TopicAdmin, TopicPartition,
    };
    use dispatcher::{
        Dispatcher, DispatcherBuilder, DispatcherConfig, DispatcherError, PartitionWorker,
        PollExit,
    };
    use tokio::time::{sleep, timeout};

    const TOPIC: &str = "topicA";

    type Seen = Arc<Mutex<Vec<String>>>;

    /// Handler that records every value it is called with
    fn recording_handler() -> (SharedHandler, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = move |_key: &[u8], value: &[u8]| -> Result<(), ContractError> {
            sink.lock()
                .unwrap()
                .push(String::from_utf8_lossy(value).into_owned());
            Ok(())
        };
        (Arc::new(handler), seen)
    }

    fn start_with(
        handler: SharedHandler,
        config: DispatcherConfig,
    ) -> (Arc<MockBroker>, Dispatcher<MockBroker>) {
        let builder = DispatcherBuilder::new(config, handler).unwrap();
        let broker = Arc::new(MockBroker::new(builder.listener(), TOPIC));
        let dispatcher = builder.start(Arc::clone(&broker));
        (broker, dispatcher)
    }

    fn start(handler: SharedHandler) -> (Arc<MockBroker>, Dispatcher<MockBroker>) {
        start_with(handler, DispatcherConfig::default())
    }

    fn values(prefix: &str, range: std::ops::Range<usize>) -> Vec<(&'static str, String)> {
        range.map(|i| ("k", format!("{prefix}-{i}"))).collect()
    }

    fn seen_with_prefix(seen: &Seen, prefix: &str) -> Vec<String> {
        seen.lock()
            .unwrap()
            .iter()
            .filter(|v| v.starts_with(prefix))
            .cloned()
            .collect()
    }

    async fn wait_for_count(seen: &Seen, expected: usize) {
        timeout(Duration::from_secs(2), async {
            while seen.lock().unwrap().len() < expected {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("handler was not invoked in time");
    }

    /// Gives the poll loop and workers a chance to act on queued batches
    async fn settle() {
        sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_registry_matches_net_ownership() {
        let (handler, _) = recording_handler();
        let (broker, dispatcher) = start(handler);
        let mut owned = BTreeSet::new();

        // Deterministic mix of assign / revoke / lost over six partitions
        for step in 0..60i32 {
            let partition = (step * 7 + step / 5) % 6;
            let set = PartitionSet::new().with(TOPIC, [partition]);
            if !owned.contains(&partition) {
                broker.assign(&set).unwrap();
                owned.insert(partition);
            } else if step % 2 == 0 {
                broker.revoke(&set);
                owned.remove(&partition);
            } else {
                broker.lose(&set);
                owned.remove(&partition);
            }

            let expected = PartitionSet::new().with(TOPIC, owned.iter().copied());
            assert_eq!(dispatcher.owned_partitions(), expected, "step {step}");
        }

        // Releasing partitions that were never owned changes nothing
        broker.revoke(&PartitionSet::new().with("other", [0]));
        broker.lose(&PartitionSet::new().with(TOPIC, [42]));
        assert_eq!(
            dispatcher.owned_partitions(),
            PartitionSet::new().with(TOPIC, owned.iter().copied())
        );

        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_sees_each_record_once_in_offset_order() {
        let (handler, seen) = recording_handler();
        let (broker, dispatcher) = start(handler);

        broker
            .assign(&PartitionSet::new().with(TOPIC, [0]))
            .unwrap();
        let mut first_offsets = Vec::new();
        for batch in 0..4 {
            first_offsets.push(
                broker
                    .deliver(TOPIC, 0, values("p0", batch * 5..batch * 5 + 5))
                    .unwrap(),
            );
        }
        assert_eq!(first_offsets, vec![0, 5, 10, 15]);

        wait_for_count(&seen, 20).await;
        settle().await;

        let expected: Vec<String> = (0..20).map(|i| format!("p0-{i}")).collect();
        assert_eq!(*seen.lock().unwrap(), expected);

        let metrics = dispatcher.worker_metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].1.batches_received, 4);
        assert_eq!(metrics[0].1.records_handled, 20);

        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_handler_call_after_revoke_with_batches_in_flight() {
        let gate = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicU64::new(0));
        let handler: SharedHandler = {
            let gate = Arc::clone(&gate);
            let calls = Arc::clone(&calls);
            Arc::new(move |_key: &[u8], _value: &[u8]| -> Result<(), ContractError> {
                calls.fetch_add(1, Ordering::SeqCst);
                while !gate.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Ok(())
            })
        };
        let (broker, dispatcher) = start(handler);

        broker
            .assign(&PartitionSet::new().with(TOPIC, [0]))
            .unwrap();
        broker.deliver(TOPIC, 0, values("a", 0..5)).unwrap();
        broker.deliver(TOPIC, 0, values("b", 0..5)).unwrap();

        // First record is inside the handler, the rest are queued
        timeout(Duration::from_secs(2), async {
            while calls.load(Ordering::SeqCst) == 0 {
                sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("handler never started");

        broker.revoke(&PartitionSet::new().with(TOPIC, [0]));
        gate.store(true, Ordering::SeqCst);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        broker.deliver(TOPIC, 0, values("c", 0..5)).unwrap();
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(dispatcher.owned_partitions().is_empty());

        let stats = dispatcher.shutdown().await.unwrap();
        assert!(stats.batches_discarded >= 1);
    }

    #[tokio::test]
    async fn test_double_stop_is_harmless() {
        let (handler, seen) = recording_handler();
        let worker = PartitionWorker::spawn(
            TopicPartition::new(TOPIC, 0),
            Arc::clone(&handler),
            4,
            &tokio::runtime::Handle::current(),
        );

        assert!(worker.stop());
        assert!(!worker.stop());
        worker.join().await;
        assert!(seen.lock().unwrap().is_empty());

        // Same through the broker: revoke, revoke again, then lost
        let (broker, dispatcher) = start(handler);
        let set = PartitionSet::new().with(TOPIC, [0]);
        broker.assign(&set).unwrap();
        broker.revoke(&set);
        broker.revoke(&set);
        broker.lose(&set);
        settle().await;
        assert!(seen.lock().unwrap().is_empty());

        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_partition_does_not_throttle_others() {
        let gate = Arc::new(AtomicBool::new(false));
        let (recorder, seen) = recording_handler();
        let handler: SharedHandler = {
            let gate = Arc::clone(&gate);
            Arc::new(move |key: &[u8], value: &[u8]| -> Result<(), ContractError> {
                if value.starts_with(b"p0") {
                    while !gate.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
                recorder.handle(key, value)
            })
        };
        let (broker, dispatcher) = start_with(handler, DispatcherConfig { queue_capacity: 1 });

        broker
            .assign(&PartitionSet::new().with(TOPIC, [0, 1]))
            .unwrap();
        // p0-0 parks the worker, p0-1 fills its one-slot queue
        broker.deliver(TOPIC, 0, values("p0", 0..1)).unwrap();
        broker.deliver(TOPIC, 0, values("p0", 1..2)).unwrap();
        settle().await;

        // One fetch carrying a batch for the full partition and one for p1
        let tagged = |partition: i32, value: &str| {
            Batch::new(
                TOPIC,
                partition,
                vec![Record::new(TOPIC, partition, 10, "k", value.to_string())],
            )
        };
        broker
            .push(Fetches::from_batches(vec![
                tagged(0, "p0-2"),
                tagged(1, "p1-0"),
            ]))
            .unwrap();

        wait_for_count(&seen, 1).await;
        assert_eq!(*seen.lock().unwrap(), ["p1-0"]);

        gate.store(true, Ordering::SeqCst);
        wait_for_count(&seen, 4).await;
        assert_eq!(seen_with_prefix(&seen, "p0"), ["p0-0", "p0-1", "p0-2"]);

        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_assign_revoke_scenario() {
        let (handler, seen) = recording_handler();
        let (broker, dispatcher) = start(handler);

        broker
            .assign(&PartitionSet::new().with(TOPIC, [0, 1]))
            .unwrap();
        broker.deliver(TOPIC, 0, values("p0", 0..3)).unwrap();
        broker.deliver(TOPIC, 1, values("p1", 0..3)).unwrap();
        wait_for_count(&seen, 6).await;

        assert_eq!(seen_with_prefix(&seen, "p0"), ["p0-0", "p0-1", "p0-2"]);
        assert_eq!(seen_with_prefix(&seen, "p1"), ["p1-0", "p1-1", "p1-2"]);

        broker.revoke(&PartitionSet::new().with(TOPIC, [0]));
        broker.deliver(TOPIC, 0, values("p0", 3..6)).unwrap();
        broker.deliver(TOPIC, 1, values("p1", 3..5)).unwrap();
        wait_for_count(&seen, 8).await;
        settle().await;

        assert_eq!(seen_with_prefix(&seen, "p0").len(), 3);
        assert_eq!(
            seen_with_prefix(&seen, "p1"),
            ["p1-0", "p1-1", "p1-2", "p1-3", "p1-4"]
        );

        let stats = dispatcher.shutdown().await.unwrap();
        assert_eq!(stats.batches_routed, 3);
        assert_eq!(stats.batches_discarded, 1);
    }

    #[tokio::test]
    async fn test_assign_then_immediately_lost() {
        let (handler, seen) = recording_handler();
        let (broker, dispatcher) = start(handler);

        let set = PartitionSet::new().with(TOPIC, [0]);
        broker.assign(&set).unwrap();
        broker.lose(&set);
        settle().await;

        assert!(seen.lock().unwrap().is_empty());
        assert!(dispatcher.owned_partitions().is_empty());
        assert!(dispatcher.is_running());

        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_client_closed_stops_fetching() {
        let (handler, _) = recording_handler();
        let (broker, dispatcher) = start(handler);

        broker.push(Fetches::closed()).unwrap();
        let stats = timeout(Duration::from_secs(2), dispatcher.wait())
            .await
            .expect("poll loop did not exit")
            .unwrap();

        assert_eq!(stats.exit, PollExit::ClientClosed);
        assert_eq!(stats.fetches, 1);
        assert_eq!(broker.fetch_calls(), 1);
        assert!(broker.is_closed());
    }

    #[tokio::test]
    async fn test_close_wakes_pending_fetch() {
        let (handler, _) = recording_handler();
        let (broker, dispatcher) = start(handler);

        settle().await;
        broker.close();
        let stats = timeout(Duration::from_secs(2), dispatcher.wait())
            .await
            .expect("close did not wake the poll loop")
            .unwrap();
        assert_eq!(stats.exit, PollExit::ClientClosed);
    }

    #[tokio::test]
    async fn test_fetch_errors_do_not_stop_processing() {
        let (handler, seen) = recording_handler();
        let (broker, dispatcher) = start(handler);

        broker
            .assign(&PartitionSet::new().with(TOPIC, [0]))
            .unwrap();
        broker.fail(TOPIC, 0, "leader not available").unwrap();
        broker.deliver(TOPIC, 0, values("p0", 0..2)).unwrap();
        wait_for_count(&seen, 2).await;

        let stats = dispatcher.shutdown().await.unwrap();
        assert_eq!(stats.fetch_errors, 1);
        assert_eq!(stats.records_routed, 2);
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_stop_partition() {
        let handled = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&handled);
        let handler: SharedHandler = Arc::new(
            move |_key: &[u8], value: &[u8]| -> Result<(), ContractError> {
                counter.fetch_add(1, Ordering::SeqCst);
                if value == b"bad" {
                    return Err(ContractError::handler("rejected"));
                }
                Ok(())
            },
        );
        let (broker, dispatcher) = start(handler);

        broker
            .assign(&PartitionSet::new().with(TOPIC, [0]))
            .unwrap();
        broker
            .deliver(TOPIC, 0, [("k", "ok"), ("k", "bad"), ("k", "ok")])
            .unwrap();

        timeout(Duration::from_secs(2), async {
            while handled.load(Ordering::SeqCst) < 3 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("records after the failure were not handled");

        let metrics = dispatcher.worker_metrics();
        assert_eq!(metrics[0].1.handler_failures, 1);
        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_assignment_halts_dispatcher() {
        let (handler, _) = recording_handler();
        let (broker, dispatcher) = start(handler);

        let set = PartitionSet::new().with(TOPIC, [0]);
        broker.assign(&set).unwrap();
        let err = broker.assign(&set).unwrap_err();
        assert!(matches!(err, ContractError::DuplicateAssignment { .. }));

        let result = timeout(Duration::from_secs(2), dispatcher.wait())
            .await
            .expect("halt did not stop the poll loop");
        assert!(matches!(
            result,
            Err(DispatcherError::Halted(ContractError::DuplicateAssignment {
                partition: 0,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn test_publish_round_trip() {
        let (handler, seen) = recording_handler();
        let (broker, dispatcher) = start(handler);

        broker.ensure_topics(&[TOPIC.to_string()], 1).await.unwrap();
        broker
            .assign(&PartitionSet::new().with(TOPIC, [0]))
            .unwrap();

        let acks: Arc<Mutex<Vec<RecordMetadata>>> = Arc::default();
        for message in ["first", "second"] {
            let acks = Arc::clone(&acks);
            broker
                .publish(
                    b"user-1",
                    message.as_bytes(),
                    Box::new(move |result: Result<RecordMetadata, ContractError>| {
                        acks.lock().unwrap().push(result.unwrap());
                    }),
                )
                .unwrap();
        }
        wait_for_count(&seen, 2).await;

        assert_eq!(*seen.lock().unwrap(), ["first", "second"]);
        let offsets: Vec<i64> = acks.lock().unwrap().iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 1]);

        dispatcher.shutdown().await.unwrap();
        assert!(broker
            .publish(b"k", b"v", Box::new(|_: Result<RecordMetadata, ContractError>| {}))
            .is_err());
    }

    #[tokio::test]
    async fn test_shutdown_stops_workers_and_closes_broker() {
        let (handler, _) = recording_handler();
        let (broker, dispatcher) = start_with(handler, DispatcherConfig { queue_capacity: 1 });

        broker
            .assign(&PartitionSet::new().with(TOPIC, [0, 1, 2]))
            .unwrap();
        assert_eq!(dispatcher.owned_partitions().len(), 3);

        dispatcher.shutdown().await.unwrap();
        assert!(broker.is_closed());

        // Late assignments after shutdown are ignored
        broker
            .assign(&PartitionSet::new().with(TOPIC, [3]))
            .unwrap();
    }

    #[tokio::test]
    async fn test_config_drives_dispatcher() {
        let config = config_loader::ConfigLoader::load_from_str(
            r#"
[kafka.connection]
brokers = ["localhost:9092"]

[kafka.topics]
producer = "topicA"
consumer = "topicA"
consumer_group = "dispatchers"
partitions = 2

[dispatcher]
queue_capacity = 2
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let (handler, seen) = recording_handler();
        let (broker, dispatcher) =
            start_with(handler, DispatcherConfig::from(&config.dispatcher));
        let topics = &config.kafka.topics;
        broker
            .ensure_topics(&topics.all(), topics.partitions)
            .await
            .unwrap();
        assert_eq!(broker.partition_count(TOPIC), Some(2));

        broker
            .assign(&PartitionSet::new().with(&topics.consumer, 0..topics.partitions))
            .unwrap();
        for i in 0..6 {
            broker
                .publish(
                    format!("key-{i}").as_bytes(),
                    format!("msg-{i}").as_bytes(),
                    Box::new(|_: Result<RecordMetadata, ContractError>| {}),
                )
                .unwrap();
        }
        wait_for_count(&seen, 6).await;

        dispatcher.shutdown().await.unwrap();
    }
}
