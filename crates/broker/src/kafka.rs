//! Kafka / Redpanda broker built on rdkafka
//!
//! Rebalance callbacks run on librdkafka's threads and are forwarded to the
//! dispatcher's listener synchronously, so ownership changes are applied
//! before any record of the new assignment can be fetched.

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::{
    Batch, BrokerClient, ContractError, DeliveryCallback, FetchError, Fetches, KafkaConfig,
    PartitionId, PartitionSet, Record, RecordMetadata, RecordPublisher, SharedListener,
    TopicAdmin,
};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientContext, TopicPartitionList};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{BrokerError, Result};

/// How long a fetch keeps collecting after the first message arrived
const FETCH_LINGER: Duration = Duration::from_millis(5);
const ADMIN_TIMEOUT: Duration = Duration::from_secs(10);

fn partition_set(list: &TopicPartitionList) -> PartitionSet {
    list.elements()
        .iter()
        .map(|elem| (elem.topic().to_string(), elem.partition()))
        .collect()
}

/// Consumer context forwarding rebalances to the dispatcher
pub struct DispatchContext {
    listener: SharedListener,
}

impl ClientContext for DispatchContext {}

impl ConsumerContext for DispatchContext {
    fn pre_rebalance(&self, base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Revoke(list) => {
                let partitions = partition_set(list);
                if partitions.is_empty() {
                    debug!("Skipping empty revoke");
                    return;
                }
                if base_consumer.assignment_lost() {
                    warn!(partitions = partitions.len(), "Partition ownership lost");
                    self.listener.on_lost(&partitions);
                } else {
                    info!(partitions = partitions.len(), "Partitions revoked");
                    self.listener.on_revoked(&partitions);
                }
            }
            Rebalance::Assign(list) => {
                debug!(partitions = list.count(), "Pre-rebalance assign");
            }
            Rebalance::Error(e) => error!(error = %e, "Rebalance error"),
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        if let Rebalance::Assign(list) = rebalance {
            let partitions = partition_set(list);
            if partitions.is_empty() {
                debug!("Skipping empty assign");
                return;
            }
            info!(partitions = partitions.len(), "Partitions assigned");
            if let Err(e) = self.listener.on_assigned(&partitions) {
                error!(error = %e, "Assignment rejected by dispatcher");
            }
        }
    }
}

/// Broker backed by a Kafka-compatible cluster
pub struct KafkaBroker {
    consumer: StreamConsumer<DispatchContext>,
    producer: FutureProducer,
    admin: AdminClient<DefaultClientContext>,
    consumer_topic: String,
    producer_topic: String,
    max_poll_records: usize,
    closed: CancellationToken,
    runtime: Handle,
}

impl KafkaBroker {
    /// Create consumer, producer and admin clients, then subscribe
    ///
    /// Must be called from within a tokio runtime: delivery acknowledgements
    /// are awaited on it.
    #[instrument(
        name = "kafka_broker_connect",
        skip(config, listener),
        fields(brokers = %config.connection.bootstrap_servers())
    )]
    pub fn connect(
        config: &KafkaConfig,
        max_poll_records: usize,
        listener: SharedListener,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| BrokerError::connection(e.to_string()))?;
        let brokers = config.connection.bootstrap_servers();

        let consumer: StreamConsumer<DispatchContext> = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &config.topics.consumer_group)
            .set(
                "session.timeout.ms",
                config.connection.session_timeout_ms.to_string(),
            )
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create_with_context(DispatchContext { listener })
            .map_err(|e| BrokerError::connection(format!("consumer: {e}")))?;

        consumer
            .subscribe(&[config.topics.consumer.as_str()])
            .map_err(|e| BrokerError::subscribe(&config.topics.consumer, e.to_string()))?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .create()
            .map_err(|e| BrokerError::connection(format!("producer: {e}")))?;

        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .create()
            .map_err(|e| BrokerError::connection(format!("admin: {e}")))?;

        info!(topic = %config.topics.consumer, "Kafka broker connected");

        Ok(Self {
            consumer,
            producer,
            admin,
            consumer_topic: config.topics.consumer.clone(),
            producer_topic: config.topics.producer.clone(),
            max_poll_records: max_poll_records.max(1),
            closed: CancellationToken::new(),
            runtime,
        })
    }
}

/// Accumulates messages of one fetch cycle grouped by partition
struct FetchBuilder {
    /// subscribed topic, for errors that only name a partition
    topic: String,
    partitions: BTreeMap<(String, PartitionId), Vec<Record>>,
    errors: Vec<FetchError>,
    records: usize,
}

impl FetchBuilder {
    fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            partitions: BTreeMap::new(),
            errors: Vec::new(),
            records: 0,
        }
    }

    fn push(&mut self, result: std::result::Result<BorrowedMessage<'_>, KafkaError>) {
        match result {
            Ok(message) => {
                let record = Record::new(
                    message.topic(),
                    message.partition(),
                    message.offset(),
                    message.key().map(bytes::Bytes::copy_from_slice).unwrap_or_default(),
                    message
                        .payload()
                        .map(bytes::Bytes::copy_from_slice)
                        .unwrap_or_default(),
                );
                self.partitions
                    .entry((message.topic().to_string(), message.partition()))
                    .or_default()
                    .push(record);
                self.records += 1;
            }
            Err(e) => self.errors.push(fetch_error(&self.topic, e)),
        }
    }

    fn finish(self) -> Fetches {
        Fetches {
            batches: self
                .partitions
                .into_iter()
                .map(|((topic, partition), records)| Batch::new(topic, partition, records))
                .collect(),
            errors: self.errors,
            client_closed: false,
        }
    }
}

/// Errors naming a partition stay scoped to it; the rest affect the client
fn fetch_error(topic: &str, error: KafkaError) -> FetchError {
    match error {
        KafkaError::PartitionEOF(partition) => {
            FetchError::partition(topic, partition, error.to_string())
        }
        other => FetchError::client(other.to_string()),
    }
}

impl BrokerClient for KafkaBroker {
    /// Wait for the first message, then linger briefly to fill the batch
    async fn fetch(&self) -> Fetches {
        if self.closed.is_cancelled() {
            return Fetches::closed();
        }

        let mut builder = FetchBuilder::new(self.consumer_topic.as_str());
        let first = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Fetches::closed(),
            message = self.consumer.recv() => message,
        };
        builder.push(first);

        while builder.records < self.max_poll_records && builder.errors.is_empty() {
            match tokio::time::timeout(FETCH_LINGER, self.consumer.recv()).await {
                Ok(message) => builder.push(message),
                Err(_) => break,
            }
        }

        builder.finish()
    }

    fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        self.consumer.unsubscribe();
        info!("Kafka broker closed");
    }
}

impl TopicAdmin for KafkaBroker {
    #[instrument(name = "kafka_ensure_topics", skip(self), fields(count = topics.len()))]
    async fn ensure_topics(
        &self,
        topics: &[String],
        partitions: i32,
    ) -> std::result::Result<(), ContractError> {
        let new_topics: Vec<NewTopic<'_>> = topics
            .iter()
            .map(|topic| NewTopic::new(topic, partitions, TopicReplication::Fixed(1)))
            .collect();
        let options = AdminOptions::new().operation_timeout(Some(ADMIN_TIMEOUT));

        let results = self
            .admin
            .create_topics(&new_topics, &options)
            .await
            .map_err(|e| ContractError::broker_connection(e.to_string()))?;

        for result in results {
            match result {
                Ok(topic) => info!(topic = %topic, partitions, "Topic created"),
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic = %topic, "Topic already exists");
                }
                Err((topic, code)) => {
                    return Err(ContractError::topic_creation(topic, code.to_string()));
                }
            }
        }
        Ok(())
    }
}

impl RecordPublisher for KafkaBroker {
    fn publish(
        &self,
        key: &[u8],
        value: &[u8],
        ack: DeliveryCallback,
    ) -> std::result::Result<(), ContractError> {
        let topic = self.producer_topic.clone();
        let record = FutureRecord::to(&topic).key(key).payload(value);

        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| ContractError::publish(&topic, e.to_string()))?;

        self.runtime.spawn(async move {
            let result = match delivery.await {
                Ok(Ok(delivered)) => Ok(RecordMetadata {
                    topic,
                    partition: delivered.partition,
                    offset: delivered.offset,
                }),
                Ok(Err((e, _))) => Err(ContractError::publish(&topic, e.to_string())),
                Err(_) => Err(ContractError::publish(&topic, "delivery future canceled")),
            };
            ack(result);
        });
        Ok(())
    }
}
