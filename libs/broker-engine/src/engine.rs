use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{BrokerConfig, EngineConfig};
use crate::cursor::CursorStore;
use crate::error::BrokerError;
use crate::record::ProducerRecord;
use crate::stream::DeliveryStream;
use crate::subscription::Subscription;
use crate::topic::{Topic, TopicInfo, TopicRegistry};

/// Where a produced record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Produced {
    pub partition: u32,
    pub offset: u64,
}

/// One partition of a group's progress on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPartitionOffset {
    pub partition: u32,
    /// Next offset the group will receive.
    pub position: u64,
    pub length: u64,
    pub lag: u64,
    /// A delivery stream currently owns this cursor.
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub topics: usize,
    pub partitions: usize,
    pub records: u64,
    pub groups: usize,
    pub active_streams: usize,
}

struct EngineInner {
    config: EngineConfig,
    topics: TopicRegistry,
    cursors: CursorStore,
    shutdown: CancellationToken,
}

/// The broker engine: owns every topic and consumer group cursor.
///
/// Cloning yields another handle to the same engine. State lives until the
/// last handle drops; [`BrokerEngine::shutdown`] ends all live delivery
/// streams and fails further calls with [`BrokerError::ShuttingDown`].
#[derive(Clone)]
pub struct BrokerEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for BrokerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerEngine")
            .field("topics", &self.inner.topics)
            .field("config", &self.inner.config)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Default for BrokerEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl BrokerEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                topics: TopicRegistry::new(),
                cursors: CursorStore::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Build an engine and create every topic the configuration declares.
    pub fn bootstrap(config: &BrokerConfig) -> Result<Self, BrokerError> {
        config.validate()?;
        let engine = Self::new(config.engine.clone());
        let ctx = CancellationToken::new();
        for topic in &config.topics {
            engine
                .create_topic(&ctx, &topic.name, topic.partitions)
                .map_err(|e| e.with_context(format!("topic '{}'", topic.name)))?;
        }
        Ok(engine)
    }

    /// Apply a changed configuration to a running engine.
    ///
    /// New topics are created. Removing a topic is rejected because topics
    /// cannot be deleted at runtime. Partition counts of existing topics are
    /// immutable, so a changed count is logged and ignored. Engine limits are
    /// fixed at construction.
    pub fn reload(&self, old: &BrokerConfig, new: &BrokerConfig) -> Result<(), BrokerError> {
        new.validate()?;

        for old_topic in &old.topics {
            if !new.topics.iter().any(|t| t.name == old_topic.name) {
                return Err(BrokerError::Config(format!(
                    "topic '{}' cannot be deleted at runtime (requires restart)",
                    old_topic.name
                )));
            }
        }

        if old.engine != new.engine {
            tracing::warn!("engine limits changed; they apply after restart");
        }

        let ctx = CancellationToken::new();
        for topic in &new.topics {
            self.reload_topic(&ctx, &topic.name, topic.partitions)?;
        }

        tracing::info!(topics = new.topics.len(), "config reload complete");
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Create a topic with `partitions` partitions.
    ///
    /// Idempotent: if the topic exists the call succeeds and the original
    /// partition count is kept, whatever `partitions` says.
    pub fn create_topic(
        &self,
        ctx: &CancellationToken,
        name: &str,
        partitions: u32,
    ) -> Result<(), BrokerError> {
        self.check_call(ctx)?;
        self.validate_topic_name(name)?;
        if partitions == 0 {
            return Err(BrokerError::InvalidArgument(format!(
                "topic '{name}': partition count must be at least 1"
            )));
        }

        let (topic, created) = self.inner.topics.get_or_create(name, partitions)?;
        if created {
            tracing::info!(topic = %name, partitions, "created topic");
        } else if topic.partition_count() != partitions {
            tracing::warn!(
                topic = %name,
                existing = topic.partition_count(),
                requested = partitions,
                "topic exists, keeping original partition count"
            );
        }
        Ok(())
    }

    /// All topic names, sorted.
    pub fn list_topics(&self, ctx: &CancellationToken) -> Result<Vec<String>, BrokerError> {
        self.check_call(ctx)?;
        Ok(self.inner.topics.topic_names())
    }

    /// Append a record to `topic`. Keyed records go to
    /// `murmur2(key) & 0x7fffffff % partitions`; unkeyed ones round-robin.
    /// Never waits on consumers.
    pub fn produce(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        record: ProducerRecord,
    ) -> Result<Produced, BrokerError> {
        self.check_call(ctx)?;
        let topic_ref = self.topic(topic)?;
        if record.size() > self.inner.config.max_record_bytes {
            return Err(BrokerError::InvalidArgument(format!(
                "record of {} bytes exceeds limit of {} bytes",
                record.size(),
                self.inner.config.max_record_bytes
            )));
        }

        let (partition, offset) = topic_ref.append(record);
        tracing::trace!(topic, partition, offset, "produced record");
        Ok(Produced { partition, offset })
    }

    /// Open a session for `group` over every partition of `topic`.
    ///
    /// The group's cursors are created at offset 0 on first use. Fails with
    /// [`BrokerError::AlreadyConsuming`] if any partition of the group is
    /// already being consumed; no partition is taken in that case.
    pub fn consume(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        group: &str,
    ) -> Result<Subscription, BrokerError> {
        self.check_call(ctx)?;
        validate_group(group)?;
        let topic_ref = self.topic(topic)?;
        let cursors = self
            .inner
            .cursors
            .get_or_create(topic, group, topic_ref.partition_count());
        let leases = cursors.lease_all()?;

        let streams = leases
            .into_iter()
            .zip(topic_ref.partitions())
            .map(|(lease, log)| {
                DeliveryStream::new(log.clone(), lease, ctx.clone(), self.inner.shutdown.clone())
            })
            .collect();

        tracing::info!(
            topic,
            group,
            partitions = topic_ref.partition_count(),
            "consume session started"
        );
        Ok(Subscription::new(topic.to_string(), group.to_string(), streams))
    }

    /// Open a delivery stream for one partition, so several sessions of a
    /// group can share a topic.
    pub fn consume_partition(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        group: &str,
        partition: u32,
    ) -> Result<DeliveryStream, BrokerError> {
        self.check_call(ctx)?;
        validate_group(group)?;
        let topic_ref = self.topic(topic)?;
        let log = topic_ref.partition(partition)?.clone();
        let lease = self
            .inner
            .cursors
            .get_or_create(topic, group, topic_ref.partition_count())
            .lease(partition)?;

        tracing::info!(topic, group, partition, "partition stream started");
        Ok(DeliveryStream::new(
            log,
            lease,
            ctx.clone(),
            self.inner.shutdown.clone(),
        ))
    }

    /// Move an idle cursor to `offset`, which may be anywhere up to the
    /// partition's current length.
    pub fn seek(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        group: &str,
        partition: u32,
        offset: u64,
    ) -> Result<(), BrokerError> {
        self.check_call(ctx)?;
        validate_group(group)?;
        let topic_ref = self.topic(topic)?;
        let log = topic_ref.partition(partition)?;
        let length = log.len();
        if offset > length {
            return Err(log.out_of_range(offset, length));
        }
        let lease = self
            .inner
            .cursors
            .get_or_create(topic, group, topic_ref.partition_count())
            .lease(partition)?;
        lease.reset(offset);
        tracing::info!(topic, group, partition, offset, "cursor repositioned");
        Ok(())
    }

    pub fn describe_topic(&self, topic: &str) -> Result<TopicInfo, BrokerError> {
        self.check_open()?;
        Ok(self.topic(topic)?.info())
    }

    /// Sorted names of groups that have consumed or sought on `topic`.
    pub fn groups(&self, topic: &str) -> Result<Vec<String>, BrokerError> {
        self.check_open()?;
        self.topic(topic)?;
        Ok(self.inner.cursors.groups(topic))
    }

    /// Per-partition progress of `group`. A group that never consumed the
    /// topic reports position 0 everywhere; no cursors are created.
    pub fn group_offsets(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Vec<GroupPartitionOffset>, BrokerError> {
        self.check_open()?;
        let topic_ref = self.topic(topic)?;
        let cursors = self.inner.cursors.get(topic, group);
        Ok(topic_ref
            .partitions()
            .iter()
            .map(|log| {
                let partition = log.index();
                let length = log.len();
                let position = cursors
                    .as_ref()
                    .and_then(|c| c.position(partition))
                    .unwrap_or(0);
                GroupPartitionOffset {
                    partition,
                    position,
                    length,
                    lag: length.saturating_sub(position),
                    active: cursors.as_ref().is_some_and(|c| c.is_leased(partition)),
                }
            })
            .collect())
    }

    pub fn stats(&self) -> EngineStats {
        let topics = self.inner.topics.topics();
        EngineStats {
            topics: topics.len(),
            partitions: topics.iter().map(|t| t.partition_count() as usize).sum(),
            records: topics.iter().map(|t| t.info().total_records()).sum(),
            groups: self.inner.cursors.len(),
            active_streams: self.inner.cursors.active_leases(),
        }
    }

    /// Stop the engine: every live delivery stream finishes with
    /// `Completion::Shutdown` and later calls fail.
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        let stats = self.stats();
        tracing::info!(
            topics = stats.topics,
            records = stats.records,
            active_streams = stats.active_streams,
            "broker engine shut down"
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Token cancelled when the engine shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    fn reload_topic(
        &self,
        ctx: &CancellationToken,
        name: &str,
        partitions: u32,
    ) -> Result<(), BrokerError> {
        match self.inner.topics.get(name) {
            Some(existing) if existing.partition_count() != partitions => {
                tracing::warn!(
                    topic = %name,
                    existing = existing.partition_count(),
                    requested = partitions,
                    "partition count cannot change at runtime, ignoring"
                );
                Ok(())
            }
            Some(_) => Ok(()),
            None => {
                self
                    .create_topic(ctx, name, partitions)
                    .map_err(|e| e.with_context(format!("topic '{name}'")))?;
                tracing::info!(topic = %name, partitions, "created new topic (reload)");
                Ok(())
            }
        }
    }

    fn topic(&self, name: &str) -> Result<Arc<Topic>, BrokerError> {
        self.inner
            .topics
            .get(name)
            .ok_or_else(|| BrokerError::TopicNotFound(name.to_string()))
    }

    fn check_open(&self) -> Result<(), BrokerError> {
        if self.is_shut_down() {
            return Err(BrokerError::ShuttingDown);
        }
        Ok(())
    }

    fn check_call(&self, ctx: &CancellationToken) -> Result<(), BrokerError> {
        self.check_open()?;
        if ctx.is_cancelled() {
            return Err(BrokerError::Cancelled);
        }
        Ok(())
    }

    fn validate_topic_name(&self, name: &str) -> Result<(), BrokerError> {
        if name.is_empty() {
            return Err(BrokerError::InvalidArgument(
                "topic name must not be empty".into(),
            ));
        }
        if name.len() > self.inner.config.max_topic_name_len {
            return Err(BrokerError::InvalidArgument(format!(
                "topic name longer than {} bytes",
                self.inner.config.max_topic_name_len
            )));
        }
        Ok(())
    }
}

fn validate_group(group: &str) -> Result<(), BrokerError> {
    if group.is_empty() {
        return Err(BrokerError::InvalidArgument(
            "group name must not be empty".into(),
        ));
    }
    Ok(())
}
