use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::{Arc, RwLock};

use crate::error::BrokerError;
use crate::lock;
use crate::partition::PartitionLog;
use crate::partitioner::Partitioner;
use crate::record::ProducerRecord;

/// A named topic: a fixed set of partition logs.
pub struct Topic {
    name: String,
    partition_count: NonZeroU32,
    partitions: Vec<Arc<PartitionLog>>,
    partitioner: Partitioner,
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

/// Snapshot of a topic's layout and per-partition lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo {
    pub name: String,
    pub partitions: Vec<PartitionInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub index: u32,
    pub length: u64,
}

impl TopicInfo {
    pub fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    pub fn total_records(&self) -> u64 {
        self.partitions.iter().map(|p| p.length).sum()
    }
}

impl Topic {
    /// Fails with [`BrokerError::InvalidArgument`] for a zero partition count.
    pub fn new(name: String, partition_count: u32) -> Result<Self, BrokerError> {
        let Some(count) = NonZeroU32::new(partition_count) else {
            return Err(BrokerError::InvalidArgument(format!(
                "topic '{name}': partition count must be at least 1"
            )));
        };
        let partitions = (0..partition_count)
            .map(|index| Arc::new(PartitionLog::new(name.clone(), index)))
            .collect();
        Ok(Self {
            name,
            partition_count: count,
            partitions,
            partitioner: Partitioner::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count.get()
    }

    pub fn partition(&self, index: u32) -> Result<&Arc<PartitionLog>, BrokerError> {
        self.partitions
            .get(index as usize)
            .ok_or_else(|| BrokerError::PartitionNotFound {
                topic: self.name.clone(),
                partition: index,
            })
    }

    pub fn partitions(&self) -> &[Arc<PartitionLog>] {
        &self.partitions
    }

    /// Route the record to a partition and append it. Returns `(partition, offset)`.
    pub fn append(&self, record: ProducerRecord) -> (u32, u64) {
        let index = self
            .partitioner
            .select(&record.key, self.partition_count);
        let offset = self.partitions[index as usize].append(record);
        (index, offset)
    }

    pub fn info(&self) -> TopicInfo {
        TopicInfo {
            name: self.name.clone(),
            partitions: self
                .partitions
                .iter()
                .map(|p| PartitionInfo {
                    index: p.index(),
                    length: p.len(),
                })
                .collect(),
        }
    }
}

/// Directory of all topics, ordered by name.
///
/// Lookups share the read lock; creation holds the write lock only for the
/// check-and-insert.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: RwLock<BTreeMap<String, Arc<Topic>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing topic, or create it with `partition_count`
    /// partitions. The flag is `true` when the topic was created by this call.
    /// A zero count is only rejected when the topic would be created.
    pub fn get_or_create(
        &self,
        name: &str,
        partition_count: u32,
    ) -> Result<(Arc<Topic>, bool), BrokerError> {
        if let Some(existing) = self.get(name) {
            return Ok((existing, false));
        }
        let mut guard = lock::write(&self.topics, "topic registry");
        if let Some(existing) = guard.get(name) {
            return Ok((existing.clone(), false));
        }
        let topic = Arc::new(Topic::new(name.to_string(), partition_count)?);
        guard.insert(name.to_string(), topic.clone());
        Ok((topic, true))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Topic>> {
        lock::read(&self.topics, "topic registry").get(name).cloned()
    }

    /// Sorted topic names as of the call.
    pub fn topic_names(&self) -> Vec<String> {
        lock::read(&self.topics, "topic registry")
            .keys()
            .cloned()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        lock::read(&self.topics, "topic registry").contains_key(name)
    }

    pub fn topics(&self) -> Vec<Arc<Topic>> {
        lock::read(&self.topics, "topic registry")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        lock::read(&self.topics, "topic registry").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = TopicRegistry::new();
        let (first, created) = registry.get_or_create("orders", 3).unwrap();
        assert!(created);
        let (second, created) = registry.get_or_create("orders", 5).unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.partition_count(), 3);
    }

    #[test]
    fn zero_partitions_are_rejected() {
        let registry = TopicRegistry::new();
        let err = registry.get_or_create("empty", 0).unwrap_err();
        assert!(matches!(err, BrokerError::InvalidArgument(_)));
        assert!(!registry.contains("empty"));
        assert!(registry.is_empty());
        assert!(matches!(
            Topic::new("empty".into(), 0),
            Err(BrokerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn names_are_sorted_and_case_sensitive() {
        let registry = TopicRegistry::new();
        for name in ["b", "a", "c", "A"] {
            registry.get_or_create(name, 1).unwrap();
        }
        assert_eq!(registry.topic_names(), vec!["A", "a", "b", "c"]);
        assert!(registry.contains("A"));
        assert!(!registry.contains("B"));
    }

    #[test]
    fn unkeyed_appends_spread_over_partitions() {
        let topic = Topic::new("events".into(), 3).unwrap();
        let placements: Vec<(u32, u64)> = (0..6)
            .map(|_| topic.append(ProducerRecord::unkeyed("v")))
            .collect();
        assert_eq!(
            placements,
            vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]
        );
        let info = topic.info();
        assert_eq!(info.partition_count(), 3);
        assert_eq!(info.total_records(), 6);
    }

    #[test]
    fn keyed_appends_stick_to_one_partition() {
        let topic = Topic::new("events".into(), 4).unwrap();
        let (partition, _) = topic.append(ProducerRecord::new("user-1", "a"));
        for expected_offset in 1..5 {
            let (p, offset) = topic.append(ProducerRecord::new("user-1", "b"));
            assert_eq!(p, partition);
            assert_eq!(offset, expected_offset);
        }
    }

    #[test]
    fn unknown_partition_is_reported() {
        let topic = Topic::new("events".into(), 2).unwrap();
        assert!(topic.partition(1).is_ok());
        assert!(matches!(
            topic.partition(2),
            Err(BrokerError::PartitionNotFound { partition: 2, .. })
        ));
    }
}
