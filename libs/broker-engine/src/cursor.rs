//! Consumer group cursors.
//!
//! Each (topic, group) pair owns one cursor per partition holding the next
//! offset to deliver. A cursor only moves through a [`CursorLease`], and at
//! most one lease per cursor exists at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::BrokerError;
use crate::lock;

#[derive(Debug, Default)]
struct PartitionCursor {
    next_offset: AtomicU64,
    leased: AtomicBool,
}

/// Cursors of one consumer group on one topic.
#[derive(Debug)]
pub struct GroupCursors {
    topic: String,
    group: String,
    partitions: Vec<PartitionCursor>,
}

impl GroupCursors {
    fn new(topic: String, group: String, partition_count: u32) -> Self {
        Self {
            topic,
            group,
            partitions: (0..partition_count)
                .map(|_| PartitionCursor::default())
                .collect(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    /// Next offset the group will receive from `partition`.
    pub fn position(&self, partition: u32) -> Option<u64> {
        self.partitions
            .get(partition as usize)
            .map(|c| c.next_offset.load(Ordering::Acquire))
    }

    pub fn is_leased(&self, partition: u32) -> bool {
        self.partitions
            .get(partition as usize)
            .is_some_and(|c| c.leased.load(Ordering::Acquire))
    }

    pub fn active_leases(&self) -> usize {
        self.partitions
            .iter()
            .filter(|c| c.leased.load(Ordering::Acquire))
            .count()
    }

    /// Take exclusive ownership of one partition cursor.
    pub fn lease(self: &Arc<Self>, partition: u32) -> Result<CursorLease, BrokerError> {
        let cursor = self
            .partitions
            .get(partition as usize)
            .ok_or_else(|| BrokerError::PartitionNotFound {
                topic: self.topic.clone(),
                partition,
            })?;
        cursor
            .leased
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BrokerError::AlreadyConsuming {
                topic: self.topic.clone(),
                group: self.group.clone(),
                partition,
            })?;
        Ok(CursorLease {
            cursors: self.clone(),
            partition,
        })
    }

    /// Lease every partition, or none: leases taken before a conflict are
    /// released when the partial vector drops.
    pub fn lease_all(self: &Arc<Self>) -> Result<Vec<CursorLease>, BrokerError> {
        (0..self.partition_count())
            .map(|p| self.lease(p))
            .collect()
    }

    fn cursor(&self, partition: u32) -> &PartitionCursor {
        &self.partitions[partition as usize]
    }
}

/// Exclusive right to advance one (topic, group, partition) cursor.
/// Released on drop.
#[derive(Debug)]
pub struct CursorLease {
    cursors: Arc<GroupCursors>,
    partition: u32,
}

impl CursorLease {
    pub fn topic(&self) -> &str {
        self.cursors.topic()
    }

    pub fn group(&self) -> &str {
        self.cursors.group()
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    pub fn position(&self) -> u64 {
        self.cursors
            .cursor(self.partition)
            .next_offset
            .load(Ordering::Acquire)
    }

    /// Record that `offset` was handed off. Never moves the cursor backwards.
    pub fn commit(&self, offset: u64) {
        self.cursors
            .cursor(self.partition)
            .next_offset
            .fetch_max(offset + 1, Ordering::AcqRel);
    }

    /// Reposition the cursor, backwards or forwards. Bounds are the caller's job.
    pub(crate) fn reset(&self, offset: u64) {
        self.cursors
            .cursor(self.partition)
            .next_offset
            .store(offset, Ordering::Release);
    }
}

impl Drop for CursorLease {
    fn drop(&mut self) {
        self.cursors
            .cursor(self.partition)
            .leased
            .store(false, Ordering::Release);
    }
}

/// All cursors known to an engine, keyed by (topic, group).
#[derive(Debug, Default)]
pub struct CursorStore {
    groups: RwLock<HashMap<(String, String), Arc<GroupCursors>>>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursors for (topic, group), created at offset 0 on first use.
    pub fn get_or_create(&self, topic: &str, group: &str, partition_count: u32) -> Arc<GroupCursors> {
        let key = (topic.to_string(), group.to_string());
        if let Some(existing) = lock::read(&self.groups, "cursor store").get(&key) {
            return existing.clone();
        }
        let mut guard = lock::write(&self.groups, "cursor store");
        guard
            .entry(key)
            .or_insert_with(|| {
                tracing::debug!(topic, group, partitions = partition_count, "created group cursors");
                Arc::new(GroupCursors::new(
                    topic.to_string(),
                    group.to_string(),
                    partition_count,
                ))
            })
            .clone()
    }

    pub fn get(&self, topic: &str, group: &str) -> Option<Arc<GroupCursors>> {
        lock::read(&self.groups, "cursor store")
            .get(&(topic.to_string(), group.to_string()))
            .cloned()
    }

    /// Sorted names of the groups that have cursors on `topic`.
    pub fn groups(&self, topic: &str) -> Vec<String> {
        let mut groups: Vec<String> = lock::read(&self.groups, "cursor store")
            .keys()
            .filter(|(t, _)| t == topic)
            .map(|(_, g)| g.clone())
            .collect();
        groups.sort();
        groups
    }

    pub fn len(&self) -> usize {
        lock::read(&self.groups, "cursor store").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_leases(&self) -> usize {
        lock::read(&self.groups, "cursor store")
            .values()
            .map(|g| g.active_leases())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursors_start_at_zero_and_are_per_group() {
        let store = CursorStore::new();
        let a = store.get_or_create("orders", "billing", 2);
        let b = store.get_or_create("orders", "audit", 2);
        assert_eq!(a.position(0), Some(0));
        assert_eq!(a.position(2), None);

        let lease = a.lease(0).unwrap();
        lease.commit(0);
        lease.commit(1);
        assert_eq!(a.position(0), Some(2));
        assert_eq!(b.position(0), Some(0));
        assert_eq!(store.groups("orders"), vec!["audit", "billing"]);
    }

    #[test]
    fn second_lease_is_rejected_until_release() {
        let store = CursorStore::new();
        let cursors = store.get_or_create("t", "g", 1);
        let lease = cursors.lease(0).unwrap();
        assert!(cursors.is_leased(0));
        assert!(matches!(
            cursors.lease(0),
            Err(BrokerError::AlreadyConsuming { partition: 0, .. })
        ));
        drop(lease);
        assert!(!cursors.is_leased(0));
        assert!(cursors.lease(0).is_ok());
    }

    #[test]
    fn lease_all_is_all_or_nothing() {
        let store = CursorStore::new();
        let cursors = store.get_or_create("t", "g", 3);
        let held = cursors.lease(2).unwrap();

        assert!(cursors.lease_all().is_err());
        assert!(!cursors.is_leased(0));
        assert!(!cursors.is_leased(1));
        assert_eq!(store.active_leases(), 1);

        drop(held);
        let all = cursors.lease_all().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(store.active_leases(), 3);
    }

    #[test]
    fn commit_never_moves_backwards() {
        let store = CursorStore::new();
        let cursors = store.get_or_create("t", "g", 1);
        let lease = cursors.lease(0).unwrap();
        lease.commit(5);
        lease.commit(3);
        assert_eq!(lease.position(), 6);
        lease.reset(2);
        assert_eq!(lease.position(), 2);
    }
}
