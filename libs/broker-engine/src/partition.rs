use std::sync::RwLock;

use tokio::sync::watch;

use crate::error::BrokerError;
use crate::lock;
use crate::record::{ProducerRecord, Record, now_ms};

/// Result of reading one offset from a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Record(Record),
    /// The offset equals the current length: nothing there yet.
    Tail,
}

/// Append-only, in-memory log for one topic partition.
///
/// Offsets start at 0 and are contiguous. Appends take the write lock, assign
/// the offset, store the record and publish the new length as one step, so
/// readers see a record either fully or not at all.
pub struct PartitionLog {
    topic: String,
    index: u32,
    records: RwLock<Vec<Record>>,
    /// Published length, bumped inside the write lock after every append.
    tail_tx: watch::Sender<u64>,
}

impl std::fmt::Debug for PartitionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionLog")
            .field("topic", &self.topic)
            .field("index", &self.index)
            .field("len", &self.len())
            .finish()
    }
}

impl PartitionLog {
    pub fn new(topic: impl Into<String>, index: u32) -> Self {
        let (tail_tx, _) = watch::channel(0);
        Self {
            topic: topic.into(),
            index,
            records: RwLock::new(Vec::new()),
            tail_tx,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Append a record and return its offset.
    pub fn append(&self, record: ProducerRecord) -> u64 {
        let mut records = lock::write(&self.records, "partition log");
        let offset = records.len() as u64;
        records.push(Record {
            key: record.key,
            value: record.value,
            offset,
            enqueued_at_ms: now_ms(),
        });
        // Published under the lock so the watched length never goes backwards.
        self.tail_tx.send_replace(offset + 1);
        offset
    }

    pub fn read_from(&self, offset: u64) -> Result<ReadOutcome, BrokerError> {
        let records = lock::read(&self.records, "partition log");
        let length = records.len() as u64;
        if offset < length {
            Ok(ReadOutcome::Record(records[offset as usize].clone()))
        } else if offset == length {
            Ok(ReadOutcome::Tail)
        } else {
            Err(self.out_of_range(offset, length))
        }
    }

    /// Up to `max` contiguous records starting at `offset`. Empty at the tail.
    pub fn read_batch(&self, offset: u64, max: usize) -> Result<Vec<Record>, BrokerError> {
        let records = lock::read(&self.records, "partition log");
        let length = records.len() as u64;
        if offset > length {
            return Err(self.out_of_range(offset, length));
        }
        Ok(records[offset as usize..]
            .iter()
            .take(max)
            .cloned()
            .collect())
    }

    /// Number of appended records, which is also the next offset to assign.
    pub fn len(&self) -> u64 {
        lock::read(&self.records, "partition log").len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver that changes after every append.
    pub fn watch_tail(&self) -> watch::Receiver<u64> {
        self.tail_tx.subscribe()
    }

    pub(crate) fn out_of_range(&self, offset: u64, length: u64) -> BrokerError {
        BrokerError::OutOfRange {
            topic: self.topic.clone(),
            partition: self.index,
            offset,
            length,
        }
    }
}
