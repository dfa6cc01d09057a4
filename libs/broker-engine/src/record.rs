use bytes::Bytes;

/// Key/value pair supplied by a producer. An empty key means "no key".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerRecord {
    pub key: Bytes,
    pub value: Bytes,
}

impl ProducerRecord {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Record without a key; routed round-robin.
    pub fn unkeyed(value: impl Into<Bytes>) -> Self {
        Self {
            key: Bytes::new(),
            value: value.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// A record stored in a partition log. Immutable once appended.
///
/// `Bytes` clones share the underlying buffer, so handing a record to a
/// consumer never copies the payload and never exposes it mutably.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
    pub offset: u64,
    /// Broker-assigned append time, epoch millis.
    pub enqueued_at_ms: i64,
}

/// What a consumer receives: the record plus the partition it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredRecord {
    pub partition: u32,
    pub offset: u64,
    pub key: Bytes,
    pub value: Bytes,
    pub enqueued_at_ms: i64,
}

impl DeliveredRecord {
    pub(crate) fn new(partition: u32, record: Record) -> Self {
        Self {
            partition,
            offset: record.offset,
            key: record.key,
            value: record.value,
            enqueued_at_ms: record.enqueued_at_ms,
        }
    }
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
