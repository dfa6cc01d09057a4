//! Partition selection for produced records.
//!
//! Keyed records go to `murmur2(key) & 0x7fffffff % partitions`, the same
//! scheme as Kafka's default partitioner, so a key always lands on the same
//! partition of a topic and clients can compute placement themselves.
//! Unkeyed records rotate across partitions starting at 0.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

const MURMUR2_SEED: u32 = 0x9747_b28c;
const MURMUR2_M: u32 = 0x5bd1_e995;
const MURMUR2_R: u32 = 24;

/// Kafka-compatible 32-bit murmur2.
pub fn murmur2(data: &[u8]) -> u32 {
    let len = data.len();
    let mut h = MURMUR2_SEED ^ (len as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(MURMUR2_M);
        k ^= k >> MURMUR2_R;
        k = k.wrapping_mul(MURMUR2_M);
        h = h.wrapping_mul(MURMUR2_M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(MURMUR2_M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(MURMUR2_M);
    h ^= h >> 15;
    h
}

/// Partition for a non-empty key.
pub fn partition_for_key(key: &[u8], partitions: NonZeroU32) -> u32 {
    (murmur2(key) & 0x7fff_ffff) % partitions.get()
}

/// Per-topic partition chooser.
#[derive(Debug, Default)]
pub struct Partitioner {
    next_unkeyed: AtomicU64,
}

impl Partitioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&self, key: &[u8], partitions: NonZeroU32) -> u32 {
        if !key.is_empty() {
            return partition_for_key(key, partitions);
        }
        let n = self.next_unkeyed.fetch_add(1, Ordering::Relaxed);
        (n % u64::from(partitions.get())) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(partitions: u32) -> NonZeroU32 {
        NonZeroU32::new(partitions).unwrap()
    }

    #[test]
    fn murmur2_matches_kafka_vectors() {
        assert_eq!(murmur2(b"21") as i32, -973_932_308);
        assert_eq!(murmur2(b"foobar") as i32, -790_332_482);
        assert_eq!(murmur2(b"a-little-bit-long-string") as i32, -985_981_536);
        assert_eq!(murmur2(b"abc"), 479_470_107);
    }

    #[test]
    fn keyed_selection_is_stable() {
        let p = Partitioner::new();
        let first = p.select(b"user-42", n(8));
        for _ in 0..100 {
            assert_eq!(p.select(b"user-42", n(8)), first);
        }
        assert_eq!(partition_for_key(b"21", n(10)), 1_173_551_340 % 10);
    }

    #[test]
    fn unkeyed_selection_round_robins() {
        let p = Partitioner::new();
        let picks: Vec<u32> = (0..7).map(|_| p.select(b"", n(3))).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn single_partition_takes_everything() {
        let p = Partitioner::new();
        assert_eq!(p.select(b"user-42", n(1)), 0);
        assert_eq!(p.select(b"", n(1)), 0);
        assert_eq!(p.select(b"", n(1)), 0);
    }

    #[test]
    fn keyed_selection_spreads() {
        let mut buckets = [0u32; 4];
        for i in 0..4000 {
            let key = format!("key-{i}");
            buckets[partition_for_key(key.as_bytes(), n(4)) as usize] += 1;
        }
        for count in buckets {
            assert!(count > 600, "uneven distribution: {buckets:?}");
        }
    }
}
