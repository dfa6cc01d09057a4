use futures::Stream;

use crate::error::BrokerError;
use crate::record::DeliveredRecord;
use crate::stream::{Completion, Delivery, DeliveryStream};

/// A consumer group session over every partition of a topic.
///
/// Merges the per-partition delivery streams. Order is preserved within a
/// partition; across partitions the start of each selection rotates so a
/// partition with a backlog cannot starve the others.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    group: String,
    streams: Vec<DeliveryStream>,
    next_start: usize,
}

impl Subscription {
    pub(crate) fn new(topic: String, group: String, streams: Vec<DeliveryStream>) -> Self {
        Self {
            topic,
            group,
            streams,
            next_start: 0,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn streams(&self) -> &[DeliveryStream] {
        &self.streams
    }

    /// Split into one delivery stream per partition, ordered by partition.
    pub fn into_partition_streams(self) -> Vec<DeliveryStream> {
        self.streams
    }

    /// `(partition, next offset)` for every partition of the session.
    pub fn positions(&self) -> Vec<(u32, u64)> {
        self.streams
            .iter()
            .map(|s| (s.partition(), s.position()))
            .collect()
    }

    /// Next record from whichever partition has one first.
    ///
    /// Cancel-safe for the same reason [`DeliveryStream::next`] is.
    pub async fn next(&mut self) -> Result<Delivery, BrokerError> {
        let count = self.streams.len();
        if count == 0 {
            return Ok(Delivery::Finished(Completion::Cancelled));
        }
        if self.streams.iter().all(|s| s.completion().is_some()) {
            return Ok(Delivery::Finished(self.completion()));
        }
        let start = self.next_start % count;
        self.next_start = self.next_start.wrapping_add(1);

        let (head, tail) = self.streams.split_at_mut(start);
        let pending: Vec<_> = tail
            .iter_mut()
            .chain(head.iter_mut())
            .filter(|s| s.completion().is_none())
            .map(|s| Box::pin(s.next()))
            .collect();
        let (result, _, _) = futures::future::select_all(pending).await;
        result
    }

    /// Completion reported once every partition stream has finished.
    fn completion(&self) -> Completion {
        self.streams
            .iter()
            .filter_map(|s| s.completion())
            .find(|c| *c != Completion::Failed)
            .unwrap_or(Completion::Failed)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<DeliveredRecord, BrokerError>> {
        futures::stream::unfold(self, |mut sub| async move {
            match sub.next().await {
                Ok(Delivery::Record(record)) => Some((Ok(record), sub)),
                Ok(Delivery::Finished(completion)) => {
                    tracing::debug!(
                        topic = %sub.topic,
                        group = %sub.group,
                        ?completion,
                        "subscription finished"
                    );
                    None
                }
                Err(e) => Some((Err(e), sub)),
            }
        })
    }
}
