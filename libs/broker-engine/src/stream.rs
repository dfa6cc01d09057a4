use std::sync::Arc;

use futures::Stream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cursor::CursorLease;
use crate::error::BrokerError;
use crate::partition::{PartitionLog, ReadOutcome};
use crate::record::DeliveredRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Cursor is behind the tail; records are handed out without waiting.
    CatchingUp,
    /// Cursor is at the tail; waiting for the next append.
    LiveWaiting,
    Cancelled,
    Closed,
}

/// Why a stream stopped. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The caller's token fired.
    Cancelled,
    /// The engine was shut down.
    Shutdown,
    /// A previous `next` returned an error.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Record(DeliveredRecord),
    Finished(Completion),
}

/// Live feed of one partition for one consumer group.
///
/// Replays from the group's cursor and then follows the tail. The cursor is
/// committed as each record is returned from [`DeliveryStream::next`]; the
/// lease on it is released when the stream is dropped.
pub struct DeliveryStream {
    log: Arc<PartitionLog>,
    lease: CursorLease,
    tail_rx: watch::Receiver<u64>,
    cancel: CancellationToken,
    shutdown: CancellationToken,
    state: StreamState,
    completion: Option<Completion>,
    delivered: u64,
}

impl std::fmt::Debug for DeliveryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryStream")
            .field("topic", &self.lease.topic())
            .field("group", &self.lease.group())
            .field("partition", &self.lease.partition())
            .field("state", &self.state)
            .field("position", &self.lease.position())
            .finish()
    }
}

impl DeliveryStream {
    pub(crate) fn new(
        log: Arc<PartitionLog>,
        lease: CursorLease,
        cancel: CancellationToken,
        shutdown: CancellationToken,
    ) -> Self {
        let tail_rx = log.watch_tail();
        Self {
            log,
            lease,
            tail_rx,
            cancel,
            shutdown,
            state: StreamState::CatchingUp,
            completion: None,
            delivered: 0,
        }
    }

    pub fn topic(&self) -> &str {
        self.lease.topic()
    }

    pub fn group(&self) -> &str {
        self.lease.group()
    }

    pub fn partition(&self) -> u32 {
        self.lease.partition()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    /// Next offset this stream will deliver; equals the group's cursor.
    pub fn position(&self) -> u64 {
        self.lease.position()
    }

    /// Records handed out by this stream instance.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Wait for the next record or for the stream to finish.
    ///
    /// Cancel-safe: dropping the future while it waits neither consumes nor
    /// skips a record. Once finished, every call returns the same completion.
    pub async fn next(&mut self) -> Result<Delivery, BrokerError> {
        loop {
            if let Some(completion) = self.completion {
                return Ok(Delivery::Finished(completion));
            }
            if self.cancel.is_cancelled() {
                self.finish(StreamState::Cancelled, Completion::Cancelled);
                continue;
            }
            if self.shutdown.is_cancelled() {
                self.finish(StreamState::Closed, Completion::Shutdown);
                continue;
            }

            // Mark the current tail as seen before reading so an append that
            // lands after the read still wakes the wait below.
            self.tail_rx.borrow_and_update();

            let offset = self.lease.position();
            match self.log.read_from(offset) {
                Ok(ReadOutcome::Record(record)) => {
                    self.lease.commit(record.offset);
                    self.delivered += 1;
                    self.state = if self.lease.position() < self.log.len() {
                        StreamState::CatchingUp
                    } else {
                        StreamState::LiveWaiting
                    };
                    return Ok(Delivery::Record(DeliveredRecord::new(
                        self.lease.partition(),
                        record,
                    )));
                }
                Ok(ReadOutcome::Tail) => {
                    self.state = StreamState::LiveWaiting;
                    let log_gone = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => false,
                        _ = self.shutdown.cancelled() => false,
                        changed = self.tail_rx.changed() => changed.is_err(),
                    };
                    if log_gone {
                        self.finish(StreamState::Closed, Completion::Shutdown);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        topic = %self.lease.topic(),
                        group = %self.lease.group(),
                        partition = self.lease.partition(),
                        error = %e,
                        "cursor ahead of partition tail"
                    );
                    self.state = StreamState::Closed;
                    self.completion = Some(Completion::Failed);
                    return Err(e);
                }
            }
        }
    }

    /// Adapt into a `futures::Stream` that ends when the delivery stream finishes.
    pub fn into_stream(self) -> impl Stream<Item = Result<DeliveredRecord, BrokerError>> {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next().await {
                Ok(Delivery::Record(record)) => Some((Ok(record), stream)),
                Ok(Delivery::Finished(_)) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }

    fn finish(&mut self, state: StreamState, completion: Completion) {
        self.state = state;
        self.completion = Some(completion);
        tracing::info!(
            topic = %self.lease.topic(),
            group = %self.lease.group(),
            partition = self.lease.partition(),
            delivered = self.delivered,
            next_offset = self.lease.position(),
            ?completion,
            "delivery stream finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use tokio::time::timeout;

    use super::*;
    use crate::cursor::CursorStore;
    use crate::error::ErrorKind;
    use crate::record::ProducerRecord;

    struct Fixture {
        log: Arc<PartitionLog>,
        store: CursorStore,
        shutdown: CancellationToken,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                log: Arc::new(PartitionLog::new("t", 0)),
                store: CursorStore::new(),
                shutdown: CancellationToken::new(),
            }
        }

        fn stream(&self, group: &str, cancel: &CancellationToken) -> DeliveryStream {
            let lease = self.store.get_or_create("t", group, 1).lease(0).unwrap();
            self.stream_with(lease, cancel)
        }

        fn stream_with(&self, lease: CursorLease, cancel: &CancellationToken) -> DeliveryStream {
            DeliveryStream::new(
                self.log.clone(),
                lease,
                cancel.clone(),
                self.shutdown.clone(),
            )
        }
    }

    async fn next_record(stream: &mut DeliveryStream) -> DeliveredRecord {
        match timeout(Duration::from_secs(5), stream.next()).await {
            Ok(Ok(Delivery::Record(r))) => r,
            other => panic!("expected a record, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn replays_then_follows_tail() {
        let fx = Fixture::new();
        fx.log.append(ProducerRecord::unkeyed("a"));
        fx.log.append(ProducerRecord::unkeyed("b"));

        let cancel = CancellationToken::new();
        let mut stream = fx.stream("g", &cancel);
        assert_eq!(next_record(&mut stream).await.offset, 0);
        assert_eq!(next_record(&mut stream).await.offset, 1);
        assert_eq!(stream.position(), 2);

        let writer = fx.log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.append(ProducerRecord::unkeyed("c"));
        });
        let live = next_record(&mut stream).await;
        assert_eq!(live.offset, 2);
        assert_eq!(&live.value[..], b"c");
        assert_eq!(stream.delivered(), 3);
    }

    #[tokio::test]
    async fn state_tracks_distance_from_tail() {
        let fx = Fixture::new();
        fx.log.append(ProducerRecord::unkeyed("a"));
        fx.log.append(ProducerRecord::unkeyed("b"));
        let cancel = CancellationToken::new();
        let mut stream = fx.stream("g", &cancel);
        assert_eq!(stream.state(), StreamState::CatchingUp);

        next_record(&mut stream).await;
        assert_eq!(stream.state(), StreamState::CatchingUp);
        next_record(&mut stream).await;
        assert_eq!(stream.position(), fx.log.len());
        assert_eq!(stream.state(), StreamState::LiveWaiting);

        fx.log.append(ProducerRecord::unkeyed("c"));
        next_record(&mut stream).await;
        assert_eq!(stream.state(), StreamState::LiveWaiting);
    }

    #[tokio::test]
    async fn cursor_past_tail_fails_the_stream() {
        let fx = Fixture::new();
        fx.log.append(ProducerRecord::unkeyed("a"));
        let cancel = CancellationToken::new();
        let lease = fx.store.get_or_create("t", "g", 1).lease(0).unwrap();
        lease.reset(fx.log.len() + 4);
        let mut stream = fx.stream_with(lease, &cancel);

        let err = stream.next().await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::OutOfRange {
                offset: 5,
                length: 1,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(stream.completion(), Some(Completion::Failed));
        assert_eq!(
            stream.next().await.unwrap(),
            Delivery::Finished(Completion::Failed)
        );
        // The faulty cursor is reported, not corrected.
        assert_eq!(stream.position(), 5);
        assert_eq!(stream.delivered(), 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_tail_wait() {
        let fx = Fixture::new();
        let cancel = CancellationToken::new();
        let mut stream = fx.stream("g", &cancel);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = timeout(Duration::from_secs(5), stream.next()).await.unwrap();
        assert_eq!(result.unwrap(), Delivery::Finished(Completion::Cancelled));
        assert_eq!(stream.state(), StreamState::Cancelled);
        // Finished streams keep reporting the same completion.
        assert_eq!(
            stream.next().await.unwrap(),
            Delivery::Finished(Completion::Cancelled)
        );
    }

    #[tokio::test]
    async fn shutdown_closes_stream() {
        let fx = Fixture::new();
        fx.log.append(ProducerRecord::unkeyed("a"));
        let cancel = CancellationToken::new();
        let mut stream = fx.stream("g", &cancel);

        fx.shutdown.cancel();
        assert_eq!(
            stream.next().await.unwrap(),
            Delivery::Finished(Completion::Shutdown)
        );
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(stream.position(), 0);
    }

    #[tokio::test]
    async fn dropping_stream_releases_lease() {
        let fx = Fixture::new();
        let cancel = CancellationToken::new();
        let stream = fx.stream("g", &cancel);
        let cursors = fx.store.get("t", "g").unwrap();
        assert!(cursors.is_leased(0));
        drop(stream);
        assert!(!cursors.is_leased(0));
    }

    #[tokio::test]
    async fn dropped_next_future_loses_nothing() {
        let fx = Fixture::new();
        let cancel = CancellationToken::new();
        let mut stream = fx.stream("g", &cancel);

        // Abandon a pending wait at the tail.
        assert!(timeout(Duration::from_millis(20), stream.next()).await.is_err());
        fx.log.append(ProducerRecord::unkeyed("a"));
        assert_eq!(next_record(&mut stream).await.offset, 0);
    }

    #[tokio::test]
    async fn futures_stream_adapter_ends_on_cancel() {
        let fx = Fixture::new();
        for v in ["a", "b", "c"] {
            fx.log.append(ProducerRecord::unkeyed(v));
        }
        let cancel = CancellationToken::new();
        let stream = fx.stream("g", &cancel).into_stream();
        futures::pin_mut!(stream);

        let mut seen = Vec::new();
        while let Some(item) = stream.next().await {
            seen.push(item.unwrap().offset);
            if seen.len() == 3 {
                cancel.cancel();
            }
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
